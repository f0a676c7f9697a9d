use std::time::Duration;

use replay_api::StageError;
use reqwest::header::CONTENT_TYPE;

const SCHEMA_REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

#[derive(Debug, Clone)]
pub struct RegistryAuth {
    pub username: String,
    pub password: Option<String>,
}

#[derive(serde::Deserialize)]
struct RegisterResponse {
    id: u32,
}

/// Клиент Confluent-совместимого Schema Registry.
///
/// Нужен только на старте: регистрирует схему и отдаёт её id для
/// wire prefix. Регистрация идемпотентна: та же схема → тот же id.
pub struct SchemaRegistryClient {
    base_url: String,
    auth: Option<RegistryAuth>,
    client: reqwest::Client,
}

impl SchemaRegistryClient {
    pub fn new(base_url: &str, auth: Option<RegistryAuth>) -> Result<Self, StageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StageError::config(format!("schema registry client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            client,
        })
    }

    /// `POST /subjects/{subject}/versions` → schema id.
    ///
    /// 5xx и сетевые ошибки = `Io`, прочие отказы registry = `Config`.
    pub async fn register(&self, subject: &str, schema: &str) -> Result<u32, StageError> {
        let url = format!("{}/subjects/{}/versions", self.base_url, urlencoding::encode(subject));
        let mut req = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, SCHEMA_REGISTRY_CONTENT_TYPE);
        if let Some(auth) = &self.auth {
            req = req.basic_auth(&auth.username, auth.password.as_ref());
        }

        let resp = req
            .json(&serde_json::json!({ "schema": schema }))
            .send()
            .await
            .map_err(|e| StageError::io(format!("schema registry request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let msg = format!("schema registry rejected subject '{subject}' ({status}): {body}");
            return Err(if status.is_server_error() { StageError::io(msg) } else { StageError::config(msg) });
        }

        let parsed: RegisterResponse = resp
            .json()
            .await
            .map_err(|e| StageError::format_err(format!("schema registry response: {e}")))?;
        tracing::info!(registry = %self.base_url, %subject, schema_id = parsed.id, "schema registered");
        Ok(parsed.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use replay_api::ErrorKind;
    use serde_json::json;

    const SCHEMA: &str = r#"{"type":"record","name":"R","fields":[{"name":"icao","type":"string"}]}"#;

    #[tokio::test]
    async fn register_returns_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/subjects/adsb-operations-value/versions")
            .match_header("content-type", SCHEMA_REGISTRY_CONTENT_TYPE)
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .match_body(Matcher::Json(json!({ "schema": SCHEMA })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 17}"#)
            .create_async()
            .await;

        let auth = RegistryAuth { username: "user".into(), password: Some("pass".into()) };
        let client = SchemaRegistryClient::new(&format!("{}/", server.url()), Some(auth)).unwrap();
        let id = client.register("adsb-operations-value", SCHEMA).await.unwrap();

        assert_eq!(id, 17);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn incompatible_schema_is_config_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/subjects/ops-value/versions")
            .with_status(409)
            .with_body(r#"{"error_code":409,"message":"incompatible"}"#)
            .create_async()
            .await;

        let client = SchemaRegistryClient::new(&server.url(), None).unwrap();
        let err = client.register("ops-value", SCHEMA).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.message().contains("incompatible"));
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/subjects/ops-value/versions")
            .with_status(503)
            .create_async()
            .await;

        let client = SchemaRegistryClient::new(&server.url(), None).unwrap();
        assert!(client.register("ops-value", SCHEMA).await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn subject_is_escaped_in_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/subjects/ops%2Fraw%20value/versions")
            .with_status(200)
            .with_body(r#"{"id": 4}"#)
            .create_async()
            .await;

        let client = SchemaRegistryClient::new(&server.url(), None).unwrap();
        assert_eq!(client.register("ops/raw value", SCHEMA).await.unwrap(), 4);
        mock.assert_async().await;
    }
}
