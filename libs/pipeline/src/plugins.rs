use replay_api::{Codec, Framing, Transport};

use codec_avro::{AvroCodec, AvroCodecConfig, SchemaRegistryClient};
use codec_json::{JsonCodec, JsonCodecConfig};
use framing_length_prefixed::{LengthPrefixedConfig, LengthPrefixedFraming};
use framing_lines::{LinesConfig, LinesFraming};
use transport_stdout::StdoutTransport;
use transport_tcp_client::{TcpClientConfig, TcpClientTransport};

use crate::config::{RegistryConfig, SinkConfig, parse_required, parse_stage_config};
use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Built-in stages by name
// ═══════════════════════════════════════════════════════════════

pub(crate) fn transport(cfg: &SinkConfig) -> Result<Box<dyn Transport>, PipelineError> {
    match cfg.transport.as_str() {
        "tcp-client" => {
            let raw = cfg
                .transport_config
                .as_ref()
                .ok_or_else(|| PipelineError::Config("tcp-client requires transport_config { host, port }".into()))?;
            let tcp: TcpClientConfig = parse_required("transport", raw)?;
            Ok(Box::new(TcpClientTransport::new(&tcp)))
        }
        "stdout" => Ok(Box::new(StdoutTransport::new())),
        other => Err(PipelineError::Config(format!("unknown transport '{other}'"))),
    }
}

pub(crate) fn framing(cfg: &SinkConfig) -> Result<Box<dyn Framing>, PipelineError> {
    match cfg.framing.as_str() {
        "lines" => {
            let lines: LinesConfig = parse_stage_config("framing", &cfg.framing_config)?;
            Ok(Box::new(LinesFraming::new(&lines)))
        }
        "length-prefixed" => {
            let lp: LengthPrefixedConfig = parse_stage_config("framing", &cfg.framing_config)?;
            let framing = LengthPrefixedFraming::new(&lp).map_err(PipelineError::stage("framing"))?;
            Ok(Box::new(framing))
        }
        other => Err(PipelineError::Config(format!("unknown framing '{other}'"))),
    }
}

/// Codec по имени. Для Avro при заданном registry схема регистрируется
/// и полученный id уходит в wire prefix.
pub(crate) async fn codec(
    cfg: &SinkConfig,
    registry: Option<&RegistryConfig>,
    default_schema: Option<&str>,
) -> Result<Box<dyn Codec>, PipelineError> {
    match cfg.codec.as_str() {
        "json" => {
            let json: JsonCodecConfig = parse_stage_config("codec", &cfg.codec_config)?;
            Ok(Box::new(JsonCodec::new(&json)))
        }
        "avro" => {
            let avro: AvroCodecConfig = parse_stage_config("codec", &cfg.codec_config)?;
            let mut codec = AvroCodec::from_config(&avro, default_schema).map_err(PipelineError::stage("codec"))?;

            match registry {
                Some(reg) => {
                    let client = SchemaRegistryClient::new(&reg.url, reg.auth()).map_err(PipelineError::stage("schema registry"))?;
                    let subject = reg.subject.clone().unwrap_or_else(|| cfg.value_subject());
                    let id = client
                        .register(&subject, codec.schema_json())
                        .await
                        .map_err(PipelineError::stage("schema registry"))?;
                    codec = codec.with_schema_id(id);
                }
                None if codec.schema_id().is_none() => {
                    tracing::warn!(sink = %cfg.name, "no schema registry and no schema_id: writing bare avro datums");
                }
                None => {}
            }
            Ok(Box::new(codec))
        }
        other => Err(PipelineError::Config(format!("unknown codec '{other}'"))),
    }
}
