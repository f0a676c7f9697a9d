use apache_avro::Schema;
use replay_api::{Codec, DataFormat, StageError};

use crate::convert::value_to_avro;

/// Magic byte Confluent wire format: `[0x00][schema id: u32 BE][avro datum]`.
pub const MAGIC_BYTE: u8 = 0x00;

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct AvroCodecConfig {
    /// Путь к .avsc. Если не задан, используется встроенная схема приложения.
    pub schema_path: Option<String>,
    /// Известный schema id (без registry). Registry id имеет приоритет.
    pub schema_id: Option<u32>,
}

// ═══════════════════════════════════════════════════════════════
//  AvroCodec
// ═══════════════════════════════════════════════════════════════

/// Avro binary codec. С `schema_id` каждый payload получает
/// 5-байтовый префикс wire format'а; без него пишется голый datum.
pub struct AvroCodec {
    schema: Schema,
    schema_json: String,
    schema_id: Option<u32>,
}

impl AvroCodec {
    pub fn new(schema_json: &str, schema_id: Option<u32>) -> Result<Self, StageError> {
        let schema = Schema::parse_str(schema_json)
            .map_err(|e| StageError::config(format!("avro: failed to parse schema: {e}")))?;
        Ok(Self { schema, schema_json: schema_json.to_string(), schema_id })
    }

    /// Схема из `schema_path`, либо `fallback`.
    pub fn from_config(cfg: &AvroCodecConfig, fallback: Option<&str>) -> Result<Self, StageError> {
        let schema_json = match (&cfg.schema_path, fallback) {
            (Some(path), _) => std::fs::read_to_string(path)
                .map_err(|e| StageError::config(format!("avro: failed to read schema file '{path}': {e}")))?,
            (None, Some(schema)) => schema.to_string(),
            (None, None) => return Err(StageError::config("avro: schema_path is required")),
        };
        Self::new(&schema_json, cfg.schema_id)
    }

    pub fn with_schema_id(mut self, id: u32) -> Self {
        self.schema_id = Some(id);
        self
    }

    pub fn schema_id(&self) -> Option<u32> {
        self.schema_id
    }

    /// Исходный текст схемы (для регистрации в registry).
    pub fn schema_json(&self) -> &str {
        &self.schema_json
    }
}

impl Codec for AvroCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, StageError> {
        let avro_value = value_to_avro(value, &self.schema)?;
        let datum = apache_avro::to_avro_datum(&self.schema, avro_value)
            .map_err(|e| StageError::format_err(format!("avro encode: {e}")))?;

        let Some(id) = self.schema_id else {
            return Ok(datum);
        };
        let mut out = Vec::with_capacity(5 + datum.len());
        out.push(MAGIC_BYTE);
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&datum);
        Ok(out)
    }

    fn data_format(&self) -> DataFormat {
        DataFormat::Avro
    }
}
