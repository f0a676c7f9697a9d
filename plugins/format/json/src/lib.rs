use replay_api::{Codec, DataFormat, StageError};

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct JsonCodecConfig {
    /// Многострочный вывод (только для stdout/отладки, несовместим с lines framing).
    pub pretty: bool,
}

/// JSON codec: payload сериализуется как есть, null-поля сохраняются.
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn new(cfg: &JsonCodecConfig) -> Self {
        Self { pretty: cfg.pretty }
    }
}

impl Codec for JsonCodec {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, StageError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }

    fn data_format(&self) -> DataFormat {
        DataFormat::Json
    }
}
