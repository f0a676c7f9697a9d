use replay_api::{Framing, StageError};

/// Newline-delimited фреймы: `payload\n`.
///
/// Подходит только для payload'ов без `\n` внутри (JSON, текст).
/// Для бинарного Avro нужен length-prefixed.
pub struct LinesFraming {
    max_length: usize,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct LinesConfig {
    /// Максимальная длина строки в байтах (0 = без ограничения).
    #[serde(default)]
    pub max_length: usize,
}

impl LinesFraming {
    pub fn new(cfg: &LinesConfig) -> Self {
        Self { max_length: cfg.max_length }
    }

    fn check_length(&self, len: usize) -> Result<(), StageError> {
        if self.max_length > 0 && len > self.max_length {
            return Err(StageError::format_err(format!(
                "line too long: {len} bytes (max {})",
                self.max_length
            )));
        }
        Ok(())
    }
}

impl Framing for LinesFraming {
    fn encode(&self, data: &[u8], buf: &mut Vec<u8>) -> Result<(), StageError> {
        if data.contains(&b'\n') {
            return Err(StageError::format_err("payload contains a newline, use length-prefixed framing"));
        }
        self.check_length(data.len())?;
        buf.extend_from_slice(data);
        buf.push(b'\n');
        Ok(())
    }
}
