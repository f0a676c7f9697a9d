use replay_api::{Framing, StageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    #[serde(alias = "be")]
    Big,
    #[serde(alias = "le")]
    Little,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
pub struct LengthPrefixedConfig {
    /// Размер заголовка длины в байтах: 1, 2 или 4 (по умолчанию 4).
    pub length_bytes: usize,

    /// Порядок байтов: "big" (по умолчанию) или "little".
    pub byte_order: ByteOrder,

    /// Максимальный размер payload в байтах (0 = без ограничения).
    pub max_payload: usize,
}

impl Default for LengthPrefixedConfig {
    fn default() -> Self {
        Self { length_bytes: 4, byte_order: ByteOrder::Big, max_payload: 0 }
    }
}

/// `[len][payload]`, длина 1/2/4 байта в заданном порядке.
pub struct LengthPrefixedFraming {
    length_bytes: usize,
    byte_order: ByteOrder,
    max_payload: usize,
}

impl LengthPrefixedFraming {
    pub fn new(cfg: &LengthPrefixedConfig) -> Result<Self, StageError> {
        if !matches!(cfg.length_bytes, 1 | 2 | 4) {
            return Err(StageError::config(format!(
                "length_bytes must be 1, 2, or 4, got {}",
                cfg.length_bytes
            )));
        }
        Ok(Self {
            length_bytes: cfg.length_bytes,
            byte_order: cfg.byte_order,
            max_payload: cfg.max_payload,
        })
    }

    fn header_limit(&self) -> usize {
        match self.length_bytes {
            1 => u8::MAX as usize,
            2 => u16::MAX as usize,
            _ => u32::MAX as usize,
        }
    }
}

impl Framing for LengthPrefixedFraming {
    fn encode(&self, data: &[u8], buf: &mut Vec<u8>) -> Result<(), StageError> {
        let len = data.len();
        if len > self.header_limit() {
            return Err(StageError::format_err(format!(
                "payload too large for {}-byte header: {len}",
                self.length_bytes
            )));
        }
        if self.max_payload > 0 && len > self.max_payload {
            return Err(StageError::format_err(format!(
                "payload too large: {len} bytes (max {})",
                self.max_payload
            )));
        }

        match (self.length_bytes, self.byte_order) {
            (1, _) => buf.push(len as u8),
            (2, ByteOrder::Big) => buf.extend_from_slice(&(len as u16).to_be_bytes()),
            (2, ByteOrder::Little) => buf.extend_from_slice(&(len as u16).to_le_bytes()),
            (_, ByteOrder::Big) => buf.extend_from_slice(&(len as u32).to_be_bytes()),
            (_, ByteOrder::Little) => buf.extend_from_slice(&(len as u32).to_le_bytes()),
        }
        buf.extend_from_slice(data);
        Ok(())
    }
}
