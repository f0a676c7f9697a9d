use serde::{Deserialize, Serialize};

use crate::util::resolve_path;

// ════════════════════════════════════════════════════════════════
//  Data Format
// ════════════════════════════════════════════════════════════════

/// Формат байтов, которые производит Codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Json,
    Avro,
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFormat::Json => write!(f, "json"),
            DataFormat::Avro => write!(f, "avro"),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  RawRecord
// ════════════════════════════════════════════════════════════════

/// Сырая запись из источника в порядке поступления.
///
/// Структура полей определяется источником (для CSV — колонки строки).
/// Scheduler смотрит только на поле с timestamp; всё остальное —
/// забота RecordTransformer.
#[derive(Clone, Debug, PartialEq)]
pub struct RawRecord {
    /// Порядковый номер записи в источнике (с 1, без учёта заголовка).
    pub position: u64,
    /// Поля записи: JSON object `{ column: value }`.
    pub fields: serde_json::Value,
}

impl RawRecord {
    pub fn new(position: u64, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { position, fields: serde_json::Value::Object(fields) }
    }

    /// Значение поля по dot-notation пути.
    pub fn field(&self, path: &str) -> Option<&serde_json::Value> {
        resolve_path(&self.fields, path)
    }

    /// Строковое значение поля (None для отсутствующих и не-строковых полей).
    pub fn field_str(&self, path: &str) -> Option<&str> {
        self.field(path).and_then(|v| v.as_str())
    }
}
