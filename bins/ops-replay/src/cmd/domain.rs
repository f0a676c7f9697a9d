use serde_json::{Map, Value};

use replay_api::{RawRecord, RecordTransformer};

/// Value-схема `AdsbExchangeOperationEvent`.
pub const ADSB_OPERATION_SCHEMA: &str = include_str!("../../schemas/adsb_operation.avsc");

// ═══════════════════════════════════════════════════════════════
//  Field groups (порядок = порядок полей схемы)
// ═══════════════════════════════════════════════════════════════

enum Kind {
    Text,
    Int,
    /// `t`/`true`/`f`/`false`
    TrueFalse,
    /// `yes`/`no`
    YesNo,
}

const OPTIONAL_FIELDS: &[(&str, Kind)] = &[
    ("airport", Kind::Text),
    ("registration", Kind::Text),
    ("flight", Kind::Text),
    ("ac_type", Kind::Text),
    ("runway", Kind::Text),
    ("flight_link", Kind::Text),
    ("squawk", Kind::Text),
    ("signal_type", Kind::Text),
    ("category", Kind::Text),
    ("year", Kind::Int),
    ("manufacturer", Kind::Text),
    ("model", Kind::Text),
    ("ownop", Kind::Text),
    ("faa_pia", Kind::TrueFalse),
    ("faa_ladd", Kind::TrueFalse),
    ("short_type", Kind::Text),
    ("mil", Kind::TrueFalse),
    ("apt_type", Kind::Text),
    ("name", Kind::Text),
    ("continent", Kind::Text),
    ("iso_country", Kind::Text),
    ("iso_region", Kind::Text),
    ("municipality", Kind::Text),
    ("scheduled_service", Kind::YesNo),
    ("iata_code", Kind::Text),
    ("elev", Kind::Int),
];

// ═══════════════════════════════════════════════════════════════
//  Transformer
// ═══════════════════════════════════════════════════════════════

/// CSV-строка операции (посадка/взлёт) → `AdsbExchangeOperationEvent`.
///
/// `time` = момент публикации, а не время из файла. Кривые опциональные
/// поля становятся `null`, трансформация никогда не падает.
pub struct AdsbOperationTransformer {
    key_field: String,
}

impl AdsbOperationTransformer {
    pub fn new(key_field: impl Into<String>) -> Self {
        Self { key_field: key_field.into() }
    }
}

impl RecordTransformer for AdsbOperationTransformer {
    fn transform(&self, record: &RawRecord, publish_ts_ms: i64) -> Value {
        let mut out = Map::with_capacity(OPTIONAL_FIELDS.len() + 3);
        out.insert("time".into(), Value::from(publish_ts_ms));
        out.insert("icao".into(), Value::from(record.field_str("icao").map(str::trim).unwrap_or("")));
        out.insert("operation".into(), Value::from(normalize_operation(record.field_str("operation"))));

        for (name, kind) in OPTIONAL_FIELDS {
            let raw = record.field_str(name);
            let value = match kind {
                Kind::Text => nullable_string(raw).map(Value::from),
                Kind::Int => int_or_null(raw).map(Value::from),
                Kind::TrueFalse => true_false(raw).map(Value::from),
                Kind::YesNo => yes_no(raw).map(Value::from),
            };
            out.insert((*name).into(), value.unwrap_or(Value::Null));
        }
        Value::Object(out)
    }

    fn key(&self, record: &RawRecord) -> Option<String> {
        nullable_string(record.field_str(&self.key_field)).map(str::to_string)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Field helpers
// ═══════════════════════════════════════════════════════════════

/// Обрезанная строка; пустая = None.
fn nullable_string(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

/// Ведущее целое (знак + цифры), остальное игнорируется: `"1200.5"` → 1200.
/// Не влезает в i32 (Avro int) → None.
fn int_or_null(v: Option<&str>) -> Option<i32> {
    let s = nullable_string(v)?;
    let digits_from = usize::from(s.starts_with(['-', '+']));
    let end = s[digits_from..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |i| i + digits_from);
    if end == digits_from {
        return None;
    }
    s[..end].parse().ok()
}

fn true_false(v: Option<&str>) -> Option<bool> {
    match nullable_string(v)?.to_ascii_lowercase().as_str() {
        "t" | "true" => Some(true),
        "f" | "false" => Some(false),
        _ => None,
    }
}

fn yes_no(v: Option<&str>) -> Option<bool> {
    match nullable_string(v)?.to_ascii_lowercase().as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

fn normalize_operation(v: Option<&str>) -> &'static str {
    match nullable_string(v).map(str::to_ascii_lowercase).as_deref() {
        Some("landing") => "landing",
        Some("takeoff") => "takeoff",
        _ => "unknown",
    }
}
