use apache_avro::types::Value;
use apache_avro::Schema;
use replay_api::StageError;

// ═══════════════════════════════════════════════════════════════
//  JSON → Avro conversion
// ═══════════════════════════════════════════════════════════════

/// Привести JSON к Avro-значению строго по схеме.
///
/// Union: `null` идёт только в null-ветку, не-null значения null-ветку
/// пропускают. Строка в позиции enum становится символом enum'а.
/// Отсутствующее поле record'а = `null`.
pub fn value_to_avro(val: &serde_json::Value, schema: &Schema) -> Result<Value, StageError> {
    use serde_json::Value as J;

    match (schema, val) {
        (Schema::Union(union_schema), val) => {
            for (idx, variant) in union_schema.variants().iter().enumerate() {
                if matches!(variant, Schema::Null) != val.is_null() {
                    continue;
                }
                if let Ok(v) = value_to_avro(val, variant) {
                    return Ok(Value::Union(idx as u32, Box::new(v)));
                }
            }
            Err(StageError::format_err(format!("avro: no union branch accepts {val}")))
        }
        (Schema::Null, J::Null) => Ok(Value::Null),
        (Schema::Boolean, J::Bool(b)) => Ok(Value::Boolean(*b)),
        (Schema::Int, J::Number(n)) => n
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(Value::Int)
            .ok_or_else(|| mismatch("int", val)),
        (Schema::Long, J::Number(n)) => n.as_i64().map(Value::Long).ok_or_else(|| mismatch("long", val)),
        (Schema::TimestampMillis, J::Number(n)) => {
            n.as_i64().map(Value::TimestampMillis).ok_or_else(|| mismatch("timestamp-millis", val))
        }
        (Schema::TimestampMicros, J::Number(n)) => {
            n.as_i64().map(Value::TimestampMicros).ok_or_else(|| mismatch("timestamp-micros", val))
        }
        (Schema::Float, J::Number(n)) => {
            n.as_f64().map(|f| Value::Float(f as f32)).ok_or_else(|| mismatch("float", val))
        }
        (Schema::Double, J::Number(n)) => n.as_f64().map(Value::Double).ok_or_else(|| mismatch("double", val)),
        (Schema::String, J::String(s)) => Ok(Value::String(s.clone())),
        (Schema::Bytes, J::String(s)) => Ok(Value::Bytes(s.as_bytes().to_vec())),
        (Schema::Enum(enum_schema), J::String(s)) => enum_schema
            .symbols
            .iter()
            .position(|sym| sym == s)
            .map(|idx| Value::Enum(idx as u32, s.clone()))
            .ok_or_else(|| StageError::format_err(format!("avro: unknown enum symbol {s:?}"))),
        (Schema::Array(inner), J::Array(items)) => {
            let items = items
                .iter()
                .map(|item| value_to_avro(item, &inner.items))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(items))
        }
        (Schema::Record(record_schema), J::Object(map)) => {
            let mut fields = Vec::with_capacity(record_schema.fields.len());
            for field in &record_schema.fields {
                let field_val = map.get(&field.name).unwrap_or(&J::Null);
                let avro_val = value_to_avro(field_val, &field.schema)
                    .map_err(|e| StageError::format_err(format!("field '{}': {}", field.name, e.message())))?;
                fields.push((field.name.clone(), avro_val));
            }
            Ok(Value::Record(fields))
        }
        (schema, val) => Err(mismatch(&format!("{schema:?}"), val)),
    }
}

fn mismatch(expected: &str, val: &serde_json::Value) -> StageError {
    StageError::format_err(format!("avro: expected {expected}, got {val}"))
}
