use replay_api::StageError;

// ═══════════════════════════════════════════════════════════════
//  Column mapping
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub(crate) struct ColumnMap {
    pub names: Vec<String>,
}

impl ColumnMap {
    /// Маппинг из строки заголовка (имена обрезаются, BOM снимается).
    pub fn from_header(fields: &[String]) -> Self {
        let names = fields
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let name = f.trim_start_matches('\u{feff}').trim();
                if name.is_empty() { format!("col{i}") } else { name.to_string() }
            })
            .collect();
        Self { names }
    }

    pub fn from_names(names: &[String]) -> Self {
        Self { names: names.to_vec() }
    }

    /// Имя колонки по индексу; лишние поля получают `colN`.
    pub fn name(&self, idx: usize) -> String {
        self.names.get(idx).cloned().unwrap_or_else(|| format!("col{idx}"))
    }
}

// ═══════════════════════════════════════════════════════════════
//  RFC 4180 field parser
// ═══════════════════════════════════════════════════════════════

/// Разбирает одну RFC 4180 запись на поля с учётом quoting.
/// Запись может содержать переводы строк внутри кавычек.
pub(crate) fn parse_fields(line: &str, delimiter: char, quoting: bool) -> Vec<String> {
    if !quoting {
        return line.split(delimiter).map(str::to_string).collect();
    }

    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    let mut field = String::new();

    loop {
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                if c != '"' {
                    field.push(c);
                } else if chars.peek() == Some(&'"') {
                    // "" → "
                    chars.next();
                    field.push('"');
                } else {
                    break;
                }
            }
            // мусор после закрывающей кавычки отбрасывается
            for c in chars.by_ref() {
                if c == delimiter {
                    break;
                }
            }
        } else {
            while let Some(c) = chars.next_if(|&c| c != delimiter) {
                field.push(c);
            }
            chars.next();
        }

        fields.push(std::mem::take(&mut field));

        if chars.peek().is_none() {
            if line.ends_with(delimiter) {
                fields.push(String::new());
            }
            break;
        }
    }

    fields
}

/// Все кавычки закрыты? Нечётное число `"` = запись продолжается
/// на следующей строке (экранированные `""` чётность не меняют).
pub(crate) fn quotes_balanced(text: &str) -> bool {
    text.bytes().filter(|&b| b == b'"').count() % 2 == 0
}

pub(crate) fn parse_delimiter(s: &str) -> Result<char, StageError> {
    if s == "\\t" {
        return Ok('\t');
    }
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '"' && c != '\n' && c != '\r' => Ok(c),
        _ => Err(StageError::config(format!(
            "CSV: delimiter must be a single character, got {s:?}"
        ))),
    }
}
