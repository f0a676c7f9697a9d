use std::borrow::Cow;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use replay_api::{RawRecord, RecordSource, StageError};

use crate::parser::{ColumnMap, parse_delimiter, parse_fields, quotes_balanced};

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    /// Первая запись — имена колонок.
    #[default]
    Present,
    /// Заголовка нет: имена из `columns` или `col0, col1, ...`.
    Absent,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct CsvSourceConfig {
    pub delimiter: String,
    /// RFC 4180 quoting (кавычки, `""`, переводы строк в полях).
    pub quoting: bool,
    pub header: HeaderMode,
    /// Имена колонок для `header = "absent"`.
    pub columns: Vec<String>,
}

impl Default for CsvSourceConfig {
    fn default() -> Self {
        Self {
            delimiter: ",".into(),
            quoting: true,
            header: HeaderMode::Present,
            columns: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  CsvRecordSource
// ═══════════════════════════════════════════════════════════════

/// Ленивый построчный reader CSV-файла.
///
/// Файл читается по мере вызовов `next_record`, целиком в память не
/// грузится. Все значения остаются строками; интерпретация полей —
/// забота трансформера.
pub struct CsvRecordSource {
    path: PathBuf,
    reader: BufReader<File>,
    /// Буфер сырой физической строки.
    line_buf: Vec<u8>,
    delimiter: char,
    quoting: bool,
    header: HeaderMode,
    columns: Option<ColumnMap>,
    /// Номер последней выданной записи (без заголовка).
    position: u64,
    /// Номер последней прочитанной физической строки.
    line_no: u64,
}

impl CsvRecordSource {
    pub async fn open(path: impl AsRef<Path>, cfg: &CsvSourceConfig) -> Result<Self, StageError> {
        let path = path.as_ref().to_path_buf();
        let delimiter = parse_delimiter(&cfg.delimiter)?;
        let file = File::open(&path)
            .await
            .map_err(|e| StageError::io(format!("open {}: {e}", path.display())))?;

        let columns = match (cfg.header, cfg.columns.is_empty()) {
            (HeaderMode::Absent, false) => Some(ColumnMap::from_names(&cfg.columns)),
            _ => None,
        };

        tracing::info!(path = %path.display(), delimiter = %delimiter.escape_default(), header = ?cfg.header, "csv source opened");

        Ok(Self {
            path,
            reader: BufReader::new(file),
            line_buf: Vec::with_capacity(512),
            delimiter,
            quoting: cfg.quoting,
            header: cfg.header,
            columns,
            position: 0,
            line_no: 0,
        })
    }

    /// Следующая физическая строка без `\n`/`\r\n`. Невалидный UTF-8
    /// заменяется на U+FFFD, строка не теряется.
    async fn next_line(&mut self) -> Result<Option<String>, StageError> {
        self.line_buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.line_buf)
            .await
            .map_err(|e| StageError::io(format!("{} line {}: {e}", self.path.display(), self.line_no + 1)))?;
        if read == 0 {
            return Ok(None);
        }
        if self.line_buf.last() == Some(&b'\n') {
            self.line_buf.pop();
            if self.line_buf.last() == Some(&b'\r') {
                self.line_buf.pop();
            }
        }

        let line = String::from_utf8_lossy(&self.line_buf);
        if let Cow::Owned(_) = line {
            tracing::warn!(path = %self.path.display(), line = self.line_no + 1, "invalid UTF-8 replaced");
        }
        Ok(Some(line.into_owned()))
    }

    /// Следующая логическая запись (с учётом многострочных полей).
    /// Пустые строки между записями пропускаются.
    async fn next_row(&mut self) -> Result<Option<String>, StageError> {
        let mut row: Option<String> = None;
        loop {
            let line = self.next_line().await?;
            let Some(line) = line else {
                if row.is_some() {
                    tracing::warn!(path = %self.path.display(), line = self.line_no, "unterminated quoted field at EOF");
                }
                return Ok(row);
            };
            self.line_no += 1;

            let text = match row.take() {
                Some(mut acc) => {
                    acc.push('\n');
                    acc.push_str(&line);
                    acc
                }
                None if line.trim().is_empty() => continue,
                None => line,
            };

            if self.quoting && !quotes_balanced(&text) {
                row = Some(text);
                continue;
            }
            return Ok(Some(text));
        }
    }

    async fn read_record(&mut self) -> Result<Option<RawRecord>, StageError> {
        loop {
            let Some(text) = self.next_row().await? else {
                return Ok(None);
            };
            let fields = parse_fields(&text, self.delimiter, self.quoting);

            if self.columns.is_none() && self.header == HeaderMode::Present {
                let columns = ColumnMap::from_header(&fields);
                tracing::debug!(columns = ?columns.names, "csv header");
                self.columns = Some(columns);
                continue;
            }
            let columns = self.columns.get_or_insert_with(|| ColumnMap::from_names(&[]));

            let map: serde_json::Map<String, serde_json::Value> = fields
                .into_iter()
                .enumerate()
                .map(|(i, v)| (columns.name(i), serde_json::Value::String(v)))
                .collect();

            self.position += 1;
            return Ok(Some(RawRecord::new(self.position, map)));
        }
    }
}

impl RecordSource for CsvRecordSource {
    fn next_record(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<RawRecord>, StageError>> + Send + '_>> {
        Box::pin(self.read_record())
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}
