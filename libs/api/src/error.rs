/// Категория ошибки стадии (source, codec, framing, transport).
///
/// Kind определяет реакцию: `Io` sink повторяет с переподключением,
/// остальное доходит до вызывающего сразу.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Неверная конфигурация или отказ registry. Повтор не поможет.
    Config,
    /// Сеть, файл, обрыв соединения.
    Io,
    /// Данные не укладываются в формат (схема, framing, кодировка).
    Format,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Format => "format",
        })
    }
}

/// Ошибка любой стадии replay: kind + сообщение.
#[derive(Clone)]
pub struct StageError {
    kind: ErrorKind,
    message: String,
}

impl StageError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Config, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Io, msg)
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Format, msg)
    }

    fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Транзиентная ошибка: имеет смысл переподключиться и повторить.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Io
    }
}

impl std::fmt::Debug for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StageError {}

impl From<std::io::Error> for StageError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for StageError {
    fn from(e: serde_json::Error) -> Self {
        Self::format_err(e.to_string())
    }
}
