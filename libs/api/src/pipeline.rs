use std::future::Future;
use std::pin::Pin;

use crate::{DataFormat, StageError};

// ════════════════════════════════════════════════════════════════
//  Pipeline Stage Traits (publish side)
// ════════════════════════════════════════════════════════════════

/// Transport — исходящее соединение, в которое пишутся framed байты.
///
/// Методы асинхронные; реализация сама решает, когда реально
/// устанавливать соединение (connect) и что значит flush.
pub trait Transport: Send {
    /// Установить соединение. Повторный вызов после `close` переподключает.
    fn connect(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>>;

    /// Записать все байты. Ошибка `Io` означает, что соединение потеряно.
    fn write_all<'a>(
        &'a mut self,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>>;

    /// Сбросить буферы в соединение.
    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>>;

    /// Закрыть соединение. Идемпотентно.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>>;

    /// Описание удалённой стороны (для логирования).
    fn peer_info(&self) -> String {
        "unknown".into()
    }
}

/// Framing — границы сообщений в исходящем потоке байтов.
///
/// Реализации stateless: выходной буфер принадлежит вызывающему.
pub trait Framing: Send + Sync {
    /// Добавить framed данные в выходной буфер.
    fn encode(&self, data: &[u8], buf: &mut Vec<u8>) -> Result<(), StageError>;
}

/// Codec — сериализация структурированного payload: Value → bytes.
///
/// Codec отвечает ТОЛЬКО за формат. Ключ партиции и framing —
/// ответственность pipeline (Endpoint).
pub trait Codec: Send + Sync {
    /// Сериализация: структурированное значение → сырые байты.
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, StageError>;

    /// Формат данных, производимых этим кодеком.
    fn data_format(&self) -> DataFormat;
}
