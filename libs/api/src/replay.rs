use std::future::Future;
use std::pin::Pin;

use crate::{RawRecord, StageError};

// ════════════════════════════════════════════════════════════════
//  Replay Collaborator Traits
// ════════════════════════════════════════════════════════════════

/// Источник записей — ленивая, упорядоченная, конечная последовательность.
///
/// Pull-модель: следующая запись читается только когда scheduler
/// вызывает `next_record`. Пока scheduler ждёт delay или publish,
/// источник не читается — это и есть backpressure.
pub trait RecordSource: Send {
    /// Следующая запись. `Ok(None)` = конец потока, `Err` = ошибка чтения
    /// (отдельный сигнал, не путать с концом потока).
    fn next_record(&mut self) -> Pin<Box<dyn Future<Output = Result<Option<RawRecord>, StageError>> + Send + '_>>;

    /// Описание источника (для логирования).
    fn describe(&self) -> String {
        "source".into()
    }
}

/// Трансформация сырой записи в payload согласно схеме.
///
/// Чистая функция без I/O. Не должна падать на кривых опциональных
/// полях — такие поля становятся явным "отсутствием" (null).
pub trait RecordTransformer: Send + Sync {
    /// Построить payload. `publish_ts_ms` — подсказка времени публикации.
    fn transform(&self, record: &RawRecord, publish_ts_ms: i64) -> serde_json::Value;

    /// Ключ партиции для записи (None = без ключа).
    fn key(&self, _record: &RawRecord) -> Option<String> {
        None
    }
}

/// Sink — асинхронная доставка одного payload.
///
/// Политика повторов принадлежит sink'у; scheduler только дожидается
/// завершения (успех или ошибка) перед чтением следующей записи.
pub trait PublishSink: Send {
    /// Доставить payload с опциональным ключом партиции.
    fn publish<'a>(
        &'a mut self,
        payload: &'a serde_json::Value,
        key: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + 'a>>;

    /// Дослать всё буферизованное (при завершении / graceful shutdown).
    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>>;

    /// Закрыть sink. После close sink больше не используется.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), StageError>> + Send + '_>>;
}
