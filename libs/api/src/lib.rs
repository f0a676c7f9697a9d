mod error;
mod pipeline;
mod replay;
mod types;
mod util;

pub use error::{ErrorKind, StageError};
pub use pipeline::{Codec, Framing, Transport};
pub use replay::{PublishSink, RecordSource, RecordTransformer};
pub use types::{DataFormat, RawRecord};
pub use util::{now_ms, resolve_path};
