mod codec;
mod convert;
mod registry;

pub use codec::{AvroCodec, AvroCodecConfig, MAGIC_BYTE};
pub use convert::value_to_avro;
pub use registry::{RegistryAuth, SchemaRegistryClient};
