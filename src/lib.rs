#![forbid(unsafe_code)]

pub mod classify;
pub mod cli;
pub mod encode;
pub mod error;
pub mod options;
pub mod shared;
pub mod value;

pub use classify::{Category, classify};
pub use encode::{Encoder, encode_to_string, encode_to_vec};
pub use error::{EncodeError, Result};
pub use options::{EncodeOptions, Indent, Replacer, ResolvedEncodeOptions};
pub use value::{ByteStream, Deferred, Primitive, RecordStream, ToJson, Value};

/// Convenience wrapper: parse JSON text and re-encode it through the
/// streaming encoder, returning the complete output as a string.
///
/// For lower-level control — pretty-printing, a replacer, async
/// sub-sources, or pull-based backpressure — build a [`Value`] directly
/// and drive an [`Encoder`].
///
/// # Errors
/// Returns an error if `json` is not valid JSON, or if re-encoding it
/// fails (it cannot: a tree built from `serde_json::Value` has no cycles
/// and no async sub-sources).
pub fn reencode_json(json: &str) -> crate::error::Result<String> {
    let parsed: serde_json::Value =
        serde_json::from_str(json).map_err(|err| crate::error::EncodeError::message(err.to_string()))?;
    encode_to_string(Value::from(parsed), None)
}
