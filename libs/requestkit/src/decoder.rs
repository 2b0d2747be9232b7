//! Keyed JSON decoding of response payloads.

use crate::error::DecodeError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode `bytes` as `T`, optionally from a top-level key of a JSON object.
///
/// With a key path the document is parsed first and the value under the
/// exact key is decoded. A missing key or a non-object root is an error,
/// never a default value.
///
/// # Errors
/// Returns `DecodeError::Json` for malformed or mismatched JSON,
/// `DecodeError::NotAnObject` when a key path is used on a non-object root,
/// and `DecodeError::MissingKey` when the key is absent.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], key_path: Option<&str>) -> Result<T, DecodeError> {
    let Some(key) = key_path else {
        return Ok(serde_json::from_slice(bytes)?);
    };

    let Value::Object(mut root) = serde_json::from_slice::<Value>(bytes)? else {
        return Err(DecodeError::NotAnObject {
            key: key.to_owned(),
        });
    };
    let value = root.remove(key).ok_or_else(|| DecodeError::MissingKey {
        key: key.to_owned(),
    })?;
    Ok(serde_json::from_value(value)?)
}
