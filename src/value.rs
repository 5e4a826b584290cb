//! Canonical dynamic value currency shared by codecs, expressions, and field
//! accessors.
//!
//! The engine never needs a bespoke dynamic-value enum: every decoded leaf,
//! every field snapshot used for condition evaluation, and every value
//! passed to a converter or validator is a `serde_json::Value`. Field
//! accessors convert to/from the caller's concrete Rust type at the
//! boundary via `serde`.

/// Re-exported so the rest of the crate (and downstream users writing
/// accessors/converters/validators) only need one import path.
pub type Value = serde_json::Value;

/// Converts a decoded dynamic value into a concrete Rust type `F`, the
/// Rust analogue of assigning a reflectively-read value onto a declared
/// field (§4.3 step 4e), including the "cast numeric wide-integer values to
/// the declared field type" behavior: `serde_json` number conversions
/// already narrow/widen as needed through `serde::Deserialize`.
pub fn into_field<F: serde::de::DeserializeOwned>(value: Value) -> Result<F, serde_json::Error> {
    serde_json::from_value(value)
}

/// Converts a concrete Rust field value into the dynamic currency, the
/// inverse used on the encode path before handing the value to a codec.
pub fn from_field<F: serde::Serialize>(value: &F) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}
