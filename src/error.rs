//! Error taxonomy for the template engine.
//!
//! Every sub-taxonomy is its own enum; `BoxonError` is the union ancestor
//! callers can match on generically or propagate with `?`.

use std::fmt;

/// Structural problems in a user-assembled template, discovered at
/// `TemplateBuilder::build` time.
#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("template for '{type_name}' has no bounded fields")]
    EmptyTemplate { type_name: &'static str },

    #[error("template for '{type_name}' declares more than one checksum field")]
    DuplicateChecksum { type_name: &'static str },

    #[error("field '{field_name}' on '{type_name}': {reason}")]
    InvalidBinding {
        type_name: &'static str,
        field_name: &'static str,
        reason: String,
    },

    #[error("checksum field '{field_name}' on '{type_name}' must have an integral target type")]
    NonIntegralChecksum {
        type_name: &'static str,
        field_name: &'static str,
    },

    #[error("prefix_size of {bits} bits on '{type_name}' exceeds the 64-bit word size")]
    PrefixTooWide { type_name: &'static str, bits: u8 },
}

/// Template-level problems discovered at load time.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("duplicate header start key {key:?} registered by more than one template")]
    DuplicateStartKey { key: Vec<u8> },

    #[error("no template in the loader matches the next bytes in the stream")]
    NoMatchingTemplate,

    #[error("no template registered for tag '{tag}'")]
    UnknownTag { tag: String },

    #[error("message terminator mismatch: expected {expected:?}, found {found:?}")]
    TerminatorMismatch { expected: Vec<u8>, found: Vec<u8> },

    #[error("no templates were supplied to the loader")]
    NoTemplates,
}

/// Missing codec, or variant resolution that yields no concrete type.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("no codec registered for binding kind {0:?}")]
    NoCodecFor(crate::binding::BindingKind),

    #[error("cannot find valid codec from alternatives for '{type_name}'")]
    NoAlternativeMatched { type_name: String },

    #[error("expression error: {0}")]
    Expression(#[from] crate::expr::ExprError),

    #[error("I/O error while decoding: {0}")]
    Io(String),

    #[error("value {value} did not pass validator '{validator}'")]
    ValidationFailed { validator: String, value: String },

    #[error("{0}")]
    Other(String),
}

/// Any runtime failure during field decode/encode; always carries the
/// offending type and field name.
#[derive(Debug, thiserror::Error)]
#[error("field '{field_name}' of '{type_name}': {source}")]
pub struct FieldError {
    pub type_name: &'static str,
    pub field_name: &'static str,
    #[source]
    pub source: CodecError,
}

/// Runtime semantic failure (null required value, checksum mismatch).
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("checksum mismatch: expected {expected:#x}, computed {actual:#x}")]
    ChecksumMismatch { expected: i64, actual: i64 },

    #[error("required value missing for '{field_name}'")]
    MissingRequiredValue { field_name: &'static str },
}

/// Encoding-only errors.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("missing mandatory field '{field_name}' during encode")]
    MissingField { field_name: &'static str },

    #[error("placeholder substitution failed: {0}")]
    Placeholder(String),
}

/// Boundary errors for the (non-goal, not implemented) configuration-message
/// sub-engine. Kept as a variant so `BoxonError` has a stable shape for
/// callers that straddle both engines.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{0}")]
    Other(String),
}

/// Union ancestor for ergonomic catch-all propagation.
#[derive(Debug, thiserror::Error)]
pub enum BoxonError {
    #[error(transparent)]
    Annotation(#[from] AnnotationError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl BoxonError {
    /// Wraps a codec-level error with the field/type identifiers, matching
    /// the engine's "annotate and re-raise" contract (§4.3).
    pub fn field(type_name: &'static str, field_name: &'static str, source: CodecError) -> Self {
        BoxonError::Field(FieldError {
            type_name,
            field_name,
            source,
        })
    }
}

/// Helper used by `Display` impls that need to print bytes as hex, matching
/// the source's "both values hex-printed" requirement for checksum errors.
pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        fmt::Write::write_fmt(&mut s, format_args!("{:02x}", b)).ok();
    }
    s
}
