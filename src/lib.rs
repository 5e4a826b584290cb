//! A declarative binary message decode/encode template engine.
//!
//! Callers assemble a [`template::Template`] through
//! [`template::TemplateBuilder`] (field bindings, skips, converters,
//! validators, checksum), register it on an [`engine::Engine`], and the
//! engine's field loop does the rest: reading/writing bytes through the
//! [`io::BitReader`]/[`io::BitWriter`] contracts, resolving variant
//! alternatives (`variant`), evaluating conditions and size expressions
//! (`expr`), and verifying/stamping checksums (`checksum`).
//!
//! [`loader::TemplateLoader`] is the entry point for dispatching an
//! incoming buffer to the right registered type by its header prefix.

pub mod binding;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod expr;
pub mod io;
pub mod loader;
pub mod skip;
pub mod template;
pub mod value;
pub mod variant;

pub use binding::{
    Alternative, BitOrder, Binding, BindingCommon, BindingKind, ByteOrder, Charset, ChecksumAlgorithmKind,
    CollectionBinding, ContextParameter, Converter, ConverterChoice, PrimitiveKind, SelectFrom,
    SkipDescriptor, TypeTag, Validator,
};
pub use config::EngineConfig;
pub use context::EvaluatorContext;
pub use engine::Engine;
pub use error::BoxonError;
pub use event::{EventListener, NoopListener, TracingListener};
pub use expr::{DefaultEvaluator, Evaluator, ExprType};
pub use io::{BitReader, BitWriter, SliceBitReader, VecBitWriter};
pub use loader::TemplateLoader;
pub use template::{ChecksumField, EvaluatedField, Header, PostProcessedField, Template, TemplateBuilder, TemplateField};
pub use value::Value;
