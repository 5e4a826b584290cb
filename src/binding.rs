//! Tagged binding descriptors (§3, §4.3 "Binding" tagged variant).
//!
//! Each concrete variant of [`Binding`] carries the parameters one leaf
//! codec needs; [`BindingKind`] is the discriminant the [`crate::codec::CodecRegistry`]
//! dispatches on.

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Runtime byte order for multi-byte primitive reads/writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

/// Bit order used when reading/writing sub-byte-width fields (prefixes,
/// `IntBits`/`BitsOf` primitives).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitOrder {
    /// Most significant bit first.
    BigEndian,
    /// Least significant bit first.
    LittleEndian,
}

/// Character set used to encode/decode `header.start`/`header.end` and
/// `STRING` bindings. A closed enum rather than a runtime charset registry,
/// since Rust has no stdlib equivalent of `java.nio.charset.Charset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    Ascii,
    Utf8,
}

impl Charset {
    pub fn encode(&self, s: &str) -> Vec<u8> {
        match self {
            Charset::Ascii | Charset::Utf8 => s.as_bytes().to_vec(),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String, crate::error::CodecError> {
        match self {
            Charset::Ascii => {
                if bytes.iter().any(|b| *b > 0x7f) {
                    return Err(crate::error::CodecError::Other(
                        "non-ASCII byte in ascii-charset field".into(),
                    ));
                }
                Ok(bytes.iter().map(|b| *b as char).collect())
            }
            Charset::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| crate::error::CodecError::Other(format!("invalid utf-8: {e}"))),
        }
    }
}

/// Primitive leaf kinds (§3 Binding PRIMITIVE variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    /// An arbitrary-width signed/unsigned integer of `n` bits (`n <= 128`).
    IntBits { bits: u32, signed: bool },
    /// Raw bit-vector of `n` bits, not interpreted as a number.
    BitsOf { bits: u32 },
}

impl PrimitiveKind {
    /// Whether this kind is a whole number (required for `CHECKSUM`
    /// targets, §4.1 step 3).
    pub fn is_integral(&self) -> bool {
        !matches!(self, PrimitiveKind::F32 | PrimitiveKind::F64)
    }
}

/// Opaque key used to look up an [`crate::engine::ErasedTemplate`] in the
/// engine's object-template registry for variant dispatch. A string tag
/// rather than `TypeId` so alternatives can be declared before every
/// participating type has necessarily been registered, and so the same tag
/// reliably round-trips between decode (reading) and encode (choosing by
/// runtime type).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeTag(pub Arc<str>);

impl TypeTag {
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        TypeTag(s.into())
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One branch of a variant-typed field (§4.5).
#[derive(Debug, Clone)]
pub struct Alternative {
    pub condition: String,
    pub prefix: u64,
    pub type_tag: TypeTag,
}

/// Variant dispatch metadata on OBJECT / ARRAY-of-object bindings (§3).
#[derive(Debug, Clone)]
pub struct SelectFrom {
    /// Number of bits making up the discriminant prefix; 0 means no prefix
    /// is read and alternatives are resolved purely by condition.
    pub prefix_size: u8,
    pub bit_order: BitOrder,
    pub alternatives: Vec<Alternative>,
    /// `None` means "void": if no alternative matches, raise
    /// `CodecError::NoAlternativeMatched`.
    pub select_default: Option<TypeTag>,
}

/// Algorithm identifier for a CHECKSUM binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithmKind {
    Xor16,
    Crc16Ccitt,
}

/// Bidirectional value transformer applied around a codec (§4.4).
pub trait Converter: Send + Sync {
    fn decode_side(&self, value: Value) -> Result<Value, crate::error::CodecError>;
    fn encode_side(&self, value: Value) -> Result<Value, crate::error::CodecError>;
    fn name(&self) -> &str {
        "converter"
    }
}

/// Post-decode predicate on a field value (§4.4).
pub trait Validator: Send + Sync {
    fn is_valid(&self, value: &Value) -> bool;
    fn name(&self) -> &str;
}

/// `{condition, converter}` pair; the first whose condition evaluates true
/// over `root` replaces the default converter for that field (§4.4).
#[derive(Clone)]
pub struct ConverterChoice {
    pub condition: String,
    pub converter: Arc<dyn Converter>,
}

impl fmt::Debug for ConverterChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterChoice")
            .field("condition", &self.condition)
            .field("converter", &self.converter.name())
            .finish()
    }
}

/// Parameters shared by every `Binding` variant (§3).
#[derive(Clone, Default)]
pub struct BindingCommon {
    pub condition: String,
    pub validator: Option<Arc<dyn Validator>>,
    pub converter: Option<Arc<dyn Converter>>,
    pub converter_choices: Vec<ConverterChoice>,
}

impl fmt::Debug for BindingCommon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingCommon")
            .field("condition", &self.condition)
            .field("validator", &self.validator.as_ref().map(|v| v.name()))
            .field("converter", &self.converter.as_ref().map(|v| v.name()))
            .field("converter_choices", &self.converter_choices)
            .finish()
    }
}

/// Discriminant used by the [`crate::codec::CodecRegistry`] to look up a
/// [`crate::codec::Codec`] (§4.4). The checksum field is not among these:
/// it is a structurally separate `ChecksumField<T>` slot on `Template<T>`,
/// read/written directly by the engine's checksum step rather than
/// dispatched through this registry (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Primitive,
    Str,
    ArrayPrimitive,
    ArrayObject,
    Object,
}

/// Tagged variant describing which leaf codec processes a field, and with
/// which parameters (§3, §4.3).
#[derive(Debug, Clone)]
pub enum Binding {
    Primitive {
        common: BindingCommon,
        kind: PrimitiveKind,
        byte_order: ByteOrder,
    },
    Str {
        common: BindingCommon,
        charset: Charset,
        size_expr: Option<String>,
        terminator: Option<u8>,
        consume_terminator: bool,
    },
    ArrayPrimitive {
        common: BindingCommon,
        element: PrimitiveKind,
        byte_order: ByteOrder,
        size_expr: Option<String>,
    },
    ArrayObject {
        common: BindingCommon,
        select_from: SelectFrom,
        size_expr: Option<String>,
    },
    Object {
        common: BindingCommon,
        select_from: SelectFrom,
    },
}

impl Binding {
    pub fn kind(&self) -> BindingKind {
        match self {
            Binding::Primitive { .. } => BindingKind::Primitive,
            Binding::Str { .. } => BindingKind::Str,
            Binding::ArrayPrimitive { .. } => BindingKind::ArrayPrimitive,
            Binding::ArrayObject { .. } => BindingKind::ArrayObject,
            Binding::Object { .. } => BindingKind::Object,
        }
    }

    pub fn common(&self) -> &BindingCommon {
        match self {
            Binding::Primitive { common, .. }
            | Binding::Str { common, .. }
            | Binding::ArrayPrimitive { common, .. }
            | Binding::ArrayObject { common, .. }
            | Binding::Object { common, .. } => common,
        }
    }

    /// Picks the active converter for this field given the current root,
    /// honoring `converter_choices` before falling back to `converter`
    /// (§4.4).
    pub fn active_converter(
        &self,
        evaluator: &dyn crate::expr::Evaluator,
        ctx: &crate::context::EvaluatorContext,
    ) -> Result<Option<Arc<dyn Converter>>, crate::error::CodecError> {
        let common = self.common();
        for choice in &common.converter_choices {
            if evaluator.evaluate_boolean(&choice.condition, ctx)? {
                return Ok(Some(choice.converter.clone()));
            }
        }
        Ok(common.converter.clone())
    }
}

/// Describes a field whose type is a sequence, used alongside an
/// `ArrayPrimitive`/`ArrayObject` binding (§3 `TemplateField.collection_binding`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionBinding {
    /// Read/write exactly `size_expr` elements; empty is valid.
    SizePrefixed,
    /// Read until a terminator marker specific to the element codec (rare;
    /// most formats use `SizePrefixed` with a `size_expr`).
    Unbounded,
}

/// One instruction to advance the cursor without producing a field value
/// (§3 SkipDescriptor).
#[derive(Debug, Clone)]
pub enum SkipDescriptor {
    SkipBits {
        condition: String,
        size_expr: String,
    },
    SkipUntil {
        condition: String,
        terminator_byte: u8,
        consume_terminator: bool,
    },
}

/// Named value installed into the [`crate::context::EvaluatorContext`]
/// while a field is processed (§3 `context_parameters`).
#[derive(Debug, Clone)]
pub struct ContextParameter {
    pub name: String,
    pub value_expr: String,
}
