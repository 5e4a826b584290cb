//! Leaf codecs dispatched by [`BindingKind`] (§4.4).
//!
//! Each codec reads/writes exactly the bytes one [`Binding`] variant
//! describes; the field loop (`crate::engine`) is responsible for running
//! skips, converters, and validators around a codec call.

use std::collections::HashMap;
use std::sync::Arc;

use crate::binding::{
    Binding, BindingKind, BitOrder, ByteOrder, CollectionBinding, PrimitiveKind, SelectFrom, TypeTag,
};
use crate::context::EvaluatorContext;
use crate::error::CodecError;
use crate::expr::Evaluator;
use crate::io::{BitReader, BitWriter};
use crate::value::Value;
use crate::variant;

/// Callback the engine implements so OBJECT / ARRAY-of-object codecs can
/// recurse into a nested template without this module depending on
/// `crate::engine` directly (§4.5).
pub trait ObjectResolver {
    fn decode_object(
        &self,
        tag: &TypeTag,
        reader: &mut dyn BitReader,
        parent_root: &Value,
    ) -> Result<Value, CodecError>;

    fn encode_object(
        &self,
        tag: &TypeTag,
        value: &Value,
        writer: &mut dyn BitWriter,
        parent_root: &Value,
    ) -> Result<(), CodecError>;
}

/// Everything a codec needs to decode one field (§4.4).
pub struct DecodeCtx<'a> {
    pub reader: &'a mut dyn BitReader,
    pub evaluator: &'a dyn Evaluator,
    pub ctx: &'a mut EvaluatorContext,
    pub resolver: &'a dyn ObjectResolver,
}

/// Symmetric encode-side bundle.
pub struct EncodeCtx<'a> {
    pub writer: &'a mut dyn BitWriter,
    pub evaluator: &'a dyn Evaluator,
    pub ctx: &'a mut EvaluatorContext,
    pub resolver: &'a dyn ObjectResolver,
}

pub trait Codec: Send + Sync {
    fn kind(&self) -> BindingKind;

    fn decode(
        &self,
        dctx: &mut DecodeCtx,
        binding: &Binding,
        collection: Option<CollectionBinding>,
    ) -> Result<Value, CodecError>;

    fn encode(
        &self,
        ectx: &mut EncodeCtx,
        binding: &Binding,
        collection: Option<CollectionBinding>,
        value: &Value,
    ) -> Result<(), CodecError>;
}

/// The primitive field's bit order is derived from its byte order: there is
/// no separate per-field bit-order knob on `Binding::Primitive`, since
/// sub-byte primitives (`IntBits`/`BitsOf`) are rare enough that a second
/// annotation axis would mostly go unused.
fn bit_order_of(byte_order: ByteOrder) -> BitOrder {
    match byte_order {
        ByteOrder::BigEndian => BitOrder::BigEndian,
        ByteOrder::LittleEndian => BitOrder::LittleEndian,
    }
}

fn sign_extend(raw: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return raw as i64;
    }
    let sign_bit = 1u64 << (bits - 1);
    if raw & sign_bit != 0 {
        (raw as i64) - ((1i64) << bits)
    } else {
        raw as i64
    }
}

fn decode_primitive(
    kind: PrimitiveKind,
    byte_order: ByteOrder,
    reader: &mut dyn BitReader,
) -> Result<Value, CodecError> {
    Ok(match kind {
        PrimitiveKind::U8 => Value::from(reader.read_u8()?),
        PrimitiveKind::I8 => Value::from(reader.read_i8()?),
        PrimitiveKind::U16 => Value::from(reader.read_u16(byte_order)?),
        PrimitiveKind::I16 => Value::from(reader.read_i16(byte_order)?),
        PrimitiveKind::U32 => Value::from(reader.read_u32(byte_order)?),
        PrimitiveKind::I32 => Value::from(reader.read_i32(byte_order)?),
        PrimitiveKind::U64 => Value::from(reader.read_u64(byte_order)?),
        PrimitiveKind::I64 => Value::from(reader.read_i64(byte_order)?),
        PrimitiveKind::F32 => Value::from(reader.read_f32(byte_order)? as f64),
        PrimitiveKind::F64 => Value::from(reader.read_f64(byte_order)?),
        PrimitiveKind::IntBits { bits, signed } => {
            let raw = reader.read_bits(bits, bit_order_of(byte_order))?;
            let v = if signed { sign_extend(raw, bits) } else { raw as i64 };
            Value::from(v)
        }
        PrimitiveKind::BitsOf { bits } => {
            let raw = reader.read_bits(bits, bit_order_of(byte_order))?;
            Value::from(raw)
        }
    })
}

fn encode_primitive(
    kind: PrimitiveKind,
    byte_order: ByteOrder,
    value: &Value,
    writer: &mut dyn BitWriter,
) -> Result<(), CodecError> {
    let as_i64 = || -> Result<i64, CodecError> {
        value
            .as_i64()
            .ok_or_else(|| CodecError::Other(format!("expected integer, got {value}")))
    };
    match kind {
        PrimitiveKind::U8 => writer.write_u8(as_i64()? as u8),
        PrimitiveKind::I8 => writer.write_i8(as_i64()? as i8),
        PrimitiveKind::U16 => writer.write_u16(as_i64()? as u16, byte_order),
        PrimitiveKind::I16 => writer.write_i16(as_i64()? as i16, byte_order),
        PrimitiveKind::U32 => writer.write_u32(as_i64()? as u32, byte_order),
        PrimitiveKind::I32 => writer.write_i32(as_i64()? as i32, byte_order),
        PrimitiveKind::U64 => writer.write_u64(as_i64()? as u64, byte_order),
        PrimitiveKind::I64 => writer.write_i64(as_i64()?, byte_order),
        PrimitiveKind::F32 => writer.write_f32(
            value
                .as_f64()
                .ok_or_else(|| CodecError::Other(format!("expected float, got {value}")))? as f32,
            byte_order,
        ),
        PrimitiveKind::F64 => writer.write_f64(
            value
                .as_f64()
                .ok_or_else(|| CodecError::Other(format!("expected float, got {value}")))?,
            byte_order,
        ),
        PrimitiveKind::IntBits { bits, .. } => {
            let raw = as_i64()? as u64 & mask(bits);
            writer.write_bits(raw, bits, bit_order_of(byte_order));
        }
        PrimitiveKind::BitsOf { bits } => {
            let raw = value
                .as_u64()
                .ok_or_else(|| CodecError::Other(format!("expected unsigned bits, got {value}")))?;
            writer.write_bits(raw, bits, bit_order_of(byte_order));
        }
    }
    Ok(())
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// PRIMITIVE leaf codec (§3 Binding PRIMITIVE).
pub struct PrimitiveCodec;

impl Codec for PrimitiveCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::Primitive
    }

    fn decode(
        &self,
        dctx: &mut DecodeCtx,
        binding: &Binding,
        _collection: Option<CollectionBinding>,
    ) -> Result<Value, CodecError> {
        let Binding::Primitive { kind, byte_order, .. } = binding else {
            unreachable!("PrimitiveCodec dispatched on non-Primitive binding");
        };
        decode_primitive(*kind, *byte_order, dctx.reader)
    }

    fn encode(
        &self,
        ectx: &mut EncodeCtx,
        binding: &Binding,
        _collection: Option<CollectionBinding>,
        value: &Value,
    ) -> Result<(), CodecError> {
        let Binding::Primitive { kind, byte_order, .. } = binding else {
            unreachable!("PrimitiveCodec dispatched on non-Primitive binding");
        };
        encode_primitive(*kind, *byte_order, value, ectx.writer)
    }
}

/// STRING leaf codec (§3 Binding STRING).
pub struct StrCodec;

impl Codec for StrCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::Str
    }

    fn decode(
        &self,
        dctx: &mut DecodeCtx,
        binding: &Binding,
        _collection: Option<CollectionBinding>,
    ) -> Result<Value, CodecError> {
        let Binding::Str {
            charset,
            size_expr,
            terminator,
            consume_terminator,
            ..
        } = binding
        else {
            unreachable!("StrCodec dispatched on non-Str binding");
        };
        let bytes = if let Some(expr) = size_expr {
            let n = dctx.evaluator.evaluate_size(expr, dctx.ctx);
            if n < 0 {
                return Err(CodecError::Other(format!("string size_expr '{expr}' did not yield a size")));
            }
            dctx.reader.read_bytes(n as usize)?
        } else if let Some(term) = terminator {
            let start = (dctx.reader.position_bits() / 8) as usize;
            dctx.reader.skip_until(*term)?;
            let end = (dctx.reader.position_bits() / 8) as usize;
            let bytes = dctx.reader.array()[start..end].to_vec();
            if *consume_terminator {
                dctx.reader.read_u8()?;
            }
            bytes
        } else {
            return Err(CodecError::Other(
                "string binding has neither a size expression nor a terminator".into(),
            ));
        };
        Ok(Value::from(charset.decode(&bytes)?))
    }

    fn encode(
        &self,
        ectx: &mut EncodeCtx,
        binding: &Binding,
        _collection: Option<CollectionBinding>,
        value: &Value,
    ) -> Result<(), CodecError> {
        let Binding::Str {
            charset,
            terminator,
            consume_terminator,
            ..
        } = binding
        else {
            unreachable!("StrCodec dispatched on non-Str binding");
        };
        let s = value
            .as_str()
            .ok_or_else(|| CodecError::Other(format!("expected string, got {value}")))?;
        ectx.writer.write_bytes(&charset.encode(s));
        if let Some(term) = terminator {
            if *consume_terminator {
                ectx.writer.write_terminator(*term);
            }
        }
        Ok(())
    }
}

fn array_count(
    size_expr: &Option<String>,
    collection: Option<CollectionBinding>,
    evaluator: &dyn Evaluator,
    ctx: &EvaluatorContext,
) -> Result<Option<usize>, CodecError> {
    match (collection, size_expr) {
        (Some(CollectionBinding::Unbounded), _) => Ok(None),
        (_, Some(expr)) => {
            let n = evaluator.evaluate_size(expr, ctx);
            if n < 0 {
                return Err(CodecError::Other(format!("array size_expr '{expr}' did not yield a size")));
            }
            Ok(Some(n as usize))
        }
        (_, None) => Err(CodecError::Other("array binding has no size expression".into())),
    }
}

fn at_end_of_stream(reader: &dyn BitReader) -> bool {
    reader.position_bits() >= (reader.array().len() as u64) * 8
}

/// ARRAY-of-primitive leaf codec, producing/consuming a JSON array (§3
/// Binding ARRAY_PRIMITIVE).
pub struct ArrayPrimitiveCodec;

impl Codec for ArrayPrimitiveCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::ArrayPrimitive
    }

    fn decode(
        &self,
        dctx: &mut DecodeCtx,
        binding: &Binding,
        collection: Option<CollectionBinding>,
    ) -> Result<Value, CodecError> {
        let Binding::ArrayPrimitive {
            element,
            byte_order,
            size_expr,
            ..
        } = binding
        else {
            unreachable!("ArrayPrimitiveCodec dispatched on non-ArrayPrimitive binding");
        };
        let count = array_count(size_expr, collection, dctx.evaluator, dctx.ctx)?;
        let mut items = Vec::new();
        match count {
            Some(n) => {
                for _ in 0..n {
                    items.push(decode_primitive(*element, *byte_order, dctx.reader)?);
                }
            }
            None => {
                while !at_end_of_stream(dctx.reader) {
                    items.push(decode_primitive(*element, *byte_order, dctx.reader)?);
                }
            }
        }
        Ok(Value::Array(items))
    }

    fn encode(
        &self,
        ectx: &mut EncodeCtx,
        binding: &Binding,
        _collection: Option<CollectionBinding>,
        value: &Value,
    ) -> Result<(), CodecError> {
        let Binding::ArrayPrimitive { element, byte_order, .. } = binding else {
            unreachable!("ArrayPrimitiveCodec dispatched on non-ArrayPrimitive binding");
        };
        let items = value
            .as_array()
            .ok_or_else(|| CodecError::Other(format!("expected array, got {value}")))?;
        for item in items {
            encode_primitive(*element, *byte_order, item, ectx.writer)?;
        }
        Ok(())
    }
}

fn decode_one_object(
    select_from: &SelectFrom,
    dctx: &mut DecodeCtx,
    type_name: &str,
) -> Result<Value, CodecError> {
    let tag = variant::resolve_for_decode(select_from, dctx.reader, dctx.evaluator, dctx.ctx, type_name)?;
    let parent_root = dctx.ctx.root_value();
    let nested = dctx.resolver.decode_object(&tag, dctx.reader, &parent_root)?;
    Ok(variant::envelope(&tag, nested))
}

fn encode_one_object(select_from: &SelectFrom, ectx: &mut EncodeCtx, value: &Value) -> Result<(), CodecError> {
    let (tag, nested) = variant::split_envelope(value)?;
    let resolution = variant::resolve_for_encode(select_from, &tag);
    if select_from.prefix_size > 0 {
        if let Some(alternative) = resolution.alternative {
            if crate::expr::references_prefix(&alternative.condition) {
                ectx.writer
                    .write_bits(alternative.prefix, select_from.prefix_size as u32, select_from.bit_order);
            }
        }
    }
    let parent_root = ectx.ctx.root_value();
    ectx.resolver.encode_object(&tag, &nested, ectx.writer, &parent_root)
}

/// ARRAY-of-object leaf codec: each element independently resolves its own
/// variant alternative (§4.5).
pub struct ArrayObjectCodec;

impl Codec for ArrayObjectCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::ArrayObject
    }

    fn decode(
        &self,
        dctx: &mut DecodeCtx,
        binding: &Binding,
        collection: Option<CollectionBinding>,
    ) -> Result<Value, CodecError> {
        let Binding::ArrayObject { select_from, size_expr, .. } = binding else {
            unreachable!("ArrayObjectCodec dispatched on non-ArrayObject binding");
        };
        let count = array_count(size_expr, collection, dctx.evaluator, dctx.ctx)?;
        let mut items = Vec::new();
        match count {
            Some(n) => {
                for _ in 0..n {
                    items.push(decode_one_object(select_from, dctx, "array element")?);
                }
            }
            None => {
                while !at_end_of_stream(dctx.reader) {
                    items.push(decode_one_object(select_from, dctx, "array element")?);
                }
            }
        }
        Ok(Value::Array(items))
    }

    fn encode(
        &self,
        ectx: &mut EncodeCtx,
        binding: &Binding,
        _collection: Option<CollectionBinding>,
        value: &Value,
    ) -> Result<(), CodecError> {
        let Binding::ArrayObject { select_from, .. } = binding else {
            unreachable!("ArrayObjectCodec dispatched on non-ArrayObject binding");
        };
        let items = value
            .as_array()
            .ok_or_else(|| CodecError::Other(format!("expected array, got {value}")))?;
        for item in items {
            encode_one_object(select_from, ectx, item)?;
        }
        Ok(())
    }
}

/// Single nested OBJECT leaf codec (§4.5).
pub struct ObjectCodec;

impl Codec for ObjectCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::Object
    }

    fn decode(
        &self,
        dctx: &mut DecodeCtx,
        binding: &Binding,
        _collection: Option<CollectionBinding>,
    ) -> Result<Value, CodecError> {
        let Binding::Object { select_from, .. } = binding else {
            unreachable!("ObjectCodec dispatched on non-Object binding");
        };
        decode_one_object(select_from, dctx, "object field")
    }

    fn encode(
        &self,
        ectx: &mut EncodeCtx,
        binding: &Binding,
        _collection: Option<CollectionBinding>,
        value: &Value,
    ) -> Result<(), CodecError> {
        let Binding::Object { select_from, .. } = binding else {
            unreachable!("ObjectCodec dispatched on non-Object binding");
        };
        encode_one_object(select_from, ectx, value)
    }
}

pub(crate) fn read_width(width_bytes: u8, byte_order: ByteOrder, reader: &mut dyn BitReader) -> Result<i64, CodecError> {
    match width_bytes {
        1 => Ok(reader.read_u8()? as i64),
        2 => Ok(reader.read_u16(byte_order)? as i64),
        4 => Ok(reader.read_u32(byte_order)? as i64),
        8 => reader.read_i64(byte_order),
        other => Err(CodecError::Other(format!("unsupported checksum width {other} bytes"))),
    }
}

pub(crate) fn write_width(width_bytes: u8, byte_order: ByteOrder, value: i64, writer: &mut dyn BitWriter) -> Result<(), CodecError> {
    match width_bytes {
        1 => writer.write_u8(value as u8),
        2 => writer.write_u16(value as u16, byte_order),
        4 => writer.write_u32(value as u32, byte_order),
        8 => writer.write_i64(value, byte_order),
        other => return Err(CodecError::Other(format!("unsupported checksum width {other} bytes"))),
    }
    Ok(())
}

/// Looks codecs up by [`BindingKind`] (§4.4).
pub struct CodecRegistry {
    codecs: HashMap<BindingKind, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn get(&self, kind: BindingKind) -> Result<&Arc<dyn Codec>, CodecError> {
        self.codecs.get(&kind).ok_or(CodecError::NoCodecFor(kind))
    }

    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.kind(), codec);
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = CodecRegistry {
            codecs: HashMap::new(),
        };
        registry.register(Arc::new(PrimitiveCodec));
        registry.register(Arc::new(StrCodec));
        registry.register(Arc::new(ArrayPrimitiveCodec));
        registry.register(Arc::new(ArrayObjectCodec));
        registry.register(Arc::new(ObjectCodec));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingCommon, Charset};
    use crate::expr::DefaultEvaluator;
    use crate::io::{SliceBitReader, VecBitWriter};

    struct NoResolver;
    impl ObjectResolver for NoResolver {
        fn decode_object(&self, _tag: &TypeTag, _reader: &mut dyn BitReader, _parent_root: &Value) -> Result<Value, CodecError> {
            Err(CodecError::Other("no objects in this test".into()))
        }
        fn encode_object(&self, _tag: &TypeTag, _value: &Value, _writer: &mut dyn BitWriter, _parent_root: &Value) -> Result<(), CodecError> {
            Err(CodecError::Other("no objects in this test".into()))
        }
    }

    #[test]
    fn primitive_round_trip_u16() {
        let binding = Binding::Primitive {
            common: BindingCommon::default(),
            kind: PrimitiveKind::U16,
            byte_order: ByteOrder::BigEndian,
        };
        let mut writer = VecBitWriter::new();
        let evaluator = DefaultEvaluator;
        let resolver = NoResolver;
        let mut ctx = EvaluatorContext::new();
        {
            let mut ectx = EncodeCtx {
                writer: &mut writer,
                evaluator: &evaluator,
                ctx: &mut ctx,
                resolver: &resolver,
            };
            PrimitiveCodec.encode(&mut ectx, &binding, None, &Value::from(4660i64)).unwrap();
        }
        let bytes = writer.into_bytes();
        assert_eq!(bytes, vec![0x12, 0x34]);
        let mut reader = SliceBitReader::new(&bytes);
        let mut ctx = EvaluatorContext::new();
        let mut dctx = DecodeCtx {
            reader: &mut reader,
            evaluator: &evaluator,
            ctx: &mut ctx,
            resolver: &resolver,
        };
        let value = PrimitiveCodec.decode(&mut dctx, &binding, None).unwrap();
        assert_eq!(value, Value::from(4660i64));
    }

    #[test]
    fn string_terminated_by_zero_byte() {
        let binding = Binding::Str {
            common: BindingCommon::default(),
            charset: Charset::Ascii,
            size_expr: None,
            terminator: Some(0x00),
            consume_terminator: true,
        };
        let data = [b'h', b'i', 0x00, 0xff];
        let mut reader = SliceBitReader::new(&data);
        let evaluator = DefaultEvaluator;
        let resolver = NoResolver;
        let mut ctx = EvaluatorContext::new();
        let mut dctx = DecodeCtx {
            reader: &mut reader,
            evaluator: &evaluator,
            ctx: &mut ctx,
            resolver: &resolver,
        };
        let value = StrCodec.decode(&mut dctx, &binding, None).unwrap();
        assert_eq!(value, Value::from("hi"));
        assert_eq!(reader.read_u8().unwrap(), 0xff);
    }

    #[test]
    fn array_primitive_unbounded_reads_to_end() {
        let binding = Binding::ArrayPrimitive {
            common: BindingCommon::default(),
            element: PrimitiveKind::U8,
            byte_order: ByteOrder::BigEndian,
            size_expr: None,
        };
        let data = [1u8, 2, 3];
        let mut reader = SliceBitReader::new(&data);
        let evaluator = DefaultEvaluator;
        let resolver = NoResolver;
        let mut ctx = EvaluatorContext::new();
        let mut dctx = DecodeCtx {
            reader: &mut reader,
            evaluator: &evaluator,
            ctx: &mut ctx,
            resolver: &resolver,
        };
        let value = ArrayPrimitiveCodec
            .decode(&mut dctx, &binding, Some(CollectionBinding::Unbounded))
            .unwrap();
        assert_eq!(value, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn read_write_width_round_trip_two_bytes() {
        let mut writer = VecBitWriter::new();
        write_width(2, ByteOrder::BigEndian, 4, &mut writer).unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(bytes, vec![0x00, 0x04]);
        let mut reader = SliceBitReader::new(&bytes);
        let value = read_width(2, ByteOrder::BigEndian, &mut reader).unwrap();
        assert_eq!(value, 4i64);
    }
}
