//! The decode/encode engine: runs a [`Template`]'s field loop and hosts the
//! registry nested OBJECT/ARRAY_OBJECT bindings dispatch through (§4.3,
//! §4.8).
//!
//! There is no reflection to fall back on for "what type does this nested
//! field decode to" the way the source JVM engine has; [`ErasedTemplate`]
//! plus a string [`TypeTag`] is this crate's substitute; see `variant.rs`
//! for the JSON envelope that carries the tag across the type-erasure
//! boundary.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::binding::TypeTag;
use crate::codec::{self, CodecRegistry, DecodeCtx, EncodeCtx, ObjectResolver};
use crate::config::EngineConfig;
use crate::context::{ContextParamsGuard, EvaluatorContext, ParserContext};
use crate::error::{BoxonError, CodecError, DataError, TemplateError};
use crate::event::EventListener;
use crate::expr::{Evaluator, ExprType};
use crate::io::{BitReader, BitWriter, SliceBitReader, VecBitWriter};
use crate::skip;
use crate::template::Template;
use crate::value::{self, Value};

/// Type-erased handle to a registered `Template<T>`, letting OBJECT /
/// ARRAY_OBJECT codecs recurse without knowing `T` at compile time (§4.5).
pub trait ErasedTemplate: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn decode_erased(
        &self,
        engine: &Engine,
        reader: &mut dyn BitReader,
        parent_root: &Value,
    ) -> Result<Value, BoxonError>;

    fn encode_erased(
        &self,
        engine: &Engine,
        value: &Value,
        writer: &mut dyn BitWriter,
        parent_root: &Value,
    ) -> Result<(), BoxonError>;
}

struct TemplateHandle<T> {
    template: Arc<Template<T>>,
}

impl<T> ErasedTemplate for TemplateHandle<T>
where
    T: Default + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn type_name(&self) -> &'static str {
        self.template.type_name
    }

    fn decode_erased(
        &self,
        engine: &Engine,
        reader: &mut dyn BitReader,
        parent_root: &Value,
    ) -> Result<Value, BoxonError> {
        let decoded = engine.decode_template(&self.template, reader, Some(parent_root))?;
        value::from_field(&decoded)
            .map_err(|e| BoxonError::Codec(CodecError::Other(format!("serialize '{}': {e}", self.type_name()))))
    }

    fn encode_erased(
        &self,
        engine: &Engine,
        value: &Value,
        writer: &mut dyn BitWriter,
        parent_root: &Value,
    ) -> Result<(), BoxonError> {
        let typed: T = value::into_field(value.clone())
            .map_err(|e| BoxonError::Codec(CodecError::Other(format!("deserialize '{}': {e}", self.type_name()))))?;
        engine.encode_template(&self.template, &typed, writer, Some(parent_root))
    }
}

/// Owns the codec registry and the nested-object template registry, and
/// drives the decode/encode field loop (§4.3, §4.8).
pub struct Engine {
    codecs: CodecRegistry,
    listener: Arc<dyn EventListener>,
    evaluator: Arc<dyn Evaluator>,
    objects: RwLock<HashMap<TypeTag, Arc<dyn ErasedTemplate>>>,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        Engine {
            codecs: CodecRegistry::default(),
            listener: config.listener.clone(),
            evaluator: config.evaluator.clone(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a concrete type under `tag`, so OBJECT/ARRAY_OBJECT
    /// bindings can recurse into it by tag (§4.5).
    pub fn register<T>(&self, tag: TypeTag, template: Arc<Template<T>>)
    where
        T: Default + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.listener.loading_templates_from(&[template.type_name]);
        self.objects
            .write()
            .expect("object registry poisoned")
            .insert(tag, Arc::new(TemplateHandle { template }));
        self.listener.loaded_templates(1);
    }

    pub fn decode<T>(&self, template: &Template<T>, bytes: &[u8]) -> Result<T, BoxonError>
    where
        T: Default + Serialize + DeserializeOwned,
    {
        let mut reader = SliceBitReader::new(bytes);
        self.decode_template(template, &mut reader, None)
    }

    pub fn encode<T>(&self, template: &Template<T>, value: &T) -> Result<Vec<u8>, BoxonError>
    where
        T: Serialize,
    {
        let mut writer = VecBitWriter::new();
        self.encode_template(template, value, &mut writer, None)?;
        Ok(writer.into_bytes())
    }

    /// The decode state machine (§4.3): header, bounded fields (skip →
    /// condition → codec → converter → validator → assign), evaluated
    /// fields, post-processed fields, checksum verification, footer.
    pub fn decode_template<T>(
        &self,
        template: &Template<T>,
        reader: &mut dyn BitReader,
        parent_root: Option<&Value>,
    ) -> Result<T, BoxonError>
    where
        T: Default + Serialize + DeserializeOwned,
    {
        let start_position_bits = reader.position_bits();
        if let Some(header) = &template.header {
            consume_header_start(header, reader, template.type_name)?;
        }

        let mut parser = ParserContext::new(T::default(), start_position_bits);
        let mut ctx = EvaluatorContext::new();
        let initial_self = value::from_field(&parser.current)
            .map_err(|e| BoxonError::Codec(CodecError::Other(format!("serialize default of '{}': {e}", template.type_name))))?;
        ctx.set_self(initial_self.clone());
        ctx.set_root(parent_root.cloned().unwrap_or(initial_self));

        for field in &template.bounded_fields {
            let params: Vec<(String, Value)> = field
                .context_parameters
                .iter()
                .map(|p| {
                    let v = self
                        .evaluator
                        .evaluate(&p.value_expr, &ctx, ExprType::Any)
                        .unwrap_or(Value::Null);
                    (p.name.clone(), v)
                })
                .collect();
            let params_guard = ContextParamsGuard::push(&mut ctx, &params);

            let proceed = self
                .evaluator
                .evaluate_boolean(&field.condition, &ctx)
                .map_err(CodecError::from)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;
            if !proceed {
                params_guard.restore(&mut ctx);
                continue;
            }

            self.listener
                .reading_field(template.type_name, field.name, &format!("{:?}", field.binding.kind()));

            skip::run_skips_decode(&field.skips, reader, self.evaluator.as_ref(), &ctx)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;

            let raw = {
                let mut dctx = DecodeCtx {
                    reader,
                    evaluator: self.evaluator.as_ref(),
                    ctx: &mut ctx,
                    resolver: self,
                };
                self.codecs
                    .get(field.binding.kind())
                    .and_then(|codec| codec.decode(&mut dctx, &field.binding, field.collection_binding))
                    .map_err(|e| BoxonError::field(template.type_name, field.name, e))?
            };

            let converted = match field
                .binding
                .active_converter(self.evaluator.as_ref(), &ctx)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?
            {
                Some(converter) => converter
                    .decode_side(raw)
                    .map_err(|e| BoxonError::field(template.type_name, field.name, e))?,
                None => raw,
            };

            if let Some(validator) = &field.binding.common().validator {
                if !validator.is_valid(&converted) {
                    let err = CodecError::ValidationFailed {
                        validator: validator.name().to_string(),
                        value: converted.to_string(),
                    };
                    return Err(BoxonError::field(template.type_name, field.name, err));
                }
            }

            field
                .set_value(&mut parser.current, converted.clone())
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;
            self.listener.read_field(template.type_name, field.name, &converted);

            refresh_self(&mut ctx, &parser.current, template.type_name)?;
            params_guard.restore(&mut ctx);
        }

        for field in &template.evaluated_fields {
            if !self
                .evaluator
                .evaluate_boolean(&field.condition, &ctx)
                .map_err(CodecError::from)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?
            {
                continue;
            }
            self.listener.evaluating_field(template.type_name, field.name);
            let value = self
                .evaluator
                .evaluate(&field.value_expr, &ctx, ExprType::Any)
                .map_err(CodecError::from)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;
            field
                .set_value(&mut parser.current, value.clone())
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;
            self.listener.evaluated_field(template.type_name, field.name, &value);
            refresh_self(&mut ctx, &parser.current, template.type_name)?;
        }

        for field in &template.post_processed_fields {
            if !self
                .evaluator
                .evaluate_boolean(&field.condition, &ctx)
                .map_err(CodecError::from)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?
            {
                continue;
            }
            let value = self
                .evaluator
                .evaluate(&field.value_decode_expr, &ctx, ExprType::Any)
                .map_err(CodecError::from)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;
            field
                .set_value(&mut parser.current, value)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;
            refresh_self(&mut ctx, &parser.current, template.type_name)?;
        }

        if let Some(checksum) = &template.checksum_field {
            if self
                .evaluator
                .evaluate_boolean(&checksum.condition, &ctx)
                .map_err(CodecError::from)
                .map_err(|e| BoxonError::field(template.type_name, checksum.name, e))?
            {
                let position_before_checksum = reader.position_bits();
                let stored = codec::read_width(checksum.width_bytes, checksum.byte_order, reader)
                    .map_err(|e| BoxonError::field(template.type_name, checksum.name, e))?;
                let (start, end) = crate::checksum::checksum_span(
                    start_position_bits,
                    position_before_checksum,
                    checksum.skip_start,
                    checksum.skip_end,
                );
                let span = reader
                    .array()
                    .get(start..end)
                    .ok_or_else(|| {
                        BoxonError::field(
                            template.type_name,
                            checksum.name,
                            CodecError::Other("checksum span out of bounds".into()),
                        )
                    })?;
                let computed = crate::checksum::algorithm_for(checksum.algorithm).calculate(span);
                if computed != stored {
                    return Err(BoxonError::Data(DataError::ChecksumMismatch {
                        expected: stored,
                        actual: computed,
                    }));
                }
                checksum
                    .set_value(&mut parser.current, Value::from(stored))
                    .map_err(|e| BoxonError::field(template.type_name, checksum.name, e))?;
            }
        }

        if let Some(header) = &template.header {
            if let Some(end) = &header.end {
                skip::verify_terminator(reader, end)?;
            }
        }

        Ok(parser.current)
    }

    /// The encode state machine, mirroring [`Engine::decode_template`]
    /// field-for-field (§4.8).
    pub fn encode_template<T>(
        &self,
        template: &Template<T>,
        value: &T,
        writer: &mut dyn BitWriter,
        parent_root: Option<&Value>,
    ) -> Result<(), BoxonError>
    where
        T: Serialize,
    {
        if let Some(header) = &template.header {
            if let Some(start) = header.start.first() {
                writer.write_bytes(start);
            }
        }

        let mut ctx = EvaluatorContext::new();
        let self_value = value::from_field(value)
            .map_err(|e| BoxonError::Codec(CodecError::Other(format!("serialize '{}': {e}", template.type_name))))?;
        ctx.set_self(self_value.clone());
        ctx.set_root(parent_root.cloned().unwrap_or(self_value.clone()));

        for field in &template.bounded_fields {
            let params: Vec<(String, Value)> = field
                .context_parameters
                .iter()
                .map(|p| {
                    let v = self
                        .evaluator
                        .evaluate(&p.value_expr, &ctx, ExprType::Any)
                        .unwrap_or(Value::Null);
                    (p.name.clone(), v)
                })
                .collect();
            let params_guard = ContextParamsGuard::push(&mut ctx, &params);

            let proceed = self
                .evaluator
                .evaluate_boolean(&field.condition, &ctx)
                .map_err(CodecError::from)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;
            if !proceed {
                params_guard.restore(&mut ctx);
                continue;
            }

            skip::run_skips_encode(&field.skips, writer, self.evaluator.as_ref(), &ctx)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;

            let raw_field_value = field
                .get_value(value)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;

            let to_write = match field
                .binding
                .active_converter(self.evaluator.as_ref(), &ctx)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?
            {
                Some(converter) => converter
                    .encode_side(raw_field_value)
                    .map_err(|e| BoxonError::field(template.type_name, field.name, e))?,
                None => raw_field_value,
            };

            self.listener
                .writing_field(template.type_name, field.name, &format!("{:?}", field.binding.kind()));
            {
                let mut ectx = EncodeCtx {
                    writer,
                    evaluator: self.evaluator.as_ref(),
                    ctx: &mut ctx,
                    resolver: self,
                };
                self.codecs
                    .get(field.binding.kind())
                    .and_then(|codec| codec.encode(&mut ectx, &field.binding, field.collection_binding, &to_write))
                    .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;
            }
            self.listener.written_field(template.type_name, field.name, &to_write);
            params_guard.restore(&mut ctx);
        }

        for field in &template.post_processed_fields {
            if !self
                .evaluator
                .evaluate_boolean(&field.condition, &ctx)
                .map_err(CodecError::from)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?
            {
                continue;
            }
            let raw = field
                .get_value(value)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;
            ctx.put("self_field_value", raw);
            let encoded = self
                .evaluator
                .evaluate(&field.value_encode_expr, &ctx, ExprType::Any)
                .map_err(CodecError::from)
                .map_err(|e| BoxonError::field(template.type_name, field.name, e))?;
            ctx.remove("self_field_value");
            if let Value::Object(mut map) = ctx.self_value() {
                map.insert(field.name.to_string(), encoded);
                ctx.set_self(Value::Object(map));
            }
        }

        if let Some(checksum) = &template.checksum_field {
            if self
                .evaluator
                .evaluate_boolean(&checksum.condition, &ctx)
                .map_err(CodecError::from)
                .map_err(|e| BoxonError::field(template.type_name, checksum.name, e))?
            {
                // The engine does not auto-fill checksums on encode: it writes
                // whatever the caller (directly, or a post-processed field)
                // already populated the field with, like any other integer
                // field's codec would.
                let stored = checksum
                    .get_value(value)
                    .map_err(|e| BoxonError::field(template.type_name, checksum.name, e))?;
                let v = stored.as_i64().ok_or_else(|| {
                    BoxonError::field(
                        template.type_name,
                        checksum.name,
                        CodecError::Other(format!("expected integer checksum value, got {stored}")),
                    )
                })?;
                codec::write_width(checksum.width_bytes, checksum.byte_order, v, writer)
                    .map_err(|e| BoxonError::field(template.type_name, checksum.name, e))?;
            }
        }

        if let Some(header) = &template.header {
            if let Some(end) = &header.end {
                skip::write_terminator(writer, end);
            }
        }

        Ok(())
    }
}

impl ObjectResolver for Engine {
    fn decode_object(
        &self,
        tag: &TypeTag,
        reader: &mut dyn BitReader,
        parent_root: &Value,
    ) -> Result<Value, CodecError> {
        let handle = self
            .objects
            .read()
            .expect("object registry poisoned")
            .get(tag)
            .cloned()
            .ok_or_else(|| CodecError::Other(TemplateError::UnknownTag { tag: tag.to_string() }.to_string()))?;
        handle
            .decode_erased(self, reader, parent_root)
            .map_err(|e| CodecError::Other(e.to_string()))
    }

    fn encode_object(
        &self,
        tag: &TypeTag,
        value: &Value,
        writer: &mut dyn BitWriter,
        parent_root: &Value,
    ) -> Result<(), CodecError> {
        let handle = self
            .objects
            .read()
            .expect("object registry poisoned")
            .get(tag)
            .cloned()
            .ok_or_else(|| CodecError::Other(TemplateError::UnknownTag { tag: tag.to_string() }.to_string()))?;
        handle
            .encode_erased(self, value, writer, parent_root)
            .map_err(|e| CodecError::Other(e.to_string()))
    }
}

fn refresh_self<T: Serialize>(ctx: &mut EvaluatorContext, current: &T, type_name: &'static str) -> Result<(), BoxonError> {
    let snapshot = value::from_field(current)
        .map_err(|e| BoxonError::Codec(CodecError::Other(format!("re-serialize '{type_name}': {e}"))))?;
    ctx.set_self(snapshot);
    Ok(())
}

fn consume_header_start(
    header: &crate::template::Header,
    reader: &mut dyn BitReader,
    type_name: &'static str,
) -> Result<(), BoxonError> {
    if header.start.is_empty() {
        return Ok(());
    }
    for candidate in &header.start {
        if reader.peek_bytes(candidate.len()) == Some(candidate.as_slice()) {
            reader
                .skip_bits((candidate.len() as u64) * 8)
                .map_err(|e| BoxonError::field(type_name, "header", e))?;
            return Ok(());
        }
    }
    Err(BoxonError::Template(TemplateError::NoMatchingTemplate))
}
