//! Compiled template model and the explicit builder API that replaces
//! reflective annotation scanning (§3, §4.1, Design Notes).
//!
//! There is no derive macro here: callers assemble a `Template<T>` through
//! [`TemplateBuilder`], supplying a getter/setter closure pair per field in
//! place of what a reflective binder would have discovered on its own.
//! This is the "explicit builder API" option called out in the Design
//! Notes, chosen over a procedural-macro front end since one is explicitly
//! out of scope (Non-goals).

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::binding::{Binding, ChecksumAlgorithmKind, ByteOrder, Charset, CollectionBinding, ContextParameter, SkipDescriptor};
use crate::error::{AnnotationError, CodecError};
use crate::value::{self, Value};

/// Descriptor carrying the acceptable starting byte sequences and an
/// optional terminator bracketing a message (§3 `header`).
#[derive(Debug, Clone)]
pub struct Header {
    pub start: Vec<Vec<u8>>,
    pub end: Option<Vec<u8>>,
    pub charset: Charset,
}

impl Header {
    pub fn new(charset: Charset) -> Self {
        Header {
            start: Vec::new(),
            end: None,
            charset,
        }
    }

    /// Adds an acceptable starting byte sequence, encoded from a literal
    /// string through `charset`.
    pub fn start_str(mut self, s: &str) -> Self {
        self.start.push(self.charset.encode(s));
        self
    }

    pub fn start_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.start.push(bytes);
        self
    }

    pub fn end_str(mut self, s: &str) -> Self {
        self.end = Some(self.charset.encode(s));
        self
    }

    pub fn end_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.end = Some(bytes);
        self
    }
}

type Getter<T> = Box<dyn Fn(&T) -> Result<Value, CodecError> + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> Result<(), CodecError> + Send + Sync>;

fn getter_for<T, F>(get: impl Fn(&T) -> F + Send + Sync + 'static) -> Getter<T>
where
    F: Serialize,
{
    Box::new(move |t: &T| {
        value::from_field(&get(t)).map_err(|e| CodecError::Other(format!("serialize field: {e}")))
    })
}

fn setter_for<T, F>(set: impl Fn(&mut T, F) + Send + Sync + 'static) -> Setter<T>
where
    F: DeserializeOwned,
{
    Box::new(move |t: &mut T, v: Value| {
        let parsed: F =
            value::into_field(v).map_err(|e| CodecError::Other(format!("deserialize field: {e}")))?;
        set(t, parsed);
        Ok(())
    })
}

/// A single bounded field's plan (§3 `TemplateField`).
pub struct TemplateField<T> {
    pub name: &'static str,
    pub binding: Binding,
    pub collection_binding: Option<CollectionBinding>,
    /// Empty string means "always process".
    pub condition: String,
    pub skips: Vec<SkipDescriptor>,
    pub context_parameters: Vec<ContextParameter>,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T: 'static> TemplateField<T> {
    pub fn new<F>(
        name: &'static str,
        binding: Binding,
        get: impl Fn(&T) -> F + Send + Sync + 'static,
        set: impl Fn(&mut T, F) + Send + Sync + 'static,
    ) -> Self
    where
        F: Serialize + DeserializeOwned,
    {
        TemplateField {
            name,
            binding,
            collection_binding: None,
            condition: String::new(),
            skips: Vec::new(),
            context_parameters: Vec::new(),
            get: getter_for(get),
            set: setter_for(set),
        }
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn collection(mut self, binding: CollectionBinding) -> Self {
        self.collection_binding = Some(binding);
        self
    }

    pub fn skip(mut self, skip: SkipDescriptor) -> Self {
        self.skips.push(skip);
        self
    }

    pub fn context_param(mut self, param: ContextParameter) -> Self {
        self.context_parameters.push(param);
        self
    }

    pub fn get_value(&self, target: &T) -> Result<Value, CodecError> {
        (self.get)(target)
    }

    pub fn set_value(&self, target: &mut T, value: Value) -> Result<(), CodecError> {
        (self.set)(target, value)
    }
}

/// A field whose value is computed after decoding, consuming no bytes
/// (§3 `evaluated_fields`).
pub struct EvaluatedField<T> {
    pub name: &'static str,
    pub condition: String,
    pub value_expr: String,
    set: Setter<T>,
}

impl<T: 'static> EvaluatedField<T> {
    pub fn new<F>(
        name: &'static str,
        value_expr: impl Into<String>,
        set: impl Fn(&mut T, F) + Send + Sync + 'static,
    ) -> Self
    where
        F: DeserializeOwned,
    {
        EvaluatedField {
            name,
            condition: String::new(),
            value_expr: value_expr.into(),
            set: setter_for(set),
        }
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn set_value(&self, target: &mut T, value: Value) -> Result<(), CodecError> {
        (self.set)(target, value)
    }
}

/// A field with distinct expressions for the decode and encode directions
/// (§3 `post_processed_fields`).
pub struct PostProcessedField<T> {
    pub name: &'static str,
    pub condition: String,
    pub value_decode_expr: String,
    pub value_encode_expr: String,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T: 'static> PostProcessedField<T> {
    pub fn new<F>(
        name: &'static str,
        value_decode_expr: impl Into<String>,
        value_encode_expr: impl Into<String>,
        get: impl Fn(&T) -> F + Send + Sync + 'static,
        set: impl Fn(&mut T, F) + Send + Sync + 'static,
    ) -> Self
    where
        F: Serialize + DeserializeOwned,
    {
        PostProcessedField {
            name,
            condition: String::new(),
            value_decode_expr: value_decode_expr.into(),
            value_encode_expr: value_encode_expr.into(),
            get: getter_for(get),
            set: setter_for(set),
        }
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn get_value(&self, target: &T) -> Result<Value, CodecError> {
        (self.get)(target)
    }

    pub fn set_value(&self, target: &mut T, value: Value) -> Result<(), CodecError> {
        (self.set)(target, value)
    }
}

/// The (at most one) checksum field on a template (§3 `checksum_field`).
pub struct ChecksumField<T> {
    pub name: &'static str,
    pub condition: String,
    pub algorithm: ChecksumAlgorithmKind,
    pub skip_start: i64,
    pub skip_end: i64,
    pub byte_order: ByteOrder,
    pub width_bytes: u8,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T: 'static> ChecksumField<T> {
    pub fn new(
        name: &'static str,
        algorithm: ChecksumAlgorithmKind,
        byte_order: ByteOrder,
        width_bytes: u8,
        get: impl Fn(&T) -> i64 + Send + Sync + 'static,
        set: impl Fn(&mut T, i64) + Send + Sync + 'static,
    ) -> Self {
        ChecksumField {
            name,
            condition: String::new(),
            algorithm,
            skip_start: 0,
            skip_end: 0,
            byte_order,
            width_bytes,
            get: getter_for(get),
            set: setter_for(set),
        }
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn skip_start(mut self, n: i64) -> Self {
        self.skip_start = n;
        self
    }

    pub fn skip_end(mut self, n: i64) -> Self {
        self.skip_end = n;
        self
    }

    pub fn get_value(&self, target: &T) -> Result<Value, CodecError> {
        (self.get)(target)
    }

    pub fn set_value(&self, target: &mut T, value: Value) -> Result<(), CodecError> {
        (self.set)(target, value)
    }
}

/// The compiled plan for a message type `T` (§3 `Template<T>`).
pub struct Template<T> {
    pub type_name: &'static str,
    pub header: Option<Header>,
    pub bounded_fields: Vec<TemplateField<T>>,
    pub evaluated_fields: Vec<EvaluatedField<T>>,
    pub post_processed_fields: Vec<PostProcessedField<T>>,
    pub checksum_field: Option<ChecksumField<T>>,
}

/// Builds and validates a [`Template<T>`] (§4.1).
pub struct TemplateBuilder<T> {
    type_name: &'static str,
    header: Option<Header>,
    bounded_fields: Vec<TemplateField<T>>,
    evaluated_fields: Vec<EvaluatedField<T>>,
    post_processed_fields: Vec<PostProcessedField<T>>,
    checksum_field: Option<ChecksumField<T>>,
    duplicate_checksum: bool,
}

impl<T: 'static> TemplateBuilder<T> {
    pub fn new(type_name: &'static str) -> Self {
        TemplateBuilder {
            type_name,
            header: None,
            bounded_fields: Vec::new(),
            evaluated_fields: Vec::new(),
            post_processed_fields: Vec::new(),
            checksum_field: None,
            duplicate_checksum: false,
        }
    }

    pub fn header(mut self, header: Header) -> Self {
        self.header = Some(header);
        self
    }

    pub fn field(mut self, field: TemplateField<T>) -> Self {
        self.bounded_fields.push(field);
        self
    }

    pub fn evaluated(mut self, field: EvaluatedField<T>) -> Self {
        self.evaluated_fields.push(field);
        self
    }

    pub fn post_processed(mut self, field: PostProcessedField<T>) -> Self {
        self.post_processed_fields.push(field);
        self
    }

    /// At most one checksum field is allowed (§3 invariant); a second call
    /// is recorded and reported by `build`.
    pub fn checksum(mut self, field: ChecksumField<T>) -> Self {
        if self.checksum_field.is_some() {
            // Recorded rather than panicking here: `build` performs the
            // single validation pass and surfaces a typed error.
            self.duplicate_checksum = true;
        }
        self.checksum_field = Some(field);
        self
    }

    /// Prepends a parent template's already-built field plan, realizing
    /// "inherited fields placed before child fields" (§4.1 step 1) without
    /// reflection over a real inheritance hierarchy.
    pub fn extend_fields(mut self, parent_fields: Vec<TemplateField<T>>) -> Self {
        let mut merged = parent_fields;
        merged.append(&mut self.bounded_fields);
        self.bounded_fields = merged;
        self
    }

    pub fn build(self) -> Result<Template<T>, AnnotationError> {
        if self.duplicate_checksum {
            return Err(AnnotationError::DuplicateChecksum {
                type_name: self.type_name,
            });
        }
        if self.bounded_fields.is_empty() {
            return Err(AnnotationError::EmptyTemplate {
                type_name: self.type_name,
            });
        }
        Ok(Template {
            type_name: self.type_name,
            header: self.header,
            bounded_fields: self.bounded_fields,
            evaluated_fields: self.evaluated_fields,
            post_processed_fields: self.post_processed_fields,
            checksum_field: self.checksum_field,
        })
    }
}
