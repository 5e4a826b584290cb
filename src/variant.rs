//! Variant/alternative resolution for OBJECT / ARRAY-of-object bindings
//! (§4.5).
//!
//! The canonical representation of a resolved variant value is a small
//! JSON envelope `{"type": <tag>, "value": <nested object>}` — the
//! adjacently-tagged-enum shape `serde` already knows how to produce and
//! consume via `#[serde(tag = "type", content = "value")]`. This closes the
//! gap left by Rust having no `value.getClass()`: the tag travels with the
//! value instead of being recovered reflectively.

use crate::binding::{BitOrder, SelectFrom, TypeTag};
use crate::context::EvaluatorContext;
use crate::error::CodecError;
use crate::expr::Evaluator;
use crate::io::BitReader;
use crate::value::Value;

pub const TAG_FIELD: &str = "type";
pub const VALUE_FIELD: &str = "value";

pub fn envelope(tag: &TypeTag, value: Value) -> Value {
    serde_json::json!({ TAG_FIELD: tag.0.as_ref(), VALUE_FIELD: value })
}

/// Splits an encoded envelope back into its tag and nested value (used on
/// the encode path, where the caller already serialized a
/// `#[serde(tag = "type", content = "value")]` enum into this shape).
pub fn split_envelope(value: &Value) -> Result<(TypeTag, Value), CodecError> {
    let tag = value
        .get(TAG_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::Other("variant value missing 'type' tag".into()))?;
    let nested = value.get(VALUE_FIELD).cloned().unwrap_or(Value::Null);
    Ok((TypeTag::new(tag.to_string()), nested))
}

/// Resolves which concrete type to decode (§4.5 steps 1-3), reading the
/// discriminant prefix (if any) and installing it into the context.
pub fn resolve_for_decode(
    select_from: &SelectFrom,
    reader: &mut dyn BitReader,
    evaluator: &dyn Evaluator,
    ctx: &mut EvaluatorContext,
    type_name: &str,
) -> Result<TypeTag, CodecError> {
    if select_from.prefix_size > 0 {
        let order = match select_from.bit_order {
            BitOrder::BigEndian => BitOrder::BigEndian,
            BitOrder::LittleEndian => BitOrder::LittleEndian,
        };
        let prefix = reader.read_bits(select_from.prefix_size as u32, order)?;
        ctx.set_prefix(prefix);
    }

    for alternative in &select_from.alternatives {
        if evaluator.evaluate_boolean(&alternative.condition, ctx)? {
            return Ok(alternative.type_tag.clone());
        }
    }

    match &select_from.select_default {
        Some(tag) => Ok(tag.clone()),
        None => Err(CodecError::NoAlternativeMatched {
            type_name: type_name.to_string(),
        }),
    }
}

/// Resolves the alternative matching a concrete (already-known) tag on the
/// encode path (§4.5 step 5), returning whether its prefix should be
/// written and, if so, the prefix value and width/order to write it with.
pub struct EncodeResolution<'a> {
    pub alternative: Option<&'a crate::binding::Alternative>,
}

pub fn resolve_for_encode<'a>(
    select_from: &'a SelectFrom,
    tag: &TypeTag,
) -> EncodeResolution<'a> {
    let alternative = select_from.alternatives.iter().find(|a| &a.type_tag == tag);
    EncodeResolution { alternative }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Alternative;
    use crate::expr::DefaultEvaluator;
    use crate::io::{SliceBitReader, VecBitWriter};
    use crate::io::BitWriter;

    fn sample_select_from() -> SelectFrom {
        SelectFrom {
            prefix_size: 8,
            bit_order: BitOrder::BigEndian,
            alternatives: vec![
                Alternative {
                    condition: "#prefix==1".into(),
                    prefix: 1,
                    type_tag: TypeTag::new("kind1"),
                },
                Alternative {
                    condition: "#prefix==2".into(),
                    prefix: 2,
                    type_tag: TypeTag::new("kind2"),
                },
            ],
            select_default: None,
        }
    }

    #[test]
    fn resolves_by_prefix_scenario_s2() {
        let select_from = sample_select_from();
        let data = [0x02u8];
        let mut reader = SliceBitReader::new(&data);
        let evaluator = DefaultEvaluator;
        let mut ctx = EvaluatorContext::new();
        let tag = resolve_for_decode(&select_from, &mut reader, &evaluator, &mut ctx, "Payload").unwrap();
        assert_eq!(tag, TypeTag::new("kind2"));
    }

    #[test]
    fn no_match_and_no_default_is_codec_error() {
        let select_from = sample_select_from();
        let data = [0x03u8];
        let mut reader = SliceBitReader::new(&data);
        let evaluator = DefaultEvaluator;
        let mut ctx = EvaluatorContext::new();
        let err = resolve_for_decode(&select_from, &mut reader, &evaluator, &mut ctx, "Payload").unwrap_err();
        assert!(matches!(err, CodecError::NoAlternativeMatched { .. }));
    }

    #[test]
    fn envelope_round_trips() {
        let mut writer = VecBitWriter::new();
        writer.write_u8(0xaa);
        let tag = TypeTag::new("kind2");
        let value = envelope(&tag, serde_json::json!({"x": 1}));
        let (parsed_tag, nested) = split_envelope(&value).unwrap();
        assert_eq!(parsed_tag, tag);
        assert_eq!(nested, serde_json::json!({"x": 1}));
    }
}
