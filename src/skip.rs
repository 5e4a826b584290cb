//! Skip descriptor execution and message terminator handling (§4.6).

use crate::binding::SkipDescriptor;
use crate::context::EvaluatorContext;
use crate::error::{CodecError, TemplateError};
use crate::expr::Evaluator;
use crate::io::{BitReader, BitWriter};

/// Runs every skip attached to a field, in declaration order, before the
/// field's own codec is dispatched (§4.6).
pub fn run_skips_decode(
    skips: &[SkipDescriptor],
    reader: &mut dyn BitReader,
    evaluator: &dyn Evaluator,
    ctx: &EvaluatorContext,
) -> Result<(), CodecError> {
    for skip in skips {
        run_one_skip_decode(skip, reader, evaluator, ctx)?;
    }
    Ok(())
}

fn run_one_skip_decode(
    skip: &SkipDescriptor,
    reader: &mut dyn BitReader,
    evaluator: &dyn Evaluator,
    ctx: &EvaluatorContext,
) -> Result<(), CodecError> {
    match skip {
        SkipDescriptor::SkipBits {
            condition,
            size_expr,
        } => {
            if !evaluator.evaluate_boolean(condition, ctx)? {
                return Ok(());
            }
            let n = evaluator.evaluate_size(size_expr, ctx);
            if n > 0 {
                reader.skip_bits(n as u64)?;
            }
            Ok(())
        }
        SkipDescriptor::SkipUntil {
            condition,
            terminator_byte,
            consume_terminator,
        } => {
            if !evaluator.evaluate_boolean(condition, ctx)? {
                return Ok(());
            }
            reader.skip_until(*terminator_byte)?;
            if *consume_terminator {
                reader.read_u8()?;
            }
            Ok(())
        }
    }
}

/// Mirrors [`run_skips_decode`] on the encode path (§4.6).
pub fn run_skips_encode(
    skips: &[SkipDescriptor],
    writer: &mut dyn BitWriter,
    evaluator: &dyn Evaluator,
    ctx: &EvaluatorContext,
) -> Result<(), CodecError> {
    for skip in skips {
        run_one_skip_encode(skip, writer, evaluator, ctx)?;
    }
    Ok(())
}

fn run_one_skip_encode(
    skip: &SkipDescriptor,
    writer: &mut dyn BitWriter,
    evaluator: &dyn Evaluator,
    ctx: &EvaluatorContext,
) -> Result<(), CodecError> {
    match skip {
        SkipDescriptor::SkipBits {
            condition,
            size_expr,
        } => {
            if !evaluator.evaluate_boolean(condition, ctx)? {
                return Ok(());
            }
            let n = evaluator.evaluate_size(size_expr, ctx);
            if n > 0 {
                writer.skip_bits(n as u64);
            }
            Ok(())
        }
        SkipDescriptor::SkipUntil {
            condition,
            terminator_byte,
            consume_terminator,
        } => {
            if !evaluator.evaluate_boolean(condition, ctx)? {
                return Ok(());
            }
            if *consume_terminator {
                writer.write_terminator(*terminator_byte);
            }
            Ok(())
        }
    }
}

/// Reads exactly `end.len()` bytes and compares against `end`; mismatch is
/// a `TemplateError` (§4.6).
pub fn verify_terminator(reader: &mut dyn BitReader, end: &[u8]) -> Result<(), TemplateError> {
    let mut found = Vec::with_capacity(end.len());
    for _ in 0..end.len() {
        match reader.read_u8() {
            Ok(b) => found.push(b),
            Err(_) => {
                return Err(TemplateError::TerminatorMismatch {
                    expected: end.to_vec(),
                    found,
                })
            }
        }
    }
    if found == end {
        Ok(())
    } else {
        Err(TemplateError::TerminatorMismatch {
            expected: end.to_vec(),
            found,
        })
    }
}

pub fn write_terminator(writer: &mut dyn BitWriter, end: &[u8]) {
    writer.write_bytes(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DefaultEvaluator;
    use crate::io::{SliceBitReader, VecBitWriter};

    #[test]
    fn skip_until_then_read_value() {
        let data = [0x11u8, 0x22, 0x00, 0x05];
        let mut reader = SliceBitReader::new(&data);
        let ev = DefaultEvaluator;
        let ctx = EvaluatorContext::new();
        let skips = vec![SkipDescriptor::SkipUntil {
            condition: String::new(),
            terminator_byte: 0x00,
            consume_terminator: true,
        }];
        run_skips_decode(&skips, &mut reader, &ev, &ctx).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 0x05);
    }

    #[test]
    fn skip_bits_encode_advances_cursor() {
        let mut writer = VecBitWriter::new();
        let ev = DefaultEvaluator;
        let ctx = EvaluatorContext::new();
        let skips = vec![SkipDescriptor::SkipBits {
            condition: String::new(),
            size_expr: "8".into(),
        }];
        run_skips_encode(&skips, &mut writer, &ev, &ctx).unwrap();
        assert_eq!(writer.into_bytes(), vec![0u8]);
    }

    #[test]
    fn terminator_mismatch_is_reported() {
        let data = [0x01u8, 0x02];
        let mut reader = SliceBitReader::new(&data);
        let err = verify_terminator(&mut reader, &[0x01, 0x03]).unwrap_err();
        match err {
            TemplateError::TerminatorMismatch { expected, found } => {
                assert_eq!(expected, vec![0x01, 0x03]);
                assert_eq!(found, vec![0x01, 0x02]);
            }
            _ => panic!("wrong error"),
        }
    }
}
