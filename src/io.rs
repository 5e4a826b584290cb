//! External reader/writer interfaces (§6) and the default `Vec<u8>`-backed
//! implementations.
//!
//! Deliberately out of scope per the distilled spec except for its
//! contract; this module ships a working default so the engine is usable
//! and testable without requiring callers to bring their own bit I/O.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use num_bigint::BigInt;

use crate::binding::{BitOrder, ByteOrder};
use crate::error::CodecError;

/// Reader contract consumed by the engine and codecs (§6).
pub trait BitReader {
    /// Current position in bits.
    fn position_bits(&self) -> u64;

    fn skip_bits(&mut self, n: u64) -> Result<(), CodecError>;
    fn skip_until(&mut self, terminator: u8) -> Result<(), CodecError>;

    fn read_bits(&mut self, n: u32, order: BitOrder) -> Result<u64, CodecError>;

    fn read_u8(&mut self) -> Result<u8, CodecError>;
    fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(self.read_u8()? as i8)
    }
    fn read_u16(&mut self, order: ByteOrder) -> Result<u16, CodecError>;
    fn read_i16(&mut self, order: ByteOrder) -> Result<i16, CodecError> {
        Ok(self.read_u16(order)? as i16)
    }
    fn read_u32(&mut self, order: ByteOrder) -> Result<u32, CodecError>;
    fn read_i32(&mut self, order: ByteOrder) -> Result<i32, CodecError> {
        Ok(self.read_u32(order)? as i32)
    }
    fn read_u64(&mut self, order: ByteOrder) -> Result<u64, CodecError>;
    fn read_i64(&mut self, order: ByteOrder) -> Result<i64, CodecError> {
        Ok(self.read_u64(order)? as i64)
    }
    fn read_f32(&mut self, order: ByteOrder) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_u32(order)?))
    }
    fn read_f64(&mut self, order: ByteOrder) -> Result<f64, CodecError> {
        Ok(f64::from_bits(self.read_u64(order)?))
    }
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, CodecError>;

    fn read_big_int(&mut self, n_bits: u32, order: ByteOrder) -> Result<BigInt, CodecError> {
        let n_bytes = ((n_bits + 7) / 8) as usize;
        let mut bytes = self.read_bytes(n_bytes)?;
        if matches!(order, ByteOrder::LittleEndian) {
            bytes.reverse();
        }
        Ok(BigInt::from_signed_bytes_be(&bytes))
    }

    /// Byte-indexed view of the entire backing buffer, used for checksum
    /// spans and header-prefix peeking.
    fn array(&self) -> &[u8];

    fn peek_bytes(&self, n: usize) -> Option<&[u8]>;
}

/// Writer contract, symmetric to [`BitReader`] (§6).
pub trait BitWriter {
    fn position_bits(&self) -> u64;

    fn skip_bits(&mut self, n: u64);
    fn write_terminator(&mut self, terminator: u8);

    fn write_bits(&mut self, value: u64, n: u32, order: BitOrder);

    fn write_u8(&mut self, v: u8);
    fn write_i8(&mut self, v: i8) {
        self.write_u8(v as u8);
    }
    fn write_u16(&mut self, v: u16, order: ByteOrder);
    fn write_i16(&mut self, v: i16, order: ByteOrder) {
        self.write_u16(v as u16, order);
    }
    fn write_u32(&mut self, v: u32, order: ByteOrder);
    fn write_i32(&mut self, v: i32, order: ByteOrder) {
        self.write_u32(v as u32, order);
    }
    fn write_u64(&mut self, v: u64, order: ByteOrder);
    fn write_i64(&mut self, v: i64, order: ByteOrder) {
        self.write_u64(v as u64, order);
    }
    fn write_f32(&mut self, v: f32, order: ByteOrder) {
        self.write_u32(v.to_bits(), order);
    }
    fn write_f64(&mut self, v: f64, order: ByteOrder) {
        self.write_u64(v.to_bits(), order);
    }
    fn write_bytes(&mut self, bytes: &[u8]);
    fn write_text(&mut self, text: &[u8]) {
        self.write_bytes(text);
    }

    fn array(&self) -> &[u8];
}

/// Default [`BitReader`] backed by a borrowed byte slice plus a bit cursor.
///
/// Multi-bit (non-byte-aligned) reads are only supported while the cursor
/// sits on a byte boundary OR the requested width is being read one bit at
/// a time; this mirrors how most binary protocols use bit-packed fields
/// only for small prefixes/flags rather than arbitrary bit-straddling
/// primitives.
pub struct SliceBitReader<'a> {
    data: &'a [u8],
    bit_pos: u64,
}

impl<'a> SliceBitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        SliceBitReader { data, bit_pos: 0 }
    }

    fn byte_pos(&self) -> usize {
        (self.bit_pos / 8) as usize
    }

    fn require_byte_aligned(&self) -> Result<(), CodecError> {
        if self.bit_pos % 8 != 0 {
            return Err(CodecError::Io(
                "byte-aligned read requested at a non-byte-aligned position".into(),
            ));
        }
        Ok(())
    }

    fn take_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.require_byte_aligned()?;
        let start = self.byte_pos();
        let end = start
            .checked_add(n)
            .ok_or_else(|| CodecError::Io("length overflow".into()))?;
        if end > self.data.len() {
            return Err(CodecError::Io(format!(
                "unexpected end of stream: need {n} bytes at offset {start}, have {}",
                self.data.len() - start.min(self.data.len())
            )));
        }
        self.bit_pos += (n as u64) * 8;
        Ok(&self.data[start..end])
    }
}

impl<'a> BitReader for SliceBitReader<'a> {
    fn position_bits(&self) -> u64 {
        self.bit_pos
    }

    fn skip_bits(&mut self, n: u64) -> Result<(), CodecError> {
        let new_pos = self.bit_pos + n;
        if new_pos > (self.data.len() as u64) * 8 {
            return Err(CodecError::Io("skip past end of stream".into()));
        }
        self.bit_pos = new_pos;
        Ok(())
    }

    fn skip_until(&mut self, terminator: u8) -> Result<(), CodecError> {
        self.require_byte_aligned()?;
        let start = self.byte_pos();
        match self.data[start..].iter().position(|b| *b == terminator) {
            Some(offset) => {
                self.bit_pos += (offset as u64) * 8;
                Ok(())
            }
            None => Err(CodecError::Io(format!(
                "terminator byte {terminator:#x} not found"
            ))),
        }
    }

    fn read_bits(&mut self, n: u32, order: BitOrder) -> Result<u64, CodecError> {
        if n > 64 {
            return Err(CodecError::Io("cannot read more than 64 bits at once".into()));
        }
        let mut value: u64 = 0;
        for i in 0..n {
            let byte_index = (self.bit_pos / 8) as usize;
            if byte_index >= self.data.len() {
                return Err(CodecError::Io("unexpected end of stream while reading bits".into()));
            }
            let bit_in_byte = (self.bit_pos % 8) as u8;
            // Bits are always stored MSB-first within a byte; `order`
            // controls the significance assigned to successive bits as
            // they are assembled into `value`.
            let bit = (self.data[byte_index] >> (7 - bit_in_byte)) & 1;
            match order {
                BitOrder::BigEndian => {
                    value = (value << 1) | (bit as u64);
                }
                BitOrder::LittleEndian => {
                    value |= (bit as u64) << i;
                }
            }
            self.bit_pos += 1;
        }
        Ok(value)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_bytes(1)?[0])
    }

    fn read_u16(&mut self, order: ByteOrder) -> Result<u16, CodecError> {
        let bytes = self.take_bytes(2)?;
        Ok(match order {
            ByteOrder::BigEndian => BigEndian::read_u16(bytes),
            ByteOrder::LittleEndian => LittleEndian::read_u16(bytes),
        })
    }

    fn read_u32(&mut self, order: ByteOrder) -> Result<u32, CodecError> {
        let bytes = self.take_bytes(4)?;
        Ok(match order {
            ByteOrder::BigEndian => BigEndian::read_u32(bytes),
            ByteOrder::LittleEndian => LittleEndian::read_u32(bytes),
        })
    }

    fn read_u64(&mut self, order: ByteOrder) -> Result<u64, CodecError> {
        let bytes = self.take_bytes(8)?;
        Ok(match order {
            ByteOrder::BigEndian => BigEndian::read_u64(bytes),
            ByteOrder::LittleEndian => LittleEndian::read_u64(bytes),
        })
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take_bytes(n)?.to_vec())
    }

    fn array(&self) -> &[u8] {
        self.data
    }

    fn peek_bytes(&self, n: usize) -> Option<&[u8]> {
        if self.bit_pos % 8 != 0 {
            return None;
        }
        let start = self.byte_pos();
        let end = start + n;
        self.data.get(start..end)
    }
}

/// Default [`BitWriter`] backed by a growable `Vec<u8>` plus a pending
/// partial byte for sub-byte-aligned writes.
#[derive(Default)]
pub struct VecBitWriter {
    data: Vec<u8>,
    pending_bits: u8,
    pending_value: u8,
}

impl VecBitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.flush_partial();
        self.data
    }

    fn flush_partial(&mut self) {
        if self.pending_bits > 0 {
            self.data.push(self.pending_value);
            self.pending_bits = 0;
            self.pending_value = 0;
        }
    }

    fn push_bit(&mut self, bit: u8) {
        self.pending_value = (self.pending_value << 1) | (bit & 1);
        self.pending_bits += 1;
        if self.pending_bits == 8 {
            self.data.push(self.pending_value);
            self.pending_bits = 0;
            self.pending_value = 0;
        }
    }

    fn require_byte_aligned(&self) {
        debug_assert_eq!(
            self.pending_bits, 0,
            "byte-aligned write requested at a non-byte-aligned position"
        );
    }
}

impl BitWriter for VecBitWriter {
    fn position_bits(&self) -> u64 {
        (self.data.len() as u64) * 8 + self.pending_bits as u64
    }

    fn skip_bits(&mut self, n: u64) {
        for _ in 0..n {
            self.push_bit(0);
        }
    }

    fn write_terminator(&mut self, terminator: u8) {
        self.require_byte_aligned();
        self.data.push(terminator);
    }

    fn write_bits(&mut self, value: u64, n: u32, order: BitOrder) {
        for i in 0..n {
            let bit = match order {
                BitOrder::BigEndian => (value >> (n - 1 - i)) & 1,
                BitOrder::LittleEndian => (value >> i) & 1,
            };
            self.push_bit(bit as u8);
        }
    }

    fn write_u8(&mut self, v: u8) {
        self.require_byte_aligned();
        self.data.push(v);
    }

    fn write_u16(&mut self, v: u16, order: ByteOrder) {
        self.require_byte_aligned();
        let mut buf = [0u8; 2];
        match order {
            ByteOrder::BigEndian => BigEndian::write_u16(&mut buf, v),
            ByteOrder::LittleEndian => LittleEndian::write_u16(&mut buf, v),
        }
        self.data.extend_from_slice(&buf);
    }

    fn write_u32(&mut self, v: u32, order: ByteOrder) {
        self.require_byte_aligned();
        let mut buf = [0u8; 4];
        match order {
            ByteOrder::BigEndian => BigEndian::write_u32(&mut buf, v),
            ByteOrder::LittleEndian => LittleEndian::write_u32(&mut buf, v),
        }
        self.data.extend_from_slice(&buf);
    }

    fn write_u64(&mut self, v: u64, order: ByteOrder) {
        self.require_byte_aligned();
        let mut buf = [0u8; 8];
        match order {
            ByteOrder::BigEndian => BigEndian::write_u64(&mut buf, v),
            ByteOrder::LittleEndian => LittleEndian::write_u64(&mut buf, v),
        }
        self.data.extend_from_slice(&buf);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.require_byte_aligned();
        self.data.extend_from_slice(bytes);
    }

    fn array(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_u16_big_endian() {
        let mut w = VecBitWriter::new();
        w.write_u16(0x0102, ByteOrder::BigEndian);
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0x01, 0x02]);
        let mut r = SliceBitReader::new(&bytes);
        assert_eq!(r.read_u16(ByteOrder::BigEndian).unwrap(), 0x0102);
    }

    #[test]
    fn bit_prefix_big_endian() {
        let mut w = VecBitWriter::new();
        w.write_bits(0b101, 3, BitOrder::BigEndian);
        w.write_bits(0, 5, BitOrder::BigEndian);
        let bytes = w.into_bytes();
        let mut r = SliceBitReader::new(&bytes);
        assert_eq!(r.read_bits(3, BitOrder::BigEndian).unwrap(), 0b101);
    }

    #[test]
    fn skip_until_terminator() {
        let data = [0x11u8, 0x22, 0x00, 0x05];
        let mut r = SliceBitReader::new(&data);
        r.skip_until(0x00).unwrap();
        assert_eq!(r.read_u8().unwrap(), 0x00);
        assert_eq!(r.read_u8().unwrap(), 0x05);
    }
}
