use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{Error, ErrorKind, Result};

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(*self)
    }
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

impl Serialize for i16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i16::<BigEndian>(*self)
    }
}

impl Serialize for i32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(*self)
    }
}

impl Serialize for i64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<BigEndian>(*self)
    }
}

impl Serialize for f32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_f32::<BigEndian>(*self)
    }
}

impl Serialize for f64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_f64::<BigEndian>(*self)
    }
}

/// Size in `u16` is the first thing serialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        let len = u16::try_from(self.len()).map_err(|_| {
            Error::new(
                ErrorKind::InvalidData,
                format!("sequence of {} elements exceeds u16 length", self.len()),
            )
        })?;
        len.serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

/// Big-endian cursor over the bytes of a class file
///
/// Every read is bounds checked and reports an `UnexpectedEof` error instead of panicking.
#[derive(Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> ByteCursor<'a> {
        ByteCursor { bytes, position: 0 }
    }

    /// Current position from the start of the underlying bytes
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    /// Take the next `len` bytes
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("needed {} bytes at position {}", len, self.position),
                )
            })?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.bytes(2)?))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.bytes(2)?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.bytes(4)?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.bytes(4)?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.bytes(8)?))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(self.bytes(4)?))
    }

    pub fn f64(&mut self) -> Result<f64> {
        Ok(BigEndian::read_f64(self.bytes(8)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn vec_length_prefix() {
        let mut out = vec![];
        vec![1u16, 0xCAFE].serialize(&mut out).unwrap();
        assert_eq!(out, vec![0, 2, 0, 1, 0xCA, 0xFE]);
    }

    #[test]
    fn cursor_reads_big_endian() {
        let mut cursor = ByteCursor::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0xFF, 0x01]);
        assert_eq!(cursor.u32().unwrap(), 0xCAFEBABE);
        assert_eq!(cursor.i8().unwrap(), -1);
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(
            cursor.u16().unwrap_err().kind(),
            ErrorKind::UnexpectedEof
        );
        assert_eq!(cursor.u8().unwrap(), 1);
    }
}
