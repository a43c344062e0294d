//! Primitive types.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_types>

use std::io::{Read, Write};

use super::{
    traits::{ReadError, ReadType, WriteError, WriteType},
    vec_builder::VecBuilder,
};

impl<R: Read> ReadType<R> for bool {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0] != 0)
    }
}

impl<W: Write> WriteType<W> for bool {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        writer.write_all(&[u8::from(*self)])?;
        Ok(())
    }
}

macro_rules! fixed_width_int {
    ($t:ty, $n:expr) => {
        impl<R: Read> ReadType<R> for $t {
            fn read(reader: &mut R) -> Result<Self, ReadError> {
                let mut buf = [0u8; $n];
                reader.read_exact(&mut buf)?;
                Ok(<$t>::from_be_bytes(buf))
            }
        }

        impl<W: Write> WriteType<W> for $t {
            fn write(&self, writer: &mut W) -> Result<(), WriteError> {
                writer.write_all(&self.to_be_bytes())?;
                Ok(())
            }
        }
    };
}

fixed_width_int!(i8, 1);
fixed_width_int!(i16, 2);
fixed_width_int!(i32, 4);
fixed_width_int!(i64, 8);

fn read_utf8<R: Read>(reader: &mut R, len: usize) -> Result<String, ReadError> {
    let buf = VecBuilder::new(len).read_exact(reader)?;
    String::from_utf8(buf.into()).map_err(|e| ReadError::Malformed(Box::new(e)))
}

// STRING
//
// First the length N is given as an INT16. Then N bytes follow which are the
// UTF-8 encoding of the character sequence.
impl<R: Read> ReadType<R> for String {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let len = i16::read(reader)?;
        let len = usize::try_from(len).map_err(|e| ReadError::Malformed(Box::new(e)))?;
        read_utf8(reader, len)
    }
}

impl<W: Write> WriteType<W> for String {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let len = i16::try_from(self.len())?;
        len.write(writer)?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

// NULLABLE_STRING
//
// Same as STRING, a null value is encoded with length of -1 and there are no
// following bytes.
impl<R: Read> ReadType<R> for Option<String> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        match i16::read(reader)? {
            l if l < -1 => Err(ReadError::Malformed(
                format!("Invalid negative length for nullable string: {l}").into(),
            )),
            -1 => Ok(None),
            l => Ok(Some(read_utf8(reader, usize::try_from(l)?)?)),
        }
    }
}

impl<W: Write> WriteType<W> for Option<String> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        match self {
            Some(s) => s.write(writer),
            None => (-1i16).write(writer),
        }
    }
}

// ARRAY<INT32> and ARRAY<STRING>
//
// First the length N is given as an INT32, then N instances follow. A null array
// is represented with a length of -1 and read back as empty.
macro_rules! primitive_array {
    ($t:ty) => {
        impl<R: Read> ReadType<R> for Vec<$t> {
            fn read(reader: &mut R) -> Result<Self, ReadError> {
                let len = i32::read(reader)?;
                if len == -1 {
                    return Ok(vec![]);
                }

                let len = usize::try_from(len)?;
                let mut res = VecBuilder::new(len);
                for _ in 0..len {
                    res.push(<$t>::read(reader)?);
                }
                Ok(res.into())
            }
        }

        impl<W: Write> WriteType<W> for Vec<$t> {
            fn write(&self, writer: &mut W) -> Result<(), WriteError> {
                let len = i32::try_from(self.len())?;
                len.write(writer)?;
                for elem in self {
                    elem.write(writer)?;
                }
                Ok(())
            }
        }
    };
}

primitive_array!(i32);
primitive_array!(String);
