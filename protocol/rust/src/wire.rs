//! Primitive pvAccess serialization: fixed-width integers in either byte order,
//! the compact size encoding and size-prefixed strings.

use crate::DecodeError;
use bytes::Buf;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;

const SIZE_NULL: u8 = 0xFF;
const SIZE_EXTENDED: u8 = 0xFE;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

pub trait WireEncode {
    fn encode(&self, writer: &mut Writer<'_>);
}

pub trait WireDecode: Sized {
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError>;
}

pub struct Writer<'a> {
    buffer: &'a mut BytesMut,
    order: ByteOrder,
}

impl<'a> Writer<'a> {
    pub fn new(buffer: &'a mut BytesMut, order: ByteOrder) -> Self {
        Self { buffer, order }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        match self.order {
            ByteOrder::Little => self.buffer.put_u16_le(value),
            ByteOrder::Big => self.buffer.put_u16(value),
        }
    }

    pub fn put_u32(&mut self, value: u32) {
        match self.order {
            ByteOrder::Little => self.buffer.put_u32_le(value),
            ByteOrder::Big => self.buffer.put_u32(value),
        }
    }

    pub fn put_bytes(&mut self, value: &[u8]) {
        self.buffer.put_slice(value);
    }

    pub fn put_size(&mut self, size: usize) {
        if size < usize::from(SIZE_EXTENDED) {
            self.put_u8(size as u8);
        } else {
            self.put_u8(SIZE_EXTENDED);
            self.put_u32(size as u32);
        }
    }

    pub fn put_string(&mut self, value: &str) {
        self.put_size(value.len());
        self.put_bytes(value.as_bytes());
    }
}

pub struct Reader {
    buffer: Bytes,
    order: ByteOrder,
}

impl Reader {
    pub fn new(buffer: Bytes, order: ByteOrder) -> Self {
        Self { buffer, order }
    }

    fn require(&self, length: usize) -> Result<(), DecodeError> {
        if self.buffer.remaining() < length {
            Err(DecodeError::Truncated {
                needed: length,
                remaining: self.buffer.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn get_u8(&mut self) -> Result<u8, DecodeError> {
        self.require(1)?;
        Ok(self.buffer.get_u8())
    }

    pub fn get_u16(&mut self) -> Result<u16, DecodeError> {
        self.require(2)?;
        Ok(match self.order {
            ByteOrder::Little => self.buffer.get_u16_le(),
            ByteOrder::Big => self.buffer.get_u16(),
        })
    }

    pub fn get_u32(&mut self) -> Result<u32, DecodeError> {
        self.require(4)?;
        Ok(match self.order {
            ByteOrder::Little => self.buffer.get_u32_le(),
            ByteOrder::Big => self.buffer.get_u32(),
        })
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.require(N)?;
        let mut array = [0; N];
        self.buffer.copy_to_slice(&mut array);
        Ok(array)
    }

    pub fn skip(&mut self, length: usize) -> Result<(), DecodeError> {
        self.require(length)?;
        self.buffer.advance(length);
        Ok(())
    }

    pub fn skip_rest(&mut self) {
        self.buffer.advance(self.buffer.remaining());
    }

    /// Reads a compact size. The null marker decodes as `0`.
    pub fn get_size(&mut self) -> Result<usize, DecodeError> {
        match self.get_u8()? {
            SIZE_NULL => Ok(0),
            SIZE_EXTENDED => Ok(self.get_u32()? as usize),
            size => Ok(size.into()),
        }
    }

    pub fn get_string(&mut self) -> Result<String, DecodeError> {
        let length = self.get_size()?;
        self.require(length)?;
        let bytes = self.buffer.split_to(length);
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidString)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn write(order: ByteOrder, f: impl FnOnce(&mut Writer<'_>)) -> Bytes {
        let mut buffer = BytesMut::new();
        f(&mut Writer::new(&mut buffer, order));
        buffer.freeze()
    }

    #[test]
    fn byte_order() {
        let little = write(ByteOrder::Little, |w| w.put_u32(0x0102_0304));
        let big = write(ByteOrder::Big, |w| w.put_u32(0x0102_0304));

        assert_eq!(&little[..], &[4, 3, 2, 1]);
        assert_eq!(&big[..], &[1, 2, 3, 4]);
        assert_eq!(
            Reader::new(big, ByteOrder::Big).get_u32().unwrap(),
            0x0102_0304
        );
    }

    #[test]
    fn extended_size() {
        let bytes = write(ByteOrder::Little, |w| w.put_size(300));

        assert_eq!(&bytes[..], &[0xFE, 0x2C, 0x01, 0, 0]);
        assert_eq!(
            Reader::new(bytes, ByteOrder::Little).get_size().unwrap(),
            300
        );
    }

    #[test]
    fn null_string_is_empty() {
        let mut reader = Reader::new(Bytes::from_static(&[0xFF]), ByteOrder::Little);
        assert_eq!(reader.get_string().unwrap(), "");
    }

    #[test]
    fn truncated_string() {
        let mut reader = Reader::new(Bytes::from_static(&[5, b'a', b'b']), ByteOrder::Little);
        assert!(matches!(
            reader.get_string().unwrap_err(),
            DecodeError::Truncated {
                needed: 5,
                remaining: 2
            }
        ));
    }
}
