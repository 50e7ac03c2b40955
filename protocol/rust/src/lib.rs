//! pvAccess discovery wire protocol.
//!
//! Every datagram carries one or more frames. A frame is an 8-byte header
//! followed by a payload whose integers use the byte order announced in the
//! header flags.

mod message;
mod socket_address;
mod wire;

pub use message::BeaconMessage;
pub use message::Guid;
pub use message::SearchChannel;
pub use message::SearchRequest;
pub use message::SearchResponse;
pub use message::SEARCH_REPLY_REQUIRED;
pub use message::SEARCH_UNICAST;
pub use socket_address::WireAddress;
pub use wire::ByteOrder;
pub use wire::Reader;
pub use wire::WireDecode;
pub use wire::WireEncode;
pub use wire::Writer;

use bytes::Buf;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;

pub const MAGIC: u8 = 0xCA;

/// Protocol version spoken by all discovery traffic.
pub const PROTOCOL_VERSION: u8 = 2;

pub const HEADER_SIZE: usize = 8;

/// Largest payload that fits in a UDP datagram.
pub const MAX_PAYLOAD_SIZE: usize = 65_507;

pub const FLAG_CONTROL: u8 = 0x01;
pub const FLAG_FROM_SERVER: u8 = 0x40;
pub const FLAG_BIG_ENDIAN: u8 = 0x80;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Command {
    Beacon,
    SearchRequest,
    SearchResponse,
    Other(u8),
}

impl From<u8> for Command {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Beacon,
            0x03 => Self::SearchRequest,
            0x04 => Self::SearchResponse,
            other => Self::Other(other),
        }
    }
}

impl From<Command> for u8 {
    fn from(value: Command) -> Self {
        match value {
            Command::Beacon => 0x00,
            Command::SearchRequest => 0x03,
            Command::SearchResponse => 0x04,
            Command::Other(other) => other,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Header {
    pub version: u8,
    pub flags: u8,
    pub command: Command,
    pub payload_size: u32,
}

impl Header {
    pub fn byte_order(&self) -> ByteOrder {
        if self.flags & FLAG_BIG_ENDIAN == FLAG_BIG_ENDIAN {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn is_control(&self) -> bool {
        self.flags & FLAG_CONTROL == FLAG_CONTROL
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Frame {
    pub header: Header,
    pub payload: Bytes,
}

impl Frame {
    /// Builds an application frame in little-endian byte order.
    pub fn application(command: Command, flags: u8, message: &impl WireEncode) -> Self {
        let flags = flags & !(FLAG_CONTROL | FLAG_BIG_ENDIAN);
        let mut payload = BytesMut::new();
        message.encode(&mut Writer::new(&mut payload, ByteOrder::Little));
        Self {
            header: Header {
                version: PROTOCOL_VERSION,
                flags,
                command,
                payload_size: payload.len() as u32,
            },
            payload: payload.freeze(),
        }
    }

    pub fn decode_payload<T: WireDecode>(&self) -> Result<T, DecodeError> {
        T::decode(&mut Reader::new(
            self.payload.clone(),
            self.header.byte_order(),
        ))
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        put_header(&self.header, &mut buffer);
        buffer.put_slice(&self.payload);
        buffer.freeze()
    }
}

/// Encodes a complete application message ready to be sent as a datagram.
pub fn encode_application_message(
    command: Command,
    flags: u8,
    message: &impl WireEncode,
) -> Bytes {
    Frame::application(command, flags, message).to_bytes()
}

fn put_header(header: &Header, buffer: &mut BytesMut) {
    buffer.put_u8(MAGIC);
    buffer.put_u8(header.version);
    buffer.put_u8(header.flags);
    buffer.put_u8(header.command.into());
    match header.byte_order() {
        ByteOrder::Little => buffer.put_u32_le(header.payload_size),
        ByteOrder::Big => buffer.put_u32(header.payload_size),
    }
}

#[derive(Default)]
pub struct PvaCodec;

impl Decoder for PvaCodec {
    type Item = Frame;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        if src[0] != MAGIC {
            return Err(DecodeError::Magic(src[0]));
        }

        let flags = src[2];
        let size_bytes = [src[4], src[5], src[6], src[7]];
        let payload_size = if flags & FLAG_BIG_ENDIAN == FLAG_BIG_ENDIAN {
            u32::from_be_bytes(size_bytes)
        } else {
            u32::from_le_bytes(size_bytes)
        };
        if payload_size as usize > MAX_PAYLOAD_SIZE {
            return Err(DecodeError::Oversized(payload_size));
        }
        if src.len() < HEADER_SIZE + payload_size as usize {
            return Ok(None);
        }

        let header = Header {
            version: src[1],
            flags,
            command: src[3].into(),
            payload_size,
        };
        src.advance(HEADER_SIZE);
        let payload = src.split_to(payload_size as usize).freeze();
        Ok(Some(Frame { header, payload }))
    }
}

impl Encoder<Frame> for PvaCodec {
    type Error = DecodeError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(HEADER_SIZE + item.payload.len());
        put_header(&item.header, dst);
        dst.put_slice(&item.payload);
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Error from network I/O")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic byte 0x{0:02X}")]
    Magic(u8),

    #[error("Payload of {0} bytes does not fit in a datagram")]
    Oversized(u32),

    #[error("Needed {needed} more bytes but only {remaining} remain")]
    Truncated { needed: usize, remaining: usize },

    #[error("String is not valid UTF-8")]
    InvalidString,
}
