use crate::socket_address::WireAddress;
use crate::wire::Reader;
use crate::wire::WireDecode;
use crate::wire::WireEncode;
use crate::wire::Writer;
use crate::DecodeError;
use std::fmt::Debug;
use std::fmt::Formatter;

/// Search request flag asking the server to answer even when it hosts none of the channels.
pub const SEARCH_REPLY_REQUIRED: u8 = 0x01;

/// Search request flag set when the request was sent to a unicast address.
pub const SEARCH_UNICAST: u8 = 0x80;

/// Type descriptor of an absent `serverStatus` field.
const NULL_TYPE: u8 = 0xFF;

/// Random identifier of a server instance, regenerated on every start.
#[derive(PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct Guid(pub [u8; 12]);

impl Debug for Guid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Guid(")?;
        self.0.iter().try_for_each(|b| write!(f, "{:02x}", b))?;
        write!(f, ")")
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct BeaconMessage {
    pub guid: Guid,
    pub flags: u8,
    pub sequence_id: u8,
    pub change_count: u16,
    pub server_address: WireAddress,
    pub server_port: u16,
    pub protocol: String,
}

impl WireEncode for BeaconMessage {
    fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_bytes(&self.guid.0);
        writer.put_u8(self.flags);
        writer.put_u8(self.sequence_id);
        writer.put_u16(self.change_count);
        writer.put_bytes(&self.server_address.0);
        writer.put_u16(self.server_port);
        writer.put_string(&self.protocol);
        writer.put_u8(NULL_TYPE);
    }
}

impl WireDecode for BeaconMessage {
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let message = Self {
            guid: Guid(reader.get_array()?),
            flags: reader.get_u8()?,
            sequence_id: reader.get_u8()?,
            change_count: reader.get_u16()?,
            server_address: WireAddress(reader.get_array()?),
            server_port: reader.get_u16()?,
            protocol: reader.get_string()?,
        };

        // Server status introspection data is not interpreted.
        reader.skip_rest();
        Ok(message)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SearchChannel {
    pub instance_id: u32,
    pub name: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SearchRequest {
    pub sequence_id: u32,
    pub flags: u8,
    pub response_address: WireAddress,
    pub response_port: u16,
    pub protocols: Vec<String>,
    pub channels: Vec<SearchChannel>,
}

impl SearchRequest {
    pub fn reply_required(&self) -> bool {
        self.flags & SEARCH_REPLY_REQUIRED == SEARCH_REPLY_REQUIRED
    }

    pub fn unicast(&self) -> bool {
        self.flags & SEARCH_UNICAST == SEARCH_UNICAST
    }
}

impl WireEncode for SearchRequest {
    fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_u32(self.sequence_id);
        writer.put_u8(self.flags);
        writer.put_bytes(&[0; 3]);
        writer.put_bytes(&self.response_address.0);
        writer.put_u16(self.response_port);
        writer.put_size(self.protocols.len());
        self.protocols.iter().for_each(|p| writer.put_string(p));
        writer.put_u16(self.channels.len() as u16);
        for channel in &self.channels {
            writer.put_u32(channel.instance_id);
            writer.put_string(&channel.name);
        }
    }
}

impl WireDecode for SearchRequest {
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let sequence_id = reader.get_u32()?;
        let flags = reader.get_u8()?;
        reader.skip(3)?;
        let response_address = WireAddress(reader.get_array()?);
        let response_port = reader.get_u16()?;
        let protocols = (0..reader.get_size()?)
            .map(|_| reader.get_string())
            .collect::<Result<_, _>>()?;
        let channels = (0..reader.get_u16()?)
            .map(|_| {
                Ok(SearchChannel {
                    instance_id: reader.get_u32()?,
                    name: reader.get_string()?,
                })
            })
            .collect::<Result<_, DecodeError>>()?;
        Ok(Self {
            sequence_id,
            flags,
            response_address,
            response_port,
            protocols,
            channels,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SearchResponse {
    pub guid: Guid,
    pub sequence_id: u32,
    pub server_address: WireAddress,
    pub server_port: u16,
    pub protocol: String,
    pub found: bool,
    pub instance_ids: Vec<u32>,
}

impl WireEncode for SearchResponse {
    fn encode(&self, writer: &mut Writer<'_>) {
        writer.put_bytes(&self.guid.0);
        writer.put_u32(self.sequence_id);
        writer.put_bytes(&self.server_address.0);
        writer.put_u16(self.server_port);
        writer.put_string(&self.protocol);
        writer.put_u8(self.found.into());
        writer.put_u16(self.instance_ids.len() as u16);
        self.instance_ids.iter().for_each(|id| writer.put_u32(*id));
    }
}

impl WireDecode for SearchResponse {
    fn decode(reader: &mut Reader) -> Result<Self, DecodeError> {
        let guid = Guid(reader.get_array()?);
        let sequence_id = reader.get_u32()?;
        let server_address = WireAddress(reader.get_array()?);
        let server_port = reader.get_u16()?;
        let protocol = reader.get_string()?;
        let found = reader.get_u8()? != 0;
        let instance_ids = (0..reader.get_u16()?)
            .map(|_| reader.get_u32())
            .collect::<Result<_, _>>()?;
        Ok(Self {
            guid,
            sequence_id,
            server_address,
            server_port,
            protocol,
            found,
            instance_ids,
        })
    }
}
