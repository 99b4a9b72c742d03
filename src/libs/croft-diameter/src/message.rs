//! Diameter message header and message codec per RFC 6733 section 3.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::avp::{self, Avp};
use crate::error::{DiameterError, DiameterResult};
use crate::{avp_code, DIAMETER_VERSION};

/// Size of the fixed message header
pub const HEADER_LEN: usize = 20;

/// Command flag bits
pub mod flag {
    pub const REQUEST: u8 = 0x80;
    pub const PROXIABLE: u8 = 0x40;
    pub const ERROR: u8 = 0x20;
}

/// Base protocol command codes used by the client
pub mod base_cmd {
    pub const CAPABILITIES_EXCHANGE: u32 = 257;
    pub const DEVICE_WATCHDOG: u32 = 280;
    pub const DISCONNECT_PEER: u32 = 282;
}

/// Fixed message header
#[derive(Debug, Clone)]
pub struct DiameterHeader {
    pub version: u8,
    pub length: u32,
    pub flags: u8,
    pub command_code: u32,
    pub application_id: u32,
    pub hop_by_hop_id: u32,
    pub end_to_end_id: u32,
}

impl DiameterHeader {
    pub fn is_request(&self) -> bool {
        self.flags & flag::REQUEST != 0
    }

    pub fn is_answer(&self) -> bool {
        !self.is_request()
    }

    fn encode(&self, out: &mut BytesMut) {
        out.put_u8(self.version);
        out.put_u8(((self.length >> 16) & 0xff) as u8);
        out.put_u16((self.length & 0xffff) as u16);
        out.put_u8(self.flags);
        out.put_u8(((self.command_code >> 16) & 0xff) as u8);
        out.put_u16((self.command_code & 0xffff) as u16);
        out.put_u32(self.application_id);
        out.put_u32(self.hop_by_hop_id);
        out.put_u32(self.end_to_end_id);
    }

    fn decode(input: &mut Bytes) -> DiameterResult<Self> {
        if input.remaining() < HEADER_LEN {
            return Err(DiameterError::Truncated {
                needed: HEADER_LEN,
                available: input.remaining(),
            });
        }

        let version = input.get_u8();
        if version != DIAMETER_VERSION {
            return Err(DiameterError::Protocol(format!(
                "unsupported Diameter version {version}"
            )));
        }
        let length = ((input.get_u8() as u32) << 16) | input.get_u16() as u32;
        let flags = input.get_u8();
        let command_code = ((input.get_u8() as u32) << 16) | input.get_u16() as u32;

        Ok(Self {
            version,
            length,
            flags,
            command_code,
            application_id: input.get_u32(),
            hop_by_hop_id: input.get_u32(),
            end_to_end_id: input.get_u32(),
        })
    }
}

/// A complete message: header plus AVP list
#[derive(Debug, Clone)]
pub struct DiameterMessage {
    pub header: DiameterHeader,
    pub avps: Vec<Avp>,
}

impl DiameterMessage {
    /// New request with the request and proxiable flags set
    pub fn request(command_code: u32, application_id: u32) -> Self {
        Self {
            header: DiameterHeader {
                version: DIAMETER_VERSION,
                length: HEADER_LEN as u32,
                flags: flag::REQUEST | flag::PROXIABLE,
                command_code,
                application_id,
                hop_by_hop_id: 0,
                end_to_end_id: 0,
            },
            avps: Vec::new(),
        }
    }

    /// New answer mirroring a request's command, application and identifiers
    pub fn answer_to(request: &DiameterMessage) -> Self {
        Self {
            header: DiameterHeader {
                version: DIAMETER_VERSION,
                length: HEADER_LEN as u32,
                flags: request.header.flags & !flag::REQUEST & !flag::ERROR,
                command_code: request.header.command_code,
                application_id: request.header.application_id,
                hop_by_hop_id: request.header.hop_by_hop_id,
                end_to_end_id: request.header.end_to_end_id,
            },
            avps: Vec::new(),
        }
    }

    /// Append an AVP, builder style
    pub fn with(mut self, avp: Avp) -> Self {
        self.avps.push(avp);
        self
    }

    pub fn push(&mut self, avp: Avp) {
        self.avps.push(avp);
    }

    /// First AVP with the given code
    pub fn find(&self, code: u32) -> Option<&Avp> {
        avp::find(&self.avps, code)
    }

    /// Result-Code AVP value, if present
    pub fn result_code(&self) -> Option<u32> {
        self.find(avp_code::RESULT_CODE)?.unsigned32()
    }

    /// Experimental-Result-Code, dug out of the Experimental-Result group
    pub fn experimental_result_code(&self) -> Option<u32> {
        let group = self.find(avp_code::EXPERIMENTAL_RESULT)?.grouped().ok()?;
        avp::find(&group, avp_code::EXPERIMENTAL_RESULT_CODE)?.unsigned32()
    }

    /// Origin-Host AVP value, if present
    pub fn origin_host(&self) -> Option<&str> {
        self.find(avp_code::ORIGIN_HOST)?.text()
    }

    /// Encode to wire form, fixing up the length field
    pub fn encode(&self) -> BytesMut {
        let avp_len: usize = self.avps.iter().map(Avp::wire_len).sum();
        let total = HEADER_LEN + avp_len;

        let mut out = BytesMut::with_capacity(total);
        let mut header = self.header.clone();
        header.length = total as u32;
        header.encode(&mut out);
        for avp in &self.avps {
            avp.encode(&mut out);
        }
        out
    }

    /// Decode one message from an input buffer
    pub fn decode(input: &mut Bytes) -> DiameterResult<Self> {
        let header = DiameterHeader::decode(input)?;

        let avp_len = (header.length as usize)
            .checked_sub(HEADER_LEN)
            .ok_or_else(|| {
                DiameterError::Malformed("message length below header size".into())
            })?;
        if input.remaining() < avp_len {
            return Err(DiameterError::Truncated {
                needed: avp_len,
                available: input.remaining(),
            });
        }

        let mut avp_input = input.copy_to_bytes(avp_len);
        let mut avps = Vec::new();
        while avp_input.has_remaining() {
            avps.push(Avp::decode(&mut avp_input)?);
        }

        Ok(Self { header, avps })
    }
}
