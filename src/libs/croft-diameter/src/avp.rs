//! AVP (Attribute-Value Pair) encoding and decoding per RFC 6733 section 4.
//!
//! Only the data types used by the base protocol and the Cx application are
//! modelled. Grouped AVPs arrive as raw octets and are decoded on demand via
//! [`Avp::grouped`], so a single malformed group does not poison the whole
//! message.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DiameterError, DiameterResult};

/// Vendor-Specific flag bit
pub const FLAG_VENDOR: u8 = 0x80;
/// Mandatory flag bit
pub const FLAG_MANDATORY: u8 = 0x40;

const HEADER_LEN: usize = 8;
const HEADER_LEN_VENDOR: usize = 12;

/// A single attribute-value pair
#[derive(Debug, Clone)]
pub struct Avp {
    pub code: u32,
    pub flags: u8,
    pub vendor_id: Option<u32>,
    pub data: AvpData,
}

/// AVP payload
#[derive(Debug, Clone)]
pub enum AvpData {
    OctetString(Bytes),
    Unsigned32(u32),
    Enumerated(i32),
    Utf8String(String),
    /// DiameterIdentity (an FQDN)
    Identity(String),
    Grouped(Vec<Avp>),
    /// Undecoded payload of an AVP read off the wire
    Raw(Bytes),
}

impl Avp {
    /// Build a mandatory AVP from the base dictionary
    pub fn base(code: u32, data: AvpData) -> Self {
        Self {
            code,
            flags: FLAG_MANDATORY,
            vendor_id: None,
            data,
        }
    }

    /// Build a mandatory vendor-specific AVP
    pub fn vendor(code: u32, vendor_id: u32, data: AvpData) -> Self {
        Self {
            code,
            flags: FLAG_VENDOR | FLAG_MANDATORY,
            vendor_id: Some(vendor_id),
            data,
        }
    }

    fn header_len(&self) -> usize {
        if self.flags & FLAG_VENDOR != 0 {
            HEADER_LEN_VENDOR
        } else {
            HEADER_LEN
        }
    }

    /// Length on the wire, padding included
    pub fn wire_len(&self) -> usize {
        let unpadded = self.header_len() + self.data.payload_len();
        (unpadded + 3) & !3
    }

    /// Append this AVP to an output buffer
    pub fn encode(&self, out: &mut BytesMut) {
        let payload_len = self.data.payload_len();
        let avp_len = self.header_len() + payload_len;

        out.put_u32(self.code);
        out.put_u8(self.flags);
        out.put_u8(((avp_len >> 16) & 0xff) as u8);
        out.put_u16((avp_len & 0xffff) as u16);
        if let Some(vendor_id) = self.vendor_id {
            out.put_u32(vendor_id);
        }
        self.data.encode(out);
        for _ in 0..(4 - payload_len % 4) % 4 {
            out.put_u8(0);
        }
    }

    /// Read one AVP off an input buffer. The payload is kept raw.
    pub fn decode(input: &mut Bytes) -> DiameterResult<Self> {
        if input.remaining() < HEADER_LEN {
            return Err(DiameterError::Truncated {
                needed: HEADER_LEN,
                available: input.remaining(),
            });
        }

        let code = input.get_u32();
        let flags = input.get_u8();
        let avp_len =
            ((input.get_u8() as usize) << 16) | input.get_u16() as usize;

        let vendor_id = if flags & FLAG_VENDOR != 0 {
            if input.remaining() < 4 {
                return Err(DiameterError::Truncated {
                    needed: 4,
                    available: input.remaining(),
                });
            }
            Some(input.get_u32())
        } else {
            None
        };

        let header_len = if vendor_id.is_some() {
            HEADER_LEN_VENDOR
        } else {
            HEADER_LEN
        };
        if avp_len < header_len {
            return Err(DiameterError::Malformed(format!(
                "AVP {code} length {avp_len} shorter than its header"
            )));
        }

        let payload_len = avp_len - header_len;
        if input.remaining() < payload_len {
            return Err(DiameterError::Truncated {
                needed: payload_len,
                available: input.remaining(),
            });
        }
        let payload = input.copy_to_bytes(payload_len);

        let padding = (4 - payload_len % 4) % 4;
        if input.remaining() >= padding {
            input.advance(padding);
        }

        Ok(Self {
            code,
            flags,
            vendor_id,
            data: AvpData::Raw(payload),
        })
    }

    /// Payload as text
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            AvpData::Utf8String(s) | AvpData::Identity(s) => Some(s),
            AvpData::Raw(b) | AvpData::OctetString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Payload as raw octets
    pub fn octets(&self) -> Option<&Bytes> {
        match &self.data {
            AvpData::OctetString(b) | AvpData::Raw(b) => Some(b),
            _ => None,
        }
    }

    /// Payload as a 32-bit unsigned value
    pub fn unsigned32(&self) -> Option<u32> {
        match &self.data {
            AvpData::Unsigned32(v) => Some(*v),
            AvpData::Enumerated(v) => Some(*v as u32),
            AvpData::Raw(b) if b.len() >= 4 => {
                let mut b = b.clone();
                Some(b.get_u32())
            }
            _ => None,
        }
    }

    /// Decode the payload as a sequence of member AVPs
    pub fn grouped(&self) -> DiameterResult<Vec<Avp>> {
        match &self.data {
            AvpData::Grouped(members) => Ok(members.clone()),
            AvpData::Raw(b) | AvpData::OctetString(b) => {
                let mut input = b.clone();
                let mut members = Vec::new();
                while input.has_remaining() {
                    members.push(Avp::decode(&mut input)?);
                }
                Ok(members)
            }
            _ => Err(DiameterError::Malformed(format!(
                "AVP {} is not a grouped AVP",
                self.code
            ))),
        }
    }
}

impl AvpData {
    fn payload_len(&self) -> usize {
        match self {
            AvpData::OctetString(b) | AvpData::Raw(b) => b.len(),
            AvpData::Unsigned32(_) | AvpData::Enumerated(_) => 4,
            AvpData::Utf8String(s) | AvpData::Identity(s) => s.len(),
            AvpData::Grouped(members) => members.iter().map(Avp::wire_len).sum(),
        }
    }

    fn encode(&self, out: &mut BytesMut) {
        match self {
            AvpData::OctetString(b) | AvpData::Raw(b) => out.put_slice(b),
            AvpData::Unsigned32(v) => out.put_u32(*v),
            AvpData::Enumerated(v) => out.put_i32(*v),
            AvpData::Utf8String(s) | AvpData::Identity(s) => out.put_slice(s.as_bytes()),
            AvpData::Grouped(members) => {
                for member in members {
                    member.encode(out);
                }
            }
        }
    }
}

/// Find the first AVP with the given code
pub fn find<'a>(avps: &'a [Avp], code: u32) -> Option<&'a Avp> {
    avps.iter().find(|a| a.code == code)
}
