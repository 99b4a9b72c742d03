//! Diameter protocol support for the subscriber data front-end.
//!
//! This crate carries just enough of RFC 6733 to act as a Cx client:
//! - AVP and message encoding/decoding
//! - a framed TCP transport
//! - the Cx application (MAR/MAA, SAR/SAA, UAR/UAA, LIR/LIA)
//! - a client that performs the capabilities exchange and correlates
//!   requests with answers

pub mod avp;
pub mod client;
pub mod cx;
pub mod error;
pub mod message;
pub mod transport;

pub use avp::{Avp, AvpData};
pub use client::{CxClient, LocalIdentity};
pub use error::{DiameterError, DiameterResult};
pub use message::{DiameterHeader, DiameterMessage};
pub use transport::{Transport, TransportReader, TransportWriter};

/// 3GPP Vendor ID used by all Cx-specific AVPs
pub const VENDOR_3GPP: u32 = 10415;

/// Diameter protocol version
pub const DIAMETER_VERSION: u8 = 1;

/// Default Diameter port
pub const DIAMETER_PORT: u16 = 3868;

/// Base protocol result codes this crate cares about
pub mod result_code {
    /// DIAMETER_SUCCESS
    pub const SUCCESS: u32 = 2001;
    /// DIAMETER_UNABLE_TO_DELIVER
    pub const UNABLE_TO_DELIVER: u32 = 3002;
    /// DIAMETER_TOO_BUSY
    pub const TOO_BUSY: u32 = 3004;
    /// DIAMETER_AUTHORIZATION_REJECTED
    pub const AUTHORIZATION_REJECTED: u32 = 5003;
}

/// Base protocol AVP codes
pub mod avp_code {
    pub const USER_NAME: u32 = 1;
    pub const HOST_IP_ADDRESS: u32 = 257;
    pub const AUTH_APPLICATION_ID: u32 = 258;
    pub const VENDOR_SPECIFIC_APPLICATION_ID: u32 = 260;
    pub const SESSION_ID: u32 = 263;
    pub const ORIGIN_HOST: u32 = 264;
    pub const VENDOR_ID: u32 = 266;
    pub const RESULT_CODE: u32 = 268;
    pub const PRODUCT_NAME: u32 = 269;
    pub const DESTINATION_REALM: u32 = 283;
    pub const DESTINATION_HOST: u32 = 293;
    pub const ORIGIN_REALM: u32 = 296;
    pub const EXPERIMENTAL_RESULT: u32 = 297;
    pub const EXPERIMENTAL_RESULT_CODE: u32 = 298;
    pub const AUTH_SESSION_STATE: u32 = 277;
}
