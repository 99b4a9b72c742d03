//! Cx application (3GPP TS 29.228/29.229): the S-CSCF/I-CSCF side of the
//! HSS interface.
//!
//! Request builders produce complete command messages routed by
//! Destination-Realm/Destination-Host; answer views pull the typed payload
//! back out of a received message.

use bytes::Bytes;

use croft_ims::authvector::{AkaAuthVector, AuthVector, DigestAuthVector};

use crate::avp::{self, Avp, AvpData};
use crate::avp_code;
use crate::message::DiameterMessage;
use crate::VENDOR_3GPP;

/// Cx Application ID
pub const APPLICATION_ID: u32 = 16777216;

/// Cx command codes
pub mod cmd {
    pub const USER_AUTHORIZATION: u32 = 300;
    pub const SERVER_ASSIGNMENT: u32 = 301;
    pub const LOCATION_INFO: u32 = 302;
    pub const MULTIMEDIA_AUTH: u32 = 303;
}

/// Cx AVP codes (all 3GPP vendor-specific)
pub mod cx_avp {
    pub const VISITED_NETWORK_IDENTIFIER: u32 = 600;
    pub const PUBLIC_IDENTITY: u32 = 601;
    pub const SERVER_NAME: u32 = 602;
    pub const SERVER_CAPABILITIES: u32 = 603;
    pub const MANDATORY_CAPABILITY: u32 = 604;
    pub const OPTIONAL_CAPABILITY: u32 = 605;
    pub const USER_DATA: u32 = 606;
    pub const SIP_NUMBER_AUTH_ITEMS: u32 = 607;
    pub const SIP_AUTHENTICATION_SCHEME: u32 = 608;
    pub const SIP_AUTHENTICATE: u32 = 609;
    pub const SIP_AUTHORIZATION: u32 = 610;
    pub const SIP_AUTH_DATA_ITEM: u32 = 612;
    pub const SERVER_ASSIGNMENT_TYPE: u32 = 614;
    pub const USER_AUTHORIZATION_TYPE: u32 = 623;
    pub const USER_DATA_ALREADY_AVAILABLE: u32 = 624;
    pub const ORIGINATING_REQUEST: u32 = 633;
    pub const CONFIDENTIALITY_KEY: u32 = 625;
    pub const INTEGRITY_KEY: u32 = 626;
    pub const SIP_DIGEST_AUTHENTICATE: u32 = 635;
}

/// Digest AVP codes carried inside SIP-Digest-Authenticate (RFC 4590 base
/// dictionary, no vendor bit)
pub mod digest_avp {
    pub const DIGEST_REALM: u32 = 104;
    pub const DIGEST_QOP: u32 = 110;
    pub const DIGEST_HA1: u32 = 121;
}

/// Cx experimental result codes
pub mod exp_result {
    pub const FIRST_REGISTRATION: u32 = 2001;
    pub const SUBSEQUENT_REGISTRATION: u32 = 2002;
    pub const UNREGISTERED_SERVICE: u32 = 2003;
    pub const ERROR_USER_UNKNOWN: u32 = 5001;
    pub const ERROR_IDENTITIES_DONT_MATCH: u32 = 5002;
    pub const ERROR_IDENTITY_NOT_REGISTERED: u32 = 5003;
    pub const ERROR_ROAMING_NOT_ALLOWED: u32 = 5004;
}

/// Server-Assignment-Type values (TS 29.229 section 6.3.15)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ServerAssignmentType {
    NoAssignment = 0,
    Registration = 1,
    ReRegistration = 2,
    UnregisteredUser = 3,
    TimeoutDeregistration = 4,
    UserDeregistration = 5,
    AdministrativeDeregistration = 8,
    AuthenticationFailure = 9,
    AuthenticationTimeout = 10,
}

impl ServerAssignmentType {
    /// Whether this assignment removes the registration binding
    pub fn is_deregistration(self) -> bool {
        matches!(
            self,
            ServerAssignmentType::TimeoutDeregistration
                | ServerAssignmentType::UserDeregistration
                | ServerAssignmentType::AdministrativeDeregistration
        )
    }
}

/// Routing identity placed on every outgoing request
#[derive(Debug, Clone)]
pub struct CxRouting {
    pub origin_host: String,
    pub origin_realm: String,
    pub dest_realm: String,
    pub dest_host: Option<String>,
}

fn common_request(command: u32, session_id: &str, routing: &CxRouting) -> DiameterMessage {
    let mut msg = DiameterMessage::request(command, APPLICATION_ID)
        .with(Avp::base(
            avp_code::SESSION_ID,
            AvpData::Utf8String(session_id.to_string()),
        ))
        .with(Avp::base(
            avp_code::VENDOR_SPECIFIC_APPLICATION_ID,
            AvpData::Grouped(vec![
                Avp::base(avp_code::VENDOR_ID, AvpData::Unsigned32(VENDOR_3GPP)),
                Avp::base(
                    avp_code::AUTH_APPLICATION_ID,
                    AvpData::Unsigned32(APPLICATION_ID),
                ),
            ]),
        ))
        // Auth-Session-State: NO_STATE_MAINTAINED
        .with(Avp::base(
            avp_code::AUTH_SESSION_STATE,
            AvpData::Enumerated(1),
        ))
        .with(Avp::base(
            avp_code::ORIGIN_HOST,
            AvpData::Identity(routing.origin_host.clone()),
        ))
        .with(Avp::base(
            avp_code::ORIGIN_REALM,
            AvpData::Identity(routing.origin_realm.clone()),
        ))
        .with(Avp::base(
            avp_code::DESTINATION_REALM,
            AvpData::Identity(routing.dest_realm.clone()),
        ));
    if let Some(dest_host) = &routing.dest_host {
        msg.push(Avp::base(
            avp_code::DESTINATION_HOST,
            AvpData::Identity(dest_host.clone()),
        ));
    }
    msg
}

fn cx(code: u32, data: AvpData) -> Avp {
    Avp::vendor(code, VENDOR_3GPP, data)
}

/// Build a Multimedia-Auth-Request
pub fn multimedia_auth_request(
    session_id: &str,
    routing: &CxRouting,
    private_id: &str,
    public_id: &str,
    server_name: &str,
    auth_scheme: &str,
    authorization: &str,
) -> DiameterMessage {
    let mut auth_item = vec![cx(
        cx_avp::SIP_AUTHENTICATION_SCHEME,
        AvpData::Utf8String(auth_scheme.to_string()),
    )];
    if !authorization.is_empty() {
        auth_item.push(cx(
            cx_avp::SIP_AUTHORIZATION,
            AvpData::OctetString(Bytes::copy_from_slice(authorization.as_bytes())),
        ));
    }

    common_request(cmd::MULTIMEDIA_AUTH, session_id, routing)
        .with(Avp::base(
            avp_code::USER_NAME,
            AvpData::Utf8String(private_id.to_string()),
        ))
        .with(cx(
            cx_avp::PUBLIC_IDENTITY,
            AvpData::Utf8String(public_id.to_string()),
        ))
        .with(cx(cx_avp::SIP_NUMBER_AUTH_ITEMS, AvpData::Unsigned32(1)))
        .with(cx(cx_avp::SIP_AUTH_DATA_ITEM, AvpData::Grouped(auth_item)))
        .with(cx(
            cx_avp::SERVER_NAME,
            AvpData::Utf8String(server_name.to_string()),
        ))
}

/// Build a Server-Assignment-Request
pub fn server_assignment_request(
    session_id: &str,
    routing: &CxRouting,
    private_id: &str,
    public_id: &str,
    server_name: &str,
    assignment_type: ServerAssignmentType,
) -> DiameterMessage {
    let mut msg = common_request(cmd::SERVER_ASSIGNMENT, session_id, routing);
    // A deregistration after an administrative action may have no private
    // identity to offer; User-Name is omitted in that case.
    if !private_id.is_empty() {
        msg.push(Avp::base(
            avp_code::USER_NAME,
            AvpData::Utf8String(private_id.to_string()),
        ));
    }
    msg.with(cx(
        cx_avp::PUBLIC_IDENTITY,
        AvpData::Utf8String(public_id.to_string()),
    ))
    .with(cx(
        cx_avp::SERVER_NAME,
        AvpData::Utf8String(server_name.to_string()),
    ))
    .with(cx(
        cx_avp::SERVER_ASSIGNMENT_TYPE,
        AvpData::Enumerated(assignment_type as u32 as i32),
    ))
    // User-Data-Already-Available: USER_DATA_NOT_AVAILABLE
    .with(cx(
        cx_avp::USER_DATA_ALREADY_AVAILABLE,
        AvpData::Enumerated(0),
    ))
}

/// Build a User-Authorization-Request
pub fn user_authorization_request(
    session_id: &str,
    routing: &CxRouting,
    private_id: &str,
    public_id: &str,
    visited_network: &str,
    authorization_type: Option<u32>,
) -> DiameterMessage {
    let mut msg = common_request(cmd::USER_AUTHORIZATION, session_id, routing)
        .with(Avp::base(
            avp_code::USER_NAME,
            AvpData::Utf8String(private_id.to_string()),
        ))
        .with(cx(
            cx_avp::PUBLIC_IDENTITY,
            AvpData::Utf8String(public_id.to_string()),
        ))
        .with(cx(
            cx_avp::VISITED_NETWORK_IDENTIFIER,
            AvpData::OctetString(Bytes::copy_from_slice(visited_network.as_bytes())),
        ));
    if let Some(authorization_type) = authorization_type {
        msg.push(cx(
            cx_avp::USER_AUTHORIZATION_TYPE,
            AvpData::Enumerated(authorization_type as i32),
        ));
    }
    msg
}

/// Build a Location-Info-Request
pub fn location_info_request(
    session_id: &str,
    routing: &CxRouting,
    public_id: &str,
    originating: bool,
    authorization_type: Option<u32>,
) -> DiameterMessage {
    let mut msg = common_request(cmd::LOCATION_INFO, session_id, routing).with(cx(
        cx_avp::PUBLIC_IDENTITY,
        AvpData::Utf8String(public_id.to_string()),
    ));
    if originating {
        // ORIGINATING_REQUEST (0): route for an originating session
        msg.push(cx(cx_avp::ORIGINATING_REQUEST, AvpData::Enumerated(0)));
    }
    if let Some(authorization_type) = authorization_type {
        msg.push(cx(
            cx_avp::USER_AUTHORIZATION_TYPE,
            AvpData::Enumerated(authorization_type as i32),
        ));
    }
    msg
}

fn find_cx<'a>(avps: &'a [Avp], code: u32) -> Option<&'a Avp> {
    avps.iter()
        .find(|a| a.code == code && (a.vendor_id.is_none() || a.vendor_id == Some(VENDOR_3GPP)))
}

/// Typed view over a Multimedia-Auth-Answer
#[derive(Debug, Clone)]
pub struct MultimediaAuthAnswer {
    /// Result-Code, falling back to the Experimental-Result-Code
    pub result_code: u32,
    /// SIP-Authentication-Scheme from the auth data item
    pub scheme: Option<String>,
    /// Decoded authentication vector, when one was supplied
    pub vector: Option<AuthVector>,
}

impl MultimediaAuthAnswer {
    pub fn from_message(msg: &DiameterMessage) -> Self {
        let result_code = msg
            .result_code()
            .or_else(|| msg.experimental_result_code())
            .unwrap_or(0);

        let mut scheme = None;
        let mut vector = None;
        if let Some(item) = find_cx(&msg.avps, cx_avp::SIP_AUTH_DATA_ITEM) {
            if let Ok(members) = item.grouped() {
                scheme = find_cx(&members, cx_avp::SIP_AUTHENTICATION_SCHEME)
                    .and_then(|a| a.text())
                    .map(str::to_string);
                vector = decode_vector(&members);
            }
        }

        Self {
            result_code,
            scheme,
            vector,
        }
    }
}

fn decode_vector(members: &[Avp]) -> Option<AuthVector> {
    if let Some(digest) = find_cx(members, cx_avp::SIP_DIGEST_AUTHENTICATE) {
        let fields = digest.grouped().ok()?;
        let ha1 = avp::find(&fields, digest_avp::DIGEST_HA1)?.text()?.to_string();
        let realm = avp::find(&fields, digest_avp::DIGEST_REALM)
            .and_then(|a| a.text())
            .unwrap_or_default()
            .to_string();
        let qop = avp::find(&fields, digest_avp::DIGEST_QOP)
            .and_then(|a| a.text())
            .unwrap_or_default()
            .to_string();
        return Some(AuthVector::Digest(DigestAuthVector { ha1, realm, qop }));
    }

    let challenge = find_cx(members, cx_avp::SIP_AUTHENTICATE)?.octets()?.to_vec();
    let response = find_cx(members, cx_avp::SIP_AUTHORIZATION)
        .and_then(|a| a.octets())
        .map(|b| b.to_vec())
        .unwrap_or_default();
    let crypt_key = find_cx(members, cx_avp::CONFIDENTIALITY_KEY)
        .and_then(|a| a.octets())
        .map(|b| b.to_vec())
        .unwrap_or_default();
    let integrity_key = find_cx(members, cx_avp::INTEGRITY_KEY)
        .and_then(|a| a.octets())
        .map(|b| b.to_vec())
        .unwrap_or_default();
    Some(AuthVector::Aka(AkaAuthVector {
        challenge,
        response,
        crypt_key,
        integrity_key,
    }))
}

/// Typed view over a Server-Assignment-Answer
#[derive(Debug, Clone)]
pub struct ServerAssignmentAnswer {
    pub result_code: u32,
    /// User-Data: the IMS subscription profile document
    pub user_data: Option<String>,
}

impl ServerAssignmentAnswer {
    pub fn from_message(msg: &DiameterMessage) -> Self {
        Self {
            result_code: msg
                .result_code()
                .or_else(|| msg.experimental_result_code())
                .unwrap_or(0),
            user_data: find_cx(&msg.avps, cx_avp::USER_DATA)
                .and_then(|a| a.text())
                .map(str::to_string),
        }
    }
}

/// S-CSCF capabilities from a UAA/LIA
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerCapabilities {
    pub mandatory: Vec<u32>,
    pub optional: Vec<u32>,
    pub server_names: Vec<String>,
}

/// Typed view over a User-Authorization-Answer or Location-Info-Answer.
/// The two commands carry the same server-name-or-capabilities payload.
#[derive(Debug, Clone)]
pub struct AuthorizationAnswer {
    pub result_code: u32,
    pub experimental_result_code: u32,
    pub server_name: Option<String>,
    pub capabilities: Option<ServerCapabilities>,
}

impl AuthorizationAnswer {
    pub fn from_message(msg: &DiameterMessage) -> Self {
        let server_name = find_cx(&msg.avps, cx_avp::SERVER_NAME)
            .and_then(|a| a.text())
            .map(str::to_string);

        let capabilities = find_cx(&msg.avps, cx_avp::SERVER_CAPABILITIES)
            .and_then(|a| a.grouped().ok())
            .map(|members| {
                let mut caps = ServerCapabilities::default();
                for member in &members {
                    match member.code {
                        cx_avp::MANDATORY_CAPABILITY => {
                            if let Some(v) = member.unsigned32() {
                                caps.mandatory.push(v);
                            }
                        }
                        cx_avp::OPTIONAL_CAPABILITY => {
                            if let Some(v) = member.unsigned32() {
                                caps.optional.push(v);
                            }
                        }
                        cx_avp::SERVER_NAME => {
                            if let Some(s) = member.text() {
                                caps.server_names.push(s.to_string());
                            }
                        }
                        _ => {}
                    }
                }
                caps
            });

        Self {
            result_code: msg.result_code().unwrap_or(0),
            experimental_result_code: msg.experimental_result_code().unwrap_or(0),
            server_name,
            capabilities,
        }
    }
}
