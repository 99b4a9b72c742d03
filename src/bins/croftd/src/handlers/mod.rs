//! Request orchestration.
//!
//! Each HTTP request runs as one task through the flows in [`impi`] and
//! [`impu`]; the shared request-type taxonomy, reply type and error mapping
//! live here. Every flow ends in exactly one [`Reply`].

pub mod impi;
pub mod impu;

use croft_diameter::cx::ServerAssignmentType;
use croft_ims::subscription;
use croft_store::StoreError;

use crate::hss::{AuthorizationStatus, HssError};

/// Terminal outcome of a request, handed back to the ingress adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub content_type: &'static str,
}

impl Reply {
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            content_type: "text/plain",
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: "text/plain",
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: "application/json",
        }
    }

    pub fn xml(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: "application/xml",
        }
    }
}

/// What the call controller asked us to do with a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    /// SIP REGISTER
    Reg,
    /// Initial non-REGISTER request (INVITE, MESSAGE, ...)
    Call,
    /// REGISTER with Expires: 0
    DeregUser,
    /// Administrative removal
    DeregAdmin,
    /// All bindings expired
    DeregTimeout,
    /// Authentication failed
    DeregAuthFail,
    /// Authentication timed out
    DeregAuthTimeout,
}

impl RequestType {
    /// Parse the PUT body `{"reqtype": T}`. Anything else is invalid input.
    pub fn from_body(body: &str) -> Option<Self> {
        let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
        match parsed.get("reqtype")?.as_str()? {
            "reg" => Some(RequestType::Reg),
            "call" => Some(RequestType::Call),
            "dereg-user" => Some(RequestType::DeregUser),
            "dereg-admin" => Some(RequestType::DeregAdmin),
            "dereg-timeout" => Some(RequestType::DeregTimeout),
            "dereg-auth-failed" => Some(RequestType::DeregAuthFail),
            "dereg-auth-timeout" => Some(RequestType::DeregAuthTimeout),
            _ => None,
        }
    }

    /// Requests that remove the registration binding
    pub fn is_deregistration(self) -> bool {
        matches!(
            self,
            RequestType::DeregUser | RequestType::DeregAdmin | RequestType::DeregTimeout
        )
    }

    /// Requests that report a failed or timed-out authentication
    pub fn is_auth_failure(self) -> bool {
        matches!(
            self,
            RequestType::DeregAuthFail | RequestType::DeregAuthTimeout
        )
    }

    /// The fixed Server-Assignment-Type for the request types that map to
    /// one directly. REG and CALL pick theirs from the cached state.
    pub fn assignment_type(self) -> Option<ServerAssignmentType> {
        match self {
            RequestType::DeregUser => Some(ServerAssignmentType::UserDeregistration),
            RequestType::DeregAdmin => Some(ServerAssignmentType::AdministrativeDeregistration),
            RequestType::DeregTimeout => Some(ServerAssignmentType::TimeoutDeregistration),
            RequestType::DeregAuthFail => Some(ServerAssignmentType::AuthenticationFailure),
            RequestType::DeregAuthTimeout => Some(ServerAssignmentType::AuthenticationTimeout),
            RequestType::Reg | RequestType::Call => None,
        }
    }
}

/// The private identities to record against a registration set: the one on
/// the request, then the one embedded in the profile, deduplicated with
/// empties elided.
pub fn associated_private_ids(private_id: &str, profile: &str) -> Vec<String> {
    let mut ids = Vec::new();
    if !private_id.is_empty() {
        ids.push(private_id.to_string());
    }
    if let Some(hint) = subscription::private_id_hint(profile) {
        if !ids.contains(&hint) {
            ids.push(hint);
        }
    }
    ids
}

/// Cache failure to HTTP status
pub fn cache_failure(err: &StoreError) -> Reply {
    match err {
        StoreError::NotFound => Reply::empty(404),
        StoreError::Backend(_) => Reply::empty(502),
        StoreError::Unavailable(_) | StoreError::Timeout => Reply::empty(503),
    }
}

/// HSS transport failure to HTTP status. Both a missed deadline and an
/// unreachable peer tell the controller to retry elsewhere.
pub fn hss_failure(err: &HssError) -> Reply {
    match err {
        HssError::Timeout | HssError::Unavailable(_) => Reply::empty(503),
    }
}

/// JSON body for the registration-status and location flows: the result
/// code plus either the assigned server name or the server capabilities.
pub fn status_body(result_code: u32, status: &AuthorizationStatus) -> String {
    let mut body = serde_json::Map::new();
    body.insert("result-code".to_string(), result_code.into());

    if let Some(server_name) = &status.server_name {
        body.insert("scscf".to_string(), server_name.clone().into());
    } else {
        let caps = status.capabilities.clone().unwrap_or_default();
        if let Some(name) = caps.server_names.first() {
            body.insert("scscf".to_string(), name.clone().into());
        }
        body.insert(
            "mandatory-capabilities".to_string(),
            caps.mandatory.into(),
        );
        body.insert("optional-capabilities".to_string(), caps.optional.into());
    }
    serde_json::Value::Object(body).to_string()
}


#[cfg(test)]
mod tests {
    use super::*;
    use croft_diameter::cx::ServerCapabilities;

    #[test]
    fn request_types_parse_from_body() {
        assert_eq!(
            RequestType::from_body(r#"{"reqtype": "reg"}"#),
            Some(RequestType::Reg)
        );
        assert_eq!(
            RequestType::from_body(r#"{"reqtype": "dereg-auth-timeout"}"#),
            Some(RequestType::DeregAuthTimeout)
        );
        assert_eq!(RequestType::from_body(r#"{"reqtype": "bogus"}"#), None);
        assert_eq!(RequestType::from_body(r#"{"other": "reg"}"#), None);
        assert_eq!(RequestType::from_body("not json"), None);
        assert_eq!(RequestType::from_body(r#"{"reqtype": 3}"#), None);
    }

    #[test]
    fn taxonomy_partitions() {
        assert!(RequestType::DeregAdmin.is_deregistration());
        assert!(!RequestType::DeregAdmin.is_auth_failure());
        assert!(RequestType::DeregAuthFail.is_auth_failure());
        assert!(!RequestType::DeregAuthFail.is_deregistration());
        assert!(!RequestType::Reg.is_deregistration());
        assert!(!RequestType::Call.is_auth_failure());
    }

    #[test]
    fn assignment_type_mapping_is_fixed() {
        assert_eq!(
            RequestType::DeregUser.assignment_type(),
            Some(ServerAssignmentType::UserDeregistration)
        );
        assert_eq!(
            RequestType::DeregAdmin.assignment_type(),
            Some(ServerAssignmentType::AdministrativeDeregistration)
        );
        assert_eq!(
            RequestType::DeregTimeout.assignment_type(),
            Some(ServerAssignmentType::TimeoutDeregistration)
        );
        assert_eq!(
            RequestType::DeregAuthFail.assignment_type(),
            Some(ServerAssignmentType::AuthenticationFailure)
        );
        assert_eq!(
            RequestType::DeregAuthTimeout.assignment_type(),
            Some(ServerAssignmentType::AuthenticationTimeout)
        );
        assert_eq!(RequestType::Reg.assignment_type(), None);
        assert_eq!(RequestType::Call.assignment_type(), None);
    }

    #[test]
    fn associated_private_ids_dedup_and_order() {
        let profile =
            "<IMSSubscription><PrivateID>alice@x</PrivateID></IMSSubscription>";
        assert_eq!(
            associated_private_ids("bob@x", profile),
            vec!["bob@x".to_string(), "alice@x".to_string()]
        );
        assert_eq!(
            associated_private_ids("alice@x", profile),
            vec!["alice@x".to_string()]
        );
        assert_eq!(
            associated_private_ids("", profile),
            vec!["alice@x".to_string()]
        );
        assert!(associated_private_ids("", "").is_empty());
    }

    #[test]
    fn status_body_prefers_server_name() {
        let status = AuthorizationStatus {
            result_code: 2001,
            experimental_result_code: 0,
            server_name: Some("sip:scscf.example.com".to_string()),
            capabilities: None,
        };
        let body: serde_json::Value =
            serde_json::from_str(&status_body(2001, &status)).unwrap();
        assert_eq!(body["result-code"], 2001);
        assert_eq!(body["scscf"], "sip:scscf.example.com");
        assert!(body.get("mandatory-capabilities").is_none());
    }

    #[test]
    fn status_body_falls_back_to_capabilities() {
        let status = AuthorizationStatus {
            result_code: 0,
            experimental_result_code: 2001,
            server_name: None,
            capabilities: Some(ServerCapabilities {
                mandatory: vec![1, 2],
                optional: vec![3],
                server_names: vec!["sip:other.example.com".to_string()],
            }),
        };
        let body: serde_json::Value =
            serde_json::from_str(&status_body(2001, &status)).unwrap();
        assert_eq!(body["scscf"], "sip:other.example.com");
        assert_eq!(body["mandatory-capabilities"], serde_json::json!([1, 2]));
        assert_eq!(body["optional-capabilities"], serde_json::json!([3]));
    }
}
