//! The IMS subscription profile document (3GPP TS 29.228 appendix) and the
//! wrapped registration-data document served to the call controller.
//!
//! The profile is stored and forwarded verbatim; only three things are ever
//! pulled out of it: the ordered public-identity list, the embedded private
//! identity, and the `IMSSubscription` subtree for re-wrapping. The scanner
//! is deliberately tolerant: anything unparseable reads as an empty profile.

/// IMS subscription XML element tags
pub mod xml {
    pub const IMS_SUBSCRIPTION_S: &str = "<IMSSubscription>";
    pub const IMS_SUBSCRIPTION_E: &str = "</IMSSubscription>";
    pub const SERVICE_PROFILE_S: &str = "<ServiceProfile>";
    pub const SERVICE_PROFILE_E: &str = "</ServiceProfile>";
    pub const PUBLIC_ID_S: &str = "<PublicIdentity>";
    pub const PUBLIC_ID_E: &str = "</PublicIdentity>";
    pub const PRIVATE_ID_S: &str = "<PrivateID>";
    pub const PRIVATE_ID_E: &str = "</PrivateID>";
    pub const IDENTITY_S: &str = "<Identity>";
    pub const IDENTITY_E: &str = "</Identity>";
    pub const REG_DATA_S: &str = "<RegistrationData>";
    pub const REG_DATA_E: &str = "</RegistrationData>";
    pub const REG_STATE_S: &str = "<RegistrationState>";
    pub const REG_STATE_E: &str = "</RegistrationState>";
}

/// Registration state of a public identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// No record of the subscriber
    NotRegistered,
    /// Known and provisioned, but no active registration
    Unregistered,
    /// Actively registered
    Registered,
}

impl RegistrationState {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationState::NotRegistered => "NOT_REGISTERED",
            RegistrationState::Unregistered => "UNREGISTERED",
            RegistrationState::Registered => "REGISTERED",
        }
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Yield the text spans between `open` and `close` within `doc`, in order
fn sections<'a>(doc: &'a str, open: &str, close: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut rest = doc;
    while let Some(start) = rest.find(open) {
        let body = &rest[start + open.len()..];
        let Some(end) = body.find(close) else {
            break;
        };
        found.push(&body[..end]);
        rest = &body[end + close.len()..];
    }
    found
}

fn first_section<'a>(doc: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = doc.find(open)?;
    let body = &doc[start + open.len()..];
    let end = body.find(close)?;
    Some(&body[..end])
}

/// Public identities of the profile, in order of first appearance with
/// duplicates preserved: every `Identity` under every `PublicIdentity` under
/// every `ServiceProfile`.
pub fn public_ids(doc: &str) -> Vec<String> {
    let Some(subscription) = first_section(doc, xml::IMS_SUBSCRIPTION_S, xml::IMS_SUBSCRIPTION_E)
    else {
        return Vec::new();
    };

    let mut ids = Vec::new();
    for profile in sections(subscription, xml::SERVICE_PROFILE_S, xml::SERVICE_PROFILE_E) {
        for public in sections(profile, xml::PUBLIC_ID_S, xml::PUBLIC_ID_E) {
            for id in sections(public, xml::IDENTITY_S, xml::IDENTITY_E) {
                ids.push(id.trim().to_string());
            }
        }
    }
    ids
}

/// The private identity embedded in the profile, if any
pub fn private_id_hint(doc: &str) -> Option<String> {
    let subscription = first_section(doc, xml::IMS_SUBSCRIPTION_S, xml::IMS_SUBSCRIPTION_E)?;
    first_section(subscription, xml::PRIVATE_ID_S, xml::PRIVATE_ID_E)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Package the registration state together with the profile document.
/// An unparseable or empty profile wraps to a state-only document.
pub fn wrap(state: RegistrationState, doc: &str) -> String {
    let mut out = String::with_capacity(doc.len() + 96);
    out.push_str(xml::REG_DATA_S);
    out.push_str(xml::REG_STATE_S);
    out.push_str(state.as_str());
    out.push_str(xml::REG_STATE_E);
    if let Some(subscription) =
        first_section(doc, xml::IMS_SUBSCRIPTION_S, xml::IMS_SUBSCRIPTION_E)
    {
        out.push_str(xml::IMS_SUBSCRIPTION_S);
        out.push_str(subscription);
        out.push_str(xml::IMS_SUBSCRIPTION_E);
    }
    out.push_str(xml::REG_DATA_E);
    out
}
