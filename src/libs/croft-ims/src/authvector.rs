//! Authentication vectors and their JSON wire form.
//!
//! Two shapes exist for digest vectors: the bare `{"digest_HA1": ...}`
//! object served on the digest endpoint, and the nested
//! `{"digest": {"ha1", "realm", "qop"}}` object served on the av endpoint.
//! AKA vectors are always `{"aka": {...}}` with hex-encoded byte fields.
//! Every field is emitted; an empty qop goes out as "auth".

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default qop emitted when the stored value is empty
pub const DEFAULT_QOP: &str = "auth";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field {0} is not valid hex")]
    Hex(&'static str),
}

/// SIP Digest credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestAuthVector {
    pub ha1: String,
    pub realm: String,
    pub qop: String,
}

/// IMS-AKA challenge material
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AkaAuthVector {
    pub challenge: Vec<u8>,
    pub response: Vec<u8>,
    pub crypt_key: Vec<u8>,
    pub integrity_key: Vec<u8>,
}

/// Either kind of vector, as returned by the HSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthVector {
    Digest(DigestAuthVector),
    Aka(AkaAuthVector),
}

#[derive(Serialize, Deserialize)]
struct Ha1Wire {
    #[serde(rename = "digest_HA1")]
    digest_ha1: String,
}

#[derive(Serialize, Deserialize)]
struct DigestWire {
    digest: DigestFields,
}

#[derive(Serialize, Deserialize)]
struct DigestFields {
    ha1: String,
    realm: String,
    qop: String,
}

#[derive(Serialize, Deserialize)]
struct AkaWire {
    aka: AkaFields,
}

#[derive(Serialize, Deserialize)]
struct AkaFields {
    challenge: String,
    response: String,
    cryptkey: String,
    integritykey: String,
}

impl DigestAuthVector {
    /// The qop to put on the wire, never empty
    pub fn wire_qop(&self) -> &str {
        if self.qop.is_empty() {
            DEFAULT_QOP
        } else {
            &self.qop
        }
    }

    /// Bare digest object: `{"digest_HA1": ha1}`
    pub fn emit_ha1(&self) -> String {
        serde_json::to_string(&Ha1Wire {
            digest_ha1: self.ha1.clone(),
        })
        .expect("digest HA1 body serializes")
    }

    /// Full digest object with realm and qop
    pub fn emit(&self) -> String {
        serde_json::to_string(&DigestWire {
            digest: DigestFields {
                ha1: self.ha1.clone(),
                realm: self.realm.clone(),
                qop: self.wire_qop().to_string(),
            },
        })
        .expect("digest body serializes")
    }

    pub fn parse_ha1(body: &str) -> Result<Self, CodecError> {
        let wire: Ha1Wire = serde_json::from_str(body)?;
        Ok(Self {
            ha1: wire.digest_ha1,
            ..Default::default()
        })
    }

    pub fn parse(body: &str) -> Result<Self, CodecError> {
        let wire: DigestWire = serde_json::from_str(body)?;
        Ok(Self {
            ha1: wire.digest.ha1,
            realm: wire.digest.realm,
            qop: wire.digest.qop,
        })
    }
}

impl AkaAuthVector {
    /// AKA object with hex-encoded byte fields
    pub fn emit(&self) -> String {
        serde_json::to_string(&AkaWire {
            aka: AkaFields {
                challenge: hex::encode(&self.challenge),
                response: hex::encode(&self.response),
                cryptkey: hex::encode(&self.crypt_key),
                integritykey: hex::encode(&self.integrity_key),
            },
        })
        .expect("aka body serializes")
    }

    pub fn parse(body: &str) -> Result<Self, CodecError> {
        let wire: AkaWire = serde_json::from_str(body)?;
        Ok(Self {
            challenge: hex::decode(&wire.aka.challenge).map_err(|_| CodecError::Hex("challenge"))?,
            response: hex::decode(&wire.aka.response).map_err(|_| CodecError::Hex("response"))?,
            crypt_key: hex::decode(&wire.aka.cryptkey).map_err(|_| CodecError::Hex("cryptkey"))?,
            integrity_key: hex::decode(&wire.aka.integritykey)
                .map_err(|_| CodecError::Hex("integritykey"))?,
        })
    }
}
