//! Credential-fetch flows keyed by private identity.
//!
//! `/impi/<id>/digest`, `/impi/<id>/av` and `/impi/<id>/aka` fetch an
//! authentication vector, optionally consulting the cache first;
//! `/impi/<id>/registration-status` asks the HSS whether a registration may
//! proceed and which S-CSCF should take it.

use croft_diameter::cx::exp_result;
use croft_diameter::result_code;
use croft_ims::authvector::{AuthVector, DigestAuthVector};
use croft_store::generate_timestamp;

use crate::context::AppContext;
use crate::handlers::{cache_failure, hss_failure, status_body, Reply};
use crate::hss::AuthorizationStatus;

/// Which credential endpoint was hit. The endpoint fixes both the requested
/// scheme and the reply shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialEndpoint {
    /// `/digest`: digest only, bare `digest_HA1` reply
    Digest,
    /// `/av`: any scheme, full reply
    Av,
    /// `/aka`: AKA requested explicitly
    Aka,
}

impl CredentialEndpoint {
    fn requested_scheme<'a>(self, ctx: &'a AppContext) -> &'a str {
        match self {
            CredentialEndpoint::Digest => &ctx.config.schemes.digest,
            CredentialEndpoint::Av => &ctx.config.schemes.unknown,
            CredentialEndpoint::Aka => &ctx.config.schemes.aka,
        }
    }

    fn digest_reply(self, vector: &DigestAuthVector) -> Reply {
        match self {
            CredentialEndpoint::Digest => Reply::json(vector.emit_ha1()),
            CredentialEndpoint::Av | CredentialEndpoint::Aka => Reply::json(vector.emit()),
        }
    }
}

/// GET `/impi/<private_id>/{digest,av,aka}`
pub async fn credentials(
    ctx: &AppContext,
    private_id: &str,
    endpoint: CredentialEndpoint,
    public_id: Option<String>,
    authorization: String,
) -> Reply {
    log::debug!(
        "credential fetch: {private_id}/{}, endpoint {endpoint:?}",
        public_id.as_deref().unwrap_or("-")
    );

    if ctx.config.cache.query_cache_av {
        return match ctx
            .cache
            .get_auth_vector(private_id, public_id.as_deref())
            .await
        {
            Ok(vector) => endpoint.digest_reply(&vector),
            Err(err) => {
                log::debug!("cached vector lookup for {private_id} failed: {err}");
                Reply::empty(502)
            }
        };
    }

    let public_id = match public_id {
        Some(public_id) => public_id,
        None if endpoint == CredentialEndpoint::Aka => {
            // AKA cannot run against a cached public identity; the binding
            // must come from the request.
            log::info!("AKA requested without a public identity - reject");
            return Reply::empty(404);
        }
        None => match ctx.cache.get_associated_public_ids(private_id).await {
            Ok(ids) => match ids.into_iter().next() {
                Some(first) => first,
                None => {
                    log::info!("no cached public identity for {private_id} - reject");
                    return Reply::empty(404);
                }
            },
            Err(err) => {
                log::debug!("public identity lookup for {private_id} failed: {err}");
                return cache_failure(&err);
            }
        },
    };

    let Some(hss) = &ctx.hss else {
        log::warn!("credential fetch without an HSS configured");
        return Reply::empty(503);
    };

    let maa = match hss
        .multimedia_auth(
            private_id,
            &public_id,
            endpoint.requested_scheme(ctx),
            &authorization,
        )
        .await
    {
        Ok(maa) => maa,
        Err(err) => {
            log::info!("Multimedia-Auth failed: {err}");
            return hss_failure(&err);
        }
    };

    match maa.result_code {
        result_code::SUCCESS => {
            let scheme = maa.scheme.as_deref().unwrap_or_default();
            if scheme == ctx.config.schemes.digest {
                let Some(AuthVector::Digest(vector)) = maa.vector else {
                    log::warn!("digest answer without a digest vector");
                    return Reply::empty(500);
                };
                let reply = endpoint.digest_reply(&vector);
                if ctx.config.cache.impu_cache_ttl != 0 {
                    cache_public_id_binding(ctx, private_id, &public_id);
                }
                reply
            } else if scheme == ctx.config.schemes.aka {
                if endpoint == CredentialEndpoint::Digest {
                    // AKA answers have no business on the digest endpoint
                    log::info!("digest requested but AKA received - reject");
                    return Reply::empty(404);
                }
                let Some(AuthVector::Aka(vector)) = maa.vector else {
                    log::warn!("AKA answer without an AKA vector");
                    return Reply::empty(500);
                };
                Reply::json(vector.emit())
            } else {
                log::info!("unusable authentication scheme {scheme:?} - reject");
                Reply::empty(404)
            }
        }
        exp_result::ERROR_USER_UNKNOWN => {
            log::info!("Multimedia-Auth answer 5001 - user unknown");
            Reply::empty(404)
        }
        code => {
            log::info!("Multimedia-Auth answer {code} - reject");
            Reply::empty(500)
        }
    }
}

/// Opportunistically record that the private identity includes the public
/// one. The response is never blocked on this write.
fn cache_public_id_binding(ctx: &AppContext, private_id: &str, public_id: &str) {
    let cache = ctx.cache.clone();
    let ttl = ctx.config.cache.impu_cache_ttl;
    let private_id = private_id.to_string();
    let public_id = public_id.to_string();
    tokio::spawn(async move {
        if let Err(err) = cache
            .put_associated_public_id(&private_id, &public_id, generate_timestamp(), Some(ttl))
            .await
        {
            log::warn!("failed to cache {private_id} -> {public_id}: {err}");
        }
    });
}

/// GET `/impi/<private_id>/registration-status`
pub async fn registration_status(
    ctx: &AppContext,
    private_id: &str,
    public_id: &str,
    visited_network: &str,
    auth_type: &str,
) -> Reply {
    let Some(hss) = &ctx.hss else {
        // Without an HSS there is nothing to authorize against; report
        // success against the configured server.
        let status = AuthorizationStatus {
            result_code: result_code::SUCCESS,
            experimental_result_code: 0,
            server_name: Some(ctx.config.hss.server_name.clone()),
            capabilities: None,
        };
        return Reply::json(status_body(result_code::SUCCESS, &status));
    };

    let visited_network = if visited_network.is_empty() {
        ctx.config.hss.dest_realm.as_str()
    } else {
        visited_network
    };

    let status = match hss
        .user_authorization(
            private_id,
            public_id,
            visited_network,
            authorization_type(auth_type),
        )
        .await
    {
        Ok(status) => status,
        Err(err) => {
            log::info!("User-Authorization failed: {err}");
            return hss_failure(&err);
        }
    };

    let rc = status.result_code;
    let exp = status.experimental_result_code;
    if rc == result_code::SUCCESS
        || exp == exp_result::FIRST_REGISTRATION
        || exp == exp_result::SUBSEQUENT_REGISTRATION
    {
        Reply::json(status_body(if rc != 0 { rc } else { exp }, &status))
    } else if exp == exp_result::ERROR_USER_UNKNOWN
        || exp == exp_result::ERROR_IDENTITIES_DONT_MATCH
    {
        log::info!("user unknown or identities do not match - reject");
        Reply::empty(404)
    } else if rc == result_code::AUTHORIZATION_REJECTED
        || exp == exp_result::ERROR_ROAMING_NOT_ALLOWED
    {
        log::info!("authorization rejected - forbid");
        Reply::empty(403)
    } else if rc == result_code::TOO_BUSY {
        log::info!("HSS busy - reject");
        Reply::empty(504)
    } else if rc == result_code::UNABLE_TO_DELIVER {
        Reply::empty(503)
    } else {
        log::info!("User-Authorization answer {rc}/{exp} - reject");
        Reply::empty(500)
    }
}

/// Map the `auth-type` query value onto User-Authorization-Type
fn authorization_type(auth_type: &str) -> Option<u32> {
    match auth_type {
        "REG" => Some(0),
        "DEREG" => Some(1),
        "CAPAB" => Some(2),
        _ => None,
    }
}
