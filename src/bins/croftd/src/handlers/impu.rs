//! Registration-data flows keyed by public identity.
//!
//! `/impu/<pub>/reg-data` is the registration state machine: the cache is
//! always read first, then the request type, the cached state and the HSS
//! configuration decide whether a Server-Assignment is issued and what gets
//! cached or deleted afterwards. `/impu/<pub>` is the deprecated variant of
//! the same flow that replies with the raw profile; `/impu/<pub>/location`
//! asks which S-CSCF serves the identity.

use croft_diameter::cx::{exp_result, ServerAssignmentType};
use croft_diameter::result_code;
use croft_ims::subscription::{self, RegistrationState};
use croft_store::{generate_timestamp, StoreError, SubscriptionRecord};

use crate::context::AppContext;
use crate::handlers::{
    associated_private_ids, cache_failure, hss_failure, status_body, Reply, RequestType,
};
use crate::hss::{AuthorizationStatus, HssGateway};

/// Reply shape: the current endpoint wraps the profile with the
/// registration state, the deprecated one returns it bare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileShape {
    Wrapped,
    Raw,
}

/// GET or PUT `/impu/<public_id>/reg-data`. `request` is `None` for a GET.
pub async fn reg_data(
    ctx: &AppContext,
    public_id: &str,
    private_id: &str,
    request: Option<RequestType>,
) -> Reply {
    run(ctx, public_id, private_id, request, ProfileShape::Wrapped).await
}

/// GET `/impu/<public_id>` (deprecated). Reads as a registration when a
/// private identity is supplied, as a call otherwise, and serves the raw
/// profile.
pub async fn subscription_profile(ctx: &AppContext, public_id: &str, private_id: &str) -> Reply {
    let request = if private_id.is_empty() {
        RequestType::Call
    } else {
        RequestType::Reg
    };
    run(ctx, public_id, private_id, Some(request), ProfileShape::Raw).await
}

async fn run(
    ctx: &AppContext,
    public_id: &str,
    private_id: &str,
    request: Option<RequestType>,
    shape: ProfileShape,
) -> Reply {
    // The cache is read unconditionally: even a deregistration needs the
    // existing binding and the profile to answer with.
    let record = match ctx.cache.get_subscription(public_id).await {
        Ok(record) => record,
        Err(StoreError::NotFound) => SubscriptionRecord {
            profile: String::new(),
            state: RegistrationState::NotRegistered,
            associated_private_ids: Vec::new(),
            ttl: 0,
        },
        Err(err) => {
            log::debug!("subscription lookup for {public_id} failed: {err}");
            return cache_failure(&err);
        }
    };
    log::debug!(
        "cached record for {public_id}: state {}, ttl {}s, profile {}",
        record.state,
        record.ttl,
        if record.profile.is_empty() {
            "empty"
        } else {
            "present"
        }
    );

    let old_state = record.state;
    let mut flow = RegDataFlow {
        ctx,
        public_id,
        private_id: private_id.to_string(),
        profile: record.profile,
        new_state: old_state,
        shape,
    };

    // A GET never changes state; answer with what the cache holds.
    let Some(request) = request else {
        return flow.reply();
    };

    // Without a private identity on the request the profile may hold one;
    // with one, check whether this binding is already on record.
    let mut new_binding = false;
    if flow.private_id.is_empty() {
        flow.private_id = subscription::private_id_hint(&flow.profile).unwrap_or_default();
    } else if !flow.profile.is_empty()
        && !record.associated_private_ids.contains(&flow.private_id)
    {
        log::debug!("{} registering with a new binding", flow.private_id);
        new_binding = true;
    }

    match &ctx.hss {
        Some(hss) => {
            flow.run_with_hss(hss.as_ref(), request, old_state, record.ttl, new_binding)
                .await
        }
        None => flow.run_local(request, old_state).await,
    }
}

/// One in-flight reg-data request. Owned by the request task and consumed
/// by exactly one terminal reply.
struct RegDataFlow<'a> {
    ctx: &'a AppContext,
    public_id: &'a str,
    private_id: String,
    profile: String,
    new_state: RegistrationState,
    shape: ProfileShape,
}

impl RegDataFlow<'_> {
    fn reply(&self) -> Reply {
        match self.shape {
            ProfileShape::Wrapped => {
                Reply::xml(subscription::wrap(self.new_state, &self.profile))
            }
            ProfileShape::Raw => {
                if self.profile.is_empty() {
                    Reply::empty(404)
                } else {
                    Reply::xml(self.profile.clone())
                }
            }
        }
    }

    async fn run_with_hss(
        &mut self,
        hss: &dyn HssGateway,
        request: RequestType,
        old_state: RegistrationState,
        ttl: u32,
        new_binding: bool,
    ) -> Reply {
        if new_binding {
            self.record_new_binding();
        }

        match request {
            RequestType::Reg => {
                self.new_state = RegistrationState::Registered;
                if old_state == RegistrationState::Registered && !new_binding {
                    if ttl < self.ctx.config.hss.reregistration_time {
                        log::debug!("re-registration: record past its half-life, refreshing");
                        self.server_assignment(hss, ServerAssignmentType::ReRegistration)
                            .await
                    } else {
                        self.reply()
                    }
                } else {
                    log::debug!("initial registration");
                    self.server_assignment(hss, ServerAssignmentType::Registration)
                        .await
                }
            }
            RequestType::Call => {
                if old_state == RegistrationState::NotRegistered {
                    // Unknown subscriber: ask the HSS to assign us for
                    // unregistered service.
                    self.new_state = RegistrationState::Unregistered;
                    self.server_assignment(hss, ServerAssignmentType::UnregisteredUser)
                        .await
                } else {
                    self.reply()
                }
            }
            RequestType::DeregUser
            | RequestType::DeregAdmin
            | RequestType::DeregTimeout
            | RequestType::DeregAuthFail
            | RequestType::DeregAuthTimeout => {
                let Some(assignment_type) = request.assignment_type() else {
                    log::error!("no assignment type for {request:?}");
                    return Reply::empty(500);
                };
                if request.is_deregistration() {
                    if old_state == RegistrationState::Registered {
                        self.new_state = RegistrationState::NotRegistered;
                        self.server_assignment(hss, assignment_type).await
                    } else {
                        // Deregistering an unregistered user is an error;
                        // answering 200 here would invite retry loops.
                        log::debug!("rejecting deregistration of an unregistered user");
                        Reply::empty(400)
                    }
                } else {
                    // Authentication failures notify the HSS but leave the
                    // registration state alone.
                    self.server_assignment(hss, assignment_type).await
                }
            }
        }
    }

    async fn run_local(&mut self, request: RequestType, old_state: RegistrationState) -> Reply {
        match request {
            RequestType::Reg => match old_state {
                RegistrationState::Registered => {
                    self.new_state = RegistrationState::Registered;
                    self.reply()
                }
                RegistrationState::Unregistered => {
                    // Locally provisioned subscriber registering
                    self.new_state = RegistrationState::Registered;
                    self.put_in_cache().await;
                    self.reply()
                }
                RegistrationState::NotRegistered => {
                    log::debug!("unrecognised subscriber {}", self.public_id);
                    Reply::empty(404)
                }
            },
            RequestType::Call => {
                if old_state == RegistrationState::NotRegistered {
                    Reply::empty(404)
                } else {
                    self.reply()
                }
            }
            RequestType::DeregUser | RequestType::DeregAdmin | RequestType::DeregTimeout => {
                if old_state == RegistrationState::Registered {
                    // Nothing else holds this data; keep it, just drop the
                    // registration.
                    self.new_state = RegistrationState::Unregistered;
                    self.put_in_cache().await;
                    self.reply()
                } else {
                    log::debug!("rejecting deregistration of an unregistered user");
                    Reply::empty(400)
                }
            }
            RequestType::DeregAuthFail | RequestType::DeregAuthTimeout => Reply::empty(200),
        }
    }

    /// Record the private identity against the registration set. The
    /// response is never blocked on this write.
    fn record_new_binding(&self) {
        let cache = self.ctx.cache.clone();
        let public_ids = subscription::public_ids(&self.profile);
        let private_id = self.private_id.clone();
        let ttl = 2 * self.ctx.config.hss.reregistration_time;
        log::debug!("associating {private_id} with the set of {}", self.public_id);
        tokio::spawn(async move {
            if let Err(err) = cache
                .put_associated_private_id(&public_ids, &private_id, generate_timestamp(), Some(ttl))
                .await
            {
                log::warn!("failed to record binding for {private_id}: {err}");
            }
        });
    }

    async fn server_assignment(
        &mut self,
        hss: &dyn HssGateway,
        assignment_type: ServerAssignmentType,
    ) -> Reply {
        let saa = match hss
            .server_assignment(&self.private_id, self.public_id, assignment_type)
            .await
        {
            Ok(saa) => saa,
            Err(err) => {
                log::info!("Server-Assignment failed: {err}");
                return hss_failure(&err);
            }
        };

        // The HSS answer is advisory for a deregistration: the controller
        // holds no bindings either way, so the local record goes regardless
        // of the result code.
        if assignment_type.is_deregistration() {
            self.delete_from_cache().await;
        }

        match saa.result_code {
            result_code::SUCCESS => {
                let assigns_user = matches!(
                    assignment_type,
                    ServerAssignmentType::Registration
                        | ServerAssignmentType::ReRegistration
                        | ServerAssignmentType::UnregisteredUser
                );
                if assigns_user {
                    if let Some(user_data) = saa.user_data {
                        self.profile = user_data;
                    }
                    self.put_in_cache().await;
                }
                self.reply()
            }
            exp_result::ERROR_USER_UNKNOWN => {
                log::info!("Server-Assignment answer 5001 - user unknown");
                Reply::empty(404)
            }
            code => {
                log::info!("Server-Assignment answer {code} - reject");
                Reply::empty(500)
            }
        }
    }

    /// Write the record against every public identity of the set. Failures
    /// are logged; the reply is already decided.
    async fn put_in_cache(&self) {
        let public_ids = subscription::public_ids(&self.profile);
        if public_ids.is_empty() {
            log::debug!("no public identities in the profile - nothing to cache");
            return;
        }

        let hss_configured = self.ctx.hss.is_some();
        // Twice the reregistration time: the refresh kicks in at the half-
        // way point, so the record never expires between REGISTERs. Without
        // an HSS this node is the master and the data never expires.
        let ttl = if hss_configured {
            Some(2 * self.ctx.config.hss.reregistration_time)
        } else {
            None
        };
        let private_ids = if hss_configured {
            associated_private_ids(&self.private_id, &self.profile)
        } else {
            Vec::new()
        };

        if let Err(err) = self
            .ctx
            .cache
            .put_subscription(
                &public_ids,
                &self.profile,
                self.new_state,
                &private_ids,
                generate_timestamp(),
                ttl,
            )
            .await
        {
            log::warn!("failed to cache subscription for {}: {err}", self.public_id);
        }
    }

    async fn delete_from_cache(&self) {
        let public_ids = subscription::public_ids(&self.profile);
        if public_ids.is_empty() {
            return;
        }
        let private_ids = associated_private_ids(&self.private_id, &self.profile);
        if let Err(err) = self
            .ctx
            .cache
            .delete_public_ids(&public_ids, &private_ids, generate_timestamp())
            .await
        {
            log::warn!(
                "failed to delete registration set for {}: {err}",
                self.public_id
            );
        }
    }
}

/// GET `/impu/<public_id>/location`
pub async fn location(
    ctx: &AppContext,
    public_id: &str,
    originating: bool,
    auth_type: &str,
) -> Reply {
    let Some(hss) = &ctx.hss else {
        // No HSS: report the configured server if the subscriber exists.
        return match ctx.cache.get_subscription(public_id).await {
            Ok(record) if !record.profile.is_empty() => {
                let status = AuthorizationStatus {
                    result_code: result_code::SUCCESS,
                    experimental_result_code: 0,
                    server_name: Some(ctx.config.hss.server_name.clone()),
                    capabilities: None,
                };
                Reply::json(status_body(result_code::SUCCESS, &status))
            }
            Ok(_) => Reply::empty(404),
            Err(StoreError::NotFound) => Reply::empty(404),
            Err(err) => cache_failure(&err),
        };
    };

    let authorization_type = if auth_type == "CAPAB" { Some(2) } else { None };
    let mut status = match hss
        .location_info(public_id, originating, authorization_type)
        .await
    {
        Ok(status) => status,
        Err(err) => {
            log::info!("Location-Info failed: {err}");
            return hss_failure(&err);
        }
    };

    let rc = status.result_code;
    let exp = status.experimental_result_code;
    if rc == result_code::SUCCESS
        || exp == exp_result::UNREGISTERED_SERVICE
        || exp == exp_result::ERROR_IDENTITY_NOT_REGISTERED
    {
        // Unregistered service and not-yet-registered identities still name
        // a server. A Server-Name is only trusted on a clean success.
        if rc != result_code::SUCCESS {
            status.server_name = None;
        }
        Reply::json(status_body(if rc != 0 { rc } else { exp }, &status))
    } else if exp == exp_result::ERROR_USER_UNKNOWN {
        log::info!("user unknown - reject");
        Reply::empty(404)
    } else if rc == result_code::TOO_BUSY {
        log::info!("HSS busy - reject");
        Reply::empty(504)
    } else if rc == result_code::UNABLE_TO_DELIVER {
        Reply::empty(503)
    } else {
        log::info!("Location-Info answer {rc}/{exp} - reject");
        Reply::empty(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{profile, with_hss, without_hss};
    use crate::hss::{HssError, ServerAssignment};
    use croft_store::generate_timestamp;
    use std::time::Duration;

    const IMPU: &str = "sip:alice@example.com";
    const IMPI: &str = "alice@example.com";

    fn config() -> crate::config::Config {
        let mut config = crate::config::Config::default();
        config.hss.enabled = true;
        config.hss.reregistration_time = 1800;
        config
    }

    fn saa_ok(user_data: Option<&str>) -> Result<ServerAssignment, HssError> {
        Ok(ServerAssignment {
            result_code: 2001,
            user_data: user_data.map(str::to_string),
        })
    }

    async fn seed(
        ctx: &crate::context::SharedContext,
        state: RegistrationState,
        private_ids: &[&str],
        ttl: Option<u32>,
    ) {
        let doc = profile(IMPU, None);
        let private_ids: Vec<String> = private_ids.iter().map(|s| s.to_string()).collect();
        ctx.cache
            .put_subscription(
                &[IMPU.to_string()],
                &doc,
                state,
                &private_ids,
                generate_timestamp(),
                ttl,
            )
            .await
            .unwrap();
    }

    /// Let fire-and-forget writes land before asserting on the cache
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn get_unknown_wraps_not_registered() {
        let (ctx, _hss) = with_hss(config());
        let reply = reg_data(&ctx, IMPU, "", None).await;
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.body,
            "<RegistrationData><RegistrationState>NOT_REGISTERED</RegistrationState></RegistrationData>"
        );
    }

    #[tokio::test]
    async fn initial_registration_fetches_and_caches() {
        let (ctx, hss) = with_hss(config());
        let doc = profile(IMPU, None);
        hss.sar.lock().unwrap().push_back(saa_ok(Some(&doc)));

        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::Reg)).await;

        assert_eq!(reply.status, 200);
        assert!(reply
            .body
            .contains("<RegistrationState>REGISTERED</RegistrationState>"));
        assert!(reply.body.contains(IMPU));
        assert_eq!(
            hss.sar_types(),
            vec![ServerAssignmentType::Registration]
        );

        let record = ctx.cache.get_subscription(IMPU).await.unwrap();
        assert_eq!(record.state, RegistrationState::Registered);
        assert_eq!(record.associated_private_ids, vec![IMPI.to_string()]);
        assert!(record.ttl > 3500 && record.ttl <= 3600);

        // The follow-up GET serves the HSS-supplied profile from the cache
        let get = reg_data(&ctx, IMPU, "", None).await;
        assert_eq!(get.status, 200);
        assert!(get.body.contains(IMPU));
        assert!(get
            .body
            .contains("<RegistrationState>REGISTERED</RegistrationState>"));
    }

    #[tokio::test]
    async fn reregistration_within_half_life_stays_local() {
        let (ctx, _hss) = with_hss(config());
        seed(&ctx, RegistrationState::Registered, &[IMPI], Some(3599)).await;

        // No SAR is scripted: any HSS traffic would fail the test
        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::Reg)).await;
        assert_eq!(reply.status, 200);
        assert!(reply
            .body
            .contains("<RegistrationState>REGISTERED</RegistrationState>"));
    }

    #[tokio::test]
    async fn reregistration_past_half_life_refreshes() {
        let (ctx, hss) = with_hss(config());
        seed(&ctx, RegistrationState::Registered, &[IMPI], Some(900)).await;
        let refreshed = profile(IMPU, Some(IMPI));
        hss.sar.lock().unwrap().push_back(saa_ok(Some(&refreshed)));

        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::Reg)).await;
        assert_eq!(reply.status, 200);
        assert_eq!(
            hss.sar_types(),
            vec![ServerAssignmentType::ReRegistration]
        );

        let record = ctx.cache.get_subscription(IMPU).await.unwrap();
        assert!(record.ttl > 3500, "refresh restores the full TTL");
        assert!(record.profile.contains("<PrivateID>"));
    }

    #[tokio::test]
    async fn new_binding_forces_registration_sar() {
        let (ctx, hss) = with_hss(config());
        seed(&ctx, RegistrationState::Registered, &[IMPI], Some(3599)).await;
        let doc = profile(IMPU, None);
        hss.sar.lock().unwrap().push_back(saa_ok(Some(&doc)));

        let reply = reg_data(&ctx, IMPU, "bob@example.com", Some(RequestType::Reg)).await;
        assert_eq!(reply.status, 200);
        assert_eq!(
            hss.sar_types(),
            vec![ServerAssignmentType::Registration]
        );

        // The binding write is fire-and-forget
        settle().await;
        let record = ctx.cache.get_subscription(IMPU).await.unwrap();
        assert!(record
            .associated_private_ids
            .contains(&"bob@example.com".to_string()));
    }

    #[tokio::test]
    async fn call_for_unknown_gets_unregistered_service() {
        let (ctx, hss) = with_hss(config());
        let doc = profile(IMPU, Some(IMPI));
        hss.sar.lock().unwrap().push_back(saa_ok(Some(&doc)));

        let reply = reg_data(&ctx, IMPU, "", Some(RequestType::Call)).await;
        assert_eq!(reply.status, 200);
        assert!(reply
            .body
            .contains("<RegistrationState>UNREGISTERED</RegistrationState>"));
        assert_eq!(
            hss.sar_types(),
            vec![ServerAssignmentType::UnregisteredUser]
        );

        let record = ctx.cache.get_subscription(IMPU).await.unwrap();
        assert_eq!(record.state, RegistrationState::Unregistered);
    }

    #[tokio::test]
    async fn call_for_known_replies_from_cache() {
        let (ctx, _hss) = with_hss(config());
        seed(&ctx, RegistrationState::Registered, &[IMPI], Some(3600)).await;

        let reply = reg_data(&ctx, IMPU, "", Some(RequestType::Call)).await;
        assert_eq!(reply.status, 200);
        assert!(reply
            .body
            .contains("<RegistrationState>REGISTERED</RegistrationState>"));
    }

    #[tokio::test]
    async fn deregistration_deletes_and_unwinds_state() {
        let (ctx, hss) = with_hss(config());
        seed(&ctx, RegistrationState::Registered, &[IMPI], Some(3600)).await;
        hss.sar.lock().unwrap().push_back(saa_ok(None));

        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::DeregUser)).await;
        assert_eq!(reply.status, 200);
        assert!(reply
            .body
            .contains("<RegistrationState>NOT_REGISTERED</RegistrationState>"));
        assert_eq!(
            hss.sar_types(),
            vec![ServerAssignmentType::UserDeregistration]
        );

        // The record is gone; a GET now reads as NOT_REGISTERED
        assert!(ctx.cache.get_subscription(IMPU).await.is_err());
        let get = reg_data(&ctx, IMPU, "", None).await;
        assert!(get
            .body
            .contains("<RegistrationState>NOT_REGISTERED</RegistrationState>"));
    }

    #[tokio::test]
    async fn deregistration_of_unregistered_is_rejected() {
        let (ctx, _hss) = with_hss(config());
        seed(&ctx, RegistrationState::Unregistered, &[IMPI], None).await;

        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::DeregUser)).await;
        assert_eq!(reply.status, 400);

        // Cache untouched
        let record = ctx.cache.get_subscription(IMPU).await.unwrap();
        assert_eq!(record.state, RegistrationState::Unregistered);
    }

    #[tokio::test]
    async fn hss_rejection_still_deletes_on_deregistration() {
        let (ctx, hss) = with_hss(config());
        seed(&ctx, RegistrationState::Registered, &[IMPI], Some(3600)).await;
        hss.sar.lock().unwrap().push_back(Ok(ServerAssignment {
            result_code: 5001,
            user_data: None,
        }));

        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::DeregAdmin)).await;
        assert_eq!(reply.status, 404);
        assert!(ctx.cache.get_subscription(IMPU).await.is_err());
    }

    #[tokio::test]
    async fn auth_failure_notifies_but_keeps_state_and_profile() {
        let (ctx, hss) = with_hss(config());
        seed(&ctx, RegistrationState::Registered, &[IMPI], Some(3600)).await;
        // Even if the HSS hands back fresh user data it is not cached here
        let other = profile("sip:other@example.com", None);
        hss.sar.lock().unwrap().push_back(saa_ok(Some(&other)));

        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::DeregAuthFail)).await;
        assert_eq!(reply.status, 200);
        assert!(reply
            .body
            .contains("<RegistrationState>REGISTERED</RegistrationState>"));
        assert_eq!(
            hss.sar_types(),
            vec![ServerAssignmentType::AuthenticationFailure]
        );

        let record = ctx.cache.get_subscription(IMPU).await.unwrap();
        assert_eq!(record.state, RegistrationState::Registered);
        assert!(record.profile.contains(IMPU));
        assert!(!record.profile.contains("sip:other@example.com"));
    }

    #[tokio::test]
    async fn hss_timeout_maps_to_503() {
        let (ctx, hss) = with_hss(config());
        hss.sar.lock().unwrap().push_back(Err(HssError::Timeout));

        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::Reg)).await;
        assert_eq!(reply.status, 503);
    }

    #[tokio::test]
    async fn hss_unexpected_code_maps_to_500() {
        let (ctx, hss) = with_hss(config());
        hss.sar.lock().unwrap().push_back(Ok(ServerAssignment {
            result_code: 3004,
            user_data: None,
        }));

        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::Reg)).await;
        assert_eq!(reply.status, 500);
    }

    #[tokio::test]
    async fn no_hss_unknown_call_is_404() {
        let ctx = without_hss(crate::config::Config::default());
        let reply = reg_data(&ctx, IMPU, "", Some(RequestType::Call)).await;
        assert_eq!(reply.status, 404);
    }

    #[tokio::test]
    async fn no_hss_reg_of_unknown_is_404() {
        let ctx = without_hss(crate::config::Config::default());
        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::Reg)).await;
        assert_eq!(reply.status, 404);
    }

    #[tokio::test]
    async fn no_hss_provisioned_subscriber_registers() {
        let ctx = without_hss(crate::config::Config::default());
        seed(&ctx, RegistrationState::Unregistered, &[], None).await;

        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::Reg)).await;
        assert_eq!(reply.status, 200);
        assert!(reply
            .body
            .contains("<RegistrationState>REGISTERED</RegistrationState>"));

        let record = ctx.cache.get_subscription(IMPU).await.unwrap();
        assert_eq!(record.state, RegistrationState::Registered);
        assert_eq!(record.ttl, 0, "master data never expires");
    }

    #[tokio::test]
    async fn no_hss_deregistration_retains_data() {
        let ctx = without_hss(crate::config::Config::default());
        seed(&ctx, RegistrationState::Registered, &[], None).await;

        let reply = reg_data(&ctx, IMPU, IMPI, Some(RequestType::DeregTimeout)).await;
        assert_eq!(reply.status, 200);
        assert!(reply
            .body
            .contains("<RegistrationState>UNREGISTERED</RegistrationState>"));

        let record = ctx.cache.get_subscription(IMPU).await.unwrap();
        assert_eq!(record.state, RegistrationState::Unregistered);
        assert!(!record.profile.is_empty());
    }

    #[tokio::test]
    async fn no_hss_auth_failure_is_200_empty() {
        let ctx = without_hss(crate::config::Config::default());
        let reply = reg_data(&ctx, IMPU, "", Some(RequestType::DeregAuthTimeout)).await;
        assert_eq!(reply.status, 200);
        assert!(reply.body.is_empty());
    }

    #[tokio::test]
    async fn deprecated_endpoint_serves_raw_profile() {
        let ctx = without_hss(crate::config::Config::default());
        seed(&ctx, RegistrationState::Unregistered, &[], None).await;

        // No private id reads as a call and serves the bare document
        let reply = subscription_profile(&ctx, IMPU, "").await;
        assert_eq!(reply.status, 200);
        assert!(reply.body.starts_with("<IMSSubscription>"));
        assert!(!reply.body.contains("RegistrationData"));
    }

    #[tokio::test]
    async fn deprecated_endpoint_unknown_is_404() {
        let ctx = without_hss(crate::config::Config::default());
        let reply = subscription_profile(&ctx, IMPU, "").await;
        assert_eq!(reply.status, 404);
    }

    #[tokio::test]
    async fn location_without_hss_reports_configured_server() {
        let ctx = without_hss(crate::config::Config::default());
        seed(&ctx, RegistrationState::Registered, &[IMPI], None).await;

        let reply = location(&ctx, IMPU, false, "").await;
        assert_eq!(reply.status, 200);
        let body: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(body["result-code"], 2001);
        assert_eq!(body["scscf"], "sip:scscf.example.com");

        let missing = location(&ctx, "sip:nobody@example.com", false, "").await;
        assert_eq!(missing.status, 404);
    }

    #[tokio::test]
    async fn location_with_hss_maps_results() {
        let (ctx, hss) = with_hss(config());
        let mock = |rc, exp, name: Option<&str>| AuthorizationStatus {
            result_code: rc,
            experimental_result_code: exp,
            server_name: name.map(str::to_string),
            capabilities: None,
        };

        hss.lir
            .lock()
            .unwrap()
            .push_back(Ok(mock(2001, 0, Some("sip:scscf.example.com"))));
        let reply = location(&ctx, IMPU, false, "").await;
        assert_eq!(reply.status, 200);
        let body: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(body["scscf"], "sip:scscf.example.com");

        // Unregistered service: success, but the server name is not trusted
        hss.lir
            .lock()
            .unwrap()
            .push_back(Ok(mock(0, 2003, Some("sip:stale.example.com"))));
        let reply = location(&ctx, IMPU, false, "").await;
        assert_eq!(reply.status, 200);
        let body: serde_json::Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(body["result-code"], 2003);
        assert!(body.get("scscf").is_none());

        hss.lir.lock().unwrap().push_back(Ok(mock(0, 5001, None)));
        assert_eq!(location(&ctx, IMPU, false, "").await.status, 404);

        // HSS busy asks the controller to wait, unable-to-deliver asks it
        // to try another node
        hss.lir
            .lock()
            .unwrap()
            .push_back(Ok(mock(result_code::TOO_BUSY, 0, None)));
        assert_eq!(location(&ctx, IMPU, false, "").await.status, 504);

        hss.lir
            .lock()
            .unwrap()
            .push_back(Ok(mock(result_code::UNABLE_TO_DELIVER, 0, None)));
        assert_eq!(location(&ctx, IMPU, false, "").await.status, 503);

        hss.lir.lock().unwrap().push_back(Err(HssError::Timeout));
        assert_eq!(location(&ctx, IMPU, false, "").await.status, 503);
    }

    #[tokio::test]
    async fn concurrent_requests_settle_on_the_store() {
        let (ctx, hss) = with_hss(config());
        let doc = profile(IMPU, Some(IMPI));
        for _ in 0..4 {
            hss.sar.lock().unwrap().push_back(saa_ok(Some(&doc)));
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                reg_data(&ctx, IMPU, IMPI, Some(RequestType::Reg)).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().status, 200);
        }

        settle().await;
        let record = ctx.cache.get_subscription(IMPU).await.unwrap();
        assert_eq!(record.state, RegistrationState::Registered);
    }
}
