//! HSS gateway: typed Cx exchanges with per-request deadlines.
//!
//! The orchestrator talks to [`HssGateway`]; the Diameter-backed
//! implementation builds the request, runs it under the configured deadline
//! and lifts the answer into a typed result. A missed deadline surfaces as
//! [`HssError::Timeout`], distinct from transport failures; any answer that
//! arrives after the deadline is dropped by the Diameter client.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use croft_diameter::cx::{
    self, AuthorizationAnswer, CxRouting, MultimediaAuthAnswer, ServerAssignmentAnswer,
    ServerAssignmentType, ServerCapabilities,
};
use croft_diameter::{CxClient, DiameterMessage};
use croft_ims::authvector::AuthVector;

use crate::config::Config;

/// Gateway failures. Protocol-level rejections are not errors here; they
/// travel in the answer's result code.
#[derive(Error, Debug)]
pub enum HssError {
    #[error("HSS exchange timed out")]
    Timeout,

    #[error("HSS unreachable: {0}")]
    Unavailable(String),
}

/// Typed Multimedia-Auth outcome
#[derive(Debug, Clone)]
pub struct MultimediaAuth {
    pub result_code: u32,
    pub scheme: Option<String>,
    pub vector: Option<AuthVector>,
}

/// Typed Server-Assignment outcome
#[derive(Debug, Clone)]
pub struct ServerAssignment {
    pub result_code: u32,
    pub user_data: Option<String>,
}

/// Typed User-Authorization / Location-Info outcome
#[derive(Debug, Clone)]
pub struct AuthorizationStatus {
    pub result_code: u32,
    pub experimental_result_code: u32,
    pub server_name: Option<String>,
    pub capabilities: Option<ServerCapabilities>,
}

/// The four Cx exchanges the orchestrator can issue
#[async_trait]
pub trait HssGateway: Send + Sync {
    async fn multimedia_auth(
        &self,
        private_id: &str,
        public_id: &str,
        scheme: &str,
        authorization: &str,
    ) -> Result<MultimediaAuth, HssError>;

    async fn server_assignment(
        &self,
        private_id: &str,
        public_id: &str,
        assignment_type: ServerAssignmentType,
    ) -> Result<ServerAssignment, HssError>;

    async fn user_authorization(
        &self,
        private_id: &str,
        public_id: &str,
        visited_network: &str,
        authorization_type: Option<u32>,
    ) -> Result<AuthorizationStatus, HssError>;

    async fn location_info(
        &self,
        public_id: &str,
        originating: bool,
        authorization_type: Option<u32>,
    ) -> Result<AuthorizationStatus, HssError>;
}

/// [`HssGateway`] over a live Diameter connection
pub struct DiameterHssGateway {
    client: CxClient,
    routing: CxRouting,
    server_name: String,
    deadline: Duration,
}

impl DiameterHssGateway {
    pub fn new(client: CxClient, config: &Config) -> Self {
        Self {
            client,
            routing: CxRouting {
                origin_host: config.diameter.origin_host.clone(),
                origin_realm: config.diameter.origin_realm.clone(),
                dest_realm: config.hss.dest_realm.clone(),
                dest_host: if config.hss.dest_host.is_empty() {
                    None
                } else {
                    Some(config.hss.dest_host.clone())
                },
            },
            server_name: config.hss.server_name.clone(),
            deadline: Duration::from_millis(config.hss.timeout_ms),
        }
    }

    fn session_id(&self) -> String {
        format!("{};{}", self.routing.origin_host, uuid::Uuid::new_v4())
    }

    async fn exchange(&self, msg: DiameterMessage) -> Result<DiameterMessage, HssError> {
        match tokio::time::timeout(self.deadline, self.client.exchange(msg)).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(err)) => Err(HssError::Unavailable(err.to_string())),
            Err(_) => Err(HssError::Timeout),
        }
    }
}

#[async_trait]
impl HssGateway for DiameterHssGateway {
    async fn multimedia_auth(
        &self,
        private_id: &str,
        public_id: &str,
        scheme: &str,
        authorization: &str,
    ) -> Result<MultimediaAuth, HssError> {
        log::debug!("MAR {private_id}/{public_id} scheme {scheme}");
        let mar = cx::multimedia_auth_request(
            &self.session_id(),
            &self.routing,
            private_id,
            public_id,
            &self.server_name,
            scheme,
            authorization,
        );
        let answer = self.exchange(mar).await?;
        let maa = MultimediaAuthAnswer::from_message(&answer);
        Ok(MultimediaAuth {
            result_code: maa.result_code,
            scheme: maa.scheme,
            vector: maa.vector,
        })
    }

    async fn server_assignment(
        &self,
        private_id: &str,
        public_id: &str,
        assignment_type: ServerAssignmentType,
    ) -> Result<ServerAssignment, HssError> {
        log::debug!("SAR {private_id}/{public_id} type {assignment_type:?}");
        let sar = cx::server_assignment_request(
            &self.session_id(),
            &self.routing,
            private_id,
            public_id,
            &self.server_name,
            assignment_type,
        );
        let answer = self.exchange(sar).await?;
        let saa = ServerAssignmentAnswer::from_message(&answer);
        Ok(ServerAssignment {
            result_code: saa.result_code,
            user_data: saa.user_data,
        })
    }

    async fn user_authorization(
        &self,
        private_id: &str,
        public_id: &str,
        visited_network: &str,
        authorization_type: Option<u32>,
    ) -> Result<AuthorizationStatus, HssError> {
        log::debug!("UAR {private_id}/{public_id} visited {visited_network}");
        let uar = cx::user_authorization_request(
            &self.session_id(),
            &self.routing,
            private_id,
            public_id,
            visited_network,
            authorization_type,
        );
        let answer = self.exchange(uar).await?;
        Ok(authorization_status(&answer))
    }

    async fn location_info(
        &self,
        public_id: &str,
        originating: bool,
        authorization_type: Option<u32>,
    ) -> Result<AuthorizationStatus, HssError> {
        log::debug!("LIR {public_id}");
        let lir = cx::location_info_request(
            &self.session_id(),
            &self.routing,
            public_id,
            originating,
            authorization_type,
        );
        let answer = self.exchange(lir).await?;
        Ok(authorization_status(&answer))
    }
}

fn authorization_status(answer: &DiameterMessage) -> AuthorizationStatus {
    let view = AuthorizationAnswer::from_message(answer);
    AuthorizationStatus {
        result_code: view.result_code,
        experimental_result_code: view.experimental_result_code,
        server_name: view.server_name,
        capabilities: view.capabilities,
    }
}
