//! Process-global state: configuration plus the shared backend clients.
//! Built once in `main` before the first request is accepted and read-only
//! from then on.

use std::sync::Arc;

use croft_store::SubscriberCache;

use crate::config::Config;
use crate::hss::HssGateway;

/// Everything a request handler needs
pub struct AppContext {
    pub config: Config,
    pub cache: Arc<SubscriberCache>,
    /// Present only when an HSS is configured
    pub hss: Option<Arc<dyn HssGateway>>,
}

/// Shared handle passed into every request task
pub type SharedContext = Arc<AppContext>;

impl AppContext {
    pub fn new(
        config: Config,
        cache: Arc<SubscriberCache>,
        hss: Option<Arc<dyn HssGateway>>,
    ) -> SharedContext {
        Arc::new(Self { config, cache, hss })
    }
}
