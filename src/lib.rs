use std::sync::Arc;

use auth::{JwtCacheService, JwtService, TokenBlacklist};
use cache::KvStore;
use config::Config;
use integrations::{IntegrationError, Integrations};
use rate_limit::RateLimiter;
use utils::Clock;

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod integrations;
pub mod middleware;
pub mod rate_limit;
pub mod resilience;
pub mod result;
pub mod router;
pub mod routes;
pub mod utils;

pub use router::create_router;

/// Services shared by every request, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn KvStore>,
    pub jwt: Arc<JwtService>,
    pub jwt_cache: JwtCacheService,
    pub blacklist: TokenBlacklist,
    pub rate_limiter: RateLimiter,
    pub integrations: Arc<Integrations>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, IntegrationError> {
        let jwt = Arc::new(JwtService::from_config(&config));
        let jwt_cache = JwtCacheService::new(
            store.clone(),
            jwt.clone(),
            clock.clone(),
            config.jwt_cache_ttl(),
        );
        let blacklist = TokenBlacklist::new(store.clone(), clock.clone());
        let rate_limiter = RateLimiter::new(store.clone(), clock, config.system_load.probe());
        let integrations = Arc::new(Integrations::from_config(&config)?);

        Ok(Self {
            config: Arc::new(config),
            store,
            jwt,
            jwt_cache,
            blacklist,
            rate_limiter,
            integrations,
        })
    }
}
