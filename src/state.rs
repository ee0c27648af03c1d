//! Shared application state for request handlers.

use std::sync::Arc;
use tera::Tera;

use crate::config::AppConfig;
use crate::health::hooks::{AuthorizationPolicy, StaticPolicy};
use crate::health::HealthChecker;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tera: Arc<Tera>,
    pub checker: Arc<HealthChecker>,
    pub policy: Arc<dyn AuthorizationPolicy>,
}

impl AppState {
    /// The authorization policy follows `[auth].require_authentication`.
    pub fn new(config: AppConfig, tera: Tera, checker: HealthChecker) -> Self {
        let policy = StaticPolicy::new(config.auth.require_authentication);
        Self {
            config: Arc::new(config),
            tera: Arc::new(tera),
            checker: Arc::new(checker),
            policy: Arc::new(policy),
        }
    }

    /// Replace the authorization policy.
    pub fn with_policy(mut self, policy: impl AuthorizationPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }
}
