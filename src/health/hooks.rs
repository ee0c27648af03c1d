//! Extension points around an evaluation.
//!
//! - [`ResponseHook`]: may mutate the assembled payload. Hooks run once per
//!   evaluation, after every built-in section is populated and before the
//!   payload is serialized. A panic inside one hook is contained.
//! - [`AuthorizationPolicy`]: decides whether callers must authenticate at all.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use super::aggregator::{panic_message, HealthEvaluation};

/// The top-level response payload, keyed and serialized in ascending order.
pub type Payload = BTreeMap<String, Value>;

pub trait ResponseHook: Send + Sync {
    fn on_response(&self, evaluation: &HealthEvaluation, payload: &mut Payload);
}

impl<F> ResponseHook for F
where
    F: Fn(&HealthEvaluation, &mut Payload) + Send + Sync,
{
    fn on_response(&self, evaluation: &HealthEvaluation, payload: &mut Payload) {
        self(evaluation, payload)
    }
}

/// Ordered list of response hooks.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn ResponseHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: impl ResponseHook + 'static) -> &mut Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in registration order. A panicking hook is logged and
    /// skipped; the hooks after it still run.
    pub(crate) fn run(&self, evaluation: &HealthEvaluation, payload: &mut Payload) {
        for (index, hook) in self.hooks.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                hook.on_response(evaluation, payload)
            }));
            if let Err(panic) = outcome {
                tracing::error!(
                    hook = index,
                    panic = %panic_message(panic.as_ref()),
                    "Response hook panicked"
                );
            }
        }
    }
}

pub trait AuthorizationPolicy: Send + Sync {
    fn require_authentication(&self) -> bool {
        true
    }
}

/// Policy read from the `[auth]` config table.
#[derive(Debug, Clone, Copy)]
pub struct StaticPolicy {
    require_authentication: bool,
}

impl StaticPolicy {
    pub fn new(require_authentication: bool) -> Self {
        Self {
            require_authentication,
        }
    }
}

impl Default for StaticPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AuthorizationPolicy for StaticPolicy {
    fn require_authentication(&self) -> bool {
        self.require_authentication
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DefaultPolicy;
    impl AuthorizationPolicy for DefaultPolicy {}

    #[test]
    fn test_policy_defaults_to_required() {
        assert!(DefaultPolicy.require_authentication());
        assert!(StaticPolicy::default().require_authentication());
        assert!(!StaticPolicy::new(false).require_authentication());
    }

    #[test]
    fn test_registry_accepts_closures() {
        let mut hooks = HookRegistry::new();
        hooks
            .register(|_: &HealthEvaluation, payload: &mut Payload| {
                payload.insert("region".to_string(), Value::from("eu-west-1"));
            })
            .register(|_: &HealthEvaluation, _: &mut Payload| {});
        assert_eq!(hooks.len(), 2);
    }
}
