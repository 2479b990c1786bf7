//! The filter contract (component B) plus the subsystems that compile,
//! register, load, and execute filters (components C-G).

pub mod builtin;
pub mod compiler;
pub mod file_manager;
pub mod loader;
pub mod processor;
pub mod registry;

use std::fmt;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::GatewayError;

/// The shape every filter obeys: a kind, an order, a guard, and an action.
/// Filters are immutable once compiled -- replacement happens by swapping
/// the instance in the [`registry::FilterRegistry`], never by mutating one
/// in place.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Stable identity used for tie-breaking and registry lookups. Derived
    /// from the source path or script-declared name by the compiler.
    fn name(&self) -> &str;

    /// One of the well-known stage tokens (`pre`, `route`, `post`, `error`,
    /// `static`, `healthcheck`) or an arbitrary user-defined kind.
    fn kind(&self) -> &str;

    /// Smaller runs first; ties break on `name`.
    fn order(&self) -> i32;

    /// Often backed by dynamic config; defaults to always-enabled.
    fn disabled(&self) -> bool {
        false
    }

    /// Guard evaluated before `run`. Defaults to always-run.
    async fn should_run(&self, ctx: &RequestContext) -> bool {
        let _ = ctx;
        true
    }

    /// The filter's action. May return a boolean the Processor OR-folds
    /// into an internal, user-opaque aggregate (see the open question in
    /// the design notes this crate grew from -- no caller depends on it).
    async fn run(&self, ctx: &mut RequestContext) -> Result<Option<bool>, GatewayError>;
}

/// Result of invoking [`run_filter`] on a single filter.
#[derive(Debug)]
pub enum FilterOutcome {
    Success(Option<bool>),
    Failed(GatewayError),
    Skipped,
    Disabled,
}

impl fmt::Display for FilterOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(_) => f.write_str("SUCCESS"),
            Self::Failed(_) => f.write_str("FAILED"),
            Self::Skipped => f.write_str("SKIPPED"),
            Self::Disabled => f.write_str("DISABLED"),
        }
    }
}

/// The guarded wrapper every invocation goes through: disabled/guard checks
/// happen here so the Processor never calls `run` on a filter that should
/// not run.
pub async fn run_filter(filter: &dyn Filter, ctx: &mut RequestContext) -> FilterOutcome {
    if filter.disabled() {
        return FilterOutcome::Disabled;
    }
    if !filter.should_run(ctx).await {
        return FilterOutcome::Skipped;
    }
    match filter.run(ctx).await {
        Ok(value) => FilterOutcome::Success(value),
        Err(err) => FilterOutcome::Failed(err),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A filter whose behavior is fully parameterized, used by every
    /// component's unit tests instead of a real compiled script.
    pub struct StubFilter {
        pub name: String,
        pub kind: String,
        pub order: i32,
        pub disabled: AtomicBool,
        pub action: Box<dyn Fn(&mut RequestContext) -> Result<Option<bool>, GatewayError> + Send + Sync>,
    }

    impl StubFilter {
        pub fn new(name: &str, kind: &str, order: i32) -> Self {
            Self {
                name: name.to_string(),
                kind: kind.to_string(),
                order,
                disabled: AtomicBool::new(false),
                action: Box::new(|_| Ok(None)),
            }
        }

        pub fn with_action(
            mut self,
            action: impl Fn(&mut RequestContext) -> Result<Option<bool>, GatewayError> + Send + Sync + 'static,
        ) -> Self {
            self.action = Box::new(action);
            self
        }

        pub fn disable(self) -> Self {
            self.disabled.store(true, Ordering::SeqCst);
            self
        }
    }

    #[async_trait]
    impl Filter for StubFilter {
        fn name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> &str {
            &self.kind
        }
        fn order(&self) -> i32 {
            self.order
        }
        fn disabled(&self) -> bool {
            self.disabled.load(Ordering::SeqCst)
        }
        async fn run(&self, ctx: &mut RequestContext) -> Result<Option<bool>, GatewayError> {
            (self.action)(ctx)
        }
    }

    #[tokio::test]
    async fn disabled_filter_is_skipped_as_disabled() {
        let filter = StubFilter::new("f", "pre", 1).disable();
        let mut ctx = RequestContext::new(pingora_http::RequestHeader::build("GET", b"/", None).unwrap());
        let outcome = run_filter(&filter, &mut ctx).await;
        assert!(matches!(outcome, FilterOutcome::Disabled));
    }
}
