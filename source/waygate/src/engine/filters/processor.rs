//! The execution core: runs every filter of a given kind against the
//! current context, in order, recording timing/status and feeding the
//! usage notifier and debug trail.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;

use crate::context::{diff_snapshots, FilterStatus, RequestContext};
use crate::debug::FilterUsageNotifier;
use crate::error::GatewayError;

use super::{run_filter, loader::FilterLoader, FilterOutcome};

pub struct FilterProcessor {
    loader: Arc<FilterLoader>,
    notifier: Arc<dyn FilterUsageNotifier>,
}

impl FilterProcessor {
    pub fn new(loader: Arc<FilterLoader>, notifier: Arc<dyn FilterUsageNotifier>) -> Self {
        Self { loader, notifier }
    }

    /// Runs every filter of `kind` in ascending `(order, name)` order
    /// against a snapshot of the sequence taken at entry. Returns the
    /// OR-folded boolean some filters may return; propagates the first
    /// `GatewayError` a filter raises, after finishing the record/notify
    /// bookkeeping for that filter.
    pub async fn run_filters_of_kind(&self, kind: &str, ctx: &mut RequestContext) -> Result<bool, GatewayError> {
        let sequence = self.loader.filters_by_kind(kind);
        let mut aggregate = false;

        for filter in sequence.iter() {
            let before = ctx.debug_routing.then(|| ctx.snapshot());

            let start = Instant::now();
            let outcome = run_filter(filter.as_ref(), ctx).await;
            let elapsed = start.elapsed();

            let status = match &outcome {
                FilterOutcome::Success(_) => FilterStatus::Success,
                FilterOutcome::Failed(_) => FilterStatus::Failed,
                FilterOutcome::Skipped => FilterStatus::Skipped,
                FilterOutcome::Disabled => FilterStatus::Disabled,
            };

            ctx.record_filter_execution(filter.name(), status, elapsed);
            self.notifier.notify(filter.name(), status, kind);

            if let Some(before) = before {
                let after = ctx.snapshot();
                let diff = diff_snapshots(&before, &after);
                if !diff.is_empty() {
                    ctx.add_routing_debug(format!("{}: {:?}", filter.name(), diff));
                }
            }

            match outcome {
                FilterOutcome::Success(Some(value)) => aggregate |= value,
                FilterOutcome::Success(None) => {}
                FilterOutcome::Failed(err) => return Err(err),
                FilterOutcome::Skipped | FilterOutcome::Disabled => {}
            }
        }

        Ok(aggregate)
    }

    /// Convenience wrapper for pipeline stages: a `GatewayError` propagates
    /// unchanged; a panic inside a filter (the Rust stand-in for "any other
    /// thrown error") is caught and wrapped as `GatewayError(500,
    /// UNCAUGHT_EXCEPTION_IN_<STAGE>_FILTER)`.
    pub async fn run_stage(&self, stage: &str, ctx: &mut RequestContext) -> Result<bool, GatewayError> {
        let stage_token = stage.to_uppercase();
        match AssertUnwindSafe(self.run_filters_of_kind(stage, ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::uncaught(&stage_token, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::filters::compiler::FilterCompiler;
    use crate::engine::filters::test_support::StubFilter;
    use crate::engine::filters::Filter;
    use crate::error::ConfigError;
    use std::sync::Arc;

    struct DirectCompiler;
    impl FilterCompiler for DirectCompiler {
        fn compile(&self, _source: &[u8], _path: &str) -> Result<Arc<dyn Filter>, ConfigError> {
            unreachable!("tests insert filters directly into the registry")
        }
    }

    fn new_ctx() -> RequestContext {
        RequestContext::new(pingora_http::RequestHeader::build("GET", b"/", None).unwrap())
    }

    #[tokio::test]
    async fn runs_filters_in_order_and_records_summary() {
        let loader = Arc::new(FilterLoader::new(Arc::new(DirectCompiler)));
        loader.registry().put(
            "second",
            Arc::new(StubFilter::new("second", "pre", 2).with_action(|ctx| {
                ctx.set("order_trail", crate::context::ContextValue::from("2"));
                Ok(None)
            })),
        );
        loader.registry().put(
            "first",
            Arc::new(StubFilter::new("first", "pre", 1).with_action(|ctx| {
                ctx.set("order_trail", crate::context::ContextValue::from("1"));
                Ok(None)
            })),
        );
        // force a sequence rebuild since we bypassed get_or_create
        loader.rebuild_sequences();

        let processor = FilterProcessor::new(loader.clone(), Arc::new(crate::debug::TracingUsageNotifier));
        let mut ctx = new_ctx();
        processor.run_filters_of_kind("pre", &mut ctx).await.unwrap();

        assert_eq!(ctx.filter_execution_summary().len(), 2);
        assert_eq!(ctx.filter_execution_summary()[0].filter_name, "first");
        assert_eq!(ctx.filter_execution_summary()[1].filter_name, "second");
    }

    #[tokio::test]
    async fn debug_routing_populates_the_trail() {
        let loader = Arc::new(FilterLoader::new(Arc::new(DirectCompiler)));
        loader.registry().put(
            "tagger",
            Arc::new(StubFilter::new("tagger", "pre", 1).with_action(|ctx| {
                ctx.set("custom_tag", crate::context::ContextValue::from("api"));
                Ok(None)
            })),
        );
        loader.rebuild_sequences();

        let processor = FilterProcessor::new(loader, Arc::new(crate::debug::TracingUsageNotifier));
        let mut ctx = new_ctx();
        ctx.debug_routing = true;
        processor.run_filters_of_kind("pre", &mut ctx).await.unwrap();

        assert_eq!(ctx.routing_debug_trail().len(), 1);
        assert!(ctx.routing_debug_trail()[0].starts_with("tagger:"));
    }

    #[tokio::test]
    async fn failed_filter_propagates_gateway_error() {
        let loader = Arc::new(FilterLoader::new(Arc::new(DirectCompiler)));
        loader.registry().put(
            "boom",
            Arc::new(StubFilter::new("boom", "pre", 1).with_action(|_ctx| Err(GatewayError::new(501, "no-vip", "no backend")))),
        );
        loader.rebuild_sequences();

        let processor = FilterProcessor::new(loader, Arc::new(crate::debug::TracingUsageNotifier));
        let mut ctx = new_ctx();
        let err = processor.run_stage("pre", &mut ctx).await.unwrap_err();
        assert_eq!(err.status, 501);
    }
}
