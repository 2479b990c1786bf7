//! The request pipeline's state machine (component H):
//! `INIT -> PRE -> ROUTE -> POST -> DONE`, with an `ERROR` side-branch from
//! any of PRE/ROUTE/POST. POST runs exactly once per request; ERROR runs at
//! most once.

use std::sync::Arc;

use pingora_http::RequestHeader;

use crate::context::RequestContext;
use crate::engine::filters::processor::FilterProcessor;
use crate::error::GatewayError;

const STAGE_PRE: &str = "pre";
const STAGE_ROUTE: &str = "route";
const STAGE_POST: &str = "post";
const STAGE_ERROR: &str = "error";

/// Drives one request through PRE/ROUTE/POST, injected with the processor
/// it runs stages through. Not a singleton: construct one per gateway
/// instance (or per test) so instances stay isolated.
pub struct PipelineRunner {
    processor: Arc<FilterProcessor>,
}

impl PipelineRunner {
    pub fn new(processor: Arc<FilterProcessor>) -> Self {
        Self { processor }
    }

    /// Runs the full pipeline for one request and returns the context at
    /// `DONE`, for the caller to read the response out of (and then drop,
    /// releasing it).
    pub async fn run(&self, request: RequestHeader) -> RequestContext {
        let mut ctx = RequestContext::new(request);
        ctx.add_routing_debug("INIT");

        let mut pending_error = None;

        ctx.add_routing_debug("PRE");
        if let Err(err) = self.processor.run_stage(STAGE_PRE, &mut ctx).await {
            pending_error = Some(err);
        }

        if pending_error.is_none() {
            ctx.add_routing_debug("ROUTE");
            if let Err(err) = self.processor.run_stage(STAGE_ROUTE, &mut ctx).await {
                pending_error = Some(err);
            }
        }

        if let Some(err) = pending_error {
            self.enter_error(&mut ctx, err).await;
            ctx.add_routing_debug("POST");
            if let Err(post_err) = self.processor.run_stage(STAGE_POST, &mut ctx).await {
                tracing::warn!(
                    error = %post_err,
                    "POST raised after an earlier stage's error; ERROR already ran once and will not re-enter"
                );
            }
            ctx.add_routing_debug("DONE");
            return ctx;
        }

        ctx.add_routing_debug("POST");
        if let Err(err) = self.processor.run_stage(STAGE_POST, &mut ctx).await {
            self.enter_error(&mut ctx, err).await;
        }

        ctx.add_routing_debug("DONE");
        ctx
    }

    async fn enter_error(&self, ctx: &mut RequestContext, err: GatewayError) {
        ctx.set_throwable(err);
        ctx.add_routing_debug("ERROR");
        if let Err(inner) = self.processor.run_stage(STAGE_ERROR, ctx).await {
            tracing::warn!(error = %inner, "error raised inside the ERROR stage was swallowed");
        }
        ctx.mark_error_handled();
    }
}
