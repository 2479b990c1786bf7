//! An example `static` filter, invoked recursively by a `route` filter
//! rather than as part of the fixed PRE/ROUTE/POST sequence. This is
//! illustrative wiring, not a core contract: a real deployment supplies its
//! own routing and upstream-calling filters (the upstream HTTP client is
//! out of scope for this engine).

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::GatewayError;

use super::super::Filter;

/// Serves a fixed body straight out of the context, without contacting an
/// origin. Demonstrates `sendZuulResponse = false` short-circuiting: a PRE
/// filter sets it, ROUTE dispatches to this filter by name instead of
/// calling an upstream client.
pub struct StaticResponseFilter {
    pub name: String,
    pub order: i32,
    pub body: String,
}

#[async_trait]
impl Filter for StaticResponseFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "static"
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn should_run(&self, ctx: &RequestContext) -> bool {
        !ctx.send_gateway_response()
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Option<bool>, GatewayError> {
        ctx.set_response_status_code(200);
        ctx.set_response_body(self.body.clone());
        Ok(Some(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_fixed_body_when_not_sending_a_real_response() {
        let mut ctx = RequestContext::new(pingora_http::RequestHeader::build("GET", b"/", None).unwrap());
        ctx.set_send_gateway_response(false);

        let filter = StaticResponseFilter { name: "static-ok".into(), order: 1, body: "ok".into() };
        assert!(filter.should_run(&ctx).await);
        filter.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.response_status_code(), Some(200));
        assert_eq!(ctx.response_body(), Some(b"ok".as_slice()));
    }
}
