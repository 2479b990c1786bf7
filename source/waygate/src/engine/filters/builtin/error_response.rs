//! The supplied ERROR filter: renders the `throwable` a stage raised into
//! the wire-visible error headers and body. Part of the public contract
//! clients observe (see the error-body format rules in the external
//! interfaces).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::GatewayError;

use super::super::Filter;

pub struct ErrorResponseFilter;

#[async_trait]
impl Filter for ErrorResponseFilter {
    fn name(&self) -> &str {
        "error-response"
    }

    fn kind(&self) -> &str {
        "error"
    }

    fn order(&self) -> i32 {
        0
    }

    async fn should_run(&self, ctx: &RequestContext) -> bool {
        ctx.throwable().is_some()
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Option<bool>, GatewayError> {
        let (status, cause, message) = {
            let throwable = ctx.throwable().expect("should_run guarantees a throwable is set");
            (throwable.status, throwable.display_cause().to_string(), throwable.message.clone())
        };

        let params = parse_query(ctx.request.uri.query().unwrap_or(""));
        let version = params.get("v").map(String::as_str).unwrap_or("1");
        let output = params.get("output").map(String::as_str).unwrap_or("xml");
        let callback = params.get("callback").cloned();
        let explicit_override = params.get("override_error_status").map(|v| v == "true").unwrap_or(false);
        let force_default_response = explicit_override || callback.is_some();

        let effective_version = if force_default_response { "1" } else { version };
        let effective_status = if force_default_response { 200 } else { status };

        let body = render_error_body(effective_version, output, &message, status, callback.as_deref());

        ctx.set_response_status_code(effective_status);
        ctx.set_response_body(body);

        if cause == "UNKNOWN" {
            ctx.add_gateway_response_header("X-Zuul-Error-Cause", "Zuul Error UNKNOWN Cause");
        } else {
            ctx.add_gateway_response_header("X-Netflix-Error-Cause", format!("Zuul Error: {cause}"));
        }

        ctx.mark_error_handled();
        Ok(None)
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut it = pair.splitn(2, '=');
            let key = it.next()?.to_string();
            let value = it.next().unwrap_or("").to_string();
            Some((key, value))
        })
        .collect()
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_json(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// `version` is already downgraded to `"1"` by the caller when status was
/// overridden; `status` is always the *original* error status, since a
/// callback-wrapped v1 body still reports it even though the outer HTTP
/// status becomes 200.
fn render_error_body(version: &str, output: &str, message: &str, status: u16, callback: Option<&str>) -> String {
    let is_v1 = version == "1";
    let json_message = escape_json(message);

    let json_body = if is_v1 {
        format!("{{\"status\": {{\"message\": \"{json_message}\", \"status_code\": {status}}}}}")
    } else {
        format!("{{\"status\": {{\"message\": \"{json_message}\"}}}}")
    };

    if output == "json" || callback.is_some() {
        match callback {
            Some(cb) => format!("{cb}({json_body});"),
            None => json_body,
        }
    } else {
        let xml_message = escape_xml(message);
        if is_v1 {
            format!("<status><status_code>{status}</status_code><message>{xml_message}</message></status>")
        } else {
            format!("<status><message>{xml_message}</message></status>")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingora_http::RequestHeader;

    fn ctx_with_query(query: &str) -> RequestContext {
        let uri = format!("/foo?{query}");
        RequestContext::new(RequestHeader::build("GET", uri.as_bytes(), None).unwrap())
    }

    #[tokio::test]
    async fn default_v1_xml_includes_status_code() {
        let mut ctx = ctx_with_query("");
        ctx.set_throwable(GatewayError::new(501, "no-vip", "default VIP or host not defined"));

        ErrorResponseFilter.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.response_status_code(), Some(501));
        let body = String::from_utf8(ctx.response_body().unwrap().to_vec()).unwrap();
        assert!(body.contains("<status_code>501</status_code>"));
        assert!(body.contains("default VIP or host not defined"));
        assert_eq!(
            ctx.gateway_response_headers(),
            &[("X-Netflix-Error-Cause".to_string(), "Zuul Error: no-vip".to_string())]
        );
    }

    #[tokio::test]
    async fn v2_json_with_callback_forces_200_and_keeps_original_status_code() {
        let mut ctx = ctx_with_query("v=2.0&output=json&callback=cb");
        ctx.set_throwable(GatewayError::new(500, "boom", "test"));

        ErrorResponseFilter.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.response_status_code(), Some(200));
        let body = String::from_utf8(ctx.response_body().unwrap().to_vec()).unwrap();
        assert_eq!(body, "cb({\"status\": {\"message\": \"test\", \"status_code\": 500}});");
    }

    #[tokio::test]
    async fn unknown_cause_uses_zuul_error_cause_header() {
        let mut ctx = ctx_with_query("");
        ctx.set_throwable(GatewayError::new(500, "", "oops"));

        ErrorResponseFilter.run(&mut ctx).await.unwrap();

        assert_eq!(
            ctx.gateway_response_headers(),
            &[("X-Zuul-Error-Cause".to_string(), "Zuul Error UNKNOWN Cause".to_string())]
        );
    }

    #[tokio::test]
    async fn error_handled_is_set_after_running() {
        let mut ctx = ctx_with_query("");
        ctx.set_throwable(GatewayError::new(500, "x", "x"));
        ErrorResponseFilter.run(&mut ctx).await.unwrap();
        assert!(ctx.error_handled());
    }
}
