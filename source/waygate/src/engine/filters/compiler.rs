//! Turns a filter script's source bytes into an executable [`Filter`].
//!
//! `FilterCompiler` is the seam: the core never inspects the compiled
//! object beyond the filter contract, so other backends (dynamic library
//! loading, pre-registered native filters) can be swapped in without
//! touching the Loader or Processor. The supplied backend embeds
//! [`rhai`], evaluating top-level `const KIND`/`const ORDER` declarations
//! for filter metadata and calling script-defined `should_run`/`run`
//! functions per invocation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rhai::{Dynamic, Engine, Scope, AST};

use crate::context::{ContextValue, RequestContext};
use crate::error::{ConfigError, GatewayError};

use super::Filter;

/// Compiles a filter script's source bytes into a [`Filter`] instance.
/// Failure surfaces a [`ConfigError`] that the Loader logs and discards --
/// the previous instance for the same path, if any, is kept serving.
pub trait FilterCompiler: Send + Sync {
    fn compile(&self, source: &[u8], path: &str) -> Result<Arc<dyn Filter>, ConfigError>;
}

/// The rhai-backed adapter. A script's shape:
///
/// ```text
/// const KIND = "pre";
/// const ORDER = 10;
///
/// fn should_run(ctx) { true }
/// fn run(ctx) { ctx.routeVIP = "api"; ctx }
/// ```
///
/// `run` receives and returns a plain object map mirroring the context's
/// string-keyed view (see [`crate::context::RequestContext::get`]); the
/// compiler merges the returned map back into the real context after the
/// call. A script raises a gateway error with `throw #{status: 501,
/// cause: "...", message: "..."};`.
pub struct RhaiCompiler {
    engine: Arc<Engine>,
}

impl Default for RhaiCompiler {
    fn default() -> Self {
        Self { engine: Arc::new(Engine::new()) }
    }
}

impl RhaiCompiler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FilterCompiler for RhaiCompiler {
    fn compile(&self, source: &[u8], path: &str) -> Result<Arc<dyn Filter>, ConfigError> {
        let text = std::str::from_utf8(source)
            .map_err(|e| ConfigError::new(path, "source is not valid UTF-8").with_source(e))?;

        let ast = self
            .engine
            .compile(text)
            .map_err(|e| ConfigError::new(path, e.to_string()))?;

        let mut scope = Scope::new();
        let _: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, &ast)
            .map_err(|e| ConfigError::new(path, format!("evaluating top-level declarations: {e}")))?;

        let kind = scope.get_value::<String>("KIND").unwrap_or_else(|| "pre".to_string());
        let order = scope.get_value::<i64>("ORDER").unwrap_or(0) as i32;
        let name = scope
            .get_value::<String>("NAME")
            .unwrap_or_else(|| default_name_from_path(path));

        Ok(Arc::new(RhaiFilter {
            name,
            kind,
            order,
            ast,
            engine: self.engine.clone(),
        }))
    }
}

fn default_name_from_path(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

struct RhaiFilter {
    name: String,
    kind: String,
    order: i32,
    ast: AST,
    engine: Arc<Engine>,
}

#[derive(Debug)]
struct RhaiRuntimeError(String);

impl fmt::Display for RhaiRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::error::Error for RhaiRuntimeError {}

fn context_to_rhai_map(ctx: &RequestContext) -> rhai::Map {
    let mut map = rhai::Map::new();
    map.insert(
        "routeVIP".into(),
        ctx.route_vip().map(|v| Dynamic::from(v.to_string())).unwrap_or(Dynamic::UNIT),
    );
    map.insert(
        "route".into(),
        ctx.route().map(|v| Dynamic::from(v.to_string())).unwrap_or(Dynamic::UNIT),
    );
    map.insert(
        "requestPath".into(),
        Dynamic::from(ctx.effective_path().to_string()),
    );
    map.insert("sendZuulResponse".into(), Dynamic::from(ctx.send_gateway_response()));
    map.insert(
        "responseStatusCode".into(),
        ctx.response_status_code().map(|c| Dynamic::from(c as i64)).unwrap_or(Dynamic::UNIT),
    );
    map.insert(
        "responseBody".into(),
        ctx.response_body()
            .map(|b| Dynamic::from(String::from_utf8_lossy(b).into_owned()))
            .unwrap_or(Dynamic::UNIT),
    );
    map.insert(
        "zuulResponseHeaders".into(),
        Dynamic::from(headers_to_rhai_array(ctx.gateway_response_headers())),
    );
    map
}

/// `[{"name": "...", "value": "..."}, ...]` -- readable from script, and
/// round-trips through [`rhai_array_to_headers`] after a filter appends to
/// the list it read and returns the whole thing back.
fn headers_to_rhai_array(headers: &[(String, String)]) -> rhai::Array {
    headers
        .iter()
        .map(|(name, value)| {
            let mut entry = rhai::Map::new();
            entry.insert("name".into(), Dynamic::from(name.clone()));
            entry.insert("value".into(), Dynamic::from(value.clone()));
            Dynamic::from_map(entry)
        })
        .collect()
}

fn rhai_array_to_headers(array: rhai::Array) -> Vec<(String, String)> {
    array
        .into_iter()
        .filter_map(|entry| entry.try_cast::<rhai::Map>())
        .map(|entry| {
            let name = entry.get("name").map(|v| v.to_string()).unwrap_or_default();
            let value = entry.get("value").map(|v| v.to_string()).unwrap_or_default();
            (name, value)
        })
        .collect()
}

fn apply_rhai_map(ctx: &mut RequestContext, value: &Dynamic, key: &str) {
    if value.is_unit() {
        return;
    }
    let context_value = if let Some(array) = value.clone().try_cast::<rhai::Array>() {
        ContextValue::Headers(rhai_array_to_headers(array))
    } else if let Some(s) = value.clone().try_cast::<String>() {
        ContextValue::String(s)
    } else if let Some(b) = value.clone().try_cast::<bool>() {
        ContextValue::Bool(b)
    } else if let Some(i) = value.clone().try_cast::<i64>() {
        ContextValue::Integer(i)
    } else if let Some(f) = value.clone().try_cast::<f64>() {
        ContextValue::Float(f)
    } else {
        ContextValue::String(value.to_string())
    };
    ctx.set(key, context_value);
}

fn gateway_error_from_thrown(value: Dynamic, stage: &str, filter_name: &str) -> GatewayError {
    if let Some(map) = value.clone().try_cast::<rhai::Map>() {
        let status = map.get("status").and_then(|v| v.as_int().ok()).unwrap_or(500) as u16;
        let cause = map
            .get("cause")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let message = map
            .get("message")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "filter raised an error".to_string());
        GatewayError::new(status, cause, message)
    } else {
        GatewayError::uncaught(stage, Some(filter_name)).with_source(RhaiRuntimeError(value.to_string()))
    }
}

#[async_trait]
impl Filter for RhaiFilter {
    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> &str {
        &self.kind
    }
    fn order(&self) -> i32 {
        self.order
    }

    async fn should_run(&self, ctx: &RequestContext) -> bool {
        let mut scope = Scope::new();
        let map = context_to_rhai_map(ctx);
        self.engine
            .call_fn::<bool>(&mut scope, &self.ast, "should_run", (map,))
            .unwrap_or(true)
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<Option<bool>, GatewayError> {
        let mut scope = Scope::new();
        let map = context_to_rhai_map(ctx);

        let result = self
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.ast, "run", (map,))
            .map_err(|err| match *err {
                rhai::EvalAltResult::ErrorRuntime(value, _) => {
                    gateway_error_from_thrown(value, &self.kind.to_uppercase(), &self.name)
                }
                other => GatewayError::uncaught(&self.kind.to_uppercase(), Some(&self.name))
                    .with_source(RhaiRuntimeError(other.to_string())),
            })?;

        if let Some(returned) = result.clone().try_cast::<rhai::Map>() {
            for (key, value) in returned.iter() {
                apply_rhai_map(ctx, value, key.as_str());
            }
            Ok(None)
        } else if let Some(b) = result.try_cast::<bool>() {
            Ok(Some(b))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn compiles_metadata_from_top_level_consts() {
        let compiler = RhaiCompiler::new();
        let filter = compiler
            .compile(
                br#"
                    const KIND = "pre";
                    const ORDER = 7;
                    fn run(ctx) { ctx }
                "#,
                "a.rhai",
            )
            .unwrap();

        assert_eq!(filter.kind(), "pre");
        assert_eq!(filter.order(), 7);
        assert_eq!(filter.name(), "a");
    }

    #[tokio::test]
    async fn run_merges_returned_map_into_context() {
        let compiler = RhaiCompiler::new();
        let filter = compiler
            .compile(
                br#"
                    const KIND = "pre";
                    const ORDER = 1;
                    fn run(ctx) {
                        ctx.routeVIP = "api";
                        ctx
                    }
                "#,
                "set_vip.rhai",
            )
            .unwrap();

        let mut ctx = RequestContext::new(pingora_http::RequestHeader::build("GET", b"/", None).unwrap());
        filter.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.route_vip(), Some("api"));
    }

    #[tokio::test]
    async fn run_can_append_a_response_header() {
        let compiler = RhaiCompiler::new();
        let filter = compiler
            .compile(
                br#"
                    const KIND = "post";
                    const ORDER = 1;
                    fn run(ctx) {
                        ctx.zuulResponseHeaders.push(#{name: "X-R", value: "1"});
                        ctx
                    }
                "#,
                "add_header.rhai",
            )
            .unwrap();

        let mut ctx = RequestContext::new(pingora_http::RequestHeader::build("GET", b"/", None).unwrap());
        filter.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.gateway_response_headers(), &[("X-R".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn thrown_map_becomes_gateway_error() {
        let compiler = RhaiCompiler::new();
        let filter = compiler
            .compile(
                br#"
                    const KIND = "pre";
                    const ORDER = 1;
                    fn run(ctx) {
                        throw #{status: 501, cause: "no-vip", message: "no backend"};
                    }
                "#,
                "fail.rhai",
            )
            .unwrap();

        let mut ctx = RequestContext::new(pingora_http::RequestHeader::build("GET", b"/", None).unwrap());
        let err = filter.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.status, 501);
        assert_eq!(err.error_cause, "no-vip");
    }

    #[test]
    fn invalid_syntax_is_a_config_error() {
        let compiler = RhaiCompiler::new();
        let err = match compiler.compile(b"fn run(ctx) {", "broken.rhai") {
            Err(err) => err,
            Ok(_) => panic!("expected a compile error"),
        };
        assert_eq!(err.path, "broken.rhai");
    }
}
