//! The per-request context shared by every filter in a pipeline run.
//!
//! The upstream system this is modeled on keeps one ambient, thread-local
//! context per request. Here ownership is explicit instead (see the design
//! notes this crate grew out of): a [`RequestContext`] is built once at
//! `INIT`, threaded through every filter call as `&mut`, and dropped at
//! `DONE`. Nothing reaches for it ambiently; the type system enforces the
//! "exactly one context per pipeline run" invariant for free.
//!
//! Well-known fields (routing target, response body, error state, ...) are
//! ordinary typed struct fields. Anything else a filter wants to stash goes
//! through [`RequestContext::set`]/[`RequestContext::get`], a string-keyed
//! escape hatch backed by [`ContextValue`].

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use http::{uri::PathAndQuery, Uri};
use pingora_http::{RequestHeader, ResponseHeader};

use crate::error::GatewayError;

/// A dynamically-typed value for the context's string-keyed escape hatch.
/// Mirrors the tagged-union shape used for filter configuration values
/// elsewhere in the gateway, rather than reaching for an opaque `Any`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Headers(Vec<(String, String)>),
    Null,
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Headers(h) => write!(f, "{h:?}"),
            Self::Null => f.write_str(""),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
impl From<String> for ContextValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}
impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

/// Status a single filter invocation finished in, recorded into the
/// execution summary and reported to the usage notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStatus {
    Success,
    Failed,
    Skipped,
    Disabled,
}

impl fmt::Display for FilterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
            Self::Disabled => "DISABLED",
        };
        f.write_str(s)
    }
}

/// One entry in the execution summary: which filter ran, how it finished,
/// and how long it took.
#[derive(Debug, Clone)]
pub struct FilterExecutionRecord {
    pub filter_name: String,
    pub status: FilterStatus,
    pub elapsed: Duration,
}

/// A cheap, shallow copy of the extension map plus the fields the debug
/// trail cares about -- used by `Debug.compareContextState` to diff context
/// before/after a filter runs without holding a live borrow across the call.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    pub extras: HashMap<String, ContextValue>,
    pub route: Option<String>,
    pub route_vip: Option<String>,
    pub response_status_code: Option<u16>,
}

/// Request-scoped, mutable state shared by every filter in a single
/// pipeline run. Never shared across concurrent requests: a fresh
/// `RequestContext` is created per run and dropped at `DONE`.
pub struct RequestContext {
    pub request: RequestHeader,
    pub response: ResponseHeader,

    route_host: Option<Uri>,
    route_vip: Option<String>,
    route: Option<String>,
    request_uri: Option<PathAndQuery>,
    send_gateway_response: bool,

    response_body: Option<Vec<u8>>,
    response_status_code: Option<u16>,
    gateway_response_headers: Vec<(String, String)>,

    throwable: Option<Arc<GatewayError>>,
    error_handled: bool,

    pub debug_routing: bool,
    pub debug_request: bool,

    filter_execution_summary: Vec<FilterExecutionRecord>,
    event_properties: HashMap<String, ContextValue>,
    extras: HashMap<String, ContextValue>,
    routing_debug_trail: Vec<String>,
}

impl RequestContext {
    /// `INIT`: place the request/response handles and start with an empty
    /// map. Called exactly once per pipeline run.
    pub fn new(request: RequestHeader) -> Self {
        Self {
            request,
            response: ResponseHeader::build(200, None).expect("status 200 always builds"),
            route_host: None,
            route_vip: None,
            route: None,
            request_uri: None,
            send_gateway_response: true,
            response_body: None,
            response_status_code: None,
            gateway_response_headers: Vec::new(),
            throwable: None,
            error_handled: false,
            debug_routing: false,
            debug_request: false,
            filter_execution_summary: Vec::new(),
            event_properties: HashMap::new(),
            extras: HashMap::new(),
            routing_debug_trail: Vec::new(),
        }
    }

    // -- well-known typed accessors -----------------------------------

    pub fn route_host(&self) -> Option<&Uri> {
        self.route_host.as_ref()
    }
    pub fn set_route_host(&mut self, host: Uri) {
        self.route_host = Some(host);
    }

    pub fn route_vip(&self) -> Option<&str> {
        self.route_vip.as_deref()
    }
    pub fn set_route_vip(&mut self, vip: impl Into<String>) {
        self.route_vip = Some(vip.into());
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }
    pub fn set_route(&mut self, route: impl Into<String>) {
        self.route = Some(route.into());
    }

    pub fn request_uri(&self) -> Option<&PathAndQuery> {
        self.request_uri.as_ref()
    }
    pub fn set_request_uri(&mut self, uri: PathAndQuery) {
        self.request_uri = Some(uri);
    }

    /// Effective path ROUTE should observe: the PRE-rewritten `request_uri`
    /// if one was set, otherwise the original request's path.
    pub fn effective_path(&self) -> &str {
        self.request_uri
            .as_ref()
            .map(|p| p.path())
            .unwrap_or_else(|| self.request.uri.path())
    }

    pub fn send_gateway_response(&self) -> bool {
        self.send_gateway_response
    }
    pub fn set_send_gateway_response(&mut self, send: bool) {
        self.send_gateway_response = send;
    }

    pub fn response_body(&self) -> Option<&[u8]> {
        self.response_body.as_deref()
    }
    pub fn set_response_body(&mut self, body: impl Into<Vec<u8>>) {
        self.response_body = Some(body.into());
    }

    pub fn response_status_code(&self) -> Option<u16> {
        self.response_status_code
    }
    pub fn set_response_status_code(&mut self, code: u16) {
        self.response_status_code = Some(code);
    }

    pub fn gateway_response_headers(&self) -> &[(String, String)] {
        &self.gateway_response_headers
    }
    pub fn add_gateway_response_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.gateway_response_headers.push((name.into(), value.into()));
    }

    /// Routing requires at least one of `route_host`/`route_vip` to be set
    /// by the time ROUTE runs.
    pub fn has_routing_target(&self) -> bool {
        self.route_host.is_some() || self.route_vip.is_some()
    }

    pub fn throwable(&self) -> Option<&GatewayError> {
        self.throwable.as_deref()
    }
    pub fn set_throwable(&mut self, err: GatewayError) {
        self.throwable = Some(Arc::new(err));
    }

    /// Monotonic: once true, stays true for the rest of the request (see
    /// the pipeline's at-most-one-ERROR-handling invariant).
    pub fn error_handled(&self) -> bool {
        self.error_handled
    }
    pub fn mark_error_handled(&mut self) {
        self.error_handled = true;
    }

    pub fn filter_execution_summary(&self) -> &[FilterExecutionRecord] {
        &self.filter_execution_summary
    }
    pub fn record_filter_execution(&mut self, filter_name: impl Into<String>, status: FilterStatus, elapsed: Duration) {
        self.filter_execution_summary.push(FilterExecutionRecord {
            filter_name: filter_name.into(),
            status,
            elapsed,
        });
    }

    pub fn event_properties(&self) -> &HashMap<String, ContextValue> {
        &self.event_properties
    }
    pub fn set_event_property(&mut self, key: impl Into<String>, value: ContextValue) {
        self.event_properties.insert(key.into(), value);
    }

    pub fn routing_debug_trail(&self) -> &[String] {
        &self.routing_debug_trail
    }
    pub fn add_routing_debug(&mut self, line: impl Into<String>) {
        if self.debug_routing {
            self.routing_debug_trail.push(line.into());
        }
    }

    // -- dynamic string-keyed bridge -----------------------------------
    //
    // Filters (especially compiled scripts, which can't call typed Rust
    // methods) go through `get`/`set`. Well-known keys dispatch to the
    // typed fields above; anything else lands in the extras map.

    pub fn get(&self, key: &str) -> Option<ContextValue> {
        match key {
            "routeVIP" => self.route_vip.clone().map(ContextValue::String),
            "route" => self.route.clone().map(ContextValue::String),
            "requestURI" => self.request_uri.as_ref().map(|u| ContextValue::String(u.to_string())),
            "sendZuulResponse" => Some(ContextValue::Bool(self.send_gateway_response)),
            "responseBody" => self
                .response_body
                .as_ref()
                .map(|b| ContextValue::String(String::from_utf8_lossy(b).into_owned())),
            "responseStatusCode" => self.response_status_code.map(|c| ContextValue::Integer(c as i64)),
            "zuulResponseHeaders" => Some(ContextValue::Headers(self.gateway_response_headers.clone())),
            "debugRouting" => Some(ContextValue::Bool(self.debug_routing)),
            "debugRequest" => Some(ContextValue::Bool(self.debug_request)),
            "errorHandled" => Some(ContextValue::Bool(self.error_handled)),
            _ => self.extras.get(key).cloned(),
        }
    }

    pub fn set(&mut self, key: impl AsRef<str>, value: ContextValue) {
        match key.as_ref() {
            "routeVIP" => self.route_vip = Some(value.to_string()),
            "route" => self.route = Some(value.to_string()),
            "sendZuulResponse" => {
                if let ContextValue::Bool(b) = value {
                    self.send_gateway_response = b;
                }
            }
            "responseBody" => self.response_body = Some(value.to_string().into_bytes()),
            "responseStatusCode" => {
                if let ContextValue::Integer(i) = value {
                    self.response_status_code = Some(i as u16);
                }
            }
            "zuulResponseHeaders" => {
                if let ContextValue::Headers(h) = value {
                    self.gateway_response_headers = h;
                }
            }
            "debugRouting" => {
                if let ContextValue::Bool(b) = value {
                    self.debug_routing = b;
                }
            }
            "debugRequest" => {
                if let ContextValue::Bool(b) = value {
                    self.debug_request = b;
                }
            }
            "errorHandled" => {
                if matches!(value, ContextValue::Bool(true)) {
                    self.error_handled = true;
                }
            }
            other => {
                self.extras.insert(other.to_string(), value);
            }
        }
    }

    /// Shallow snapshot for before/after diffing in debug mode.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            extras: self.extras.clone(),
            route: self.route.clone(),
            route_vip: self.route_vip.clone(),
            response_status_code: self.response_status_code,
        }
    }

    /// `DONE`: drop the context, releasing everything it held. Taking
    /// `self` by value means nothing can observe this context past this
    /// call.
    pub fn unset(self) {}
}

/// Diff state for a single extras key across two snapshots, for the
/// routing-debug trail's before/after view.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextDiff {
    Added(ContextValue),
    Removed(ContextValue),
    Changed { old: ContextValue, new: ContextValue },
}

/// Compare two snapshots taken before/after a filter ran, returning only
/// the keys that actually changed.
pub fn diff_snapshots(before: &ContextSnapshot, after: &ContextSnapshot) -> HashMap<String, ContextDiff> {
    let mut diff = HashMap::new();

    for (key, new_val) in &after.extras {
        match before.extras.get(key) {
            Some(old_val) if old_val == new_val => {}
            Some(old_val) => {
                diff.insert(key.clone(), ContextDiff::Changed { old: old_val.clone(), new: new_val.clone() });
            }
            None => {
                diff.insert(key.clone(), ContextDiff::Added(new_val.clone()));
            }
        }
    }

    for (key, old_val) in &before.extras {
        if !after.extras.contains_key(key) {
            diff.insert(key.clone(), ContextDiff::Removed(old_val.clone()));
        }
    }

    diff
}
