//! An embeddable edge-gateway filter execution engine: a per-request
//! pipeline (PRE -> ROUTE -> POST, with an ERROR side-branch) that runs
//! small scriptable filters hot-loaded from disk.
//!
//! The HTTP front end (socket accept, header parsing, body I/O), the
//! upstream client, service discovery, and observability sinks are outside
//! this crate's scope -- it consumes [`pingora_http::RequestHeader`] and
//! produces an in-memory response body/status/headers via
//! [`context::RequestContext`], and exposes hooks ([`debug::FilterUsageNotifier`])
//! for a host to wire into its own metrics.

pub mod context;
pub mod debug;
pub mod engine;
pub mod error;
pub mod pipeline;
