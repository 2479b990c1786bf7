//! End-to-end scenarios driving real `.rhai` files through a temp
//! directory, the file manager's scanner, and the pipeline -- the same
//! path a deployed gateway takes, minus the HTTP front end.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pingora_http::RequestHeader;
use tempfile::TempDir;
use waygate::debug::TracingUsageNotifier;
use waygate::engine::filters::builtin::error_response::ErrorResponseFilter;
use waygate::engine::filters::compiler::RhaiCompiler;
use waygate::engine::filters::file_manager::{FilterFileManager, WatchedDirectory};
use waygate::engine::filters::loader::FilterLoader;
use waygate::engine::filters::processor::FilterProcessor;
use waygate::pipeline::PipelineRunner;

struct Harness {
    _pre_dir: TempDir,
    _route_dir: TempDir,
    _post_dir: TempDir,
    loader: Arc<FilterLoader>,
    manager: Arc<FilterFileManager>,
    pipeline: PipelineRunner,
    seen: HashSet<String>,
}

impl Harness {
    fn new() -> Self {
        let pre_dir = tempfile::tempdir().unwrap();
        let route_dir = tempfile::tempdir().unwrap();
        let post_dir = tempfile::tempdir().unwrap();

        let loader = Arc::new(FilterLoader::new(Arc::new(RhaiCompiler::new())));
        loader.registry().put("error-response", Arc::new(ErrorResponseFilter));
        loader.rebuild_sequences();

        let manager = Arc::new(FilterFileManager::new(
            loader.clone(),
            vec![
                WatchedDirectory { kind: "pre".into(), path: pre_dir.path().to_path_buf() },
                WatchedDirectory { kind: "route".into(), path: route_dir.path().to_path_buf() },
                WatchedDirectory { kind: "post".into(), path: post_dir.path().to_path_buf() },
            ],
            Duration::from_millis(50),
            "rhai",
        ));

        let processor = Arc::new(FilterProcessor::new(loader.clone(), Arc::new(TracingUsageNotifier)));
        let pipeline = PipelineRunner::new(processor);

        Self { _pre_dir: pre_dir, _route_dir: route_dir, _post_dir: post_dir, loader, manager, pipeline, seen: HashSet::new() }
    }

    fn pre_path(&self) -> std::path::PathBuf {
        self._pre_dir.path().to_path_buf()
    }
    fn route_path(&self) -> std::path::PathBuf {
        self._route_dir.path().to_path_buf()
    }
    fn post_path(&self) -> std::path::PathBuf {
        self._post_dir.path().to_path_buf()
    }

    async fn scan(&mut self) {
        self.manager.scan_once(&mut self.seen).await;
    }

    async fn request(&self, path: &str) -> waygate::context::RequestContext {
        self.pipeline.run(RequestHeader::build("GET", path.as_bytes(), None).unwrap()).await
    }
}

#[tokio::test]
async fn s1_happy_pre_route_post() {
    let mut h = Harness::new();
    std::fs::write(
        h.pre_path().join("set_vip.rhai"),
        r#"const KIND = "pre"; const ORDER = 1;
           fn run(ctx) { ctx.routeVIP = "api"; ctx }"#,
    )
    .unwrap();
    std::fs::write(
        h.route_path().join("respond.rhai"),
        r#"const KIND = "route"; const ORDER = 1;
           fn run(ctx) { ctx.responseStatusCode = 200; ctx.responseBody = "ok"; ctx }"#,
    )
    .unwrap();
    std::fs::write(
        h.post_path().join("tag.rhai"),
        r#"const KIND = "post"; const ORDER = 1;
           fn run(ctx) {
               ctx.zuulResponseHeaders.push(#{name: "X-R", value: "1"});
               ctx
           }"#,
    )
    .unwrap();
    h.scan().await;

    let ctx = h.request("/foo").await;
    assert_eq!(ctx.response_status_code(), Some(200));
    assert_eq!(ctx.response_body(), Some(b"ok".as_slice()));
    assert_eq!(ctx.filter_execution_summary().len(), 3);
    assert_eq!(ctx.gateway_response_headers(), &[("X-R".to_string(), "1".to_string())]);
}

#[tokio::test]
async fn s2_error_in_pre_runs_post_and_produces_error_body() {
    let mut h = Harness::new();
    std::fs::write(
        h.pre_path().join("fail.rhai"),
        r#"const KIND = "pre"; const ORDER = 1;
           fn run(ctx) {
               throw #{status: 501, cause: "zuul.niws.defaultClient or zuul.default.host not defined",
                       message: "default VIP or host not defined for route"};
           }"#,
    )
    .unwrap();
    h.scan().await;

    let ctx = h.request("/").await;
    assert_eq!(ctx.response_status_code(), Some(501));
    let body = String::from_utf8(ctx.response_body().unwrap().to_vec()).unwrap();
    assert!(body.contains("<status_code>501</status_code>"));
    assert!(body.contains("default VIP or host not defined"));
}

#[tokio::test]
async fn s3_error_body_v2_json_with_callback() {
    let mut h = Harness::new();
    std::fs::write(
        h.pre_path().join("fail.rhai"),
        r#"const KIND = "pre"; const ORDER = 1;
           fn run(ctx) { throw #{status: 500, cause: "boom", message: "test"}; }"#,
    )
    .unwrap();
    h.scan().await;

    let ctx = h.request("/?v=2.0&output=json&callback=cb").await;
    assert_eq!(ctx.response_status_code(), Some(200));
    let body = String::from_utf8(ctx.response_body().unwrap().to_vec()).unwrap();
    assert_eq!(body, "cb({\"status\": {\"message\": \"test\", \"status_code\": 500}});");
}

#[tokio::test]
async fn s4_hot_reload_picks_up_edits_and_new_files() {
    let mut h = Harness::new();
    std::fs::write(
        h.pre_path().join("a.rhai"),
        r#"const KIND = "pre"; const ORDER = 1;
           fn run(ctx) { ctx.a_ran = "1"; ctx }"#,
    )
    .unwrap();
    h.scan().await;
    assert_eq!(h.loader.filters_by_kind("pre").len(), 1);

    std::fs::write(
        h.pre_path().join("a.rhai"),
        r#"const KIND = "pre"; const ORDER = 3;
           fn run(ctx) { ctx.a_ran = "new"; ctx }"#,
    )
    .unwrap();
    std::fs::write(
        h.pre_path().join("b.rhai"),
        r#"const KIND = "pre"; const ORDER = 2;
           fn run(ctx) { ctx.b_ran = "1"; ctx }"#,
    )
    .unwrap();
    h.scan().await;

    let sequence = h.loader.filters_by_kind("pre");
    let names: Vec<&str> = sequence.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["b", "a"]);
    assert_eq!(sequence[1].order(), 3);
}

#[tokio::test]
async fn s5_bad_compile_preserves_old_instance() {
    let mut h = Harness::new();
    std::fs::write(
        h.pre_path().join("good.rhai"),
        r#"const KIND = "pre"; const ORDER = 1;
           fn run(ctx) { ctx.tag = "good"; ctx }"#,
    )
    .unwrap();
    h.scan().await;
    let before = h.loader.filters_by_kind("pre")[0].clone();

    std::fs::write(h.pre_path().join("good.rhai"), "fn run(ctx) {").unwrap();
    h.scan().await;
    let after = h.loader.filters_by_kind("pre")[0].clone();

    assert!(Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn s6_post_error_triggers_error_stage_once() {
    let mut h = Harness::new();
    std::fs::write(
        h.post_path().join("fail.rhai"),
        r#"const KIND = "post"; const ORDER = 1;
           fn run(ctx) { throw #{status: 500, cause: "X", message: "boom"}; }"#,
    )
    .unwrap();
    h.scan().await;

    let ctx = h.request("/").await;
    assert!(ctx.error_handled());
    let error_runs = ctx.filter_execution_summary().iter().filter(|r| r.filter_name == "error-response").count();
    assert_eq!(error_runs, 1);
    assert_eq!(
        ctx.gateway_response_headers(),
        &[("X-Netflix-Error-Cause".to_string(), "Zuul Error: X".to_string())]
    );
}
