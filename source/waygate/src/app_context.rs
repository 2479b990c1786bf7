//! Bootstrap wiring: turns [`waygate_config::settings::EngineSettings`] into
//! a running [`crate::pipeline::PipelineRunner`] backed by a live
//! [`FilterFileManager`] poller.
//!
//! The HTTP front end that would hand requests to the pipeline is outside
//! this crate's scope (see the crate docs); `AppContext` stops at having a
//! pipeline ready to drive and a poller keeping it current.

use std::sync::Arc;

use waygate_config::settings::EngineSettings;

use waygate::debug::TracingUsageNotifier;
use waygate::engine::filters::builtin::error_response::ErrorResponseFilter;
use waygate::engine::filters::compiler::RhaiCompiler;
use waygate::engine::filters::file_manager::{FileManagerHandle, FilterFileManager, WatchedDirectory};
use waygate::engine::filters::loader::FilterLoader;
use waygate::engine::filters::processor::FilterProcessor;
use waygate::pipeline::PipelineRunner;

pub struct AppContext {
    pub pipeline: Arc<PipelineRunner>,
    file_manager: Arc<FilterFileManager>,
}

impl AppContext {
    /// Builds the loader/registry/processor/pipeline stack from `settings`
    /// and registers the builtin ERROR filter. Does not start polling yet
    /// -- call [`AppContext::ready`] for that.
    pub fn bootstrap(settings: &EngineSettings) -> Self {
        let loader = Arc::new(FilterLoader::new(Arc::new(RhaiCompiler::new())));
        loader.registry().put("error-response", Arc::new(ErrorResponseFilter));
        loader.rebuild_sequences();

        let processor = Arc::new(FilterProcessor::new(loader.clone(), Arc::new(TracingUsageNotifier)));
        let pipeline = Arc::new(PipelineRunner::new(processor));

        let directories: Vec<WatchedDirectory> = settings
            .directories
            .iter()
            .map(|(kind, path)| WatchedDirectory { kind, path: path.clone() })
            .collect();

        let file_manager = Arc::new(FilterFileManager::new(
            loader,
            directories,
            settings.poll_interval,
            settings.script_extension.clone(),
        ));

        Self { pipeline, file_manager }
    }

    /// Starts the background poller. Returns a handle the caller shuts down
    /// on exit.
    pub fn ready(&self) -> FileManagerHandle {
        tracing::info!("starting filter directory poller");
        self.file_manager.clone().start()
    }
}
