use miette::Diagnostic;
use thiserror::Error;

/// Failure to load or validate the engine's own settings (directories, poll
/// interval, ...). Distinct from a [`ConfigError`] inside the gateway crate,
/// which covers a single filter script failing to compile.
#[derive(Debug, Error, Diagnostic)]
pub enum SettingsError {
    #[error("failed to read settings file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid poll interval {raw:?}")]
    BadInterval {
        raw: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("configured {kind} filter directory does not exist: {path}")]
    MissingDirectory { kind: String, path: String },
}
