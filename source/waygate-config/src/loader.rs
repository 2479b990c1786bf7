use crate::{
    cli::{apply_cli, Cli},
    error::SettingsError,
    settings::{EngineSettings, RawSettings},
};

/// Loads [`EngineSettings`] from an optional TOML file, then layers CLI
/// overrides on top. Mirrors the load-then-override shape the rest of the
/// gateway's config stack uses, minus the file-watching: settings are read
/// once at startup, the live filter set is what's reloaded continuously.
pub fn load_settings(cli: &Cli) -> Result<EngineSettings, SettingsError> {
    let mut settings = match &cli.config {
        Some(path) if path.exists() => {
            tracing::info!(path = %path.display(), "loading engine settings");
            RawSettings::from_file(path)?.into_settings()?
        }
        Some(path) => {
            tracing::warn!(path = %path.display(), "settings file not found, using defaults");
            EngineSettings::default()
        }
        None => EngineSettings::default(),
    };

    apply_cli(&mut settings, cli);
    check_explicit_directories_exist(&settings)?;

    Ok(settings)
}

/// A directory the operator explicitly pointed at (via the settings file or
/// a CLI flag) that doesn't exist on disk is a startup-time misconfiguration,
/// not something to silently scan-and-find-nothing -- fail fast. The
/// untouched built-in defaults are exempt: a fresh checkout with no
/// `filters/` tree yet should still start, since the FileManager treats an
/// empty/missing directory as "no filters of this kind" on its own.
fn check_explicit_directories_exist(settings: &EngineSettings) -> Result<(), SettingsError> {
    let defaults = EngineSettings::default();

    for (kind, path) in settings.directories.iter() {
        let is_untouched_default = match kind.as_str() {
            "pre" => path == &defaults.directories.pre,
            "route" => path == &defaults.directories.route,
            "post" => path == &defaults.directories.post,
            "error" => Some(path) == defaults.directories.error.as_ref(),
            _ => false,
        };

        if !is_untouched_default && !path.exists() {
            return Err(SettingsError::MissingDirectory {
                kind,
                path: path.display().to_string(),
            });
        }
    }

    Ok(())
}
