//! Configuration file loading and template generation.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use super::Config;
use crate::error::{Error, Result};

const TEMPLATE_BANNER: &str = "\
# Puzzle-box controller configuration.
#
# This file was generated with stock defaults. Review every value before
# starting a session; all fields are optional and fall back to the values
# shown here. Trial templates are ANSWER-CUE pairs: the answer character
# is R, L, E (either), I (input), S (same as preference) or O (opposite
# from preference); the cue character is R, L, B (both) or N (neither).

";

impl Config {
    /// Load the configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read,
    /// [`Error::ConfigSyntax`] on bad TOML, or [`Error::Config`] when
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        info!(path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    /// Load the configuration, or generate a template and stop.
    ///
    /// On first run with no configuration present, a template with stock
    /// defaults is written to `path` and [`Error::TemplateCreated`] is
    /// returned: the operator must review the template before restart.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateCreated`] after writing a template, or any
    /// error from [`Config::load`].
    pub fn load_or_template<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        warn!(path = %path.display(), "configuration file not found, writing template");
        Self::default().write_template(path)?;
        Err(Error::TemplateCreated { path: path.to_path_buf() })
    }

    /// Write this configuration as a commented template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be written.
    pub fn write_template(&self, path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialize template: {e}")))?;
        fs::write(path, format!("{TEMPLATE_BANNER}{body}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("puzzlebox.toml");

        // First load writes a template and stops.
        let err = Config::load_or_template(&path).unwrap_err();
        assert!(matches!(err, Error::TemplateCreated { .. }));
        assert!(path.exists());

        // Second load parses the template back to the defaults.
        let config = Config::load_or_template(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_rejects_bad_syntax() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("puzzlebox.toml");
        fs::write(&path, "[blocks\ntrials_in_block = 4").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::ConfigSyntax(_))));
    }

    #[test]
    fn test_load_runs_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("puzzlebox.toml");
        fs::write(&path, "[blocks]\ntrials_in_block = 0\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }
}
