//! Compiler configuration.

use std::path::{Path, PathBuf};

use ck_renderer::RenderOptions;
use serde::Deserialize;

/// Error loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid YAML for this schema.
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Build-wide compiler settings, usually loaded from `config.yaml`.
///
/// All fields have defaults, so a missing or partial file still yields a
/// working configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Directory containing one subdirectory per course, plus `shared/`.
    pub content_dir: PathBuf,
    /// Directory receiving the `data_<locale>.json` artifacts.
    pub output_dir: PathBuf,
    /// Site domain; links elsewhere open in a new tab.
    pub domain: String,
    /// Locales to compile. Courses missing a translation are skipped for
    /// that locale; English is the fallback for localization files.
    pub locales: Vec<String>,
    /// Base URL for emoji images.
    pub emoji_url: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            output_dir: PathBuf::from("public/content"),
            domain: "example.org".to_owned(),
            locales: vec!["en".to_owned()],
            emoji_url: "https://static.example.org/emoji".to_owned(),
        }
    }
}

impl CompilerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Render options for one locale of this configuration.
    #[must_use]
    pub fn render_options(&self, locale: &str) -> RenderOptions {
        RenderOptions {
            locale: locale.to_owned(),
            domain: self.domain.clone(),
            emoji_url: self.emoji_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.content_dir, PathBuf::from("content"));
        assert_eq!(config.locales, vec!["en".to_owned()]);
    }

    #[test]
    fn test_from_file_partial() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "domain: mathspace.test\nlocales: [en, de]\n").unwrap();

        let config = CompilerConfig::from_file(&path).unwrap();
        assert_eq!(config.domain, "mathspace.test");
        assert_eq!(config.locales, vec!["en".to_owned(), "de".to_owned()]);
        // Unspecified fields keep their defaults.
        assert_eq!(config.output_dir, PathBuf::from("public/content"));
    }

    #[test]
    fn test_from_file_invalid() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "locales: {broken").unwrap();
        assert!(matches!(
            CompilerConfig::from_file(&path),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_render_options() {
        let config = CompilerConfig::default();
        let options = config.render_options("de");
        assert_eq!(options.locale, "de");
        assert_eq!(options.domain, "example.org");
    }
}
