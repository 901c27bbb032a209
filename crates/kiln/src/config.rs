//! Configuration file (kiln.toml) and project setup.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kiln_assets::{AssetBuilder, BuildConfig, PathTable};
use kiln_server::DevServerConfig;
use serde::Deserialize;

/// Configuration file structure (kiln.toml).
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub build: BuildSettings,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_output")]
    pub output: String,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub open: bool,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildSettings {
    /// Inline source maps in stylesheets
    #[serde(default = "default_true")]
    pub sourcemaps: bool,
    #[serde(default = "default_true")]
    pub minify_js: bool,
    /// Fail the html task on lint findings instead of warning
    #[serde(default)]
    pub lint_fails_build: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            output: default_output(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            open: true,
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            sourcemaps: true,
            minify_js: true,
            lint_fails_build: false,
        }
    }
}

fn default_source() -> String {
    "src".to_string()
}
fn default_output() -> String {
    "dist".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_true() -> bool {
    true
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        tracing::debug!("No {} found, using defaults", path.display());
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// A project: its root directory and configuration.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub config: ConfigFile,
}

impl Project {
    /// Load the config file; the project root is the current directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let root = std::env::current_dir().context("Failed to read current directory")?;
        Ok(Self {
            config: load_config(&root.join(config_path))?,
            root,
        })
    }

    /// Build settings resolved against the project root.
    pub fn build_config(&self) -> BuildConfig {
        BuildConfig {
            root: self.root.clone(),
            paths: PathTable::new(&self.config.paths.source, &self.config.paths.output),
            sourcemaps: self.config.build.sourcemaps,
            minify_js: self.config.build.minify_js,
            lint_fails_build: self.config.build.lint_fails_build,
        }
    }

    pub fn builder(&self) -> AssetBuilder {
        AssetBuilder::new(self.build_config())
    }

    /// Server settings, with command-line overrides applied.
    pub fn server_config(&self, port: Option<u16>, open: bool) -> DevServerConfig {
        DevServerConfig {
            root: self.build_config().output_dir(),
            port: port.unwrap_or(self.config.server.port),
            host: self.config.server.host.clone(),
            open: open && self.config.server.open,
        }
    }
}
