// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the configuration file that Quayside reads at
//! startup. Every credential and working path the service needs lives here as
//! an explicit field. No component performs ambient environment lookups; the
//! binary parses one [`Config`] and hands slices of it to each component at
//! construction.
//!
//! # Secrets
//!
//! Token fields go through shell expansion, so the configuration file can
//! reference environment variables instead of embedding secrets:
//!
//! ```toml
//! [github]
//! user = "octocat"
//! token = "$GITHUB_TOKEN"
//! ```

use serde::{Deserialize, Serialize};
use std::{
    env::temp_dir,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Top-level configuration layout.
///
/// Parsed from a TOML file via [`FromStr`], or loaded from disk through
/// [`Config::load`]. Every section is optional in the file; missing sections
/// fall back to their defaults, which is enough to run the normalizer locally
/// but not to publish (publishing needs real credentials).
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings.
    pub server: ServerConfig,

    /// Scratch directories for uploads and extracted trees.
    pub workspace: WorkspaceConfig,

    /// Repository host credentials and endpoint.
    pub github: GithubConfig,

    /// Static-site host credentials and endpoint.
    pub pages: PagesConfig,

    /// Site publishing policy.
    pub site: SiteConfig,

    /// Optional text-completion passthrough endpoint.
    pub inference: Option<InferenceConfig>,
}

impl Config {
    /// Load configuration from a file on disk.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadFile`] if the file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the contents fail to parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = read_to_string(path.as_ref()).map_err(|err| ConfigError::ReadFile {
            source: err,
            path: path.as_ref().to_path_buf(),
        })?;

        data.parse()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on path and secret fields.
        config.workspace.upload_dir = expand_path(&config.workspace.upload_dir)?;
        config.workspace.extract_dir = expand_path(&config.workspace.extract_dir)?;
        config.github.user = expand(&config.github.user)?;
        config.github.token = expand(&config.github.token)?;
        config.pages.account_id = expand(&config.pages.account_id)?;
        config.pages.token = expand(&config.pages.token)?;
        if let Some(inference) = config.inference.as_mut() {
            inference.token = expand(&inference.token)?;
        }

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand(value: &str) -> Result<String> {
    Ok(shellexpand::full(value)
        .map_err(ConfigError::ShellExpansion)?
        .into_owned())
}

fn expand_path(value: &Path) -> Result<PathBuf> {
    expand(value.to_string_lossy().as_ref()).map(PathBuf::from)
}

/// HTTP listener settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. "127.0.0.1:8787".
    pub bind: String,

    /// Upper bound on request bodies, which bounds archive uploads.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".into(),
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Scratch directories for uploads and extracted trees.
///
/// Both directories are created on demand. Entries under them live for a
/// single request and are removed on success and failure alike.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Where uploaded archives are spooled before extraction.
    pub upload_dir: PathBuf,

    /// Where archives are extracted and normalized before publishing.
    pub extract_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            upload_dir: temp_dir().join("quayside").join("uploads"),
            extract_dir: temp_dir().join("quayside").join("sites"),
        }
    }
}

/// Repository host credentials and endpoint.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Account that owns published repositories.
    pub user: String,

    /// API token with repository creation and push rights.
    pub token: String,

    /// REST endpoint, overridable for self-hosted instances and tests.
    pub api_url: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            token: String::new(),
            api_url: "https://api.github.com".into(),
        }
    }
}

/// Static-site host credentials and endpoint.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PagesConfig {
    /// Account that owns deployment projects.
    pub account_id: String,

    /// API token with project creation and deployment rights.
    pub token: String,

    /// REST endpoint, overridable for tests.
    pub api_url: String,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            token: String::new(),
            api_url: "https://api.cloudflare.com/client/v4".into(),
        }
    }
}

/// Site publishing policy.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Document that must exist at the site root after normalization.
    pub entry_document: String,

    /// Prefix applied to derived repository names.
    pub repo_prefix: String,

    /// Branch that repositories are published and built from.
    pub branch: String,

    /// Commit author name used when no submitter identity is supplied.
    pub author_name: String,

    /// Commit author email.
    pub author_email: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            entry_document: "index.html".into(),
            repo_prefix: "quay".into(),
            branch: "main".into(),
            author_name: "Quayside".into(),
            author_email: "publisher@quayside.invalid".into(),
        }
    }
}

/// Text-completion passthrough endpoint.
///
/// Absent by default. When configured, the server proxies completion requests
/// to this endpoint verbatim with bearer authentication.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Completion endpoint URL.
    pub url: String,

    /// Bearer token for the endpoint.
    pub token: String,

    /// Model identifier injected into requests that omit one.
    pub model: Option<String>,
}

/// Determine default absolute path to the configuration file.
///
/// Uses `$XDG_CONFIG_HOME/quayside/quayside.toml` or the platform
/// equivalent. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigHome`] if the configuration directory cannot be
///   determined.
pub fn default_config_path() -> Result<PathBuf, NoConfigHome> {
    dirs::config_dir()
        .map(|path| path.join("quayside").join("quayside.toml"))
        .ok_or(NoConfigHome)
}

/// No way to determine user's configuration directory.
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigHome;

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("cannot read configuration file {path:?}")]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
