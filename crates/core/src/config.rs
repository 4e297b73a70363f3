//! Configuration management for Recall.
//!
//! Settings are merged from, in increasing precedence:
//! - Defaults
//! - The workspace config file (`.recall/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! Pipeline tunables (chunk sizes, thresholds, providers) live in the
//! knowledge crate's engine config; this struct only carries what every
//! command needs before the engine is opened.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Canonical generation provider ids.
pub const KNOWN_PROVIDERS: [&str; 3] = ["on-device", "local-model", "none"];

/// Canonical provider id for a name or alias, ignoring case and surrounding
/// whitespace.
pub fn canonical_provider(name: &str) -> Option<&'static str> {
    match name.trim().to_lowercase().as_str() {
        "on-device" | "ondevice" | "chrome-ai" => Some("on-device"),
        "local-model" | "local" | "ollama" | "transformers" => Some("local-model"),
        "none" => Some("none"),
        _ => None,
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .recall/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Preferred generation provider, tried before the configured fallback order
    pub provider: Option<String>,

    /// Local model identifier for the local-model provider
    pub model: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub json_logs: bool,
}

/// Values given on the command line. `None`/`false` leaves the loaded
/// setting untouched.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workspace: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub log_level: Option<String>,
    pub verbose: bool,
    pub no_color: bool,
    pub json_logs: bool,
}

/// Full configuration file structure.
///
/// Unknown top-level sections are ignored so the same file can be shared
/// with other tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    generation: Option<GenerationSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationSection {
    provider: Option<String>,
    model: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: None,
            model: None,
            log_level: None,
            verbose: false,
            no_color: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `RECALL_WORKSPACE`: Override workspace path
    /// - `RECALL_CONFIG`: Path to config file
    /// - `RECALL_PROVIDER`: Preferred generation provider
    /// - `RECALL_MODEL`: Local model identifier
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use recall_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = env_var("RECALL_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }
        config.config_file = env_var("RECALL_CONFIG").map(PathBuf::from);

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.recall_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        config.provider = env_var("RECALL_PROVIDER").or(config.provider);
        config.model = env_var("RECALL_MODEL").or(config.model);
        config.log_level = env_var("RUST_LOG").or(config.log_level);
        config.no_color |= std::env::var_os("NO_COLOR").is_some();

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = if contents.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(&contents).map_err(|e| {
                AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.json_logs = json;
            }
        }

        if let Some(generation) = config_file.generation {
            if generation.provider.is_some() {
                result.provider = generation.provider;
            }
            if generation.model.is_some() {
                result.model = generation.model;
            }
        }

        Ok(result)
    }

    /// Apply command-line overrides. Flags win over the environment and
    /// the config file.
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        let Overrides {
            workspace,
            config_file,
            provider,
            model,
            log_level,
            verbose,
            no_color,
            json_logs,
        } = overrides;

        self.workspace = workspace.unwrap_or(self.workspace);
        self.config_file = config_file.or(self.config_file);
        self.provider = provider.or(self.provider);
        self.model = model.or(self.model);
        self.log_level = log_level.or(self.log_level);
        self.no_color |= no_color;
        self.json_logs |= json_logs;

        if verbose {
            self.verbose = true;
            self.log_level.get_or_insert_with(|| "debug".to_string());
        }

        self
    }

    /// Get the path to the .recall directory.
    pub fn recall_dir(&self) -> PathBuf {
        self.workspace.join(".recall")
    }

    /// Ensure the .recall directory exists.
    pub fn ensure_recall_dir(&self) -> AppResult<()> {
        let recall_dir = self.recall_dir();
        if !recall_dir.exists() {
            std::fs::create_dir_all(&recall_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .recall directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Validate the configured generation provider.
    pub fn validate(&self) -> AppResult<()> {
        if let Some(ref provider) = self.provider {
            if canonical_provider(provider).is_none() {
                return Err(AppError::Config(format!(
                    "Unknown provider: {}. Supported: {}",
                    provider,
                    KNOWN_PROVIDERS.join(", ")
                )));
            }
        }

        if let Some(ref model) = self.model {
            if model.trim().is_empty() {
                return Err(AppError::Config("Model name must not be empty".to_string()));
            }
        }

        Ok(())
    }
}

/// Non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
