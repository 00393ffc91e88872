use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from redfox.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct RedfoxConfig {
    pub watchdog: WatchdogConfig,
    pub container: ContainerConfig,
    pub wordlists: WordlistConfig,
    pub ai: AiConfig,
    pub nmap: NmapConfig,
    pub gobuster: GobusterConfig,
    pub hydra: HydraConfig,
    pub nikto: NiktoConfig,
}

/// Retry and priority parameters shared by every supervised invocation.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub max_retries: u32,
    pub backoff_base_secs: i64,
    pub niceness: i32,
}

/// Container runtime settings; `enabled = false` runs tools natively.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub enabled: bool,
    pub cpus: f64,
    pub memory: String,
}

/// Wordlist locations, relative to the working directory unless absolute.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WordlistConfig {
    pub dir: PathBuf,
    pub web_common: String,
    pub users: String,
    pub passwords: String,
}

/// Report-synthesis model. No model means no AI report.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub model: Option<String>,
    pub total_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NmapConfig {
    pub image: String,
    pub total_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GobusterConfig {
    pub image: String,
    pub total_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HydraConfig {
    pub image: String,
    pub total_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NiktoConfig {
    pub image: String,
    pub total_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file exists but is not valid TOML for this schema.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl RedfoxConfig {
    /// Load configuration from `path`. A missing file is not an error:
    /// defaults apply, so a bare `redfox --ip <target>` works out of the box.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

// --- Default implementations ---

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_secs: 5,
            niceness: 10,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: None,
            total_timeout_secs: 600,
            idle_timeout_secs: 120,
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cpus: 1.0,
            memory: "1g".to_string(),
        }
    }
}

impl Default for WordlistConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("wordlists"),
            web_common: "common.txt".to_string(),
            users: "users/names.txt".to_string(),
            passwords: "passwords/rockyou.txt".to_string(),
        }
    }
}

impl Default for NmapConfig {
    fn default() -> Self {
        Self {
            image: "instrumentisto/nmap".to_string(),
            total_timeout_secs: 900,
            idle_timeout_secs: 120,
        }
    }
}

impl Default for GobusterConfig {
    fn default() -> Self {
        Self {
            image: "aoighost/gobuster:latest".to_string(),
            total_timeout_secs: 600,
            idle_timeout_secs: 60,
        }
    }
}

impl Default for HydraConfig {
    fn default() -> Self {
        Self {
            image: "pentesttools/hydra".to_string(),
            total_timeout_secs: 1800,
            idle_timeout_secs: 300,
        }
    }
}

impl Default for NiktoConfig {
    fn default() -> Self {
        Self {
            image: "frapsoft/nikto:latest".to_string(),
            total_timeout_secs: 900,
            idle_timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RedfoxConfig::default();
        assert_eq!(config.watchdog.max_retries, 2);
        assert_eq!(config.watchdog.backoff_base_secs, 5);
        assert_eq!(config.watchdog.niceness, 10);
        assert!(config.container.enabled);
        assert_eq!(config.container.memory, "1g");
        assert_eq!(config.nmap.image, "instrumentisto/nmap");
        assert!(config.ai.model.is_none());
        assert_eq!(config.ai.total_timeout_secs, 600);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = RedfoxConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.watchdog.max_retries, 2);
    }

    #[test]
    fn test_load_partial_file_keeps_other_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("redfox.toml");
        std::fs::write(
            &path,
            r#"
[watchdog]
max_retries = 5

[container]
enabled = false

[ai]
model = "ai/gemma3"
"#,
        )
        .unwrap();

        let config = RedfoxConfig::load(&path).unwrap();
        assert_eq!(config.watchdog.max_retries, 5);
        // untouched keys in a present section fall back too
        assert_eq!(config.watchdog.backoff_base_secs, 5);
        assert!(!config.container.enabled);
        assert_eq!(config.ai.model.as_deref(), Some("ai/gemma3"));
        assert_eq!(config.gobuster.image, "aoighost/gobuster:latest");
    }

    #[test]
    fn test_load_invalid_toml_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("redfox.toml");
        std::fs::write(&path, "watchdog = not valid").unwrap();

        let err = RedfoxConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_wordlist_defaults() {
        let config = WordlistConfig::default();
        assert_eq!(config.dir, PathBuf::from("wordlists"));
        assert_eq!(config.web_common, "common.txt");
        assert_eq!(config.users, "users/names.txt");
        assert_eq!(config.passwords, "passwords/rockyou.txt");
    }
}
