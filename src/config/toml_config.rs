use crate::config::{locate_executable, DEFAULT_SETUPC_PATHS, DEFAULT_TIMEOUT_SECONDS};
use crate::core::params::ParameterSet;
use crate::core::ConfigProvider;
use crate::utils::error::{ManagerError, Result};
use crate::utils::validation::{
    validate_parameter_set, validate_path, validate_range, Validate, ValidationContext,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

pub const MAX_TIMEOUT_SECONDS: u64 = 600;
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid env var pattern"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub setupc: SetupcConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub presets: BTreeMap<String, PresetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupcConfig {
    pub path: PathBuf,
    /// 未設定時使用執行檔所在目錄
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

/// 具名的預設安裝參數
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetConfig {
    #[serde(default = "default_side")]
    pub port_a: String,
    #[serde(default = "default_side")]
    pub port_b: String,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_level() -> String {
    "info".to_string()
}

fn default_side() -> String {
    "-".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl Default for SetupcConfig {
    fn default() -> Self {
        let path = locate_executable(&DEFAULT_SETUPC_PATHS)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETUPC_PATHS[0]));
        Self {
            path,
            working_dir: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            setupc: SetupcConfig::default(),
            logging: LoggingConfig::default(),
            presets: BTreeMap::new(),
        }
    }
}

impl PresetConfig {
    /// 解碼兩端的參數字串
    pub fn parameters(&self, name: &str) -> Result<(ParameterSet, ParameterSet)> {
        let decode = |side: &str, raw: &str| {
            ParameterSet::decode(raw).map_err(|e| match e {
                ManagerError::Validation { value, reason, .. } => ManagerError::Validation {
                    field: format!("presets.{}.{}", name, side),
                    value,
                    reason,
                },
                other => other,
            })
        };
        Ok((decode("port_a", &self.port_a)?, decode("port_b", &self.port_b)?))
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        tracing::debug!("Loaded configuration from {}", path.as_ref().display());
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed)?)
    }

    /// 替換環境變數 (例如 ${COM0COM_HOME})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&path, content)?;
        tracing::info!("💾 Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// 設定的路徑不存在時，改用已知安裝位置中第一個存在的
    pub fn resolved_executable(&self) -> PathBuf {
        if self.setupc.path.exists() {
            return self.setupc.path.clone();
        }
        match locate_executable(&DEFAULT_SETUPC_PATHS) {
            Some(found) => {
                tracing::info!(
                    "Configured setupc not found, using {}",
                    found.display()
                );
                found
            }
            None => self.setupc.path.clone(),
        }
    }

    pub fn preset(&self, name: &str) -> Result<(ParameterSet, ParameterSet)> {
        let preset = self.presets.get(name).ok_or_else(|| ManagerError::Config {
            message: format!(
                "Unknown preset '{}'. Available: {}",
                name,
                self.presets.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        })?;
        preset.parameters(name)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_path("setupc.path", &self.setupc.path.to_string_lossy())?;

        if let Some(dir) = &self.setupc.working_dir {
            validate_path("setupc.working_dir", &dir.to_string_lossy())?;
        }

        validate_range(
            "setupc.timeout_seconds",
            self.setupc.timeout_seconds,
            1,
            MAX_TIMEOUT_SECONDS,
        )?;

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ManagerError::validation(
                "logging.level",
                &self.logging.level,
                format!("Unsupported level. Valid levels: {}", LOG_LEVELS.join(", ")),
            ));
        }

        for (name, preset) in &self.presets {
            let (port_a, port_b) = preset.parameters(name)?;
            validate_parameter_set(&port_a, ValidationContext::Install)?;
            validate_parameter_set(&port_b, ValidationContext::Install)?;
        }

        Ok(())
    }
}

impl ConfigProvider for AppConfig {
    fn executable_path(&self) -> &Path {
        &self.setupc.path
    }

    fn working_dir(&self) -> Option<&Path> {
        self.setupc.working_dir.as_deref()
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.setupc.timeout_seconds)
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
