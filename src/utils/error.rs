use crate::core::classifier::ErrorClassifier;
use crate::domain::command::CommandResult;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// 錯誤類別，對應到使用者可理解的問題來源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Driver,
    Setupc,
    Permission,
    Configuration,
    Network,
    Gui,
    System,
    Validation,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Driver => "driver",
            ErrorCategory::Setupc => "setupc",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Network => "network",
            ErrorCategory::Gui => "gui",
            ErrorCategory::System => "system",
            ErrorCategory::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "info",
            ErrorSeverity::Warning => "warning",
            ErrorSeverity::Error => "error",
            ErrorSeverity::Critical => "critical",
        }
    }

    /// CLI 的結束碼：依嚴重程度決定
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorSeverity::Info => 0,
            ErrorSeverity::Warning => 2,
            ErrorSeverity::Error => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解決方案附帶的後續動作，由前端決定如何呈現
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionAction {
    RestartElevated,
    OpenSettings,
    DownloadTool,
    RunSetupWizard,
    RemovePort,
    ResetParameters,
    OpenTaskManager,
    ViewLogs,
    ReportIssue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Solution {
    title: String,
    description: String,
    action: Option<SolutionAction>,
    link: Option<String>,
}

impl Solution {
    pub(crate) fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            action: None,
            link: None,
        }
    }

    pub(crate) fn with_action(mut self, action: SolutionAction) -> Self {
        self.action = Some(action);
        self
    }

    pub(crate) fn with_link(mut self, link: &str) -> Self {
        self.link = Some(link.to_string());
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn action(&self) -> Option<SolutionAction> {
        self.action
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }
}

/// 分類後的錯誤資訊。只由 [`ErrorClassifier`] 建立，建立後不可變。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    category: ErrorCategory,
    severity: ErrorSeverity,
    title: String,
    message: String,
    technical_details: String,
    solutions: Vec<Solution>,
}

impl ErrorInfo {
    pub(crate) fn new(
        category: ErrorCategory,
        severity: ErrorSeverity,
        title: &str,
        message: &str,
        solutions: Vec<Solution>,
    ) -> Self {
        Self {
            category,
            severity,
            title: title.to_string(),
            message: message.to_string(),
            technical_details: String::new(),
            solutions,
        }
    }

    pub(crate) fn with_details(mut self, details: impl Into<String>) -> Self {
        self.technical_details = details.into();
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 原始診斷文字，僅供記錄使用
    pub fn technical_details(&self) -> &str {
        &self.technical_details
    }

    pub fn solutions(&self) -> &[Solution] {
        &self.solutions
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Invalid {field} '{value}': {reason}")]
    Validation {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("TOML parsing error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV output error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Could not parse setupc output: {message} ({skipped} records skipped)")]
    Parse { message: String, skipped: usize },

    #[error("Command failed: {}", .0.command_line())]
    Execution(Box<CommandResult>),
}

impl ManagerError {
    pub(crate) fn validation(field: &str, value: &str, reason: impl Into<String>) -> Self {
        ManagerError::Validation {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ManagerError::Validation { .. } => ErrorCategory::Validation,
            ManagerError::Config { .. }
            | ManagerError::ConfigParse(_)
            | ManagerError::ConfigWrite(_) => ErrorCategory::Configuration,
            ManagerError::Io(_) | ManagerError::Serialization(_) | ManagerError::Csv(_) => {
                ErrorCategory::System
            }
            ManagerError::Parse { .. } => ErrorCategory::Setupc,
            ManagerError::Execution(result) => result
                .error()
                .map(|info| info.category())
                .unwrap_or(ErrorCategory::System),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ManagerError::Validation { .. } => ErrorSeverity::Warning,
            ManagerError::Execution(result) => result
                .error()
                .map(|info| info.severity())
                .unwrap_or(ErrorSeverity::Error),
            _ => ErrorSeverity::Error,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ManagerError::Validation { field, .. } => {
                format!("Correct the value of '{}' and try again", field)
            }
            ManagerError::Config { .. }
            | ManagerError::ConfigParse(_)
            | ManagerError::ConfigWrite(_) => {
                "Check the configuration file syntax and values".to_string()
            }
            ManagerError::Io(_) => "Check file permissions and available disk space".to_string(),
            ManagerError::Serialization(_) | ManagerError::Csv(_) => {
                "Try a different output format".to_string()
            }
            ManagerError::Parse { .. } => {
                "Verify that setupc.exe is a supported com0com version".to_string()
            }
            ManagerError::Execution(result) => result
                .error()
                .and_then(|info| info.solutions().first())
                .map(|solution| solution.description().to_string())
                .unwrap_or_else(|| "Check the logs for details".to_string()),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ManagerError::Validation { field, reason, .. } => {
                format!("Invalid value for {}: {}", field, reason)
            }
            ManagerError::Execution(result) => match result.error() {
                Some(info) => info.to_string(),
                None => format!("Command exited with code {}", result.exit_code()),
            },
            other => other.to_string(),
        }
    }

    /// 轉成可呈現的錯誤資訊（經由分類器建立）
    pub fn error_info(&self, classifier: &ErrorClassifier) -> ErrorInfo {
        match self {
            ManagerError::Validation { field, reason, .. } => {
                classifier.validation_failure(field, reason)
            }
            ManagerError::Config { .. }
            | ManagerError::ConfigParse(_)
            | ManagerError::ConfigWrite(_) => classifier.configuration_failure(&self.to_string()),
            ManagerError::Execution(result) => match result.error() {
                Some(info) => info.clone(),
                None => classifier.classify(result.stderr()),
            },
            other => classifier.classify(&other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ManagerError>;
