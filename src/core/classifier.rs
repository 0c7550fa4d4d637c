//! 把 setupc 的診斷文字分類成 [`ErrorInfo`]。
//!
//! 樣式表在啟動時建立一次，之後只讀；同一段文字可能符合多個樣式，
//! 所以依固定優先順序比對，第一個符合的勝出。

use crate::utils::error::{ErrorCategory, ErrorInfo, ErrorSeverity, Solution, SolutionAction};
use regex::{Regex, RegexBuilder};
use std::path::Path;
use std::time::Duration;

const COM0COM_DOWNLOAD_URL: &str = "https://sourceforge.net/projects/com0com/";
const SUPPORT_URL: &str = "https://sourceforge.net/projects/com0com/support";

struct ErrorPattern {
    name: &'static str,
    regex: Regex,
    template: ErrorInfo,
}

pub struct ErrorClassifier {
    patterns: Vec<ErrorPattern>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("patterns", &self.pattern_names())
            .finish()
    }
}

fn pattern(name: &'static str, expr: &str, template: ErrorInfo) -> ErrorPattern {
    let regex = RegexBuilder::new(expr)
        .case_insensitive(true)
        .build()
        .expect("Invalid classifier pattern");
    ErrorPattern {
        name,
        regex,
        template,
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        let patterns = vec![
            pattern(
                "permission_denied",
                r"access\s+(is\s+)?denied|permission\s+denied|requires\s+elevation|administrator\s+privileges",
                permission_template(),
            ),
            pattern(
                "missing_executable",
                r"setupc(\.exe)?\b.*\b(not\s+found|could\s+not\s+be\s+found|cannot\s+find|not\s+recognized)|cannot\s+find\s+the\s+file\s+specified|no\s+such\s+file\s+or\s+directory",
                missing_executable_template(),
            ),
            pattern(
                "port_already_exists",
                r"port.*already.*exists|already\s+(exists|in\s+use)",
                ErrorInfo::new(
                    ErrorCategory::Validation,
                    ErrorSeverity::Warning,
                    "Port Already Exists",
                    "The specified port number or name is already in use.",
                    vec![
                        Solution::new(
                            "Use Different Port",
                            "Try a different port number or let the system auto-assign one",
                        ),
                        Solution::new(
                            "Remove Existing Port",
                            "Remove the existing port pair if it's no longer needed",
                        )
                        .with_action(SolutionAction::RemovePort),
                    ],
                ),
            ),
            pattern(
                "driver_not_installed",
                r"driver.*not.*installed",
                ErrorInfo::new(
                    ErrorCategory::Driver,
                    ErrorSeverity::Critical,
                    "Driver Not Installed",
                    "The com0com virtual serial port driver is not installed on this system.",
                    vec![
                        Solution::new(
                            "Install Driver",
                            "Download and install the com0com driver package",
                        )
                        .with_action(SolutionAction::DownloadTool)
                        .with_link(COM0COM_DOWNLOAD_URL),
                        Solution::new(
                            "Run Setup Wizard",
                            "Use the setup wizard to detect and configure the driver",
                        )
                        .with_action(SolutionAction::RunSetupWizard),
                    ],
                ),
            ),
            pattern(
                "timeout",
                r"time(d)?[\s-]*out",
                timeout_template(ErrorSeverity::Warning),
            ),
            pattern(
                "invalid_parameter",
                r"invalid.*param",
                ErrorInfo::new(
                    ErrorCategory::Validation,
                    ErrorSeverity::Error,
                    "Invalid Parameter",
                    "One or more parameters have invalid values.",
                    vec![
                        Solution::new(
                            "Check Parameter Format",
                            "Verify that parameters follow the correct format (e.g., PortName=COM8)",
                        ),
                        Solution::new(
                            "Use Valid Values",
                            "Ensure boolean values are 'yes' or 'no', and port names start with 'COM'",
                        ),
                        Solution::new(
                            "Reset to Defaults",
                            "Use default parameter values and modify only what's necessary",
                        )
                        .with_action(SolutionAction::ResetParameters),
                    ],
                ),
            ),
            pattern(
                "port_busy",
                r"\bbusy\b|in\s+use\s+by\s+another",
                ErrorInfo::new(
                    ErrorCategory::System,
                    ErrorSeverity::Warning,
                    "Port Busy",
                    "The port is currently in use by another application.",
                    vec![
                        Solution::new(
                            "Close Applications",
                            "Close any applications that might be using virtual serial ports",
                        ),
                        Solution::new(
                            "Check Process List",
                            "Use Task Manager to find and close applications using the port",
                        )
                        .with_action(SolutionAction::OpenTaskManager),
                        Solution::new("Wait and Retry", "Wait a moment and try the operation again"),
                    ],
                ),
            ),
        ];

        Self { patterns }
    }

    pub fn pattern_names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|p| p.name).collect()
    }

    /// 依優先順序比對診斷文字；都不符合時回傳「非預期錯誤」
    pub fn classify(&self, raw: &str) -> ErrorInfo {
        match self.patterns.iter().find(|p| p.regex.is_match(raw)) {
            Some(found) => {
                tracing::debug!("Classified error as '{}'", found.name);
                found.template.clone().with_details(raw)
            }
            None => self.unexpected(raw),
        }
    }

    pub fn unexpected(&self, raw: &str) -> ErrorInfo {
        ErrorInfo::new(
            ErrorCategory::System,
            ErrorSeverity::Error,
            "Unexpected Error",
            "An unexpected error occurred.",
            vec![
                Solution::new(
                    "Check Logs",
                    "Check the application logs for more detailed information",
                )
                .with_action(SolutionAction::ViewLogs),
                Solution::new(
                    "Restart Application",
                    "Try restarting the application to resolve temporary issues",
                ),
                Solution::new(
                    "Contact Support",
                    "If the problem persists, contact support with error details",
                )
                .with_action(SolutionAction::ReportIssue)
                .with_link(SUPPORT_URL),
            ],
        )
        .with_details(raw)
    }

    /// 無法找到或啟動 setupc 執行檔
    pub fn missing_executable(&self, program: &Path, error: &std::io::Error) -> ErrorInfo {
        missing_executable_template().with_details(format!(
            "Failed to start '{}': {}",
            program.display(),
            error
        ))
    }

    pub fn timed_out(&self, after: Duration) -> ErrorInfo {
        timeout_template(ErrorSeverity::Error).with_details(format!(
            "Command timed out after {} seconds",
            after.as_secs_f64()
        ))
    }

    pub fn cancelled(&self) -> ErrorInfo {
        ErrorInfo::new(
            ErrorCategory::System,
            ErrorSeverity::Info,
            "Operation Cancelled",
            "The operation was cancelled before it completed.",
            vec![Solution::new(
                "Run Again",
                "Start the operation again when you are ready",
            )],
        )
        .with_details("Cancelled by caller")
    }

    pub fn validation_failure(&self, field: &str, reason: &str) -> ErrorInfo {
        ErrorInfo::new(
            ErrorCategory::Validation,
            ErrorSeverity::Warning,
            &format!("Invalid {}", field),
            reason,
            vec![
                Solution::new(
                    "Correct the Value",
                    &format!("Change the value of '{}' and submit again", field),
                ),
                Solution::new(
                    "Reset to Defaults",
                    "Use default parameter values and modify only what's necessary",
                )
                .with_action(SolutionAction::ResetParameters),
            ],
        )
        .with_details(format!("{}: {}", field, reason))
    }

    pub fn configuration_failure(&self, detail: &str) -> ErrorInfo {
        ErrorInfo::new(
            ErrorCategory::Configuration,
            ErrorSeverity::Error,
            "Configuration Problem",
            "The application settings could not be loaded or are invalid.",
            vec![Solution::new(
                "Review Settings",
                "Open the settings and correct the highlighted values",
            )
            .with_action(SolutionAction::OpenSettings)],
        )
        .with_details(detail)
    }
}

fn permission_template() -> ErrorInfo {
    ErrorInfo::new(
        ErrorCategory::Permission,
        ErrorSeverity::Error,
        "Permission Denied",
        "The application doesn't have permission to perform this operation.",
        vec![
            Solution::new(
                "Run as Administrator",
                "Restart the application with elevated (administrator) privileges",
            )
            .with_action(SolutionAction::RestartElevated),
            Solution::new(
                "Check User Account Control",
                "Allow the application through User Account Control when prompted",
            ),
        ],
    )
}

fn missing_executable_template() -> ErrorInfo {
    ErrorInfo::new(
        ErrorCategory::Setupc,
        ErrorSeverity::Error,
        "setupc.exe Not Found",
        "The setupc.exe command-line tool could not be found or executed.",
        vec![
            Solution::new(
                "Specify Path Manually",
                "Set the correct path to setupc.exe in the settings",
            )
            .with_action(SolutionAction::OpenSettings),
            Solution::new(
                "Install com0com",
                "Download and install com0com from the official website",
            )
            .with_action(SolutionAction::DownloadTool)
            .with_link(COM0COM_DOWNLOAD_URL),
            Solution::new(
                "Check Installation",
                "Verify com0com was installed correctly and restart the computer",
            ),
        ],
    )
}

fn timeout_template(severity: ErrorSeverity) -> ErrorInfo {
    ErrorInfo::new(
        ErrorCategory::System,
        severity,
        "Operation Timed Out",
        "The operation took too long to complete and was cancelled.",
        vec![
            Solution::new(
                "Increase Timeout",
                "Increase the command timeout value in the settings",
            )
            .with_action(SolutionAction::OpenSettings),
            Solution::new(
                "Check System Load",
                "Close other applications and try again when the system is less busy",
            ),
            Solution::new(
                "Restart Service",
                "Restart the Windows Device Manager or reboot the system",
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_point_at_the_sourceforge_project() {
        let info = ErrorClassifier::new().unexpected("boom");
        let report = info
            .solutions()
            .iter()
            .find(|s| s.action() == Some(SolutionAction::ReportIssue))
            .unwrap();
        assert!(report
            .link()
            .unwrap()
            .starts_with("https://sourceforge.net/projects/com0com/"));
    }

    #[test]
    fn test_access_is_denied_is_permission() {
        let classifier = ErrorClassifier::new();
        let info = classifier.classify("CreateFile(): Access is denied.");

        assert_eq!(info.category(), ErrorCategory::Permission);
        assert!(info
            .solutions()
            .iter()
            .any(|s| s.description().contains("elevated")));
        assert_eq!(info.technical_details(), "CreateFile(): Access is denied.");
    }

    #[test]
    fn test_priority_order_first_match_wins() {
        let classifier = ErrorClassifier::new();
        // 同時符合 permission 與 busy，permission 優先
        let info = classifier.classify("port busy: access denied");
        assert_eq!(info.category(), ErrorCategory::Permission);

        // 同時符合 already exists 與 invalid parameter
        let info = classifier.classify("invalid parameter: port COM3 already exists");
        assert_eq!(info.title(), "Port Already Exists");
    }

    #[test]
    fn test_each_pattern() {
        let classifier = ErrorClassifier::new();
        let cases = [
            ("'setupc.exe' is not recognized as a command", ErrorCategory::Setupc),
            ("The port CNCA0 already exists", ErrorCategory::Validation),
            ("com0com driver is not installed", ErrorCategory::Driver),
            ("Operation timed out", ErrorCategory::System),
            ("Invalid parameter EmuNoise", ErrorCategory::Validation),
            ("COM8 is busy", ErrorCategory::System),
        ];
        for (text, category) in cases {
            assert_eq!(classifier.classify(text).category(), category, "{}", text);
        }
    }

    #[test]
    fn test_unknown_text_falls_back_to_unexpected() {
        let classifier = ErrorClassifier::new();
        let info = classifier.classify("something odd happened");
        assert_eq!(info.title(), "Unexpected Error");
        assert_eq!(info.category(), ErrorCategory::System);
        assert_eq!(info.technical_details(), "something odd happened");
        assert!(!info.solutions().is_empty());
    }

    #[test]
    fn test_templates_are_not_shared_between_calls() {
        let classifier = ErrorClassifier::new();
        let first = classifier.classify("access denied (1)");
        let second = classifier.classify("access denied (2)");
        assert_eq!(first.technical_details(), "access denied (1)");
        assert_eq!(second.technical_details(), "access denied (2)");
        assert_eq!(first.solutions(), second.solutions());
    }

    #[test]
    fn test_engine_timeout_is_error_severity() {
        let info = ErrorClassifier::new().timed_out(Duration::from_secs(3));
        assert_eq!(info.category(), ErrorCategory::System);
        assert_eq!(info.severity(), ErrorSeverity::Error);
        assert!(info.technical_details().contains("3"));
    }
}
