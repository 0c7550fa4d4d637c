use crate::utils::error::ErrorInfo;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// setupc 的操作種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verb {
    InstallNumbered,
    InstallAuto,
    /// 不帶參數的 `install`：提交先前以 `--no-update` 暫存的安裝
    InstallUpdate,
    Remove,
    Change,
    List,
    Preinstall,
    Update,
    Reload,
    Uninstall,
    EnableAll,
    DisableAll,
    InfClean,
    BusyNames,
    ListFriendlyNames,
    UpdateFriendlyNames,
}

impl Verb {
    /// 會修改驅動或埠狀態的操作必須序列化執行
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Verb::List | Verb::ListFriendlyNames)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Verb::InstallNumbered | Verb::InstallAuto | Verb::InstallUpdate => "install",
            Verb::Remove => "remove",
            Verb::Change => "change",
            Verb::List => "list",
            Verb::Preinstall => "preinstall",
            Verb::Update => "update",
            Verb::Reload => "reload",
            Verb::Uninstall => "uninstall",
            Verb::EnableAll => "enable",
            Verb::DisableAll => "disable",
            Verb::InfClean => "infclean",
            Verb::BusyNames => "busynames",
            Verb::ListFriendlyNames => "listfnames",
            Verb::UpdateFriendlyNames => "updatefnames",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `--wait [+]<seconds>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaitOption {
    pub seconds: u32,
    /// `+` 前綴：逾時後詢問使用者
    pub prompt_after_timeout: bool,
}

/// 放在操作參數前面的全域旗標
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GlobalOptions {
    pub output: Option<PathBuf>,
    pub wait: Option<WaitOption>,
    pub detail_prms: bool,
    pub silent: bool,
    pub no_update: bool,
    pub no_update_fnames: bool,
    pub show_fnames: bool,
}

impl GlobalOptions {
    /// 固定順序輸出旗標，確保同樣輸入得到同樣的參數向量
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(output) = &self.output {
            args.push("--output".to_string());
            args.push(output.display().to_string());
        }
        if let Some(wait) = &self.wait {
            args.push("--wait".to_string());
            let prefix = if wait.prompt_after_timeout { "+" } else { "" };
            args.push(format!("{}{}", prefix, wait.seconds));
        }
        if self.detail_prms {
            args.push("--detail-prms".to_string());
        }
        if self.silent {
            args.push("--silent".to_string());
        }
        if self.no_update {
            args.push("--no-update".to_string());
        }
        if self.no_update_fnames {
            args.push("--no-update-fnames".to_string());
        }
        if self.show_fnames {
            args.push("--show-fnames".to_string());
        }
        args
    }
}

/// 完整的 setupc 呼叫描述。只能由 `CommandBuilder` 建立。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    verb: Verb,
    args: Vec<String>,
    options: GlobalOptions,
}

impl CommandSpec {
    pub(crate) fn new(verb: Verb, args: Vec<String>, options: GlobalOptions) -> Self {
        Self {
            verb,
            args,
            options,
        }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// 操作本身的參數（含動詞）
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn options(&self) -> &GlobalOptions {
        &self.options
    }

    pub fn is_mutating(&self) -> bool {
        self.verb.is_mutating()
    }

    /// 交給行程的完整參數向量：全域旗標在前
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.options.to_args();
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// 只用於記錄，不會交給 shell 執行
    pub fn command_line(&self) -> String {
        self.argv().join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// 行程的結束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Exited,
    TimedOut,
    Cancelled,
    SpawnFailed,
}

pub const EXIT_TIMED_OUT: i32 = -1;
pub const EXIT_SPAWN_FAILED: i32 = -2;
pub const EXIT_IO_ERROR: i32 = -3;
pub const EXIT_CANCELLED: i32 = -4;

/// 一次呼叫的最終結果，建立後不可變
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    command: String,
    verb: Verb,
    outcome: Outcome,
    stdout: String,
    stderr: String,
    exit_code: i32,
    started_at: DateTime<Utc>,
    elapsed: Duration,
    error: Option<ErrorInfo>,
}

impl CommandResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        spec: &CommandSpec,
        outcome: Outcome,
        stdout: String,
        stderr: String,
        exit_code: i32,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        error: Option<ErrorInfo>,
    ) -> Self {
        Self {
            command: spec.command_line(),
            verb: spec.verb(),
            outcome,
            stdout,
            stderr,
            exit_code,
            started_at,
            elapsed,
            error,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome == Outcome::Exited && self.exit_code == 0 && self.error.is_none()
    }

    pub fn command_line(&self) -> &str {
        &self.command
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }
}

/// 批次執行結果：遇到第一個失敗就停止
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub results: Vec<CommandResult>,
    /// 失敗步驟的索引（從 0 開始）
    pub failed_step: Option<usize>,
    pub total_steps: usize,
}

impl BatchResult {
    pub fn success(&self) -> bool {
        self.failed_step.is_none() && self.results.len() == self.total_steps
    }

    pub fn failure(&self) -> Option<&CommandResult> {
        self.failed_step.and_then(|step| self.results.get(step))
    }
}
