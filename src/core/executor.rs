//! 以非同步方式執行 setupc。
//!
//! 所有提交都先進入同一個 FIFO 佇列，由單一的派送工作依序取出：
//! 會修改狀態的操作取得寫入權（同一時間只有一個，依提交順序），唯讀操作
//! 取得讀取權（彼此可並行，但會排在先前提交的修改操作之後）。
//! 每次提交都只會產生一個最終結果，包含逾時與取消。

use crate::core::classifier::ErrorClassifier;
use crate::domain::command::{
    BatchResult, CommandResult, CommandSpec, Outcome, EXIT_CANCELLED, EXIT_IO_ERROR,
    EXIT_SPAWN_FAILED, EXIT_TIMED_OUT,
};
use crate::domain::ports::{ConfigProvider, Executor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// 行程被終止後，等待剩餘輸出的時間
const OUTPUT_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub executable: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub default_timeout: Duration,
}

impl EngineSettings {
    /// 工作目錄預設為執行檔所在目錄
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        let executable = executable.into();
        let working_dir = executable
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.to_path_buf());
        Self {
            executable,
            working_dir,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config<C: ConfigProvider + ?Sized>(config: &C) -> Self {
        let mut settings = Self::new(config.executable_path());
        if let Some(dir) = config.working_dir() {
            settings.working_dir = Some(dir.to_path_buf());
        }
        settings.default_timeout = config.command_timeout();
        settings
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

enum Work {
    Single(CommandSpec, oneshot::Sender<CommandResult>),
    Batch(Vec<CommandSpec>, oneshot::Sender<BatchResult>),
}

struct Job {
    id: u64,
    work: Work,
    timeout: Duration,
    token: CancellationToken,
}

impl Job {
    fn is_mutating(&self) -> bool {
        match &self.work {
            Work::Single(spec, _) => spec.is_mutating(),
            Work::Batch(..) => true,
        }
    }
}

enum Finish {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// 負責實際啟動行程並把結果整理成 [`CommandResult`]
struct ProcessRunner {
    settings: EngineSettings,
    classifier: Arc<ErrorClassifier>,
}

impl ProcessRunner {
    async fn perform(&self, job: Job) {
        let Job {
            id,
            work,
            timeout,
            token,
        } = job;
        match work {
            Work::Single(spec, reply) => {
                let result = self.run(id, &spec, timeout, &token).await;
                if reply.send(result).is_err() {
                    tracing::debug!("[op {}] Caller dropped the handle before completion", id);
                }
            }
            Work::Batch(steps, reply) => {
                let result = self.run_batch(id, &steps, timeout, &token).await;
                if reply.send(result).is_err() {
                    tracing::debug!("[op {}] Caller dropped the batch handle", id);
                }
            }
        }
    }

    /// 尚未開始就被取消或無法派送的工作：直接回覆，不啟動任何行程
    fn reject(&self, job: Job, make: impl Fn(&CommandSpec) -> CommandResult) {
        match job.work {
            Work::Single(spec, reply) => {
                let _ = reply.send(make(&spec));
            }
            Work::Batch(steps, reply) => {
                let results: Vec<CommandResult> = steps.first().map(&make).into_iter().collect();
                let failed_step = if results.is_empty() { None } else { Some(0) };
                let _ = reply.send(BatchResult {
                    results,
                    failed_step,
                    total_steps: steps.len(),
                });
            }
        }
    }

    fn cancelled_result(&self, spec: &CommandSpec) -> CommandResult {
        CommandResult::new(
            spec,
            Outcome::Cancelled,
            String::new(),
            String::new(),
            EXIT_CANCELLED,
            Utc::now(),
            Duration::ZERO,
            Some(self.classifier.cancelled()),
        )
    }

    async fn run_batch(
        &self,
        id: u64,
        steps: &[CommandSpec],
        timeout: Duration,
        token: &CancellationToken,
    ) -> BatchResult {
        let total_steps = steps.len();
        let mut results = Vec::with_capacity(total_steps);

        for (index, spec) in steps.iter().enumerate() {
            let result = if token.is_cancelled() {
                self.cancelled_result(spec)
            } else {
                self.run(id, spec, timeout, token).await
            };
            let succeeded = result.success();
            results.push(result);

            if !succeeded {
                tracing::error!(
                    "[op {}] Batch step {}/{} failed, skipping the remaining steps",
                    id,
                    index + 1,
                    total_steps
                );
                return BatchResult {
                    results,
                    failed_step: Some(index),
                    total_steps,
                };
            }
        }

        BatchResult {
            results,
            failed_step: None,
            total_steps,
        }
    }

    async fn run(
        &self,
        id: u64,
        spec: &CommandSpec,
        timeout: Duration,
        token: &CancellationToken,
    ) -> CommandResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let executable = &self.settings.executable;

        tracing::debug!(
            "[op {}] Running {} {}",
            id,
            executable.display(),
            spec.command_line()
        );

        let mut command = Command::new(executable);
        command
            .args(spec.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.settings.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    "[op {}] Failed to start '{}': {}",
                    id,
                    executable.display(),
                    e
                );
                return CommandResult::new(
                    spec,
                    Outcome::SpawnFailed,
                    String::new(),
                    e.to_string(),
                    EXIT_SPAWN_FAILED,
                    started_at,
                    clock.elapsed(),
                    Some(self.classifier.missing_executable(executable, &e)),
                );
            }
        };

        let mut stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let mut stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        let finish = tokio::select! {
            status = child.wait() => Finish::Exited(status),
            _ = tokio::time::sleep(timeout) => Finish::TimedOut,
            _ = token.cancelled() => Finish::Cancelled,
        };

        match finish {
            Finish::Exited(Ok(status)) => {
                let remaining = || timeout.saturating_sub(clock.elapsed()).max(OUTPUT_GRACE);
                let stdout = drain(&mut stdout_task, remaining()).await;
                let stderr = drain(&mut stderr_task, remaining()).await;
                let exit_code = status.code().unwrap_or(EXIT_IO_ERROR);
                self.completed(id, spec, stdout, stderr, exit_code, started_at, clock)
            }
            Finish::Exited(Err(e)) => {
                tracing::error!("[op {}] Failed waiting for setupc: {}", id, e);
                terminate(id, &mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                CommandResult::new(
                    spec,
                    Outcome::Exited,
                    String::new(),
                    e.to_string(),
                    EXIT_IO_ERROR,
                    started_at,
                    clock.elapsed(),
                    Some(self.classifier.unexpected(&e.to_string())),
                )
            }
            Finish::TimedOut => {
                tracing::warn!(
                    "[op {}] '{}' timed out after {:?}, terminating",
                    id,
                    spec.command_line(),
                    timeout
                );
                terminate(id, &mut child).await;
                let stdout = drain(&mut stdout_task, OUTPUT_GRACE).await;
                let stderr = drain(&mut stderr_task, OUTPUT_GRACE).await;
                let info = self.classifier.timed_out(timeout);
                let stderr = if stderr.trim().is_empty() {
                    info.technical_details().to_string()
                } else {
                    stderr
                };
                CommandResult::new(
                    spec,
                    Outcome::TimedOut,
                    stdout,
                    stderr,
                    EXIT_TIMED_OUT,
                    started_at,
                    clock.elapsed(),
                    Some(info),
                )
            }
            Finish::Cancelled => {
                tracing::info!("[op {}] '{}' cancelled, terminating", id, spec.command_line());
                terminate(id, &mut child).await;
                let stdout = drain(&mut stdout_task, OUTPUT_GRACE).await;
                let stderr = drain(&mut stderr_task, OUTPUT_GRACE).await;
                CommandResult::new(
                    spec,
                    Outcome::Cancelled,
                    stdout,
                    stderr,
                    EXIT_CANCELLED,
                    started_at,
                    clock.elapsed(),
                    Some(self.classifier.cancelled()),
                )
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn completed(
        &self,
        id: u64,
        spec: &CommandSpec,
        stdout: String,
        stderr: String,
        exit_code: i32,
        started_at: DateTime<Utc>,
        clock: Instant,
    ) -> CommandResult {
        let elapsed = clock.elapsed();
        if exit_code == 0 {
            tracing::info!(
                "[op {}] '{}' completed in {:.2}s",
                id,
                spec.command_line(),
                elapsed.as_secs_f64()
            );
            return CommandResult::new(
                spec,
                Outcome::Exited,
                stdout,
                stderr,
                exit_code,
                started_at,
                elapsed,
                None,
            );
        }

        // setupc 有時把錯誤寫到 stdout
        let diagnostic = if !stderr.trim().is_empty() {
            stderr.clone()
        } else if !stdout.trim().is_empty() {
            stdout.clone()
        } else {
            format!("setupc exited with code {}", exit_code)
        };
        let info = self.classifier.classify(&diagnostic);
        tracing::error!(
            "[op {}] '{}' failed with exit code {} ({}: {})",
            id,
            spec.command_line(),
            exit_code,
            info.category(),
            info.title()
        );
        CommandResult::new(
            spec,
            Outcome::Exited,
            stdout,
            stderr,
            exit_code,
            started_at,
            elapsed,
            Some(info),
        )
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buffer).await {
            tracing::warn!("Failed to read setupc output: {}", e);
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// 在期限內收集剩餘輸出，逾時則放棄（子孫行程可能仍握著管線）
async fn drain(task: &mut JoinHandle<String>, limit: Duration) -> String {
    match tokio::time::timeout(limit, &mut *task).await {
        Ok(Ok(output)) => output,
        _ => {
            task.abort();
            String::new()
        }
    }
}

async fn terminate(id: u64, child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!("[op {}] Failed to terminate setupc: {}", id, e);
    }
}

async fn dispatch(mut queue: mpsc::UnboundedReceiver<Job>, runner: Arc<ProcessRunner>) {
    let gate = Arc::new(RwLock::new(()));

    while let Some(job) = queue.recv().await {
        if job.token.is_cancelled() {
            tracing::info!("[op {}] Removed from queue before start", job.id);
            runner.reject(job, |spec| runner.cancelled_result(spec));
            continue;
        }

        let token = job.token.clone();
        if job.is_mutating() {
            // 等待所有進行中的操作結束；之後提交的操作都排在這之後
            let permit = tokio::select! {
                permit = gate.clone().write_owned() => permit,
                _ = token.cancelled() => {
                    tracing::info!("[op {}] Cancelled while queued", job.id);
                    runner.reject(job, |spec| runner.cancelled_result(spec));
                    continue;
                }
            };
            spawn_job(runner.clone(), job, permit);
        } else {
            let permit = tokio::select! {
                permit = gate.clone().read_owned() => permit,
                _ = token.cancelled() => {
                    tracing::info!("[op {}] Cancelled while queued", job.id);
                    runner.reject(job, |spec| runner.cancelled_result(spec));
                    continue;
                }
            };
            spawn_job(runner.clone(), job, permit);
        }
    }

    tracing::debug!("Execution engine queue closed");
}

fn spawn_job<P: Send + 'static>(runner: Arc<ProcessRunner>, job: Job, permit: P) {
    tokio::spawn(async move {
        runner.perform(job).await;
        drop(permit);
    });
}

/// 單一操作的控制代碼：可取消、可等待結果
pub struct OperationHandle {
    id: u64,
    token: CancellationToken,
    receiver: oneshot::Receiver<CommandResult>,
    spec: CommandSpec,
    classifier: Arc<ErrorClassifier>,
}

impl OperationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 排隊中的操作會直接移除；執行中的操作會終止行程
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn wait(self) -> CommandResult {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => CommandResult::new(
                &self.spec,
                Outcome::Cancelled,
                String::new(),
                String::new(),
                EXIT_CANCELLED,
                Utc::now(),
                Duration::ZERO,
                Some(
                    self.classifier
                        .unexpected("Execution worker stopped before reporting a result"),
                ),
            ),
        }
    }
}

pub struct BatchHandle {
    id: u64,
    token: CancellationToken,
    receiver: oneshot::Receiver<BatchResult>,
    total_steps: usize,
}

impl BatchHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn wait(self) -> BatchResult {
        self.receiver.await.unwrap_or(BatchResult {
            results: Vec::new(),
            failed_step: None,
            total_steps: self.total_steps,
        })
    }
}

/// setupc 的執行引擎。必須在 tokio runtime 中建立。
pub struct ExecutionEngine {
    queue: mpsc::UnboundedSender<Job>,
    next_id: AtomicU64,
    default_timeout: Duration,
    runner: Arc<ProcessRunner>,
}

impl ExecutionEngine {
    pub fn new(settings: EngineSettings, classifier: Arc<ErrorClassifier>) -> Self {
        let default_timeout = settings.default_timeout;
        let runner = Arc::new(ProcessRunner {
            settings,
            classifier,
        });
        let (queue, receiver) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(receiver, runner.clone()));

        tracing::debug!(
            "Execution engine started for {}",
            runner.settings.executable.display()
        );
        Self {
            queue,
            next_id: AtomicU64::new(1),
            default_timeout,
            runner,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.runner.settings
    }

    fn enqueue(&self, job: Job) {
        if let Err(mpsc::error::SendError(job)) = self.queue.send(job) {
            tracing::error!("[op {}] Execution engine is not running", job.id);
            let classifier = self.runner.classifier.clone();
            self.runner.reject(job, |spec| {
                CommandResult::new(
                    spec,
                    Outcome::SpawnFailed,
                    String::new(),
                    String::new(),
                    EXIT_IO_ERROR,
                    Utc::now(),
                    Duration::ZERO,
                    Some(classifier.unexpected("Execution engine is not running")),
                )
            });
        }
    }

    /// 提交一個操作，立即返回；結果透過 [`OperationHandle::wait`] 取得
    pub fn submit(&self, spec: CommandSpec, timeout: Duration) -> OperationHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (reply, receiver) = oneshot::channel();

        tracing::debug!("[op {}] Queued '{}'", id, spec.command_line());
        self.enqueue(Job {
            id,
            work: Work::Single(spec.clone(), reply),
            timeout,
            token: token.clone(),
        });

        OperationHandle {
            id,
            token,
            receiver,
            spec,
            classifier: self.runner.classifier.clone(),
        }
    }

    /// 依序執行的批次，視為單一修改操作；任一步失敗即中止後續步驟
    pub fn submit_batch(&self, steps: Vec<CommandSpec>, timeout: Duration) -> BatchHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (reply, receiver) = oneshot::channel();
        let total_steps = steps.len();

        tracing::debug!("[op {}] Queued batch of {} steps", id, total_steps);
        self.enqueue(Job {
            id,
            work: Work::Batch(steps, reply),
            timeout,
            token: token.clone(),
        });

        BatchHandle {
            id,
            token,
            receiver,
            total_steps,
        }
    }

    /// 完成時呼叫 callback；回傳的 token 可用來取消
    pub fn submit_with_callback<F>(
        &self,
        spec: CommandSpec,
        timeout: Duration,
        callback: F,
    ) -> CancellationToken
    where
        F: FnOnce(CommandResult) + Send + 'static,
    {
        let handle = self.submit(spec, timeout);
        let token = handle.cancellation_token();
        tokio::spawn(async move {
            callback(handle.wait().await);
        });
        token
    }
}

#[async_trait]
impl Executor for ExecutionEngine {
    async fn execute(&self, spec: CommandSpec, timeout: Duration) -> CommandResult {
        self.submit(spec, timeout).wait().await
    }

    async fn execute_batch(&self, steps: Vec<CommandSpec>, timeout: Duration) -> BatchResult {
        self.submit_batch(steps, timeout).wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::CommandBuilder;
    use crate::utils::error::ErrorCategory;

    #[test]
    fn test_working_dir_defaults_to_executable_dir() {
        let settings = EngineSettings::new("/opt/com0com/setupc.exe");
        assert_eq!(settings.working_dir, Some(PathBuf::from("/opt/com0com")));

        let bare = EngineSettings::new("setupc.exe");
        assert_eq!(bare.working_dir, None);
        assert_eq!(bare.default_timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_missing_executable_is_setupc_error() {
        let engine = ExecutionEngine::new(
            EngineSettings::new("/definitely/not/here/setupc.exe").with_working_dir(None),
            Arc::new(ErrorClassifier::new()),
        );
        let spec = CommandBuilder::new().list().unwrap();
        let result = engine.execute(spec, Duration::from_secs(5)).await;

        assert!(!result.success());
        assert_eq!(result.outcome(), Outcome::SpawnFailed);
        assert_eq!(result.exit_code(), EXIT_SPAWN_FAILED);
        assert_eq!(result.error().unwrap().category(), ErrorCategory::Setupc);
    }

    #[tokio::test]
    async fn test_cancel_before_start_produces_cancelled_result() {
        let engine = ExecutionEngine::new(
            EngineSettings::new("/definitely/not/here/setupc.exe").with_working_dir(None),
            Arc::new(ErrorClassifier::new()),
        );
        let handle = engine.submit(CommandBuilder::new().remove(1).unwrap(), DEFAULT_TIMEOUT);
        handle.cancel();
        let result = handle.wait().await;

        assert_eq!(result.outcome(), Outcome::Cancelled);
        assert_eq!(result.exit_code(), EXIT_CANCELLED);
        assert!(!result.success());
    }
}
