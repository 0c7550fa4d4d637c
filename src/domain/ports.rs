use crate::domain::command::{BatchResult, CommandResult, CommandSpec};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub trait ConfigProvider: Send + Sync {
    fn executable_path(&self) -> &Path;
    /// 執行 setupc 時的工作目錄，它需要在自己的目錄下找到 .inf 檔
    fn working_dir(&self) -> Option<&Path>;
    fn command_timeout(&self) -> Duration;
}

/// 執行 setupc 呼叫的介面；失敗一律放在結果裡回傳，不會跨越非同步邊界拋出
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, spec: CommandSpec, timeout: Duration) -> CommandResult;

    async fn execute_batch(&self, steps: Vec<CommandSpec>, timeout: Duration) -> BatchResult;
}
