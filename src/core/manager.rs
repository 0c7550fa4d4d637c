use crate::core::builder::{CommandBuilder, Intent};
use crate::core::params::ParameterSet;
use crate::core::parser::{parse_name_list, parse_port_list, ParseReport};
use crate::domain::command::{BatchResult, CommandResult, CommandSpec};
use crate::domain::model::{DriverInfo, DriverStatus, PortId, PortPair};
use crate::domain::ports::Executor;
use crate::utils::error::{ErrorCategory, ManagerError, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;

/// 高階操作：建立命令、交給執行器、解析結果並維護埠對快取
pub struct PortManager<E: Executor> {
    executor: E,
    builder: CommandBuilder,
    timeout: Duration,
    install_path: Option<PathBuf>,
    cache: RwLock<Vec<PortPair>>,
}

impl<E: Executor> PortManager<E> {
    pub fn new(executor: E, timeout: Duration) -> Self {
        Self {
            executor,
            builder: CommandBuilder::new(),
            timeout,
            install_path: None,
            cache: RwLock::new(Vec::new()),
        }
    }

    pub fn with_builder(mut self, builder: CommandBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// 回報在 [`DriverInfo`] 裡的安裝位置
    pub fn with_install_path(mut self, path: Option<PathBuf>) -> Self {
        self.install_path = path;
        self
    }

    pub fn builder(&self) -> &CommandBuilder {
        &self.builder
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    async fn run(&self, spec: CommandSpec) -> Result<CommandResult> {
        let result = self.executor.execute(spec, self.timeout).await;
        if result.success() {
            Ok(result)
        } else {
            Err(ManagerError::Execution(Box::new(result)))
        }
    }

    async fn run_intent(&self, intent: &Intent) -> Result<CommandResult> {
        let spec = self.builder.build(intent)?;
        self.run(spec).await
    }

    /// 修改成功後重新讀取清單；讀取失敗只記錄，不影響已成功的修改
    async fn refresh_after(&self, result: CommandResult) -> Result<CommandResult> {
        if let Err(e) = self.list_report().await {
            tracing::warn!("Port list refresh failed: {}", e);
        }
        Ok(result)
    }

    pub async fn list_report(&self) -> Result<ParseReport> {
        let result = self.run_intent(&Intent::List).await?;
        let report = parse_port_list(result.stdout())?;
        if report.skipped > 0 {
            tracing::warn!("{} port records could not be parsed", report.skipped);
        }

        let mut cache = self.cache.write().await;
        *cache = report.pairs.clone();
        Ok(report)
    }

    pub async fn list_ports(&self) -> Result<Vec<PortPair>> {
        Ok(self.list_report().await?.pairs)
    }

    /// 最近一次成功讀取的清單（複本）
    pub async fn cached_pairs(&self) -> Vec<PortPair> {
        self.cache.read().await.clone()
    }

    pub async fn install_pair(
        &self,
        pair: u32,
        port_a: ParameterSet,
        port_b: ParameterSet,
    ) -> Result<CommandResult> {
        tracing::info!("🔧 Installing port pair {}", pair);
        let result = self
            .run_intent(&Intent::InstallNumbered {
                pair,
                port_a,
                port_b,
            })
            .await?;
        self.refresh_after(result).await
    }

    pub async fn install_auto(
        &self,
        port_a: ParameterSet,
        port_b: ParameterSet,
    ) -> Result<CommandResult> {
        tracing::info!("🔧 Installing port pair with the next free number");
        let result = self
            .run_intent(&Intent::InstallAuto { port_a, port_b })
            .await?;
        self.refresh_after(result).await
    }

    /// 以單一修改操作執行多筆安裝；任一步失敗即回傳錯誤
    pub async fn install_batch(&self, installs: &[Intent]) -> Result<BatchResult> {
        let steps = self.builder.install_batch(installs)?;
        tracing::info!("🔧 Installing {} port pairs as a batch", installs.len());

        let batch = self.executor.execute_batch(steps, self.timeout).await;
        if let Some(failed) = batch.failure() {
            tracing::error!(
                "Batch install stopped at step {}/{}",
                batch.failed_step.map_or(0, |step| step + 1),
                batch.total_steps
            );
            let failed = failed.clone();
            if let Err(e) = self.list_report().await {
                tracing::warn!("Port list refresh failed: {}", e);
            }
            return Err(ManagerError::Execution(Box::new(failed)));
        }

        if let Err(e) = self.list_report().await {
            tracing::warn!("Port list refresh failed: {}", e);
        }
        Ok(batch)
    }

    pub async fn remove_pair(&self, pair: u32) -> Result<CommandResult> {
        tracing::info!("🗑️ Removing port pair {}", pair);
        let result = self.run_intent(&Intent::Remove { pair }).await?;
        self.refresh_after(result).await
    }

    pub async fn change_port(&self, port: PortId, parameters: ParameterSet) -> Result<CommandResult> {
        tracing::info!("✏️ Changing parameters of {}", port);
        let result = self
            .run_intent(&Intent::Change { port, parameters })
            .await?;
        self.refresh_after(result).await
    }

    pub async fn preinstall(&self) -> Result<CommandResult> {
        self.run_intent(&Intent::Preinstall).await
    }

    pub async fn update(&self) -> Result<CommandResult> {
        self.run_intent(&Intent::Update).await
    }

    pub async fn reload(&self) -> Result<CommandResult> {
        tracing::info!("🔄 Reloading the com0com driver");
        let result = self.run_intent(&Intent::Reload).await?;
        self.refresh_after(result).await
    }

    /// 移除所有埠與驅動；快取一併清空
    pub async fn uninstall(&self) -> Result<CommandResult> {
        tracing::info!("🗑️ Uninstalling com0com");
        let result = self.run_intent(&Intent::Uninstall).await?;
        self.cache.write().await.clear();
        Ok(result)
    }

    pub async fn enable_all(&self) -> Result<CommandResult> {
        let result = self.run_intent(&Intent::EnableAll).await?;
        self.refresh_after(result).await
    }

    pub async fn disable_all(&self) -> Result<CommandResult> {
        let result = self.run_intent(&Intent::DisableAll).await?;
        self.refresh_after(result).await
    }

    pub async fn infclean(&self) -> Result<CommandResult> {
        self.run_intent(&Intent::InfClean).await
    }

    pub async fn busy_names(&self, pattern: &str) -> Result<Vec<String>> {
        let result = self
            .run_intent(&Intent::BusyNames {
                pattern: pattern.to_string(),
            })
            .await?;
        Ok(parse_name_list(result.stdout()))
    }

    pub async fn list_friendly_names(&self) -> Result<Vec<String>> {
        let result = self.run_intent(&Intent::ListFriendlyNames).await?;
        Ok(parse_name_list(result.stdout()))
    }

    pub async fn update_friendly_names(&self) -> Result<CommandResult> {
        let result = self.run_intent(&Intent::UpdateFriendlyNames).await?;
        self.refresh_after(result).await
    }

    /// 以 `list` 探測驅動是否可用
    pub async fn driver_status(&self) -> DriverInfo {
        let install_path = self
            .install_path
            .as_ref()
            .map(|path| path.display().to_string());

        match self.list_report().await {
            Ok(_) => DriverInfo {
                status: DriverStatus::Installed,
                install_path,
                error_message: None,
            },
            Err(e) => {
                let status = match &e {
                    ManagerError::Execution(result) => match result.error().map(|i| i.category()) {
                        Some(ErrorCategory::Driver) | Some(ErrorCategory::Setupc) => {
                            DriverStatus::NotInstalled
                        }
                        _ => DriverStatus::Error,
                    },
                    _ => DriverStatus::Error,
                };
                tracing::warn!("Driver check failed ({:?}): {}", status, e);
                DriverInfo {
                    status,
                    install_path: None,
                    error_message: Some(e.user_friendly_message()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::ErrorClassifier;
    use crate::core::params::ParamKey;
    use crate::domain::command::Outcome;
    use crate::domain::model::PortStatus;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// 依序回傳預先排好的 (exit code, stdout)，並記錄收到的參數
    #[derive(Clone, Default)]
    struct MockExecutor {
        responses: Arc<Mutex<VecDeque<(i32, String)>>>,
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl MockExecutor {
        fn respond(&self, exit_code: i32, stdout: &str) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .push_back((exit_code, stdout.to_string()));
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        fn answer(&self, spec: &CommandSpec) -> CommandResult {
            self.calls.lock().unwrap().push(spec.argv());
            let (exit_code, stdout) = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((0, String::new()));
            let error = (exit_code != 0).then(|| ErrorClassifier::new().classify(&stdout));
            CommandResult::new(
                spec,
                Outcome::Exited,
                stdout,
                String::new(),
                exit_code,
                Utc::now(),
                Duration::from_millis(1),
                error,
            )
        }
    }

    #[async_trait]
    impl Executor for MockExecutor {
        async fn execute(&self, spec: CommandSpec, _timeout: Duration) -> CommandResult {
            self.answer(&spec)
        }

        async fn execute_batch(&self, steps: Vec<CommandSpec>, _timeout: Duration) -> BatchResult {
            let mut results = Vec::new();
            for (index, spec) in steps.iter().enumerate() {
                let result = self.answer(spec);
                let ok = result.success();
                results.push(result);
                if !ok {
                    return BatchResult {
                        results,
                        failed_step: Some(index),
                        total_steps: steps.len(),
                    };
                }
            }
            BatchResult {
                results,
                failed_step: None,
                total_steps: steps.len(),
            }
        }
    }

    fn manager(mock: &MockExecutor) -> PortManager<MockExecutor> {
        PortManager::new(mock.clone(), Duration::from_secs(5))
    }

    const TWO_PAIRS: &str = "CNCA0 PortName=COM1\nCNCB0 PortName=COM2\nCNCA1 PortName=COM3\n";

    #[tokio::test]
    async fn test_list_updates_cache() {
        let mock = MockExecutor::default();
        mock.respond(0, TWO_PAIRS);
        let manager = manager(&mock);

        let pairs = manager.list_ports().await.unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].status(), PortStatus::Error);
        assert_eq!(manager.cached_pairs().await.len(), 2);
    }

    #[tokio::test]
    async fn test_install_refreshes_list() {
        let mock = MockExecutor::default();
        mock.respond(0, "").respond(0, TWO_PAIRS);
        let manager = manager(&mock);

        let params = ParameterSet::defaults().with(ParamKey::PortName, "COM1");
        manager
            .install_pair(0, params, ParameterSet::defaults())
            .await
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0], vec!["install", "0", "PortName=COM1", "-"]);
        assert_eq!(calls[1], vec!["list"]);
        assert_eq!(manager.cached_pairs().await.len(), 2);
    }

    #[tokio::test]
    async fn test_reload_and_friendly_name_update_refresh_list() {
        let mock = MockExecutor::default();
        mock.respond(0, TWO_PAIRS)
            .respond(0, "")
            .respond(0, "CNCA0 PortName=COM1\nCNCB0 PortName=COM2\n")
            .respond(0, "")
            .respond(0, TWO_PAIRS);
        let manager = manager(&mock);

        manager.list_ports().await.unwrap();
        manager.reload().await.unwrap();
        assert_eq!(manager.cached_pairs().await.len(), 1);

        manager.update_friendly_names().await.unwrap();
        assert_eq!(manager.cached_pairs().await.len(), 2);

        let calls = mock.calls();
        assert_eq!(calls[1], vec!["reload"]);
        assert_eq!(calls[2], vec!["list"]);
        assert_eq!(calls[3], vec!["updatefnames"]);
        assert_eq!(calls[4], vec!["list"]);
    }

    #[tokio::test]
    async fn test_failed_command_becomes_execution_error() {
        let mock = MockExecutor::default();
        mock.respond(1, "Access is denied.");
        let manager = manager(&mock);

        let err = manager.remove_pair(3).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Permission);
        // 失敗時不重新讀取清單
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn test_validation_failure_runs_nothing() {
        let mock = MockExecutor::default();
        let manager = manager(&mock);

        let bad = ParameterSet::defaults().with(ParamKey::EmuBR, "maybe");
        let err = tokio_test::block_on(manager.change_port("CNCA0".parse().unwrap(), bad))
            .unwrap_err();
        assert!(matches!(err, ManagerError::Validation { .. }));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_uninstall_clears_cache() {
        let mock = MockExecutor::default();
        mock.respond(0, TWO_PAIRS).respond(0, "");
        let manager = manager(&mock);

        manager.list_ports().await.unwrap();
        manager.uninstall().await.unwrap();
        assert!(manager.cached_pairs().await.is_empty());
    }

    #[tokio::test]
    async fn test_driver_status() {
        let mock = MockExecutor::default();
        mock.respond(0, TWO_PAIRS)
            .respond(1, "The com0com driver is not installed");
        let manager = manager(&mock).with_install_path(Some(PathBuf::from("C:/com0com")));

        let info = manager.driver_status().await;
        assert!(info.is_available());
        assert_eq!(info.install_path.as_deref(), Some("C:/com0com"));

        let info = manager.driver_status().await;
        assert_eq!(info.status, DriverStatus::NotInstalled);
        assert!(info.error_message.is_some());
    }

    #[tokio::test]
    async fn test_busy_names() {
        let mock = MockExecutor::default();
        mock.respond(0, "COM1\nCOM3\n");
        let manager = manager(&mock);

        assert_eq!(manager.busy_names("COM?*").await.unwrap(), vec!["COM1", "COM3"]);
        assert_eq!(mock.calls()[0], vec!["busynames", "COM?*"]);
    }

    #[tokio::test]
    async fn test_install_batch_reports_failed_step() {
        let mock = MockExecutor::default();
        mock.respond(0, "").respond(1, "Invalid parameter");
        let manager = manager(&mock);

        let installs = vec![
            Intent::InstallAuto {
                port_a: ParameterSet::defaults(),
                port_b: ParameterSet::defaults(),
            },
            Intent::InstallAuto {
                port_a: ParameterSet::defaults(),
                port_b: ParameterSet::defaults(),
            },
        ];
        let err = manager.install_batch(&installs).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);

        // 兩個步驟 + 失敗後的 list，不會送出最後的 install
        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], vec!["list"]);
    }
}
