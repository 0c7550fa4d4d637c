use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// RUST_LOG 優先；否則使用指定層級，未指定時依 verbose 決定
fn build_filter(verbose: bool, level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match level {
            Some(level) => level.to_ascii_lowercase(),
            None if verbose => "debug".to_string(),
            None => "info".to_string(),
        };
        EnvFilter::new(format!("com0com_manager={},warn", level))
    })
}

pub fn init_cli_logger(verbose: bool) {
    init_logger(verbose, None, false);
}

pub fn init_json_logger() {
    init_logger(false, None, true);
}

/// 依配置檔的 `[logging]` 設定初始化
pub fn init_logger(verbose: bool, level: Option<&str>, json: bool) {
    let registry = tracing_subscriber::registry().with(build_filter(verbose, level));

    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .try_init()
    };

    // 測試中可能被初始化多次
    if let Err(e) = result {
        eprintln!("Logger already initialized: {}", e);
    }
}
