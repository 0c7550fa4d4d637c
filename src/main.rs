use anyhow::Context;
use clap::Parser;
use com0com_manager::config::cli::{render_pairs, Cli, Commands};
use com0com_manager::core::ConfigProvider;
use com0com_manager::utils::{logger, validation::parse_port_id};
use com0com_manager::{
    AppConfig, CommandBuilder, CommandResult, EngineSettings, ErrorClassifier, ErrorInfo,
    ExecutionEngine, ManagerError, ParameterSet, PortManager,
};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let classifier = Arc::new(ErrorClassifier::new());

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(cli.verbose);
            tracing::error!("❌ Configuration validation failed: {}", e);
            fail(&e, &classifier);
        }
    };

    // 初始化日誌
    logger::init_logger(cli.verbose, Some(&config.logging.level), config.logging.json);
    tracing::debug!("CLI arguments: {:?}", cli);

    // 不需要 setupc 的命令
    match &cli.command {
        Commands::Diagnose { text } => {
            print_error_info(&classifier.classify(&text.join(" ")));
            return Ok(());
        }
        Commands::Presets => {
            print_presets(&config);
            return Ok(());
        }
        Commands::Init { path } => {
            config
                .save(path)
                .with_context(|| format!("writing configuration to {}", path.display()))?;
            println!("✅ Configuration written to {}", path.display());
            return Ok(());
        }
        _ => {}
    }

    tracing::info!("🚀 Using setupc at {}", config.setupc.path.display());
    let engine = ExecutionEngine::new(EngineSettings::from_config(&config), classifier.clone());
    let manager = PortManager::new(engine, config.command_timeout())
        .with_builder(CommandBuilder::with_options(cli.flags.to_options()))
        .with_install_path(config.setupc.path.parent().map(Path::to_path_buf));

    match run(&cli, &config, &manager).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
            tracing::info!("✅ Done");
        }
        Err(e) => {
            tracing::error!(
                "❌ Operation failed: {} (Category: {}, Severity: {})",
                e,
                e.category(),
                e.severity().as_str()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            fail(&e, &classifier);
        }
    }

    Ok(())
}

async fn run(
    cli: &Cli,
    config: &AppConfig,
    manager: &PortManager<ExecutionEngine>,
) -> com0com_manager::Result<String> {
    let output = match &cli.command {
        Commands::List { format } => {
            let pairs = manager.list_ports().await?;
            render_pairs(&pairs, *format)?
        }
        Commands::Install {
            pair,
            preset,
            port_a,
            port_b,
        } => {
            let (port_a, port_b) = match preset {
                Some(name) => config.preset(name)?,
                None => (
                    decode_side(port_a.as_deref())?,
                    decode_side(port_b.as_deref())?,
                ),
            };
            let result = match pair {
                Some(pair) => manager.install_pair(*pair, port_a, port_b).await?,
                None => manager.install_auto(port_a, port_b).await?,
            };
            command_output(&result)
        }
        Commands::Remove { pair } => command_output(&manager.remove_pair(*pair).await?),
        Commands::Change { port, parameters } => {
            let port = parse_port_id("port", port)?;
            let parameters = ParameterSet::decode(parameters)?;
            command_output(&manager.change_port(port, parameters).await?)
        }
        Commands::Preinstall => command_output(&manager.preinstall().await?),
        Commands::Update => command_output(&manager.update().await?),
        Commands::Reload => command_output(&manager.reload().await?),
        Commands::Uninstall => command_output(&manager.uninstall().await?),
        Commands::Enable => command_output(&manager.enable_all().await?),
        Commands::Disable => command_output(&manager.disable_all().await?),
        Commands::Infclean => command_output(&manager.infclean().await?),
        Commands::Busynames { pattern } => manager.busy_names(pattern).await?.join("\n"),
        Commands::Listfnames => manager.list_friendly_names().await?.join("\n"),
        Commands::Updatefnames => command_output(&manager.update_friendly_names().await?),
        Commands::Status => {
            let info = manager.driver_status().await;
            serde_json::to_string_pretty(&info)?
        }
        Commands::Diagnose { .. } | Commands::Presets | Commands::Init { .. } => String::new(),
    };
    Ok(output)
}

fn decode_side(raw: Option<&str>) -> com0com_manager::Result<ParameterSet> {
    match raw {
        Some(raw) => ParameterSet::decode(raw),
        None => Ok(ParameterSet::defaults()),
    }
}

fn command_output(result: &CommandResult) -> String {
    tracing::debug!(
        "'{}' finished in {:.2}s",
        result.command_line(),
        result.elapsed().as_secs_f64()
    );
    result.stdout().trim_end().to_string()
}

fn print_presets(config: &AppConfig) {
    if config.presets.is_empty() {
        println!("No presets configured");
        return;
    }
    for (name, preset) in &config.presets {
        println!("{:<16} A: {:<32} B: {}", name, preset.port_a, preset.port_b);
    }
}

fn print_error_info(info: &ErrorInfo) {
    eprintln!("❌ {}", info);
    eprintln!(
        "   Category: {}, Severity: {}",
        info.category(),
        info.severity().as_str()
    );
    for solution in info.solutions() {
        eprintln!("💡 {}: {}", solution.title(), solution.description());
        if let Some(link) = solution.link() {
            eprintln!("   {}", link);
        }
    }
}

/// 輸出錯誤資訊，依嚴重程度決定退出碼
fn fail(error: &ManagerError, classifier: &ErrorClassifier) -> ! {
    print_error_info(&error.error_info(classifier));
    if let ManagerError::Execution(result) = error {
        let details = result.stderr().trim();
        if !details.is_empty() {
            eprintln!("{}", details);
        }
    }

    let exit_code = error.severity().exit_code();
    let exit_code = if exit_code == 0 { 1 } else { exit_code };
    std::process::exit(exit_code);
}
