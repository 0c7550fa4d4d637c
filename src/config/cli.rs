use crate::config::AppConfig;
use crate::domain::command::{GlobalOptions, WaitOption};
use crate::domain::model::{Port, PortPair};
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "com0com-manager")]
#[command(about = "Manage com0com virtual serial port pairs through setupc")]
pub struct Cli {
    /// TOML 配置檔
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// setupc.exe 的路徑，覆蓋配置檔
    #[arg(long)]
    pub setupc: Option<PathBuf>,

    /// 每個命令的逾時秒數，覆蓋配置檔
    #[arg(long)]
    pub timeout: Option<u64>,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[command(flatten)]
    pub flags: SetupcFlags,

    #[command(subcommand)]
    pub command: Commands,
}

/// 直接轉交給 setupc 的全域旗標
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SetupcFlags {
    /// 把 setupc 的輸出寫到檔案
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// 等待裝置安裝完成，`+N` 表示逾時後詢問
    #[arg(long, value_parser = parse_wait)]
    pub wait: Option<WaitOption>,

    #[arg(long)]
    pub detail_prms: bool,

    #[arg(long)]
    pub silent: bool,

    #[arg(long)]
    pub no_update_fnames: bool,

    #[arg(long)]
    pub show_fnames: bool,
}

impl SetupcFlags {
    pub fn to_options(&self) -> GlobalOptions {
        GlobalOptions {
            output: self.output.clone(),
            wait: self.wait,
            detail_prms: self.detail_prms,
            silent: self.silent,
            no_update: false,
            no_update_fnames: self.no_update_fnames,
            show_fnames: self.show_fnames,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// 列出所有埠對
    List {
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// 安裝一對埠；未指定 --pair 時使用下一個可用編號
    Install {
        #[arg(long)]
        pair: Option<u32>,
        /// 使用配置檔中的預設參數
        #[arg(long, conflicts_with_all = ["port_a", "port_b"])]
        preset: Option<String>,
        /// A 端參數，例如 PortName=COM8,EmuBR=yes
        port_a: Option<String>,
        /// B 端參數
        port_b: Option<String>,
    },
    Remove {
        pair: u32,
    },
    /// 修改單一埠的參數，例如 change CNCA0 PortName=COM9
    Change {
        port: String,
        parameters: String,
    },
    Preinstall,
    Update,
    Reload,
    Uninstall,
    /// 啟用所有埠
    Enable,
    /// 停用所有埠
    Disable,
    Infclean,
    Busynames {
        pattern: String,
    },
    Listfnames,
    Updatefnames,
    /// 檢查驅動是否可用
    Status,
    /// 列出配置檔中的預設參數
    Presets,
    /// 把目前生效的配置寫成 TOML 檔
    Init {
        path: PathBuf,
    },
    /// 對任意錯誤文字執行錯誤分類
    Diagnose {
        #[arg(required = true)]
        text: Vec<String>,
    },
}

fn parse_wait(raw: &str) -> std::result::Result<WaitOption, String> {
    let (prompt_after_timeout, digits) = match raw.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let seconds = digits
        .parse::<u32>()
        .map_err(|_| format!("'{}' is not a number of seconds", raw))?;
    Ok(WaitOption {
        seconds,
        prompt_after_timeout,
    })
}

impl Cli {
    /// 載入配置檔（沒有就用預設值），再套用命令列覆蓋並驗證
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };

        if let Some(path) = &self.setupc {
            config.setupc.path = path.clone();
        } else if self.config.is_some() {
            config.setupc.path = config.resolved_executable();
        }
        if let Some(timeout) = self.timeout {
            config.setupc.timeout_seconds = timeout;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
        if self.json_logs {
            config.logging.json = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Serialize)]
struct PairRow {
    pair: u32,
    status: String,
    port_a: String,
    port_b: String,
    params_a: String,
    params_b: String,
}

impl From<&PortPair> for PairRow {
    fn from(pair: &PortPair) -> Self {
        let name = |port: Option<&Port>| port.map(Port::display_name).unwrap_or_default();
        let params = |port: Option<&Port>| {
            port.map(|p| p.parameters().encode())
                .unwrap_or_default()
        };
        Self {
            pair: pair.number(),
            status: pair.status().to_string(),
            port_a: name(pair.port_a()),
            port_b: name(pair.port_b()),
            params_a: params(pair.port_a()),
            params_b: params(pair.port_b()),
        }
    }
}

pub fn render_pairs(pairs: &[PortPair], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(pairs)?),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for pair in pairs {
                writer.serialize(PairRow::from(pair))?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        OutputFormat::Table => {
            if pairs.is_empty() {
                return Ok("No port pairs installed".to_string());
            }
            let mut lines = vec![format!(
                "{:<6} {:<10} {:<12} {:<12}",
                "PAIR", "STATUS", "PORT A", "PORT B"
            )];
            for pair in pairs {
                let row = PairRow::from(pair);
                let port_b = if row.port_b.is_empty() { "-" } else { &row.port_b };
                let port_a = if row.port_a.is_empty() { "-" } else { &row.port_a };
                lines.push(format!(
                    "{:<6} {:<10} {:<12} {:<12}",
                    row.pair, row.status, port_a, port_b
                ));
            }
            Ok(lines.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_port_list;

    fn pairs() -> Vec<PortPair> {
        parse_port_list("CNCA0 PortName=COM8\nCNCB0 PortName=COM9\nCNCA1 PortName=COM3\n")
            .unwrap()
            .pairs
    }

    #[test]
    fn test_parse_wait() {
        assert_eq!(
            parse_wait("+15").unwrap(),
            WaitOption {
                seconds: 15,
                prompt_after_timeout: true
            }
        );
        assert!(!parse_wait("5").unwrap().prompt_after_timeout);
        assert!(parse_wait("soon").is_err());
    }

    #[test]
    fn test_cli_parses_install() {
        let cli = Cli::try_parse_from([
            "com0com-manager",
            "--wait",
            "+10",
            "install",
            "--pair",
            "3",
            "PortName=COM8",
            "-",
        ])
        .unwrap();

        match cli.command {
            Commands::Install {
                pair,
                port_a,
                port_b,
                preset,
            } => {
                assert_eq!(pair, Some(3));
                assert_eq!(port_a.as_deref(), Some("PortName=COM8"));
                assert_eq!(port_b.as_deref(), Some("-"));
                assert!(preset.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.flags.to_options().to_args(), vec!["--wait", "+10"]);
    }

    #[test]
    fn test_render_table() {
        let table = render_pairs(&pairs(), OutputFormat::Table).unwrap();
        assert!(table.starts_with("PAIR"));
        assert!(table.contains("COM8"));
        assert!(table.lines().nth(2).unwrap().contains("error"));
    }

    #[test]
    fn test_render_csv_and_json() {
        let csv = render_pairs(&pairs(), OutputFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "pair,status,port_a,port_b,params_a,params_b"
        );
        assert_eq!(lines.next().unwrap(), "0,active,COM8,COM9,PortName=COM8,PortName=COM9");

        let json: serde_json::Value =
            serde_json::from_str(&render_pairs(&pairs(), OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json[1]["status"], "error");
        assert_eq!(json[0]["port_a"]["id"], "CNCA0");
    }
}
