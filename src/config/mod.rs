#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

pub use toml_config::{AppConfig, LoggingConfig, PresetConfig, SetupcConfig};

use std::path::{Path, PathBuf};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// com0com 常見的安裝位置，依序嘗試
pub const DEFAULT_SETUPC_PATHS: [&str; 3] = [
    r"C:\Program Files\com0com\setupc.exe",
    r"C:\Program Files (x86)\com0com\setupc.exe",
    r"C:\com0com\setupc.exe",
];

/// 回傳第一個存在的檔案路徑
pub fn locate_executable<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|candidate| candidate.as_ref())
        .find(|path| path.is_file())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_executable_picks_first_existing() {
        let dir = TempDir::new().unwrap();
        let second = dir.path().join("b").join("setupc.exe");
        let third = dir.path().join("setupc.exe");
        std::fs::create_dir_all(second.parent().unwrap()).unwrap();
        std::fs::write(&second, b"").unwrap();
        std::fs::write(&third, b"").unwrap();

        let candidates = vec![dir.path().join("missing.exe"), second.clone(), third];
        assert_eq!(locate_executable(&candidates), Some(second));
    }

    #[test]
    fn test_locate_executable_ignores_directories() {
        let dir = TempDir::new().unwrap();
        assert_eq!(locate_executable(&[dir.path()]), None);
    }
}
