//! 解析 `setupc list` 的輸出。
//!
//! 每一行是一個埠的紀錄，例如：
//!
//! ```text
//!        CNCA0 PortName=COM8,EmuBR=yes
//!        CNCB0 PortName=COM9
//! ```
//!
//! 埠的順序不固定，同一對的兩端也不一定相鄰。格式錯誤的紀錄會被略過並計數，
//! 只缺一端的埠對仍然會回傳（狀態為 error）。

use crate::core::params::ParameterSet;
use crate::domain::model::{Port, PortId, PortPair, Side, PORT_ID_PREFIX};
use crate::utils::error::{ManagerError, Result};
use std::collections::BTreeMap;

/// 解析結果與被略過的紀錄數
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub pairs: Vec<PortPair>,
    pub skipped: usize,
}

impl ParseReport {
    pub fn pair(&self, number: u32) -> Option<&PortPair> {
        self.pairs.iter().find(|pair| pair.number() == number)
    }
}

#[derive(Default)]
struct Sides {
    port_a: Option<Port>,
    port_b: Option<Port>,
}

pub fn parse_port_list(output: &str) -> Result<ParseReport> {
    let mut sides: BTreeMap<u32, Sides> = BTreeMap::new();
    let mut records = 0usize;
    let mut skipped = 0usize;

    for line in output.lines().map(str::trim) {
        // 非 CNC 開頭的行（標題、空行、提示文字）不算紀錄
        if !line.starts_with(PORT_ID_PREFIX) {
            continue;
        }
        records += 1;

        let port = match parse_record(line) {
            Ok(port) => port,
            Err(e) => {
                tracing::warn!("Skipping malformed port record '{}': {}", line, e);
                skipped += 1;
                continue;
            }
        };

        let id = port.id();
        let entry = sides.entry(id.pair).or_default();
        let slot = match id.side {
            Side::A => &mut entry.port_a,
            Side::B => &mut entry.port_b,
        };
        if slot.is_some() {
            tracing::warn!("Skipping duplicate record for {}", id);
            skipped += 1;
            continue;
        }
        *slot = Some(port);
    }

    if records > 0 && records == skipped {
        return Err(ManagerError::Parse {
            message: format!("none of the {} port records could be parsed", records),
            skipped,
        });
    }

    let pairs: Vec<PortPair> = sides
        .into_iter()
        .map(|(number, sides)| PortPair::new(number, sides.port_a, sides.port_b))
        .collect();

    tracing::debug!(
        "Parsed {} port pairs ({} records skipped)",
        pairs.len(),
        skipped
    );
    Ok(ParseReport { pairs, skipped })
}

/// 解析單一紀錄：識別碼、可選的停用標記、參數字串
fn parse_record(line: &str) -> Result<Port> {
    let mut tokens = line.split_whitespace();
    let id: PortId = tokens.next().unwrap_or_default().parse()?;

    let mut disabled = false;
    let mut params = Vec::new();
    for token in tokens {
        if is_disabled_marker(token) {
            disabled = true;
        } else {
            params.push(token);
        }
    }

    let parameters = if params.is_empty() {
        ParameterSet::defaults()
    } else {
        ParameterSet::decode(&params.join(" "))?
    };

    Ok(Port::new(id, parameters).disabled(disabled))
}

fn is_disabled_marker(token: &str) -> bool {
    token
        .trim_matches(|c| c == '(' || c == ')' || c == '[' || c == ']')
        .eq_ignore_ascii_case("disabled")
}

/// `busynames` 的輸出：每行一個正在使用的名稱
pub fn parse_name_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::{ParamKey, ParamValue};
    use crate::domain::model::PortStatus;

    #[test]
    fn test_parse_simple_list() {
        let output = "       CNCA0 PortName=COM8\n       CNCB0 PortName=COM9,EmuBR=yes\n";
        let report = parse_port_list(output).unwrap();

        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.skipped, 0);
        let pair = &report.pairs[0];
        assert_eq!(pair.status(), PortStatus::Active);
        assert_eq!(
            pair.port_b().unwrap().parameters().get_key(ParamKey::EmuBR),
            Some(&ParamValue::explicit("yes"))
        );
    }

    #[test]
    fn test_sides_out_of_order_and_not_adjacent() {
        let output = "CNCB1 PortName=COM4\nCNCA0 PortName=COM1\nCNCA1 PortName=COM3\nCNCB0 PortName=COM2\n";
        let report = parse_port_list(output).unwrap();

        assert_eq!(report.pairs.len(), 2);
        assert_eq!(report.pairs[0].number(), 0);
        assert_eq!(report.pairs[1].display_name(), "Pair 1: COM3 <-> COM4");
    }

    #[test]
    fn test_malformed_records_are_counted() {
        let output = "CNCA0 PortName=COM1\nCNCB0 PortName=COM2\nCNCX7 PortName=COM5\nCNCA2 garbage\n";
        let report = parse_port_list(output).unwrap();
        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn test_all_records_malformed_is_fatal() {
        let err = parse_port_list("CNCQ1 x\nCNCA nothing\n").unwrap_err();
        assert!(matches!(err, ManagerError::Parse { skipped: 2, .. }));
    }

    #[test]
    fn test_empty_output_has_no_pairs() {
        let report = parse_port_list("\n   \n").unwrap();
        assert!(report.pairs.is_empty());
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_disabled_marker() {
        let output = "CNCA4 PortName=COM10 (disabled)\nCNCB4 PortName=COM11\n";
        let report = parse_port_list(output).unwrap();
        assert_eq!(report.pairs[0].status(), PortStatus::Disabled);
        assert!(report.pairs[0].port_a().unwrap().is_disabled());
    }

    #[test]
    fn test_record_without_parameters() {
        let report = parse_port_list("CNCA3\nCNCB3 PortName=-\n").unwrap();
        let pair = report.pair(3).unwrap();
        assert!(pair.port_a().unwrap().parameters().is_defaults());
        assert_eq!(
            pair.port_b().unwrap().name(),
            Some(&ParamValue::Default)
        );
    }

    #[test]
    fn test_parse_name_list() {
        assert_eq!(parse_name_list("COM1\n\n COM3 \n"), vec!["COM1", "COM3"]);
    }
}
