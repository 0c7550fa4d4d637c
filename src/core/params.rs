//! setupc 參數字串的編解碼。
//!
//! 參數字串的文法：`-`（使用預設值）、`*`（沿用目前設定），或是
//! `key=value[,key=value...]`。哨兵值只在這一層與字串互轉，其餘程式碼
//! 一律透過 [`ParamValue`] 與 [`ParameterSet`] 操作。

use crate::utils::error::{ManagerError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub const DEFAULTS_SENTINEL: &str = "-";
pub const CURRENT_SENTINEL: &str = "*";
pub const AUTO_ASSIGN_SENTINEL: &str = "COM#";

/// setupc 認得的參數名稱，宣告順序即序列化順序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ParamKey {
    PortName,
    RealPortName,
    EmuBR,
    EmuOverrun,
    EmuNoise,
    AddRTTO,
    AddRITO,
    PlugInMode,
    ExclusiveMode,
    HiddenMode,
    AllDataBits,
    Cts,
    Dsr,
    Dcd,
    Ri,
}

/// 每個參數的值型別，決定要套用哪一個驗證函式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    PortName,
    FreeText,
    Boolean,
    Probability,
    Timing,
    Pin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamGroup {
    Basic,
    Emulation,
    Timing,
    Modes,
    PinWiring,
}

impl ParamKey {
    pub const ALL: [ParamKey; 15] = [
        ParamKey::PortName,
        ParamKey::RealPortName,
        ParamKey::EmuBR,
        ParamKey::EmuOverrun,
        ParamKey::EmuNoise,
        ParamKey::AddRTTO,
        ParamKey::AddRITO,
        ParamKey::PlugInMode,
        ParamKey::ExclusiveMode,
        ParamKey::HiddenMode,
        ParamKey::AllDataBits,
        ParamKey::Cts,
        ParamKey::Dsr,
        ParamKey::Dcd,
        ParamKey::Ri,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKey::PortName => "PortName",
            ParamKey::RealPortName => "RealPortName",
            ParamKey::EmuBR => "EmuBR",
            ParamKey::EmuOverrun => "EmuOverrun",
            ParamKey::EmuNoise => "EmuNoise",
            ParamKey::AddRTTO => "AddRTTO",
            ParamKey::AddRITO => "AddRITO",
            ParamKey::PlugInMode => "PlugInMode",
            ParamKey::ExclusiveMode => "ExclusiveMode",
            ParamKey::HiddenMode => "HiddenMode",
            ParamKey::AllDataBits => "AllDataBits",
            ParamKey::Cts => "cts",
            ParamKey::Dsr => "dsr",
            ParamKey::Dcd => "dcd",
            ParamKey::Ri => "ri",
        }
    }

    pub fn class(&self) -> ParamClass {
        match self {
            ParamKey::PortName => ParamClass::PortName,
            ParamKey::RealPortName => ParamClass::FreeText,
            ParamKey::EmuNoise => ParamClass::Probability,
            ParamKey::AddRTTO | ParamKey::AddRITO => ParamClass::Timing,
            ParamKey::Cts | ParamKey::Dsr | ParamKey::Dcd | ParamKey::Ri => ParamClass::Pin,
            ParamKey::EmuBR
            | ParamKey::EmuOverrun
            | ParamKey::PlugInMode
            | ParamKey::ExclusiveMode
            | ParamKey::HiddenMode
            | ParamKey::AllDataBits => ParamClass::Boolean,
        }
    }

    pub fn group(&self) -> ParamGroup {
        match self {
            ParamKey::PortName | ParamKey::RealPortName => ParamGroup::Basic,
            ParamKey::EmuBR | ParamKey::EmuOverrun | ParamKey::EmuNoise => ParamGroup::Emulation,
            ParamKey::AddRTTO | ParamKey::AddRITO => ParamGroup::Timing,
            ParamKey::PlugInMode
            | ParamKey::ExclusiveMode
            | ParamKey::HiddenMode
            | ParamKey::AllDataBits => ParamGroup::Modes,
            ParamKey::Cts | ParamKey::Dsr | ParamKey::Dcd | ParamKey::Ri => ParamGroup::PinWiring,
        }
    }

    /// 序列化排序用：已知參數依宣告順序，未知參數排在最後
    fn rank(name: &str) -> usize {
        ParamKey::ALL
            .iter()
            .position(|key| key.as_str() == name)
            .unwrap_or(ParamKey::ALL.len())
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamKey {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self> {
        ParamKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| ManagerError::validation("parameter", s, "Unknown parameter name"))
    }
}

/// 單一欄位的值；哨兵值以變體表示，不做字串比對
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamValue {
    Default,
    Current,
    AutoAssign,
    Explicit(String),
}

impl ParamValue {
    pub fn explicit(value: impl Into<String>) -> Self {
        ParamValue::Explicit(value.into())
    }

    pub fn from_wire(raw: &str) -> Self {
        match raw {
            DEFAULTS_SENTINEL => ParamValue::Default,
            CURRENT_SENTINEL => ParamValue::Current,
            AUTO_ASSIGN_SENTINEL => ParamValue::AutoAssign,
            other => ParamValue::Explicit(other.to_string()),
        }
    }

    pub fn to_wire(&self) -> &str {
        match self {
            ParamValue::Default => DEFAULTS_SENTINEL,
            ParamValue::Current => CURRENT_SENTINEL,
            ParamValue::AutoAssign => AUTO_ASSIGN_SENTINEL,
            ParamValue::Explicit(value) => value,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ParamValue::Explicit(value) if value.trim().is_empty())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_wire())
    }
}

impl From<&str> for ParamValue {
    fn from(raw: &str) -> Self {
        ParamValue::from_wire(raw)
    }
}

impl From<bool> for ParamValue {
    fn from(flag: bool) -> Self {
        ParamValue::Explicit(if flag { "yes" } else { "no" }.to_string())
    }
}

/// 可接到 cts/dsr/dcd/ri 的訊號來源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinSource {
    RemoteRts,
    LocalRts,
    RemoteDtr,
    LocalDtr,
    RemoteOut1,
    LocalOut1,
    RemoteOut2,
    LocalOut2,
    RemoteOpen,
    LocalOpen,
    On,
}

impl PinSource {
    pub const ALL: [PinSource; 11] = [
        PinSource::RemoteRts,
        PinSource::LocalRts,
        PinSource::RemoteDtr,
        PinSource::LocalDtr,
        PinSource::RemoteOut1,
        PinSource::LocalOut1,
        PinSource::RemoteOut2,
        PinSource::LocalOut2,
        PinSource::RemoteOpen,
        PinSource::LocalOpen,
        PinSource::On,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PinSource::RemoteRts => "rrts",
            PinSource::LocalRts => "lrts",
            PinSource::RemoteDtr => "rdtr",
            PinSource::LocalDtr => "ldtr",
            PinSource::RemoteOut1 => "rout1",
            PinSource::LocalOut1 => "lout1",
            PinSource::RemoteOut2 => "rout2",
            PinSource::LocalOut2 => "lout2",
            PinSource::RemoteOpen => "ropen",
            PinSource::LocalOpen => "lopen",
            PinSource::On => "on",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PinSource::ALL.iter().copied().find(|pin| pin.as_str() == name)
    }

    pub fn names() -> Vec<&'static str> {
        PinSource::ALL.iter().map(|pin| pin.as_str()).collect()
    }
}

/// 接線設定：`!` 前綴是值的一部分，不是獨立欄位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinAssignment {
    pub inverted: bool,
    pub source: PinSource,
}

impl PinAssignment {
    pub fn new(source: PinSource) -> Self {
        Self {
            inverted: false,
            source,
        }
    }

    pub fn inverted(source: PinSource) -> Self {
        Self {
            inverted: true,
            source,
        }
    }
}

impl fmt::Display for PinAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            f.write_str("!")?;
        }
        f.write_str(self.source.as_str())
    }
}

impl FromStr for PinAssignment {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self> {
        let (inverted, name) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let source = PinSource::from_name(name).ok_or_else(|| {
            ManagerError::validation(
                "pin",
                s,
                format!(
                    "Unknown signal '{}'. Must be one of: {} (optionally prefixed with !)",
                    name,
                    PinSource::names().join(", ")
                ),
            )
        })?;
        Ok(Self { inverted, source })
    }
}

#[derive(Debug, Clone)]
enum Repr {
    Defaults,
    Current,
    Fields(Vec<(String, ParamValue)>),
}

/// 一個埠的參數集合。
///
/// 兩個整體哨兵（預設 / 目前設定）與逐欄位設定互斥；欄位集合永遠不為空，
/// 移除最後一個欄位會回到「預設」。
#[derive(Debug, Clone)]
pub struct ParameterSet {
    repr: Repr,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl ParameterSet {
    pub fn defaults() -> Self {
        Self {
            repr: Repr::Defaults,
        }
    }

    pub fn current() -> Self {
        Self {
            repr: Repr::Current,
        }
    }

    pub fn is_defaults(&self) -> bool {
        matches!(self.repr, Repr::Defaults)
    }

    pub fn is_current(&self) -> bool {
        matches!(self.repr, Repr::Current)
    }

    /// 設定欄位。空值等同移除該欄位。
    ///
    /// 儲存的值即為送出的值：前後空白會去掉，布林參數一律轉成小寫。
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> &mut Self {
        let value = Self::canonical(name, value.into());
        if value.is_empty() {
            self.remove(name);
            return self;
        }

        if !matches!(self.repr, Repr::Fields(_)) {
            self.repr = Repr::Fields(Vec::new());
        }
        if let Repr::Fields(entries) = &mut self.repr {
            match entries.iter_mut().find(|(key, _)| key == name) {
                Some(entry) => entry.1 = value,
                None => entries.push((name.to_string(), value)),
            }
        }
        self
    }

    fn canonical(name: &str, value: ParamValue) -> ParamValue {
        let ParamValue::Explicit(raw) = value else {
            return value;
        };
        let trimmed = raw.trim();
        match ParamKey::from_str(name) {
            Ok(key) if key.class() == ParamClass::Boolean => {
                ParamValue::from_wire(&trimmed.to_ascii_lowercase())
            }
            _ => ParamValue::from_wire(trimmed),
        }
    }

    pub fn with(mut self, key: ParamKey, value: impl Into<ParamValue>) -> Self {
        self.set(key.as_str(), value);
        self
    }

    pub fn with_pin(self, key: ParamKey, pin: PinAssignment) -> Self {
        self.with(key, ParamValue::Explicit(pin.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        let Repr::Fields(entries) = &mut self.repr else {
            return None;
        };
        let index = entries.iter().position(|(key, _)| key == name)?;
        let (_, removed) = entries.remove(index);
        if entries.is_empty() {
            self.repr = Repr::Defaults;
        }
        Some(removed)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    pub fn get_key(&self, key: ParamKey) -> Option<&ParamValue> {
        self.get(key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        let entries: &[(String, ParamValue)] = match &self.repr {
            Repr::Fields(entries) => entries,
            _ => &[],
        };
        entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 以固定順序排列的欄位（已知參數依宣告順序，未知參數保持插入順序）
    fn ordered(&self) -> Vec<(&str, &ParamValue)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by_key(|(key, _)| ParamKey::rank(key));
        entries
    }

    /// 轉成 setupc 參數字串
    pub fn encode(&self) -> String {
        match &self.repr {
            Repr::Defaults => DEFAULTS_SENTINEL.to_string(),
            Repr::Current => CURRENT_SENTINEL.to_string(),
            Repr::Fields(_) => {
                let parts: Vec<String> = self
                    .ordered()
                    .into_iter()
                    .filter(|(_, value)| !value.is_empty())
                    .map(|(key, value)| format!("{}={}", key, value.to_wire()))
                    .collect();
                if parts.is_empty() {
                    DEFAULTS_SENTINEL.to_string()
                } else {
                    parts.join(",")
                }
            }
        }
    }

    /// 解析 setupc 參數字串；格式錯誤的項目回傳 validation 錯誤
    pub fn decode(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match raw {
            DEFAULTS_SENTINEL => return Ok(Self::defaults()),
            CURRENT_SENTINEL => return Ok(Self::current()),
            "" => {
                return Err(ManagerError::validation(
                    "parameters",
                    raw,
                    "Parameter string cannot be empty (use '-' for defaults)",
                ))
            }
            _ => {}
        }

        let mut set = Self::defaults();
        for entry in raw.split(',') {
            let entry = entry.trim();
            let Some((key, value)) = entry.split_once('=') else {
                return Err(ManagerError::validation(
                    "parameters",
                    entry,
                    "Invalid parameter format, expected key=value",
                ));
            };
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() {
                return Err(ManagerError::validation(
                    "parameters",
                    entry,
                    "Parameter key cannot be empty",
                ));
            }
            if value.is_empty() {
                return Err(ManagerError::validation(
                    key,
                    value,
                    format!("Parameter value for '{}' cannot be empty", key),
                ));
            }
            if set.get(key).is_some() {
                return Err(ManagerError::validation(
                    key,
                    value,
                    format!("Parameter '{}' is given more than once", key),
                ));
            }
            set.set(key, ParamValue::from_wire(value));
        }
        Ok(set)
    }
}

/// 比較時忽略欄位順序
impl PartialEq for ParameterSet {
    fn eq(&self, other: &Self) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Defaults, Repr::Defaults) | (Repr::Current, Repr::Current) => true,
            (Repr::Fields(a), Repr::Fields(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(key, value)| other.get(key) == Some(value))
            }
            _ => false,
        }
    }
}

impl Eq for ParameterSet {}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ParameterSet {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_declared_key_order() {
        let set = ParameterSet::defaults()
            .with(ParamKey::EmuBR, "yes")
            .with(ParamKey::PortName, "COM8");

        assert_eq!(set.encode(), "PortName=COM8,EmuBR=yes");
    }

    #[test]
    fn test_encode_sentinels() {
        assert_eq!(ParameterSet::defaults().encode(), "-");
        assert_eq!(ParameterSet::current().encode(), "*");
    }

    #[test]
    fn test_empty_values_are_omitted() {
        let mut set = ParameterSet::defaults().with(ParamKey::PortName, "COM3");
        set.set("EmuBR", "");
        assert_eq!(set.encode(), "PortName=COM3");

        set.set("PortName", "  ");
        assert!(set.is_defaults());
        assert_eq!(set.encode(), "-");
    }

    #[test]
    fn test_unknown_keys_keep_insertion_order_after_known_keys() {
        let mut set = ParameterSet::defaults();
        set.set("Zeta", "1");
        set.set("Alpha", "2");
        set.set("cts", "!rrts");
        assert_eq!(set.encode(), "cts=!rrts,Zeta=1,Alpha=2");
    }

    #[test]
    fn test_decode_sentinels_and_fields() {
        assert!(ParameterSet::decode("-").unwrap().is_defaults());
        assert!(ParameterSet::decode(" * ").unwrap().is_current());

        let set = ParameterSet::decode("PortName=COM#,cts=!ropen").unwrap();
        assert_eq!(set.get("PortName"), Some(&ParamValue::AutoAssign));
        assert_eq!(set.get("cts"), Some(&ParamValue::explicit("!ropen")));
    }

    #[test]
    fn test_decode_rejects_malformed_entries() {
        assert!(ParameterSet::decode("PortName").is_err());
        assert!(ParameterSet::decode("=COM3").is_err());
        assert!(ParameterSet::decode("PortName=COM3,").is_err());
        assert!(ParameterSet::decode("PortName=COM3,PortName=COM4").is_err());
        assert!(ParameterSet::decode("").is_err());
    }

    #[test]
    fn test_pin_inversion_survives_round_trip() {
        let set = ParameterSet::defaults()
            .with_pin(ParamKey::Dcd, PinAssignment::inverted(PinSource::LocalDtr));
        let decoded = ParameterSet::decode(&set.encode()).unwrap();

        let pin: PinAssignment = decoded.get_key(ParamKey::Dcd).unwrap().to_wire().parse().unwrap();
        assert!(pin.inverted);
        assert_eq!(pin.source, PinSource::LocalDtr);
        assert_eq!(decoded, set);
    }

    #[test]
    fn test_boolean_values_are_written_lowercase() {
        let set = ParameterSet::defaults()
            .with(ParamKey::EmuBR, "YES")
            .with(ParamKey::HiddenMode, " No ");
        assert_eq!(set.encode(), "EmuBR=yes,HiddenMode=no");
        assert_eq!(
            ParameterSet::decode("EmuOverrun=Yes").unwrap().encode(),
            "EmuOverrun=yes"
        );
    }

    #[test]
    fn test_padded_values_survive_round_trip() {
        let set = ParameterSet::defaults()
            .with(ParamKey::AddRTTO, " 5")
            .with(ParamKey::PortName, "COM8 ");
        assert_eq!(set.encode(), "PortName=COM8,AddRTTO=5");
        assert_eq!(ParameterSet::decode(&set.encode()).unwrap(), set);
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = ParameterSet::decode("EmuBR=yes,PortName=COM1").unwrap();
        let b = ParameterSet::decode("PortName=COM1,EmuBR=yes").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, ParameterSet::defaults());
    }
}
