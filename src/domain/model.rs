use crate::core::params::{ParamKey, ParamValue, ParameterSet};
use crate::utils::error::{ManagerError, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const MAX_PAIR_NUMBER: u32 = 999;
pub const PORT_ID_PREFIX: &str = "CNC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn as_char(&self) -> char {
        match self {
            Side::A => 'A',
            Side::B => 'B',
        }
    }
}

/// 埠識別碼，例如 `CNCA0`、`CNCB3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId {
    pub side: Side,
    pub pair: u32,
}

impl PortId {
    pub fn new(side: Side, pair: u32) -> Self {
        Self { side, pair }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", PORT_ID_PREFIX, self.side.as_char(), self.pair)
    }
}

impl FromStr for PortId {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| ManagerError::validation("port", s, reason);
        let rest = s
            .strip_prefix(PORT_ID_PREFIX)
            .ok_or_else(|| invalid("Port identifier must start with CNC"))?;
        let mut chars = rest.chars();
        let side = match chars.next() {
            Some('A') => Side::A,
            Some('B') => Side::B,
            _ => return Err(invalid("Port side must be A or B")),
        };
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("Port identifier must end with a pair number"));
        }
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(invalid("Pair number must not have leading zeros"));
        }
        let pair: u32 = digits
            .parse()
            .map_err(|_| invalid("Pair number is out of range"))?;
        if pair > MAX_PAIR_NUMBER {
            return Err(invalid("Pair number is out of range"));
        }
        Ok(Self { side, pair })
    }
}

impl Serialize for PortId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 一個虛擬埠在某次 `list` 時的快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    id: PortId,
    parameters: ParameterSet,
    disabled: bool,
}

impl Port {
    pub fn new(id: PortId, parameters: ParameterSet) -> Self {
        Self {
            id,
            parameters,
            disabled: false,
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    /// 指派的埠名稱（明確名稱或自動指派哨兵）
    pub fn name(&self) -> Option<&ParamValue> {
        self.parameters.get_key(ParamKey::PortName)
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// 顯示用名稱：有明確名稱就用名稱，否則用識別碼
    pub fn display_name(&self) -> String {
        match self.name() {
            Some(ParamValue::Explicit(name)) => name.clone(),
            _ => self.id.to_string(),
        }
    }
}

impl Serialize for Port {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Port", 4)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("name", &self.name().map(|name| name.to_wire()))?;
        state.serialize_field("parameters", &self.parameters.encode())?;
        state.serialize_field("disabled", &self.disabled)?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Active,
    Disabled,
    Error,
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PortStatus::Active => "active",
            PortStatus::Disabled => "disabled",
            PortStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// 一對虛擬埠。狀態由兩端的觀察結果推導，不能直接設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortPair {
    number: u32,
    port_a: Option<Port>,
    port_b: Option<Port>,
    status: PortStatus,
}

impl PortPair {
    pub fn new(number: u32, port_a: Option<Port>, port_b: Option<Port>) -> Self {
        let status = Self::derive_status(port_a.as_ref(), port_b.as_ref());
        Self {
            number,
            port_a,
            port_b,
            status,
        }
    }

    fn derive_status(port_a: Option<&Port>, port_b: Option<&Port>) -> PortStatus {
        match (port_a, port_b) {
            (Some(a), Some(b)) if a.is_disabled() || b.is_disabled() => PortStatus::Disabled,
            (Some(_), Some(_)) => PortStatus::Active,
            _ => PortStatus::Error,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn port_a(&self) -> Option<&Port> {
        self.port_a.as_ref()
    }

    pub fn port_b(&self) -> Option<&Port> {
        self.port_b.as_ref()
    }

    pub fn port(&self, side: Side) -> Option<&Port> {
        match side {
            Side::A => self.port_a(),
            Side::B => self.port_b(),
        }
    }

    pub fn status(&self) -> PortStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == PortStatus::Active
    }

    pub fn display_name(&self) -> String {
        let side_name = |side: Side| {
            self.port(side)
                .map(Port::display_name)
                .unwrap_or_else(|| format!("{} (missing)", PortId::new(side, self.number)))
        };
        format!(
            "Pair {}: {} <-> {}",
            self.number,
            side_name(Side::A),
            side_name(Side::B)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Installed,
    NotInstalled,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverInfo {
    pub status: DriverStatus,
    pub install_path: Option<String>,
    pub error_message: Option<String>,
}

impl DriverInfo {
    pub fn is_available(&self) -> bool {
        self.status == DriverStatus::Installed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(id: &str, params: &str) -> Port {
        Port::new(id.parse().unwrap(), ParameterSet::decode(params).unwrap())
    }

    #[test]
    fn test_port_id_round_trip() {
        let id: PortId = "CNCB12".parse().unwrap();
        assert_eq!(id, PortId::new(Side::B, 12));
        assert_eq!(id.to_string(), "CNCB12");

        assert!("CNCC1".parse::<PortId>().is_err());
        assert!("CNCA".parse::<PortId>().is_err());
        assert!("COM3".parse::<PortId>().is_err());
        assert!("CNCA1000".parse::<PortId>().is_err());
        assert!("CNCA007".parse::<PortId>().is_err());
        assert_eq!("CNCA0".parse::<PortId>().unwrap().to_string(), "CNCA0");
    }

    #[test]
    fn test_pair_status_is_derived() {
        let pair = PortPair::new(
            0,
            Some(port("CNCA0", "PortName=COM8")),
            Some(port("CNCB0", "PortName=COM9")),
        );
        assert_eq!(pair.status(), PortStatus::Active);
        assert_eq!(pair.display_name(), "Pair 0: COM8 <-> COM9");

        let half = PortPair::new(1, Some(port("CNCA1", "-")), None);
        assert_eq!(half.status(), PortStatus::Error);
        assert_eq!(half.display_name(), "Pair 1: CNCA1 <-> CNCB1 (missing)");

        let disabled = PortPair::new(
            2,
            Some(port("CNCA2", "-").disabled(true)),
            Some(port("CNCB2", "-")),
        );
        assert_eq!(disabled.status(), PortStatus::Disabled);
    }

    #[test]
    fn test_port_name_from_parameters() {
        let named = port("CNCA3", "PortName=COM5,EmuBR=yes");
        assert_eq!(named.name(), Some(&ParamValue::explicit("COM5")));

        let auto = port("CNCB3", "PortName=COM#");
        assert_eq!(auto.name(), Some(&ParamValue::AutoAssign));
        assert_eq!(auto.display_name(), "CNCB3");
    }
}
