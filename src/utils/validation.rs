use crate::core::params::{ParamClass, ParamKey, ParamValue, ParameterSet, PinSource};
use crate::domain::model::{PortId, MAX_PAIR_NUMBER};
use crate::utils::error::{ManagerError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// 單一欄位檢查的結果：失敗時附上原因
pub type Check = std::result::Result<(), String>;

/// EmuNoise 的上限，照 setupc 文件的字面值
pub const MAX_NOISE: f64 = 0.99999999;

static PORT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CNC([AB])(0|[1-9]\d*)$").expect("static regex"));
static COM_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^COM\d+$").expect("static regex"));

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// 驗證時的情境：`COM#` 只在安裝時合法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationContext {
    Install,
    Change,
}

pub fn check_pair_number(raw: &str) -> Check {
    let number: i64 = raw
        .trim()
        .parse()
        .map_err(|_| "Pair number must be a valid integer".to_string())?;
    check_range(number, 0, MAX_PAIR_NUMBER as i64)
        .map_err(|_| format!("Pair number must be between 0 and {}", MAX_PAIR_NUMBER))
}

pub fn check_probability(raw: &str) -> Check {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
        return Err("EmuNoise must be a decimal number".to_string());
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| "EmuNoise must be a decimal number".to_string())?;
    if value < 0.0 {
        return Err("EmuNoise cannot be negative".to_string());
    }
    if value > MAX_NOISE {
        return Err(format!("EmuNoise must be between 0 and {}", MAX_NOISE));
    }
    Ok(())
}

pub fn check_boolean(raw: &str) -> Check {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "no" => Ok(()),
        _ => Err("Boolean value must be 'yes' or 'no'".to_string()),
    }
}

pub fn check_port_identifier(raw: &str) -> Check {
    let shape_error = || {
        "Port identifier must match CNC[AB]<number> (e.g. CNCA0, CNCB1)".to_string()
    };
    let caps = PORT_ID_PATTERN.captures(raw).ok_or_else(shape_error)?;
    check_pair_number(&caps[2])
}

pub fn check_pin_assignment(raw: &str) -> Check {
    let name = raw.strip_prefix('!').unwrap_or(raw);
    if PinSource::from_name(name).is_some() {
        Ok(())
    } else {
        Err(format!(
            "Unknown signal '{}'. Must be one of: {} (optionally prefixed with !)",
            name,
            PinSource::names().join(", ")
        ))
    }
}

pub fn check_timing(raw: &str) -> Check {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err("Value must be a non-negative integer".to_string());
    }
    // 不設上限，只確認能轉成整數
    raw.parse::<u64>()
        .map(|_| ())
        .map_err(|_| "Value is too large".to_string())
}

pub fn check_com_name(raw: &str) -> Check {
    if COM_NAME_PATTERN.is_match(raw) {
        Ok(())
    } else {
        Err("Port name must be COM<number> or COM# for auto-assign".to_string())
    }
}

pub fn check_free_text(raw: &str) -> Check {
    if raw.trim().is_empty() {
        return Err("Value cannot be empty".to_string());
    }
    if raw.contains([',', '=']) {
        return Err("Value cannot contain ',' or '='".to_string());
    }
    Ok(())
}

/// 依參數類別檢查一個欄位的值
pub fn check_parameter(key: ParamKey, value: &ParamValue, context: ValidationContext) -> Check {
    match (key.class(), value) {
        (ParamClass::PortName, ParamValue::AutoAssign) => match context {
            ValidationContext::Install => Ok(()),
            ValidationContext::Change => {
                Err("COM# (auto-assign) is only allowed when installing a pair".to_string())
            }
        },
        (_, ParamValue::AutoAssign) => {
            Err("COM# (auto-assign) is only valid for PortName".to_string())
        }
        (ParamClass::PortName | ParamClass::Pin, ParamValue::Default | ParamValue::Current) => {
            Ok(())
        }
        (_, ParamValue::Default | ParamValue::Current) => {
            Err(format!("'{}' does not accept '-' or '*'", key))
        }
        (class, ParamValue::Explicit(raw)) => match class {
            ParamClass::PortName => check_com_name(raw),
            ParamClass::FreeText => check_free_text(raw),
            ParamClass::Boolean => check_boolean(raw),
            ParamClass::Probability => check_probability(raw),
            ParamClass::Timing => check_timing(raw),
            ParamClass::Pin => check_pin_assignment(raw),
        },
    }
}

/// 驗證整組參數，第一個失敗的欄位會轉成 validation 錯誤
pub fn validate_parameter_set(set: &ParameterSet, context: ValidationContext) -> Result<()> {
    if set.is_current() && context == ValidationContext::Install {
        return Err(ManagerError::validation(
            "parameters",
            "*",
            "A new port has no current settings; use '-' or explicit values",
        ));
    }

    for (name, value) in set.iter() {
        let key: ParamKey = name.parse().map_err(|_| {
            ManagerError::validation(name, value.to_wire(), "Unknown parameter name")
        })?;
        check_parameter(key, value, context)
            .map_err(|reason| ManagerError::validation(name, value.to_wire(), reason))?;
    }
    Ok(())
}

pub fn validate_pair_number(field_name: &str, number: u32) -> Result<()> {
    validate_range(field_name, number, 0, MAX_PAIR_NUMBER)
}

pub fn parse_port_id(field_name: &str, raw: &str) -> Result<PortId> {
    check_port_identifier(raw).map_err(|reason| ManagerError::validation(field_name, raw, reason))?;
    raw.parse()
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(ManagerError::validation(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(ManagerError::validation(
            field_name,
            path,
            "Path contains null bytes",
        ));
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ManagerError::validation(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    check_range(value, min, max)
        .map_err(|reason| ManagerError::validation(field_name, &value.to_string(), reason))
}

fn check_range<T: PartialOrd + std::fmt::Display + Copy>(value: T, min: T, max: T) -> Check {
    if value < min || value > max {
        return Err(format!("Value must be between {} and {}", min, max));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_pair_number() {
        assert!(check_pair_number("0").is_ok());
        assert!(check_pair_number("999").is_ok());
        assert!(check_pair_number("1000").is_err());
        assert!(check_pair_number("-1").is_err());
        assert!(check_pair_number("abc").is_err());
        assert!(check_pair_number("1.5").is_err());
    }

    #[test]
    fn test_check_probability_boundaries() {
        assert!(check_probability("0").is_ok());
        assert!(check_probability("0.5").is_ok());
        assert!(check_probability("0.99999999").is_ok());
        assert!(check_probability("0.999999995").is_err());
        assert!(check_probability("1").is_err());
        assert!(check_probability("1.0").is_err());
        assert!(check_probability("-0.1").is_err());
        assert!(check_probability("1e-3").is_err());
        assert!(check_probability("NaN").is_err());
    }

    #[test]
    fn test_check_boolean_is_case_insensitive() {
        assert!(check_boolean("yes").is_ok());
        assert!(check_boolean("NO").is_ok());
        assert!(check_boolean("true").is_err());
    }

    #[test]
    fn test_check_port_identifier() {
        assert!(check_port_identifier("CNCA0").is_ok());
        assert!(check_port_identifier("CNCB12").is_ok());
        assert!(check_port_identifier("CNCC0").is_err());
        assert!(check_port_identifier("CNCA").is_err());
        assert!(check_port_identifier("cnca0").is_err());
        assert!(check_port_identifier("CNCA1000").is_err());
    }

    #[test]
    fn test_check_pin_assignment_echoes_unknown_name() {
        assert!(check_pin_assignment("rrts").is_ok());
        assert!(check_pin_assignment("!on").is_ok());
        let reason = check_pin_assignment("!bogus").unwrap_err();
        assert!(reason.contains("'bogus'"));
    }

    #[test]
    fn test_check_timing_has_no_upper_bound() {
        assert!(check_timing("0").is_ok());
        assert!(check_timing("4000000000").is_ok());
        assert!(check_timing("-5").is_err());
        assert!(check_timing("10ms").is_err());
    }

    #[test]
    fn test_auto_assign_only_on_install() {
        let set = ParameterSet::defaults().with(ParamKey::PortName, ParamValue::AutoAssign);
        assert!(validate_parameter_set(&set, ValidationContext::Install).is_ok());
        assert!(validate_parameter_set(&set, ValidationContext::Change).is_err());

        let misplaced = ParameterSet::defaults().with(ParamKey::EmuBR, ParamValue::AutoAssign);
        assert!(validate_parameter_set(&misplaced, ValidationContext::Install).is_err());
    }

    #[test]
    fn test_validation_error_names_the_field() {
        let set = ParameterSet::decode("PortName=COM4,EmuNoise=1.0").unwrap();
        match validate_parameter_set(&set, ValidationContext::Change) {
            Err(ManagerError::Validation { field, value, .. }) => {
                assert_eq!(field, "EmuNoise");
                assert_eq!(value, "1.0");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        let set = ParameterSet::decode("Speed=fast").unwrap();
        assert!(validate_parameter_set(&set, ValidationContext::Change).is_err());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("setupc.path", "C:/com0com/setupc.exe").is_ok());
        assert!(validate_path("setupc.path", "").is_err());
        assert!(validate_path("setupc.path", "bad\0path").is_err());
    }
}
