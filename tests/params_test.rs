use anyhow::Result;
use com0com_manager::core::params::{PinAssignment, PinSource};
use com0com_manager::{ParamKey, ParamValue, ParameterSet};

#[test]
fn test_encode_uses_declared_key_order() {
    let params = ParameterSet::defaults()
        .with(ParamKey::EmuBR, "yes")
        .with(ParamKey::PortName, "COM8");
    assert_eq!(params.encode(), "PortName=COM8,EmuBR=yes");
}

#[test]
fn test_round_trip_ignores_key_order() -> Result<()> {
    let samples = [
        "-",
        "*",
        "PortName=COM8,EmuBR=yes",
        "EmuOverrun=no,PortName=COM#,cts=!rrts,AddRTTO=100",
        "RealPortName=Modem7,EmuNoise=0.25,ExclusiveMode=yes,HiddenMode=no,PlugInMode=yes",
        "dsr=rdtr,dcd=!on,ri=lout1,AddRITO=0,EmuBR=no",
    ];

    for raw in samples {
        let params = ParameterSet::decode(raw)?;
        let decoded = ParameterSet::decode(&params.encode())?;
        assert_eq!(decoded, params, "round trip of '{}'", raw);
    }
    Ok(())
}

#[test]
fn test_sentinels_become_variants() -> Result<()> {
    let params = ParameterSet::decode("PortName=COM#,cts=-,dsr=*")?;
    assert_eq!(params.get_key(ParamKey::PortName), Some(&ParamValue::AutoAssign));
    assert_eq!(params.get_key(ParamKey::Cts), Some(&ParamValue::Default));
    assert_eq!(params.get_key(ParamKey::Dsr), Some(&ParamValue::Current));

    assert!(ParameterSet::decode("-")?.is_defaults());
    assert!(ParameterSet::decode("*")?.is_current());
    Ok(())
}

#[test]
fn test_malformed_strings_are_rejected() {
    for raw in ["", "PortName", "=COM1", "PortName=", "PortName=COM1,PortName=COM2"] {
        assert!(ParameterSet::decode(raw).is_err(), "'{}' should be rejected", raw);
    }
}

#[test]
fn test_empty_values_are_omitted() {
    let mut params = ParameterSet::defaults();
    params.set("PortName", "COM3");
    params.set("EmuBR", "");
    assert_eq!(params.encode(), "PortName=COM3");

    params.remove("PortName");
    assert_eq!(params.encode(), "-");
}

#[test]
fn test_pin_assignment_wire_form() -> Result<()> {
    let params = ParameterSet::defaults()
        .with_pin(ParamKey::Cts, PinAssignment::inverted(PinSource::RemoteRts));
    assert_eq!(params.encode(), "cts=!rrts");

    let pin: PinAssignment = "!rdtr".parse()?;
    assert!(pin.inverted);
    assert_eq!(pin.source, PinSource::RemoteDtr);
    assert!("!bogus".parse::<PinAssignment>().is_err());
    Ok(())
}
