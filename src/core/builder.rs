use crate::core::params::ParameterSet;
use crate::domain::command::{CommandSpec, GlobalOptions, Verb};
use crate::domain::model::PortId;
use crate::utils::error::{ManagerError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_pair_number, validate_parameter_set, validate_path,
    ValidationContext,
};

/// 呼叫端想做的事；安裝時指定編號與自動編號是兩種不同意圖，不做推斷
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    InstallNumbered {
        pair: u32,
        port_a: ParameterSet,
        port_b: ParameterSet,
    },
    InstallAuto {
        port_a: ParameterSet,
        port_b: ParameterSet,
    },
    /// 提交先前以 `--no-update` 暫存的安裝
    CommitInstalls,
    Remove {
        pair: u32,
    },
    Change {
        port: PortId,
        parameters: ParameterSet,
    },
    List,
    Preinstall,
    Update,
    Reload,
    Uninstall,
    EnableAll,
    DisableAll,
    InfClean,
    BusyNames {
        pattern: String,
    },
    ListFriendlyNames,
    UpdateFriendlyNames,
}

impl Intent {
    pub fn verb(&self) -> Verb {
        match self {
            Intent::InstallNumbered { .. } => Verb::InstallNumbered,
            Intent::InstallAuto { .. } => Verb::InstallAuto,
            Intent::CommitInstalls => Verb::InstallUpdate,
            Intent::Remove { .. } => Verb::Remove,
            Intent::Change { .. } => Verb::Change,
            Intent::List => Verb::List,
            Intent::Preinstall => Verb::Preinstall,
            Intent::Update => Verb::Update,
            Intent::Reload => Verb::Reload,
            Intent::Uninstall => Verb::Uninstall,
            Intent::EnableAll => Verb::EnableAll,
            Intent::DisableAll => Verb::DisableAll,
            Intent::InfClean => Verb::InfClean,
            Intent::BusyNames { .. } => Verb::BusyNames,
            Intent::ListFriendlyNames => Verb::ListFriendlyNames,
            Intent::UpdateFriendlyNames => Verb::UpdateFriendlyNames,
        }
    }
}

/// 把意圖轉成 [`CommandSpec`]。任何欄位驗證失敗都不會產生命令。
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    options: GlobalOptions,
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: GlobalOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GlobalOptions {
        &self.options
    }

    pub fn build(&self, intent: &Intent) -> Result<CommandSpec> {
        self.build_with(intent, self.options.clone())
    }

    fn build_with(&self, intent: &Intent, options: GlobalOptions) -> Result<CommandSpec> {
        validate_options(&options)?;

        let verb = intent.verb();
        let mut args = vec![verb.name().to_string()];
        match intent {
            Intent::InstallNumbered {
                pair,
                port_a,
                port_b,
            } => {
                validate_pair_number("pair", *pair)?;
                args.push(pair.to_string());
                args.extend(encode_install_sides(port_a, port_b)?);
            }
            Intent::InstallAuto { port_a, port_b } => {
                args.extend(encode_install_sides(port_a, port_b)?);
            }
            Intent::Remove { pair } => {
                validate_pair_number("pair", *pair)?;
                args.push(pair.to_string());
            }
            Intent::Change { port, parameters } => {
                validate_pair_number("port", port.pair)?;
                validate_parameter_set(parameters, ValidationContext::Change)?;
                args.push(port.to_string());
                args.push(parameters.encode());
            }
            Intent::EnableAll | Intent::DisableAll => args.push("all".to_string()),
            Intent::BusyNames { pattern } => {
                validate_non_empty_string("pattern", pattern)?;
                args.push(pattern.trim().to_string());
            }
            Intent::CommitInstalls
            | Intent::List
            | Intent::Preinstall
            | Intent::Update
            | Intent::Reload
            | Intent::Uninstall
            | Intent::InfClean
            | Intent::ListFriendlyNames
            | Intent::UpdateFriendlyNames => {}
        }

        let spec = CommandSpec::new(verb, args, options);
        tracing::debug!("Built command: {}", spec.command_line());
        Ok(spec)
    }

    /// 批次安裝：每一筆加上 `--no-update`，最後以不帶參數的 `install` 提交
    pub fn install_batch(&self, installs: &[Intent]) -> Result<Vec<CommandSpec>> {
        if installs.is_empty() {
            return Err(ManagerError::validation(
                "batch",
                "",
                "A batch needs at least one install",
            ));
        }

        let staged = GlobalOptions {
            no_update: true,
            ..self.options.clone()
        };
        let mut steps = Vec::with_capacity(installs.len() + 1);
        for intent in installs {
            if !matches!(
                intent,
                Intent::InstallNumbered { .. } | Intent::InstallAuto { .. }
            ) {
                return Err(ManagerError::validation(
                    "batch",
                    intent.verb().name(),
                    "Only install operations can be batched",
                ));
            }
            steps.push(self.build_with(intent, staged.clone())?);
        }
        let commit = GlobalOptions {
            no_update: false,
            ..self.options.clone()
        };
        steps.push(self.build_with(&Intent::CommitInstalls, commit)?);
        Ok(steps)
    }

    pub fn install_numbered(
        &self,
        pair: u32,
        port_a: ParameterSet,
        port_b: ParameterSet,
    ) -> Result<CommandSpec> {
        self.build(&Intent::InstallNumbered {
            pair,
            port_a,
            port_b,
        })
    }

    pub fn install_auto(&self, port_a: ParameterSet, port_b: ParameterSet) -> Result<CommandSpec> {
        self.build(&Intent::InstallAuto { port_a, port_b })
    }

    pub fn remove(&self, pair: u32) -> Result<CommandSpec> {
        self.build(&Intent::Remove { pair })
    }

    pub fn change(&self, port: PortId, parameters: ParameterSet) -> Result<CommandSpec> {
        self.build(&Intent::Change { port, parameters })
    }

    pub fn list(&self) -> Result<CommandSpec> {
        self.build(&Intent::List)
    }
}

fn encode_install_sides(port_a: &ParameterSet, port_b: &ParameterSet) -> Result<[String; 2]> {
    validate_parameter_set(port_a, ValidationContext::Install).map_err(|e| side_error(e, 'A'))?;
    validate_parameter_set(port_b, ValidationContext::Install).map_err(|e| side_error(e, 'B'))?;
    Ok([port_a.encode(), port_b.encode()])
}

/// 錯誤訊息裡標明是哪一端的參數
fn side_error(error: ManagerError, side: char) -> ManagerError {
    match error {
        ManagerError::Validation {
            field,
            value,
            reason,
        } => ManagerError::Validation {
            field: format!("port {} {}", side, field),
            value,
            reason,
        },
        other => other,
    }
}

fn validate_options(options: &GlobalOptions) -> Result<()> {
    if let Some(output) = &options.output {
        validate_path("output", &output.to_string_lossy())?;
    }
    Ok(())
}
