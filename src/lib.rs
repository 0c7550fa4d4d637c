pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::config::AppConfig;
pub use crate::core::builder::{CommandBuilder, Intent};
pub use crate::core::classifier::ErrorClassifier;
pub use crate::core::executor::{EngineSettings, ExecutionEngine, OperationHandle};
pub use crate::core::manager::PortManager;
pub use crate::core::params::{ParamKey, ParamValue, ParameterSet};
pub use crate::domain::command::{BatchResult, CommandResult, CommandSpec, GlobalOptions, Outcome};
pub use crate::domain::model::{DriverInfo, DriverStatus, PortId, PortPair, PortStatus};
pub use crate::utils::error::{ErrorCategory, ErrorInfo, ErrorSeverity, ManagerError, Result};
