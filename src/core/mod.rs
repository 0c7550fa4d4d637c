pub mod builder;
pub mod classifier;
pub mod executor;
pub mod manager;
pub mod params;
pub mod parser;

pub use crate::domain::model::{PortPair, PortStatus};
pub use crate::domain::ports::{ConfigProvider, Executor};
pub use crate::utils::error::Result;
