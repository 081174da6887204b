mod alarms;
mod core;
mod observability;
mod rules;
mod server;
mod storage;

pub use alarms::AlarmsConfig;
pub use core::Config;
pub use observability::LogConfig;
pub use rules::{HeaderConfig, RulesConfig};
pub use server::ServerConfig;
pub use storage::{EngineConfig, StorageConfig};
