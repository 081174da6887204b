pub mod schema;

pub use schema::{
    AlarmsConfig, Config, EngineConfig, HeaderConfig, LogConfig, RulesConfig, ServerConfig,
    StorageConfig,
};
