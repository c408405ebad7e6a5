pub mod settings;

pub use settings::{AppConfig, EngineConfig, LoggingConfig, ServerConfig};
