mod engine;

pub use engine::{CONFIG_FILE_NAME, DATA_DIR_ENV, EngineConfig, RETENTION_DAYS_ENV};
