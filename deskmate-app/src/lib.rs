pub mod bootstrap;
pub mod config;

pub use bootstrap::{build_engine, init_logging};
pub use config::AppConfig;
