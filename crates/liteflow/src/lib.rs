pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod jobs;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
