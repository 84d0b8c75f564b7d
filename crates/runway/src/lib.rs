mod actions;
mod build_cache;
mod collaborators;
mod config;
mod execution_context;
mod expression;
mod plugins;
mod reporter;
mod runner;
mod runway;
mod secrets;
mod signal;
mod stream;
mod trigger;
mod types;
mod workflow;
mod workspace;

pub use crate::runway::*;
pub use actions::*;
pub use build_cache::*;
pub use collaborators::*;
pub use config::*;
pub use execution_context::*;
pub use expression::*;
pub use plugins::*;
pub use reporter::*;
pub use runner::*;
pub use secrets::*;
pub use signal::*;
pub use stream::*;
pub use trigger::*;
pub use types::*;
pub use workflow::*;
pub use workspace::*;

pub use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Error>;
