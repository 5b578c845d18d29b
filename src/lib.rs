pub mod actors;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod live;
pub mod log;
pub mod orchestration;
pub mod workflow;

pub use error::{Error, Result};
