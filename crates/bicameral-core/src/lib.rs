//! Bicameral Core - data model, temporal spine, wire protocol, config and errors

pub mod config;
pub mod error;
pub mod protocol;
pub mod spine;
pub mod types;

pub use config::*;
pub use error::{Error, Result};
pub use protocol::*;
pub use spine::{SystemClock, TemporalSpine, WallClock};
pub use types::*;
