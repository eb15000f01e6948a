//! Command implementations

pub mod config;
pub mod destroy;
pub mod resize;
pub mod start;
pub mod status;
pub mod stop;
pub mod version;
