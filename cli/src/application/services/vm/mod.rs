//! VM lifecycle use-cases: locate, provision, resize, stop, destroy.
//!
//! Each module imports only from `crate::domain`,
//! `crate::application::ports` and `devbox_common`. Every operation begins
//! with a Locator call; nothing is cached between invocations.

pub mod bootstrap;
pub mod destroy;
pub mod locator;
pub mod poll;
pub mod provision;
pub mod resize;
pub mod stop;
pub mod wait;
