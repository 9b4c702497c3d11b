//! Reference player driver for SlimServer-style backends.
//!
//! The backend exposes a line-oriented CLI over TCP: whitespace
//! delimited, URL-escaped per token, one response line per command,
//! plus a persistent `listen` mode streaming notification lines. This
//! crate translates the `rondoplayer` contracts onto that protocol:
//!
//! - [`SlimServer`] holds the endpoint and the request channel,
//! - [`SlimPlayer`] implements `Player` + `Library` for one player id
//!   and runs the notification stream that feeds its event bus.

mod config_ext;
mod player;
pub mod proto;
mod server;

pub use config_ext::SlimConfigExt;
pub use player::SlimPlayer;
pub use server::{SlimPlayerInfo, SlimServer};
