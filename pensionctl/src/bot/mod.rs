//! Interactive chat commands: `/start`, `/today`, `/stats`, `/search`, `/help` and the inline
//! keyboard callbacks behind the `/start` menu.
//!
//! Data commands are gated by an [`AllowList`] of chat ids. `/start` and `/help` are open to
//! everyone.

pub mod auth;
pub mod commands;
pub mod handlers;
pub mod poller;

pub use auth::AllowList;
pub use handlers::{Handlers, Reply};
pub use poller::{UpdatePoller, run_update_poller};
