//! Command handlers.

mod config;
mod get;
mod sync;

pub(crate) use config::handle_config;
pub(crate) use get::handle_get;
pub(crate) use sync::handle_sync;
