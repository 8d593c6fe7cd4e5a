#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! File-backed configuration for binman.
//!
//! Layout: `model.rs` (typed config documents), `defaults.rs` (built-in values),
//! `loader.rs` (YAML parsing and normalisation), `validate.rs` (structural checks).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{expand_home, load, parse};
pub use model::{
    ApiType, BinmanConfig, GlobalConfig, PatternConfig, PostCommand, QueryType, ReleaseSpec,
    SelectionConfig, SourceConfig, TieBreak, split_repo,
};
