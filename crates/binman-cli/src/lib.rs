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
#![allow(clippy::redundant_pub_crate, clippy::multiple_crate_versions)]

//! Command line front end that keeps tracked release binaries up to date.
//!
//! Layout:
//! - `cli.rs`: argument parsing and command dispatch
//! - `commands/`: command handlers (`sync`, `get`, `config`)
//! - `client.rs`: CLI error type and HTTP client construction
//! - `providers.rs`: GitHub and GitLab release clients plus asset download
//! - `extract.rs`: tar and zip extraction
//! - `output.rs`: summary and document renderers
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod client;
pub(crate) mod commands;
pub(crate) mod extract;
pub(crate) mod output;
pub(crate) mod providers;

pub use cli::run;
