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
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Release resolution core for binman.
//!
//! A [`BinmanRelease`] carries one tracked repository through an ordered
//! [`Pipeline`] of [`Action`]s: status check, URL resolution, artifact path
//! resolution, then the finalize stages (extract, find target, link, post
//! commands). Each action mutates the descriptor and either completes, reports
//! the release as already up to date, or aborts the run with a [`ReleaseError`].
//!
//! Layout: `descriptor.rs` (release state), `paths.rs` (path resolver),
//! `select.rs` (asset selector), `finder.rs` (artifact finder), `actions.rs`
//! (preparation actions and pipeline), `finalize.rs` (post-download actions and
//! collaborator traits), `model.rs` (provider payloads), `template.rs`,
//! `filetype.rs`, `error.rs`.

pub mod actions;
pub mod descriptor;
pub mod error;
pub mod filetype;
pub mod finalize;
pub mod finder;
pub mod model;
pub mod paths;
pub mod select;
pub mod template;

pub use actions::{
    Action, ActionKind, ActionOutcome, FinalizeMode, Pipeline, PipelineOutcome, ReleaseContext,
    ReleaseStatusAction, SetArtifactPathAction, SetUrlAction,
};
pub use descriptor::BinmanRelease;
pub use error::{ReleaseError, ReleaseResult};
pub use filetype::{FileKind, FileTypeMatcher};
pub use finalize::{
    ExtractAction, Extractor, FindTargetAction, LinkAction, Linker, PostCommandsAction,
    SymlinkLinker,
};
pub use finder::ArtifactFinder;
pub use model::{Asset, GitHubAsset, GitHubRelease, GitLabAssets, GitLabLink, GitLabRelease, ReleaseData};
pub use select::AssetSelector;
pub use template::{DataMap, format_string};
