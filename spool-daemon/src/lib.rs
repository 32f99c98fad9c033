// The library carries everything; the binary is a thin clap front end.
// Public-API clippy lints that don't apply to internal-use code:
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod logging;

pub mod basic;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod ipc;
pub mod registry;
pub mod types;
pub mod value;
pub mod workspace;
