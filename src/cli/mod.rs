//! Command-line interface for M2M Fetcher

pub mod args;
pub mod commands;

pub use args::{AuthAction, AuthArgs, Cli, Commands, DownloadArgs, GlobalArgs};
pub use commands::{handle_auth, handle_download};
