//! Minimal flag/env surface layered on top of the file config (§4.13).

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "reraw-relay", version, about = "A Nostr relay core")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "RERAW_CONFIG", default_value = "./config/config.toml")]
    pub config: PathBuf,

    /// Overrides `APP.PORT` from the config file.
    #[arg(long, env = "RERAW_APP__PORT")]
    pub port: Option<u16>,
}
