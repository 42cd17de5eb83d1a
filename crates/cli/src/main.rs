//! The stock `aedris` binary, without any plugins built in.

use std::process::ExitCode;

use aedris_cli::{PluginCatalog, run_with_catalog};

#[tokio::main]
async fn main() -> ExitCode {
    run_with_catalog(PluginCatalog::new()).await
}
