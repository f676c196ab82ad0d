pub mod diagnostics;
pub mod root;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check connectivity to the store, broker, and Docker hosts
    Diagnostics,
}
