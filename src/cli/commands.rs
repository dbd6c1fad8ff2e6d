use clap::Subcommand;

use super::reduce::ReduceArgs;
use super::serve::ServeArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the step decision HTTP service
    Serve(ServeArgs),

    /// Reduce an HTML snapshot and print the addressable elements
    Reduce(ReduceArgs),

    /// Show build, configuration and backend information
    Info,
}
