use super::env::CliArgs;
use super::info::cmd_info;
use super::reduce::cmd_reduce;
use super::serve::cmd_serve;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Serve(args) => cmd_serve(args, ctx.config().clone()).await,
        Commands::Reduce(args) => cmd_reduce(args, ctx.config()).await,
        Commands::Info => cmd_info(ctx).await,
    }
}
