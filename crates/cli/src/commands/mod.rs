mod auth;
mod bash;
pub mod bulk;
pub mod cp;
mod exec;
mod link;
mod run;

use crate::cli::Commands;
use crate::context::CommandContext;
use crate::error::Result;

/// Runs one command to completion and returns its exit code.
pub async fn dispatch(command: Commands, ctx: &CommandContext) -> Result<i32> {
    match command {
        Commands::Auth { key } => auth::execute(ctx, key),
        Commands::Link { repl } => link::execute(ctx, &repl).await,
        Commands::Bash { repl } => bash::execute(ctx, repl.as_deref()).await,
        Commands::Exec {
            repl,
            program,
            arguments,
        } => exec::execute(ctx, repl.as_deref(), program, arguments).await,
        Commands::Cp {
            src,
            dest,
            repl,
            fail_fast,
        } => cp::execute(ctx, &src, &dest, repl.as_deref(), fail_fast).await,
        Commands::Run {
            stop,
            restart,
            repl,
        } => run::execute(ctx, stop, restart, repl.as_deref()).await,
        Commands::Bulk { args } => bulk::execute(ctx, args).await,
    }
}
