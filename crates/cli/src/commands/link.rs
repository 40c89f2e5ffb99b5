use colored::Colorize;
use tracing::debug;

use crate::connect::resolve_identity;
use crate::context::CommandContext;
use crate::error::Result;

pub async fn execute(ctx: &CommandContext, repl: &str) -> Result<i32> {
    let id = resolve_identity(ctx.endpoints(), repl).await?;
    let cwd = std::env::current_dir()?;
    let dir = cwd.display().to_string();

    debug!(target = "replkit", %dir, %id, "linking directory");
    ctx.config().update(|c| {
        c.repls.insert(dir, id);
    })?;
    println!("Linked {} to {}", cwd.display(), repl.green());
    Ok(0)
}
