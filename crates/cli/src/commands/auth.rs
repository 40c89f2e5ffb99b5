use tracing::debug;

use crate::connect::{is_key, KEY_SITE};
use crate::context::CommandContext;
use crate::error::{CliError, Result};

pub fn execute(ctx: &CommandContext, key: Option<String>) -> Result<i32> {
    let Some(key) = key else {
        return Err(CliError::fatal(format!(
            "No key given. Get a developer API key from {KEY_SITE} and pass it \
             with --key or the REPLKIT_KEY environment variable."
        )));
    };
    if !is_key(&key) {
        return Err(CliError::fatal(
            "That key looks invalid. Keys are in the form of xxxxx:xxxxx.",
        ));
    }

    debug!(target = "replkit", "writing key to config");
    let mut config = ctx.config();
    config.update(|c| c.key = Some(key))?;
    println!("Wrote to config file: {}", config.path().display());
    Ok(0)
}
