use std::io::Write;

use replkit_proto::{CommandOutput, ExecRequest};
use tracing::debug;

use crate::context::CommandContext;
use crate::error::Result;

pub async fn execute(
    ctx: &CommandContext,
    repl: Option<&str>,
    program: String,
    arguments: Vec<String>,
) -> Result<i32> {
    let session = ctx.session(repl).await?;
    let channel = session.channel("exec").await?;

    // Subscribe before the request so no output event is missed.
    let mut events = channel.subscribe();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(message) = events.next().await {
            if let Ok(data) = serde_json::from_value::<CommandOutput>(message) {
                if let Some(text) = data.output {
                    let _ = stdout.write_all(text.as_bytes());
                    let _ = stdout.flush();
                }
            }
        }
    });

    let mut args = vec![program];
    args.extend(arguments);
    debug!(target = "replkit", ?args, "executing");
    channel
        .request(ExecRequest::Exec { args, env: None })
        .await?;
    printer.abort();
    Ok(0)
}
