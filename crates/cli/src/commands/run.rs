use std::io::Write;
use std::time::Duration;

use replkit_client::{Channel, Error as ClientError};
use replkit_proto::{CommandOutput, RunMessage};
use serde_json::Value;
use tracing::debug;

use crate::context::CommandContext;
use crate::error::Result;

const STOP_WAIT: Duration = Duration::from_secs(30);

pub async fn execute(
    ctx: &CommandContext,
    stop: bool,
    restart: bool,
    repl: Option<&str>,
) -> Result<i32> {
    let should_stop = stop || restart;
    let should_run = !stop || restart;

    let session = ctx.session(repl).await?;
    let channel = session.channel("shellrun2").await?;

    let mut output = channel.subscribe();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(message) = output.next().await {
            if let Ok(data) = serde_json::from_value::<CommandOutput>(message) {
                if let Some(text) = data.output {
                    let _ = stdout.write_all(text.as_bytes());
                    let _ = stdout.flush();
                }
            }
        }
    });

    if should_stop {
        debug!(target = "replkit", "stopping");
        wait_for_idle(&channel).await?;
    }
    if should_run {
        debug!(target = "replkit", "running");
        session.run(None).await?;
    }

    printer.abort();
    Ok(0)
}

/// Sends `clear` and waits for the command push that reports the program
/// idle (`state == 0`). Output pushes arriving in between are skipped.
async fn wait_for_idle(channel: &Channel) -> Result<()> {
    let mut events = channel.subscribe();
    channel.send(RunMessage::Clear {})?;
    loop {
        let event = tokio::time::timeout(STOP_WAIT, events.next())
            .await
            .map_err(|_| ClientError::Timeout)?;
        match event {
            Some(message) => {
                if message.get("state").and_then(Value::as_i64) == Some(0) {
                    return Ok(());
                }
            }
            None => return Err(ClientError::ConnectionClosed.into()),
        }
    }
}
