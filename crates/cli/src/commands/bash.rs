use std::io::Write;

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use futures::StreamExt;
use replkit_client::Channel;
use replkit_proto::{CommandOutput, ShellMessage};

use crate::context::CommandContext;
use crate::error::Result;

pub async fn execute(ctx: &CommandContext, repl: Option<&str>) -> Result<i32> {
    let session = ctx.session(repl).await?;
    let channel = session.channel("shell").await?;

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

    enable_raw_mode()?;
    if let Ok((cols, rows)) = terminal::size() {
        channel.send(ShellMessage::ResizeTerm { rows, cols })?;
    }
    let result = input_loop(&channel).await;
    disable_raw_mode()?;
    printer.abort();
    result
}

async fn input_loop(channel: &Channel) -> Result<i32> {
    let mut events = EventStream::new();
    // Track the line being typed so typing "exit" quits the local loop too.
    let mut line = String::new();
    while let Some(event) = events.next().await {
        match event? {
            Event::Key(key) => {
                if key.modifiers.contains(KeyModifiers::CONTROL)
                    && key.code == KeyCode::Char('c')
                {
                    println!("^C");
                    return Ok(0);
                }
                let Some(input) = key_to_input(&key) else {
                    continue;
                };
                if input == "\r" {
                    if line == "exit" {
                        println!();
                        return Ok(0);
                    }
                    line.clear();
                } else if let KeyCode::Char(c) = key.code {
                    line.push(c);
                } else {
                    line.clear();
                }
                channel.send(ShellMessage::Input(input))?;
            }
            Event::Resize(cols, rows) => {
                channel.send(ShellMessage::ResizeTerm { rows, cols })?;
            }
            _ => {}
        }
    }
    Ok(0)
}

fn key_to_input(key: &KeyEvent) -> Option<String> {
    match key.code {
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let c = c.to_ascii_lowercase();
            c.is_ascii_lowercase()
                .then(|| ((c as u8 - b'a' + 1) as char).to_string())
        }
        KeyCode::Char(c) => Some(c.to_string()),
        KeyCode::Enter => Some("\r".to_string()),
        KeyCode::Backspace => Some("\u{7f}".to_string()),
        KeyCode::Tab => Some("\t".to_string()),
        KeyCode::Esc => Some("\u{1b}".to_string()),
        KeyCode::Up => Some("\u{1b}[A".to_string()),
        KeyCode::Down => Some("\u{1b}[B".to_string()),
        KeyCode::Right => Some("\u{1b}[C".to_string()),
        KeyCode::Left => Some("\u{1b}[D".to_string()),
        KeyCode::Home => Some("\u{1b}[H".to_string()),
        KeyCode::End => Some("\u{1b}[F".to_string()),
        KeyCode::Delete => Some("\u{1b}[3~".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn plain_characters_pass_through() {
        assert_eq!(key_to_input(&plain(KeyCode::Char('x'))).as_deref(), Some("x"));
        assert_eq!(key_to_input(&plain(KeyCode::Enter)).as_deref(), Some("\r"));
        assert_eq!(key_to_input(&plain(KeyCode::Tab)).as_deref(), Some("\t"));
    }

    #[test]
    fn control_characters_map_to_low_bytes() {
        let key = KeyEvent::new(KeyCode::Char('d'), KeyModifiers::CONTROL);
        assert_eq!(key_to_input(&key).as_deref(), Some("\u{4}"));
    }

    #[test]
    fn arrow_keys_emit_escape_sequences() {
        assert_eq!(
            key_to_input(&plain(KeyCode::Up)).as_deref(),
            Some("\u{1b}[A")
        );
    }

    #[test]
    fn unmapped_keys_are_dropped() {
        assert!(key_to_input(&plain(KeyCode::F(5))).is_none());
    }
}
