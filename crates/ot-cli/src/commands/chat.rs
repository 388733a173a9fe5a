//! Line-oriented chat front end.
//!
//! Each input line is one chat message, e.g. `/new_oil` or `/km 12345`.
//! Replies go to the writer, one message per command. Storage failures are
//! logged and answered with a generic apology so the session keeps going.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Result;

use ot_core::{DigitExtractor, Ingress, IngressEvent, UserId, UserRepository};

use crate::render::{GENERIC_ERROR, GREETING, Renderer};

const UNKNOWN_COMMAND: &str = "I don't know that command. Send /help for the list.";

/// A parsed chat line.
#[derive(Debug, PartialEq, Eq)]
enum ChatCommand<'a> {
    Help,
    Event(IngressEvent),
    Photo(&'a str),
    Quit,
    Unknown,
}

fn parse_line(line: &str) -> Option<ChatCommand<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    // Group chats address bots as `/km@SomeBot`.
    let word = word.split_once('@').map_or(word, |(command, _)| command);
    let rest = rest.trim();

    Some(match word {
        "/start" | "/help" => ChatCommand::Help,
        "/new_oil" => ChatCommand::Event(IngressEvent::NewIntervalRequested),
        "/km" | "/reading" => ChatCommand::Event(IngressEvent::TextReading {
            raw_text: rest.to_string(),
        }),
        "/photo" => ChatCommand::Photo(rest),
        "/reset" => ChatCommand::Event(IngressEvent::ResetRequested),
        "/status" => ChatCommand::Event(IngressEvent::StatusRequested),
        "/quit" | "/exit" => ChatCommand::Quit,
        _ => ChatCommand::Unknown,
    })
}

/// Reads commands from `input` until end of input or `/quit`.
pub async fn run<I, W, R, E>(
    input: I,
    writer: &mut W,
    app: &Ingress<R, E>,
    renderer: &Renderer,
    user_id: &UserId,
) -> Result<()>
where
    I: BufRead,
    W: Write,
    R: UserRepository,
    E: DigitExtractor,
{
    tracing::info!(user_id = %user_id, "chat session started");

    for line in input.lines() {
        let line = line?;
        let Some(command) = parse_line(&line) else {
            continue;
        };

        let event = match command {
            ChatCommand::Help => {
                writeln!(writer, "{GREETING}")?;
                continue;
            }
            ChatCommand::Quit => break,
            ChatCommand::Unknown => {
                writeln!(writer, "{UNKNOWN_COMMAND}")?;
                continue;
            }
            ChatCommand::Photo(path) => match read_photo(path).await {
                Some(image) => IngressEvent::PhotoReading { image },
                None => {
                    writeln!(writer, "I didn't get the photo. Could you send it again?")?;
                    continue;
                }
            },
            ChatCommand::Event(event) => event,
        };

        match app.handle(user_id, event).await {
            Ok(outcome) => writeln!(writer, "{}", renderer.render(&outcome))?,
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "chat command failed");
                writeln!(writer, "{GENERIC_ERROR}")?;
            }
        }
        writer.flush()?;
    }

    tracing::info!(user_id = %user_id, "chat session ended");
    Ok(())
}

async fn read_photo(path: &str) -> Option<Vec<u8>> {
    if path.is_empty() {
        return None;
    }
    match tokio::fs::read(Path::new(path)).await {
        Ok(image) => Some(image),
        Err(err) => {
            tracing::warn!(path, error = %err, "failed to read photo");
            None
        }
    }
}
