use log::error;
use std::io::Write;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt };

use super::transport::ChatTransport;
use super::{ ChatSession, ClientError, TurnOutcome };

/// Line-oriented terminal chat. Each input line is one turn; the reply is
/// written as it streams in. Returns at end of input.
pub async fn run_repl<T, R, W>(
    session: &mut ChatSession<T>,
    input: R,
    out: &mut W
) -> Result<(), ClientError>
    where T: ChatTransport, R: AsyncBufRead + Unpin, W: Write + Send
{
    if let Some(greeting) = session.messages().first() {
        writeln!(out, "{}: {}", greeting.role, greeting.content)?;
    }

    let mut lines = input.lines();
    loop {
        write!(out, "you> ")?;
        out.flush()?;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        write!(out, "assistant: ")?;
        out.flush()?;
        let mut write_err: Option<std::io::Error> = None;
        let outcome = session.submit_with(&line, |fragment| {
            if write_err.is_some() {
                return;
            }
            if let Err(e) = write!(out, "{}", fragment).and_then(|_| out.flush()) {
                write_err = Some(e);
            }
        }).await?;
        if let Some(e) = write_err {
            return Err(e.into());
        }
        writeln!(out)?;

        if let TurnOutcome::Interrupted(reason) = outcome {
            writeln!(out, "(reply interrupted: {})", reason)?;
        }
    }

    Ok(())
}
