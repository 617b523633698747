pub mod models;
pub mod errors;
pub mod client;
pub mod surface;
pub mod exchange;
pub mod cli;

use cli::Args;
use client::{ HttpRefineClient, RefineClient };
use exchange::{ MessageExchangeHandler, SubmitOutcome };
use log::{ debug, error, info, warn };
use std::collections::VecDeque;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use surface::{ ChatSurface, TerminalSurface };
use tokio::io::{ AsyncBufRead, AsyncBufReadExt, BufReader };
use tokio::task::JoinSet;

pub const CLOSE_COMMAND: &str = "/close";

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let client = HttpRefineClient::new(
        args.endpoint.clone(),
        args.request_timeout_secs.map(Duration::from_secs)
    )?;

    info!("--- Chat Configuration ---");
    info!("Refine Endpoint: {}", client.endpoint());
    match args.request_timeout_secs {
        Some(secs) => info!("Request Timeout: {}s", secs),
        None => info!("Request Timeout: none"),
    }
    info!("Chart Directory: {}", args.chart_dir.as_deref().unwrap_or("(not saved)"));
    info!("-------------------------");

    let surface = TerminalSurface::stdout(args.chart_dir.clone().map(PathBuf::from));
    let handler = Arc::new(MessageExchangeHandler::new(surface, client)?);

    println!("Type a message and press Enter. {} to quit.", CLOSE_COMMAND);
    drive(handler, BufReader::new(tokio::io::stdin())).await;
    Ok(())
}

/// Feeds input lines to the handler until the close command or end of input.
///
/// Input keeps being read while a request is in flight. Lines that arrive in
/// the meantime wait here and are submitted one at a time as each reply
/// settles, so the handler never sees an overlapping submission. On end of
/// input every queued line is still sent; the close command abandons them.
pub async fn drive<S, C, R>(handler: Arc<MessageExchangeHandler<S, C>>, input: R)
    where S: ChatSurface + 'static, C: RefineClient + 'static, R: AsyncBufRead + Unpin
{
    let mut segments = input.split(b'\n');
    let mut queued: VecDeque<String> = VecDeque::new();
    let mut pending = JoinSet::new();
    let mut input_open = true;

    loop {
        if pending.is_empty() {
            match queued.pop_front() {
                Some(line) => {
                    let handler = handler.clone();
                    pending.spawn(async move { handler.submit(&line).await });
                }
                None if !input_open => break,
                None => {}
            }
        }

        tokio::select! {
            segment = segments.next_segment(), if input_open => {
                match segment {
                    Ok(Some(bytes)) => {
                        match decode_line(bytes) {
                            Some(line) if line.trim() == CLOSE_COMMAND => {
                                pending.shutdown().await;
                                break;
                            }
                            Some(line) => {
                                if !pending.is_empty() {
                                    debug!("Request in flight, queueing input line");
                                }
                                queued.push_back(line);
                            }
                            None => {}
                        }
                    }
                    Ok(None) => {
                        input_open = false;
                    }
                    Err(e) => {
                        error!("Failed to read input, treating it as closed: {}", e);
                        input_open = false;
                    }
                }
            }
            Some(joined) = pending.join_next(), if !pending.is_empty() => {
                match joined {
                    Ok(SubmitOutcome::Busy) => warn!("Submission was refused as busy"),
                    Ok(_) => {}
                    Err(e) => error!("Submission task failed: {}", e),
                }
            }
        }
    }

    handler.close();
}

fn decode_line(mut bytes: Vec<u8>) -> Option<String> {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    match String::from_utf8(bytes) {
        Ok(line) => Some(line),
        Err(e) => {
            warn!("Skipping input line that is not valid UTF-8: {}", e);
            None
        }
    }
}
