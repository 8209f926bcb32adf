//! CLI mode: run one invocation from an event file.

use oar_ocr_gateway::gateway::{InvocationResponse, RequestHandler};
use std::io::Read;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Reads the event document from `source` (`-` for stdin).
fn read_event(source: &str) -> Result<Vec<u8>, std::io::Error> {
    if source == "-" {
        let mut buffer = Vec::new();
        std::io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        std::fs::read(Path::new(source))
    }
}

/// Runs the invocation in `event_source` and prints the response envelope.
///
/// Returns the envelope so the caller can choose the exit status.
pub async fn run_invoke(
    handler: &RequestHandler,
    event_source: &str,
    request_id: Option<&str>,
    pretty: bool,
) -> Result<InvocationResponse, Box<dyn std::error::Error + Send + Sync>> {
    let event = read_event(event_source)?;
    info!(bytes = event.len(), source = event_source, "event loaded");

    let start = Instant::now();
    let response = handler.handle_bytes(&event, request_id).await;
    info!(
        status = response.status_code,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "invocation finished"
    );

    let output = if pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{output}");
    Ok(response)
}
