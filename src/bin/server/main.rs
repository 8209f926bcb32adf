//! OAR OCR gateway binary
//!
//! Runs OCR invocations from the command line or over HTTP.
//!
//! # Usage
//!
//! ## Single invocation
//! ```bash
//! echo '{"image": "s3://bucket/scan.pdf", "pages": "1-2"}' \
//!   | oar-ocr-gateway invoke --model-dir /opt --event -
//! ```
//!
//! ## Server mode
//! ```bash
//! oar-ocr-gateway serve --model-dir /opt --port 8080
//! ```

mod cli;
mod config;
mod server;

use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "oar-ocr-gateway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "OCR gateway adapter: single invocations or an HTTP server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single invocation and print the response envelope
    Invoke {
        /// Event JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,

        /// Request id used for logging and the workspace name
        #[arg(long = "request-id")]
        request_id: Option<String>,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,

        #[command(flatten)]
        runtime: config::RuntimeArgs,
    },
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, short, default_value = "8080", env = "OAR_PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "OAR_HOST")]
        host: String,

        /// Largest accepted request body in bytes
        #[arg(
            long = "max-body-bytes",
            default_value_t = server::DEFAULT_MAX_BODY_BYTES,
            env = "OAR_MAX_BODY_BYTES"
        )]
        max_body_bytes: usize,

        #[command(flatten)]
        runtime: config::RuntimeArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    oar_ocr_gateway::utils::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Invoke {
            event,
            request_id,
            pretty,
            runtime,
        } => {
            let handler = runtime.build_handler().await?;
            let response =
                cli::run_invoke(&handler, &event, request_id.as_deref(), pretty).await?;
            if !response.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Serve {
            port,
            host,
            max_body_bytes,
            runtime,
        } => {
            let handler = runtime.build_handler().await?;
            let config = server::ServerConfig {
                host,
                port,
                max_body_bytes,
            };
            info!("Starting server on {}:{}", config.host, config.port);
            server::run_server(config, handler).await?;
        }
    }

    Ok(())
}
