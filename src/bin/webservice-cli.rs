use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use webservice::client::{Client, ClientOptions, Context};

#[derive(Parser)]
#[command(name = "webservice-cli")]
#[command(about = "Issue HTTP requests through the webservice client", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Request timeout in seconds.
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    /// Extra header, as `Name: value`. May be repeated.
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a request and print the buffered response
    Request {
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        endpoint: String,
        /// Raw request body
        #[arg(short, long)]
        data: Option<String>,
    },
    /// Send a JSON document
    Json {
        #[arg(short = 'X', long, default_value = "POST")]
        method: String,
        endpoint: String,
        data: String,
    },
    /// Stream the response body to stdout
    Stream {
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        endpoint: String,
    },
    /// Check connectivity to the host
    Ping,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let options = ClientOptions::default()
        .with_timeout(Duration::from_secs(cli.timeout))
        .add_headers(cli.headers);
    let client = Client::with_options(cli.url, options)?;
    let ctx = Context::background();

    match cli.command {
        Commands::Request {
            method,
            endpoint,
            data,
        } => {
            let body = data.map(Bytes::from).unwrap_or_default();
            let (status, body) = client
                .new_request([])
                .send(&ctx, method.as_str(), &endpoint, body)
                .await?;
            print_response(status, &body)?;
        }
        Commands::Json {
            method,
            endpoint,
            data,
        } => {
            let document: Value = serde_json::from_str(&data)?;
            let (status, body) = client
                .new_json_request([])
                .send(&ctx, method.as_str(), &endpoint, &document)
                .await?;
            print_response(status, &body)?;
        }
        Commands::Stream { method, endpoint } => {
            let (status, response) = client
                .new_stream_request([])
                .send(&ctx, method.as_str(), &endpoint, Bytes::new())
                .await?;
            eprintln!("Status: {}", status);

            let mut stdout = tokio::io::stdout();
            let mut chunks = response.bytes_stream();
            while let Some(chunk) = chunks.next().await {
                stdout.write_all(&chunk?).await?;
            }
            stdout.flush().await?;
        }
        Commands::Ping => {
            let report = client.ping().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("header {raw:?} is not `Name: value`"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn print_response(
    status: reqwest::StatusCode,
    body: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", String::from_utf8_lossy(body)),
    }
    Ok(())
}
