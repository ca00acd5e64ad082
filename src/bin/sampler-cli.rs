use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "sampler-cli")]
#[command(about = "Query the shape sampler admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:3002")]
    url: String,

    #[arg(short, long, env = "SAMPLER_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check sampler status and queue counters
    Status,
    /// Show totals across endpoints, fingerprints and samples
    Stats,
    /// List observed endpoints
    Endpoints,
    /// List response shapes of an endpoint
    Fingerprints { endpoint_id: i64 },
    /// Show retained samples of a response shape
    Samples { fingerprint_id: i64 },
}

impl Commands {
    fn path(&self) -> String {
        match self {
            Commands::Status => "/admin/status".to_string(),
            Commands::Stats => "/admin/stats".to_string(),
            Commands::Endpoints => "/admin/endpoints".to_string(),
            Commands::Fingerprints { endpoint_id } => {
                format!("/admin/endpoints/{endpoint_id}/fingerprints")
            }
            Commands::Samples { fingerprint_id } => {
                format!("/admin/fingerprints/{fingerprint_id}/samples")
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.path());
    let res = client.get(url).headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
