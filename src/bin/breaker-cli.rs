use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "breaker-cli")]
#[command(about = "Management CLI for the queue circuit breaker", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:7013")]
    url: String,

    /// Admin API key, if the server requires one.
    #[arg(short, long, env = "BREAKER_ADMIN_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check breaker status and feature switches
    Status,
    /// List all circuits with state and statistics
    List,
    /// Show one circuit by hash
    Show { hash: String },
    /// Close the circuit a uri belongs to
    Close { uri: String },
    /// Reopen the circuit a uri belongs to
    Reopen { uri: String },
    /// Close every circuit
    CloseAll,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }
    let base = cli.url.trim_end_matches('/');

    let request = match &cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::List => client.get(format!("{}/circuits", base)),
        Commands::Show { hash } => client.get(format!("{}/circuits/{}", base, hash)),
        Commands::Close { uri } => client
            .post(format!("{}/circuits/close", base))
            .json(&json!({ "uri": uri })),
        Commands::Reopen { uri } => client
            .post(format!("{}/circuits/reopen", base))
            .json(&json!({ "uri": uri })),
        Commands::CloseAll => client.post(format!("{}/circuits/close-all", base)),
    };

    let res = request.headers(headers).send().await?;
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
