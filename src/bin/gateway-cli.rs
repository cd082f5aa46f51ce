use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{Map, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the breaker gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List every live circuit breaker
    Breakers,
    /// Show one circuit breaker
    Breaker { name: String },
    /// Override threshold and/or open-state wait of a breaker
    Customize {
        name: String,
        /// Failure percentage in (0, 100]
        #[arg(long)]
        threshold: Option<f32>,
        /// Milliseconds, or a duration such as `30s` or `2m`
        #[arg(long)]
        wait: Option<String>,
    },
    /// Force a breaker back to CLOSED
    Reset { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Breakers => client.get(format!("{base}/admin/breakers")),
        Commands::Breaker { name } => client.get(format!("{base}/admin/breakers/{name}")),
        Commands::Customize {
            name,
            threshold,
            wait,
        } => {
            let mut body = Map::new();
            if let Some(threshold) = threshold {
                body.insert("failure_rate_threshold".into(), Value::from(threshold));
            }
            if let Some(wait) = wait {
                body.insert("wait_duration_open".into(), Value::from(wait));
            }
            client
                .post(format!("{base}/admin/breakers/{name}/customize"))
                .json(&body)
        }
        Commands::Reset { name } => client.post(format!("{base}/admin/breakers/{name}/reset")),
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
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
