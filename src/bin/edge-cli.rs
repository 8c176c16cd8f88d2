use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::{json, Value};

use edge_proxy::upstream::extract_text;

/// Same bound the browser client puts on a submission.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

const SERVICE_BUSY: &str = "サービス混雑中です。時間をあけてからご利用ください。";

#[derive(Parser)]
#[command(name = "edge-cli")]
#[command(about = "Management CLI for the webhook edge proxy", long_about = None)]
struct Cli {
    /// Admin API base URL
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Admin API key
    #[arg(short, long, env = "EDGE_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy status
    Status,
    /// List runtime settings (secrets redacted)
    Settings,
    /// Set a runtime setting (webhook_url, auth_header_name, auth_token, challenge_secret)
    Set { name: String, value: String },
    /// Remove a runtime setting
    Unset { name: String },
    /// Show a client's rate limit bucket
    Bucket { client: String },
    /// Reset a client's rate limit bucket
    Reset { client: String },
    /// Submit text through the proxy and print the extracted result
    Submit {
        /// Relay endpoint
        #[arg(long, default_value = "http://localhost:8080")]
        proxy: String,
        /// Origin header to send
        #[arg(long, default_value = "http://localhost:8000")]
        origin: String,
        /// Payload field carrying the text
        #[arg(long, default_value = "問い合わせ内容")]
        field: String,
        /// Challenge token, if the proxy enforces one
        #[arg(long)]
        challenge_token: Option<String>,
        text: String,
    },
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

    let admin = |path: &str| format!("{}{}", cli.url.trim_end_matches('/'), path);

    match cli.command {
        Commands::Status => {
            let res = client.get(admin("/admin/status")).headers(headers).send().await?;
            print_response(res).await?;
        }
        Commands::Settings => {
            let res = client.get(admin("/admin/settings")).headers(headers).send().await?;
            print_response(res).await?;
        }
        Commands::Set { name, value } => {
            let res = client
                .put(admin(&format!("/admin/settings/{name}")))
                .headers(headers)
                .json(&json!({ "value": value }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Unset { name } => {
            let res = client
                .delete(admin(&format!("/admin/settings/{name}")))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Bucket { client: id } => {
            let res = client
                .get(admin(&format!("/admin/ratelimit/{id}")))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Reset { client: id } => {
            let res = client
                .delete(admin(&format!("/admin/ratelimit/{id}")))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Submit {
            proxy,
            origin,
            field,
            challenge_token,
            text,
        } => {
            submit(&client, &proxy, &origin, &field, challenge_token, &text).await?;
        }
    }

    Ok(())
}

async fn submit(
    client: &reqwest::Client,
    proxy: &str,
    origin: &str,
    field: &str,
    challenge_token: Option<String>,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut payload = serde_json::Map::new();
    payload.insert(field.to_string(), Value::String(text.to_string()));

    let mut request = client
        .post(proxy)
        .header("Origin", origin)
        .json(&payload)
        .timeout(SUBMIT_TIMEOUT);
    if let Some(token) = challenge_token {
        request = request.header("CF-Turnstile-Response", token);
    }

    let res = match request.send().await {
        Ok(res) => res,
        Err(e) if e.is_timeout() => {
            eprintln!("{SERVICE_BUSY}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let status = res.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry = res
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("?")
            .to_string();
        eprintln!("{SERVICE_BUSY} (retry after {retry}s)");
        return Ok(());
    }

    let body: Value = res.json().await?;
    if !status.is_success() {
        eprintln!("Error: proxy returned status {status}");
        eprintln!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    match extract_text(&body) {
        Ok(result) => println!("{result}"),
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Response: {}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
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

    if status == StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
