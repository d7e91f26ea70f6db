use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "embed-proxy-cli")]
#[command(about = "Management CLI for the embedding proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy liveness
    Health,
    /// Show the portal site list and rate limit
    Config,
    /// Manage remote-browser sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start a session for a target URL
    Start { target: String },
    /// Show a session's status
    Status { id: String },
    /// Save the latest frame as a PNG file
    Frame {
        id: String,
        #[arg(short, long, default_value = "frame.png")]
        output: String,
    },
    /// Stop a session
    Stop { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{base}/health")).send().await?;
            print_response(res).await?;
        }
        Commands::Config => {
            let res = client.get(format!("{base}/api/config")).send().await?;
            print_response(res).await?;
        }
        Commands::Session { command } => match command {
            SessionCommands::Start { target } => {
                let res = client
                    .post(format!("{base}/api/session"))
                    .json(&json!({"url": target}))
                    .send()
                    .await?;
                print_response(res).await?;
            }
            SessionCommands::Status { id } => {
                let res = client.get(format!("{base}/api/session/{id}")).send().await?;
                print_response(res).await?;
            }
            SessionCommands::Frame { id, output } => {
                let res = client.get(format!("{base}/api/session/{id}/frame")).send().await?;
                match res.status().as_u16() {
                    200 => {
                        let png = res.bytes().await?;
                        tokio::fs::write(&output, &png).await?;
                        println!("Saved {} bytes to {}", png.len(), output);
                    }
                    202 => println!("Session is still initializing"),
                    _ => print_response(res).await?,
                }
            }
            SessionCommands::Stop { id } => {
                let res = client.delete(format!("{base}/api/session/{id}")).send().await?;
                if res.status().is_success() {
                    println!("Stopped {id}");
                } else {
                    print_response(res).await?;
                }
            }
        },
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
