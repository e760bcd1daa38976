//! Green wallet command-line front end
//!
//! Reads one command per line from stdin: a code to redeem, `balance`,
//! `history`, `codes`, `metrics` or `quit`.

use green_ledger::{Config, Device, Notice, NoticeSink, Severity};
use prometheus::{Encoder, TextEncoder};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prints notices the way the portal shows toasts
struct ConsoleSink;

impl NoticeSink for ConsoleSink {
    fn notify(&self, notice: Notice) {
        let marker = match notice.severity {
            Severity::Success => "+",
            Severity::Destructive => "!",
        };
        println!("[{}] {}: {}", marker, notice.title, notice.description);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Green wallet");

    // Load configuration
    let config = match std::env::var("WALLET_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::from_env()?,
    };

    let device = Device::open(config).await?;
    let view = device.open_view();
    let badge = view.badge().await?;
    println!(
        "Balance: {} ({} codes available, type `codes` to list them)",
        badge.label(),
        device.registry().len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim().to_ascii_lowercase().as_str() {
            "quit" | "exit" => break,
            "balance" => println!("Balance: {} Green Tokens", view.balance().await?),
            "history" => {
                let history = view.history(10).await?;
                if history.is_empty() {
                    println!("No transactions yet. Redeem your first token above!");
                }
                for tx in history {
                    println!(
                        "{}  Token: {}  +{}",
                        tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        tx.code,
                        tx.amount
                    );
                }
            }
            "codes" => {
                for (code, value, used) in view.code_list().await? {
                    println!("{} (+{}){}", code, value, if used { " ✓" } else { "" });
                }
            }
            "metrics" => {
                let mut buffer = Vec::new();
                TextEncoder::new().encode(&device.metrics().registry().gather(), &mut buffer)?;
                print!("{}", String::from_utf8_lossy(&buffer));
            }
            _ => {
                if view.redeem(&line, &ConsoleSink).await.is_ok() {
                    println!("Balance: {}", badge.label());
                }
            }
        }
    }

    tracing::info!("Shutting down Green wallet");
    device.shutdown().await?;
    Ok(())
}
