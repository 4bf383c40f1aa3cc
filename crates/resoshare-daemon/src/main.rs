//! resoshare — keeps one browser's portal cookies synchronized with the
//! shared store so several operators can share a single signed-in session.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod engine;
mod supervisor;

use resoshare_browser::PortalSession;
use resoshare_core::Options;
use resoshare_store::PinnedStore;

use engine::ReconciliationEngine;
use supervisor::fatal;

const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

fn config_path() -> PathBuf {
    std::env::var("RESOSHARE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("resoshare.toml"))
}

/// Store client from the bot credentials in the environment.
fn env_store() -> PinnedStore {
    let token = match std::env::var("RESOSHARE_BOT_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => fatal("Configuration error: RESOSHARE_BOT_TOKEN is not set"),
    };
    let chat_id = match std::env::var("RESOSHARE_CHAT_ID")
        .ok()
        .and_then(|raw| raw.parse().ok())
    {
        Some(chat_id) => chat_id,
        None => fatal("Configuration error: RESOSHARE_CHAT_ID is not set or not a number"),
    };
    PinnedStore::new(token, chat_id)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Provisioning subcommands; the sync loop runs with no arguments.
    if args.len() > 1 {
        match args[1].as_str() {
            "init-store" => {
                if let Err(err) = env_store().reinit().await {
                    fatal(err);
                }
                println!("Store initialized");
                return Ok(());
            }
            "add-account" => {
                let Some(hash) = args.get(2) else {
                    eprintln!("Usage: resoshare add-account <hash>");
                    std::process::exit(1);
                };
                if let Err(err) = env_store().add_account(hash).await {
                    fatal(err);
                }
                println!("Account {hash} provisioned");
                return Ok(());
            }
            "remove-account" => {
                let Some(hash) = args.get(2) else {
                    eprintln!("Usage: resoshare remove-account <hash>");
                    std::process::exit(1);
                };
                if let Err(err) = env_store().remove_account(hash).await {
                    fatal(err);
                }
                println!("Account {hash} removed");
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("resoshare — shared portal session synchronizer");
                println!();
                println!("Usage: resoshare [command]");
                println!();
                println!("Commands:");
                println!("  (none)                  Run the cookie sync loop");
                println!("  init-store              Reset the shared store to its seed state");
                println!("  add-account <hash>      Provision an account in the shared store");
                println!("  remove-account <hash>   Drop an account from the shared store");
                println!("  help                    Show this help message");
                return Ok(());
            }
            other => {
                eprintln!("Unknown command: {other}. Use 'resoshare help' for usage.");
                std::process::exit(1);
            }
        }
    }

    let options = match Options::load(&config_path()) {
        Ok(options) => options,
        Err(err) => fatal(err),
    };
    let webdriver_url = std::env::var("RESOSHARE_WEBDRIVER_URL")
        .unwrap_or_else(|_| DEFAULT_WEBDRIVER_URL.into());

    info!(
        "Managing account {} with {} via {}",
        options.hash, options.browser, webdriver_url
    );

    let store = env_store();
    let session =
        match PortalSession::connect(&webdriver_url, options.browser, &options.user_agent).await {
            Ok(session) => session,
            Err(err) => fatal(err),
        };

    let engine = ReconciliationEngine::new(store, session, options.hash);
    supervisor::run(engine).await
}
