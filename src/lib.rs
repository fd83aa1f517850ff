pub mod cli;
pub mod client;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;
pub mod sse;

use cli::{ ChatArgs, Cli, Command, ServeArgs };
use client::TranscriptClient;
use log::{ info, warn };
use server::Server;
use session::ChatSession;
use std::error::Error;
use tokio::io::BufReader;

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Chat(args) => chat(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let defaults = args.generation_defaults();

    info!("--- Relay Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Provider Base URL: {}", args.base_url);
    info!("Provider API Key: {}", if args.api_key.is_some() { "set" } else { "MISSING" });
    info!("Site URL: {}", args.site_url);
    info!("Site Name: {}", args.site_name);
    info!("Default Model: {}", defaults.model);
    info!("Default Temperature: {}", defaults.temperature);
    info!("Default Max Tokens: {}", defaults.max_tokens);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("---------------------------");

    if !models::catalog::is_known(&defaults.model) {
        warn!("Default model '{}' is not in the known model catalogue", defaults.model);
    }

    // The only provider client for the process; handlers get it through router state.
    let provider = llm::new_client(&args.provider_config())?;
    info!("Provider client ready: {}", provider.name());

    let server = Server::new(args.server_addr.clone(), provider, defaults, args);
    server.run().await?;

    Ok(())
}

async fn chat(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let client = TranscriptClient::new(args.relay_url.clone())?;
    let mut session = ChatSession::new(client, args.session_options());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    session.run(stdin, &mut stdout).await?;

    Ok(())
}
