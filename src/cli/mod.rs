use clap::{ Args, Parser, Subcommand };

use crate::llm::ProviderConfig;
use crate::models::GenerationParameters;
use crate::models::catalog;
use crate::session::SessionOptions;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging/output
    #[arg(long, global = true, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the relay HTTP server
    Serve(ServeArgs),

    /// Chat with a running relay from the terminal
    Chat(ChatArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host address and port for the relay to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    // --- Provider Args ---
    /// OpenRouter API key. Required; the relay refuses to start without it.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible provider API.
    #[arg(long, env = "OPENROUTER_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    pub base_url: String,

    /// Site URL sent to the provider as HTTP-Referer.
    #[arg(long, env = "SITE_URL", default_value = "http://localhost:3000")]
    pub site_url: String,

    /// Site name sent to the provider as X-Title.
    #[arg(long, env = "SITE_NAME", default_value = "Taller PWA")]
    pub site_name: String,

    // --- Generation defaults ---
    /// Model used when a request does not name one.
    #[arg(long, env = "DEFAULT_MODEL", default_value = catalog::GPT_4O_MINI)]
    pub default_model: String,

    /// Temperature used when a request does not set one.
    #[arg(long, env = "DEFAULT_TEMPERATURE", default_value = "0.7")]
    pub default_temperature: f64,

    /// Max output tokens used when a request does not set them.
    #[arg(long, env = "DEFAULT_MAX_TOKENS", default_value = "1000")]
    pub default_max_tokens: i64,

    // --- TLS ---
    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl ServeArgs {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            site_url: non_empty(&self.site_url),
            site_name: non_empty(&self.site_name),
        }
    }

    pub fn generation_defaults(&self) -> GenerationParameters {
        GenerationParameters {
            model: self.default_model.clone(),
            temperature: self.default_temperature,
            max_tokens: self.default_max_tokens,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    /// Base URL of a running relay.
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:3000")]
    pub relay_url: String,

    /// Model to request (defaults to the relay's default).
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub max_tokens: Option<i64>,

    /// System prompt placed at the head of the conversation.
    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system: Option<String>,
}

impl ChatArgs {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            system_prompt: self.system.clone(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() { None } else { Some(value.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["chat-relay", "serve", "--api-key", "k"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.generation_defaults(), GenerationParameters::default());
        let config = args.provider_config();
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.site_name.as_deref(), Some("Taller PWA"));
    }

    #[test]
    fn chat_overrides() {
        let cli = Cli::try_parse_from([
            "chat-relay",
            "chat",
            "--relay-url",
            "http://relay:8080",
            "--model",
            catalog::CLAUDE_HAIKU,
            "--max-tokens",
            "200",
        ]).unwrap();
        let Command::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(args.relay_url, "http://relay:8080");
        let options = args.session_options();
        assert_eq!(options.model.as_deref(), Some("anthropic/claude-3-haiku"));
        assert_eq!(options.max_tokens, Some(200));
        assert_eq!(options.temperature, None);
    }
}
