mod repl;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

use chatter::core::config;
use chatter::core::{Conversation, EnvCredentials};
use chatter::inference::{HttpTransport, Image, PROVIDERS, RequestOptions};

#[derive(Parser)]
#[command(name = "chatter", about = "Chat with any LLM provider from the terminal")]
struct Args {
    /// LLM provider to use (built-in: local, openai, anthropic, fireworks, groq, generic)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model identifier, overrides the provider default
    #[arg(short, long)]
    model: Option<String>,

    /// System prompt for this session
    #[arg(short, long)]
    system: Option<String>,

    /// Maximum tokens per reply
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Wait for full replies instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Image to attach to the first query
    #[arg(long)]
    image: Option<PathBuf>,
}

fn load_image(path: &PathBuf) -> std::io::Result<Image> {
    let media_type = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(Image::media_type_for)
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsupported image type: {}", path.display()),
            )
        })?;
    let bytes = std::fs::read(path)?;
    Ok(Image::from_bytes(media_type, &bytes))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    // Initialize file logger - writes to chatter.log in current directory
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    if let Ok(log_file) = File::create("chatter.log") {
        let _ = WriteLogger::init(LevelFilter::Debug, log_config, log_file);
    }

    let file_config = config::load_config().unwrap_or_else(|e| {
        eprintln!("warning: {e}, using defaults");
        config::ChatterConfig::default()
    });
    let resolved = config::resolve(&file_config, args.provider.as_deref(), args.system.as_deref());

    log::info!("Chatter starting up with provider: {}", resolved.provider);
    if !PROVIDERS.contains(&resolved.provider.as_str()) {
        log::warn!(
            "{} is not a built-in provider, relying on config overrides",
            resolved.provider
        );
    }

    let mut overrides = resolved.overrides;
    if args.model.is_some() {
        overrides.model = args.model;
    }
    let defaults = RequestOptions {
        provider: Some(resolved.provider.clone()),
        max_tokens: args.max_tokens.or(resolved.max_tokens),
        overrides,
        ..Default::default()
    };

    let pending_image = args.image.as_ref().map(load_image).transpose()?;

    let conversation = Conversation::new(
        resolved.system_prompt,
        defaults,
        Arc::new(HttpTransport::new()),
    );

    repl::Repl {
        conversation,
        credentials: Box::new(EnvCredentials::with_config(&file_config)),
        provider: resolved.provider,
        stream: resolved.stream && !args.no_stream,
        pending_image,
    }
    .run()
    .await
}
