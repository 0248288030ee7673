use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chatrelay_core::{
    config::Config,
    framings::FramingResolver,
    model::StreamInfo,
    relay::{ChatStreamProxy, StreamingResponse},
    session::StreamSession,
    store::{MemoryMessageStore, MemoryUsageLedger},
    upstream::UpstreamClient,
};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;

#[derive(Parser)]
#[command(author, version, about = "chatrelay CLI smoke tool", long_about = None)]
struct Cli {
    /// Config file (JSON or TOML); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay a live upstream SSE stream to stdout through the full pipeline
    Proxy {
        #[arg(long, help = "Upstream SSE URL to open")]
        url: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        provider: String,
        #[arg(long, help = "Conversation id; enables persistence and the trailer frame")]
        conversation: Option<String>,
    },
    /// Assemble a captured SSE transcript offline (from a file or stdin)
    Assemble {
        #[arg(long, help = "Transcript file; stdin when omitted")]
        file: Option<PathBuf>,
        #[arg(long)]
        provider: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Proxy {
            url,
            model,
            owner,
            provider,
            conversation,
        } => {
            let store = Arc::new(MemoryMessageStore::new());
            let ledger = Arc::new(MemoryUsageLedger::new());
            let proxy = ChatStreamProxy::new(&cfg.framing, store.clone(), ledger.clone())?;

            let client = UpstreamClient::new(&cfg.http)?;
            let upstream = client.open_stream(&url).await?;

            let info = StreamInfo {
                conversation_id: conversation,
                model_id: model,
                owner_id: owner,
                provider_id: provider,
            };
            let response = proxy.proxy_response(upstream, info)?;
            for (name, value) in StreamingResponse::headers() {
                eprintln!("{name}: {value}");
            }

            let mut body = response.into_body();
            let mut stdout = std::io::stdout();
            while let Some(item) = body.next().await {
                match item {
                    Ok(chunk) => {
                        stdout.write_all(&chunk)?;
                        stdout.flush()?;
                    }
                    Err(err) => {
                        eprintln!("stream error: {err}");
                        std::process::exit(1);
                    }
                }
            }

            // The usage submission is detached; give it a moment before the
            // process exits, then report what the smoke stores saw.
            for _ in 0..100 {
                if !ledger.records().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            for (id, message) in store.messages() {
                eprintln!(
                    "persisted {id}: {} answer chars, {} reasoning chars, {} tokens",
                    message.content.len(),
                    message.reasoning_content.len(),
                    message.total_tokens
                );
            }
            for (owner, record) in ledger.records() {
                eprintln!(
                    "usage {owner} {}: prompt={} completion={} total={}",
                    record.date, record.prompt_tokens, record.completion_tokens, record.total_tokens
                );
            }
        }
        Commands::Assemble { file, provider } => {
            let raw = match file {
                Some(path) => std::fs::read(path)?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };

            let resolver = FramingResolver::new(&cfg.framing)?;
            let framing = resolver.resolve(&provider);
            let info = StreamInfo {
                conversation_id: None,
                model_id: "offline".into(),
                owner_id: "local".into(),
                provider_id: provider,
            };
            let mut session = StreamSession::new(info, framing);
            session.ingest_chunk(&raw);

            let usage = session.usage();
            println!("== answer ==");
            println!("{}", session.visible());
            if !session.reasoning().is_empty() {
                println!("== reasoning ==");
                println!("{}", session.reasoning());
            }
            println!(
                "== usage == prompt={} completion={} total={}",
                usage.prompt, usage.completion, usage.total
            );
        }
    }

    Ok(())
}
