use std::{fs::File, io::BufReader, path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use config::Config;
use discord::{DiscordClient, IncomingMessage};
use dispatch::Dispatcher;
use media::HeadProbe;
use pipeline::Pipeline;
use reqwest::Client;
use sources::PostFetcher;
use tokio::{
    io::{self, AsyncBufReadExt},
    task::JoinSet,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use translate::DeepL;

mod config;
mod discord;
mod dispatch;
mod embed;
mod link;
mod media;
mod pipeline;
mod sources;
mod translate;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to configuration file.
    #[arg(long, default_value = ".postrelay.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,postrelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let Args { config } = Args::parse();

    let cfg: Config = {
        let file = match File::open(&config) {
            Ok(f) => BufReader::new(f),
            Err(e) => {
                eprintln!("Failed to open config {}: {e}", config.display());
                return ExitCode::FAILURE;
            }
        };

        match serde_yaml::from_reader(file) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Failed to parse config: {e}");
                return ExitCode::FAILURE;
            }
        }
    };

    let client = match Client::builder()
        .timeout(cfg.http_timeout())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to build HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        PostFetcher::new(client.clone(), &cfg.twitter_api, &cfg.bluesky_api),
        Arc::new(DeepL::new(client.clone(), cfg.deepl_base(), &cfg.deepl_key)),
        Dispatcher::new(
            Arc::new(DiscordClient::new(client.clone(), &cfg.discord_token, &cfg.discord_api)),
            Arc::new(HeadProbe::new(client)),
            cfg.attachment_limit,
        ),
    ));

    info!("listening for message events on stdin");

    // One JSON-encoded MESSAGE_CREATE payload per line, one task per message.
    let mut tasks = JoinSet::new();
    let mut lines = io::BufReader::new(io::stdin()).lines();
    loop {
        while tasks.try_join_next().is_some() {}

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read event stream");
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<IncomingMessage>(&line) {
            Ok(message) => {
                let pipeline = pipeline.clone();
                tasks.spawn(async move { pipeline.handle(message).await });
            }
            Err(e) => warn!(error = %e, "skipping malformed event"),
        }
    }

    info!(pending = tasks.len(), "event stream closed, finishing in-flight messages");
    while tasks.join_next().await.is_some() {}

    ExitCode::SUCCESS
}
