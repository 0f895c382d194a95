use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use microci::build::BuildCoordinator;
use microci::cancel::CancelRegistry;
use microci::config::{Cli, Commands, ServerArgs};
use microci::dispatch::EventDispatcher;
use microci::engine::{ContainerEngine, DockerEngine};
use microci::github::{CommitStatusSink, GitHubStatusClient};
use microci::notify::{ChatSink, Notifier};
use microci::report::StatsLedger;
use microci::server::{AppState, build_router};
use microci::shutdown::{SignalCoordinator, termination_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.json);

    match &cli.command {
        Commands::Server(args) => serve(&cli, args).await,
        Commands::Info => docker_info(&cli).await,
    }
}

fn init_tracing(debug: bool, json: bool) {
    let default_filter = if debug {
        "microci=debug,tower_http=debug"
    } else {
        "microci=info,tower_http=info"
    };
    let registry = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
    );

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(cli: &Cli, args: &ServerArgs) -> anyhow::Result<()> {
    let engine = DockerEngine::connect(&cli.docker_connection()?)
        .context("failed to configure Docker client")?;
    let ledger = Arc::new(StatsLedger::new());
    let registry = Arc::new(CancelRegistry::new());

    let notifier = if args.quiet {
        Notifier::disabled(Arc::clone(&ledger))
    } else if let Some(token) = args.slack_token() {
        let chat = ChatSink::new(token, &args.slack_channel)?;
        Notifier::chat(chat, Arc::clone(&ledger))
    } else {
        Notifier::console(Arc::clone(&ledger))
    };

    let status_sink: Option<Arc<dyn CommitStatusSink>> = match args.github_token() {
        Some(token) => Some(Arc::new(GitHubStatusClient::from_token(token)?)),
        None => None,
    };

    let credentials = args.registry_credentials();
    if credentials.is_none() && (args.user.is_some() || args.password.is_some()) {
        warn!("Registry user or password missing; pushing unauthenticated");
    }

    info!(
        notifier = notifier.kind(),
        commit_status = status_sink.is_some(),
        authenticated = credentials.is_some(),
        push = !args.no_push,
        "Configured build pipeline"
    );

    let coordinator = BuildCoordinator::new(Arc::new(engine), Arc::new(notifier), Arc::clone(&ledger))
        .with_status_sink(status_sink)
        .with_target(args.image_target())
        .with_credentials(credentials)
        .with_push(!args.no_push);
    let dispatcher = EventDispatcher::new(Arc::new(coordinator), Arc::clone(&registry));

    if args.secret.is_empty() {
        warn!("No webhook secret configured; signatures are not verified");
    }
    let state = AppState::new(
        args.secret.clone().into_bytes(),
        dispatcher,
        ledger,
        env!("CARGO_PKG_VERSION"),
    );
    let app = build_router(state);

    let addr = args.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening for GitHub hooks");

    let signals = SignalCoordinator::new(registry);
    let shutdown = signals.shutdown_token();
    let signal = termination_signal().context("failed to install signal handlers")?;
    tokio::spawn(async move { signals.run(signal).await });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server error")?;

    info!("Graceful exit");
    Ok(())
}

async fn docker_info(cli: &Cli) -> anyhow::Result<()> {
    let engine = DockerEngine::connect(&cli.docker_connection()?)
        .context("failed to configure Docker client")?;

    let registry = Arc::new(CancelRegistry::new());
    let token = CancellationToken::new();
    registry.append(token.clone());

    let signals = SignalCoordinator::new(registry);
    let signal = termination_signal().context("failed to install signal handlers")?;
    tokio::spawn(async move { signals.run(signal).await });

    let info = tokio::select! {
        _ = token.cancelled() => return Ok(()),
        info = engine.info() => info.context("failed to query Docker daemon")?,
    };
    println!("{info}");
    Ok(())
}
