use clap::Parser;
use derive_more::{Display, Error};
use exn::ResultExt;
use figment::Figment;
use figment::providers::Serialized;
use shelf_config::Config;
use shelf_server::AppState;
use shelf_storage::LocalBackend;
use shelf_thumbnail::Scheduler;
use shelf_thumbnail::convert::CommandConverter;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Browse a directory over HTTP, with thumbnails made on demand.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file (TOML, YAML or JSON). Defaults to `shelf.toml` in the
    /// platform config directory, if present.
    #[arg(short, long, env = "SHELF_CONFIG")]
    config: Option<PathBuf>,
    /// Directory to serve [default: current directory]
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Address to listen on [default: 0.0.0.0:9595]
    #[arg(short, long)]
    listen: Option<SocketAddr>,
    /// Maximum thumbnail conversions running at once [default: 4]
    #[arg(short = 'j', long)]
    max_conversions: Option<usize>,
    /// Thumbnail converter executable [default: convert]
    #[arg(long)]
    converter: Option<String>,
}

impl Args {
    /// Config sources with command-line flags merged on top.
    fn figment(&self, file: Option<&Path>) -> Figment {
        let mut figment = Config::figment(file);
        if let Some(root) = &self.root {
            figment = figment.merge(Serialized::default("root", root));
        }
        if let Some(listen) = &self.listen {
            figment = figment.merge(Serialized::default("listen", listen));
        }
        if let Some(max_conversions) = self.max_conversions {
            figment = figment.merge(Serialized::default("thumbnails.max_conversions", max_conversions));
        }
        if let Some(converter) = &self.converter {
            figment = figment.merge(Serialized::default("thumbnails.converter", converter));
        }
        figment
    }
}

#[derive(Debug, Display, Error)]
enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("cannot serve {}", _0.display())]
    Root(#[error(not(source))] PathBuf),
    #[display("server stopped unexpectedly")]
    Server,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    run(args).await.map_err(|err| miette::miette!("{err:?}"))
}

async fn run(args: Args) -> Result<(), exn::Exn<ErrorKind>> {
    let file = Config::resolve_file(args.config.as_deref()).map_err(|err| err.raise(ErrorKind::Config))?;
    let config = Config::from_figment(&args.figment(file.as_deref())).map_err(|err| err.raise(ErrorKind::Config))?;

    let root = std::fs::canonicalize(&config.root).or_raise(|| ErrorKind::Root(config.root.clone()))?;
    let storage = LocalBackend::new(&root).map_err(|err| err.raise(ErrorKind::Root(root.clone())))?;

    let thumbnails = &config.thumbnails;
    let converter = match CommandConverter::discover(&thumbnails.converter, &thumbnails.converter_args) {
        Ok(converter) => converter,
        Err(err) => {
            // Listing and downloads still work; previews fail until it's installed.
            tracing::warn!(error = ?err, "Thumbnail converter unavailable, previews will fail");
            CommandConverter::new(&thumbnails.converter, &thumbnails.converter_args)
        },
    };
    let scheduler = Scheduler::new(Arc::new(converter), thumbnails.max_conversions)
        .map_err(|err| err.raise(ErrorKind::Config))?;

    let state = AppState::new(storage, scheduler);
    shelf_server::prepare(state.storage()).await.map_err(|err| err.raise(ErrorKind::Root(root.clone())))?;
    shelf_server::serve(config.listen, state, shutdown_signal())
        .await
        .map_err(|err| err.raise(ErrorKind::Server))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
