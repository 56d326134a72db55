use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use waypoint_core::SessionCode;
use waypoint_road::{
    build_store,
    cli::{self, Cli, Commands},
    config::Config,
    serve, telemetry,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!("waypoint-road failed: {err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    telemetry::init_tracing()?;

    let args = Cli::parse();
    match args.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::NewCode => {
            println!("{}", SessionCode::generate());
            Ok(())
        }
        Commands::Debug {
            url,
            session,
            command,
        } => cli::run_debug_client(url, session, command).await,
        Commands::Serve { port } => {
            let mut config = Config::from_env();
            if let Some(port) = port {
                config.port = port;
            }
            info!(
                port = config.port,
                ttl_seconds = config.session_ttl_seconds,
                "starting waypoint road session server"
            );
            let metrics = telemetry::init_metrics()?;
            let store = build_store(&config).await?;

            let addr = format!("0.0.0.0:{}", config.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind to {addr}"))?;
            serve(listener, store, &config, Some(metrics)).await
        }
    }
}
