use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use zapd::platform::command::CommandPlatform;
use zapd::service::Service;
use zapd::{cli, client, config};

/// Wait for the first Ctrl+C (graceful shutdown).
/// A second Ctrl+C while shutting down force-exits immediately.
async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl+C handler: {}", e);
        return;
    }
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nzapd: forced exit");
            std::process::exit(1);
        }
    });
}

/// `--run` / `--reload`: send one request to a running daemon and exit.
async fn run_client(args: &cli::Args, port: u16) {
    let client = client::Client::local(port);
    let result = match &args.run {
        Some(text) => client.run(text).await.map(|r| {
            if r.unsafe_origin {
                "queued (restricted commands disabled)".to_string()
            } else {
                "queued".to_string()
            }
        }),
        None => client
            .reload_mappings()
            .await
            .map(|r| format!("reloaded {} mapping rules", r.mappings)),
    };
    match result {
        Ok(message) => println!("{}", message),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    // The config decides the default log level, so read it before logging starts.
    let loaded = config::find_config_file(args.config.as_deref())
        .map(|path| {
            let result = config::load_config(&path);
            (path, result)
        });
    let debug = matches!(&loaded, Some((_, Ok(file))) if file.debug_logging == Some(true));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" })),
        )
        .init();

    let file_config = loaded.and_then(|(path, result)| match result {
        Ok(cfg) => {
            tracing::debug!("Loaded config from {}", path.display());
            Some(cfg)
        }
        Err(e) => {
            tracing::warn!("{}", e);
            None
        }
    });

    let config = config::Config::resolve(file_config, &args);

    if args.run.is_some() || args.reload {
        run_client(&args, config.port).await;
        return;
    }

    tracing::info!(
        "zapd {} (data: {}, temp: {})",
        env!("CARGO_PKG_VERSION"),
        config.data_dir.display(),
        config.temp_dir.display()
    );

    let platform = Arc::new(CommandPlatform::from_config(&config));
    let service = match Service::start(&config, platform).await {
        Ok(service) => service,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    wait_for_shutdown().await;
    tracing::info!("Shutting down...");
    service.stop().await;
    tracing::info!("Goodbye.");
}
