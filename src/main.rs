use anyhow::Context;
use clap::Parser;
use screenshot_service::{
    metrics, router, serve, setup_logging, validate_config, AppState, BrowserProvider,
    CaptureEngine, CapturePipeline, ChromeContextFactory, ChromeWarmFactory, Cli, Config,
    EphemeralProvider, PooledProvider, ProviderStrategy,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = load_config(&args).await?;

    setup_logging(args.verbose_logging(&config))?;

    info!("Starting screenshot-service v{}", env!("CARGO_PKG_VERSION"));
    log_config(&config);

    match config.strategy {
        ProviderStrategy::Pooled => {
            let provider = PooledProvider::new(
                ChromeContextFactory::new(config.clone()),
                config.max_concurrency,
                config.max_queue_depth,
            );
            run(config, provider).await
        }
        ProviderStrategy::Ephemeral => {
            let provider = EphemeralProvider::new(ChromeWarmFactory::new(config.clone()));
            run(config, provider).await
        }
    }
}

async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let config = if let Some(config_path) = &args.config {
        let config_content = tokio::fs::read_to_string(config_path)
            .await
            .with_context(|| format!("reading {}", config_path.display()))?;
        serde_json::from_str(&config_content).context("parsing configuration file")?
    } else {
        Config::default()
    };

    let config = args.apply(config);
    validate_config(&config)?;
    Ok(config)
}

fn log_config(config: &Config) {
    info!("Configuration loaded successfully");
    info!("Strategy: {:?}", config.strategy);
    info!("Max concurrency: {}", config.max_concurrency);
    info!("Navigation timeout: {:?}", config.navigation_timeout);
    if !config.security.auth_enabled() {
        warn!("No auth token configured, /screenshot is open to anyone");
    }
    if config.security.host_whitelist.is_empty() {
        warn!("No host whitelist configured, any hostname may be captured");
    }
}

async fn run<P: BrowserProvider>(config: Config, provider: P) -> anyhow::Result<()> {
    let metrics = if config.metrics_enabled {
        Some(metrics::install_prometheus()?)
    } else {
        None
    };

    let provider = Arc::new(provider);
    let engine = CaptureEngine::new(
        provider.clone(),
        config.security.clone(),
        CapturePipeline::new(config.navigation_timeout, config.security.auth_token.clone()),
    )
    .with_url_logging(!config.dev_mode);

    let app = router(Arc::new(AppState { engine, metrics }), config.dev_mode);
    let result = serve(app, config.port, shutdown_signal()).await;

    info!("Shutting down...");
    provider.shutdown().await;

    result.context("HTTP server error")?;
    info!("Screenshot-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
