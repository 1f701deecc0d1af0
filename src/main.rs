use std::net::SocketAddr;
use std::sync::Arc;

use paraphrase_server::{
    Config,
    api::{self, AppState},
    gpu_detection::DeviceSelection,
    models::{HubModelSource, HubSettings, ModelLoader},
    service::{GenerationLimits, ParaphraseService},
};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // HuggingFace tokenizers spawn their own thread pool, which fights with
    // the blocking pool used for generation.
    std::env::set_var("TOKENIZERS_PARALLELISM", "false");

    dotenv::dotenv().ok();
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    tracing::info!("🚀 Starting Paraphrase Server v{}", env!("CARGO_PKG_VERSION"));

    let devices = DeviceSelection::detect(config.model.force_backend.as_deref());
    tracing::info!(
        device = %devices.device,
        cuda_available = devices.cuda_available,
        "Compute device selected"
    );

    let source = Arc::new(HubModelSource::new(HubSettings::from(&config.model)));
    let loader = Arc::new(ModelLoader::new(
        source,
        config.model.retry_policy(),
        devices,
    ));

    let limits = GenerationLimits {
        max_input_tokens: config.model.max_input_tokens,
        max_output_tokens: config.model.max_output_tokens,
    };
    let service = Arc::new(ParaphraseService::new(
        Arc::clone(&loader),
        limits,
        config.model.max_concurrent_requests,
    ));
    tracing::info!(
        model_id = %config.model.model_id,
        max_concurrent_requests = service.max_concurrent(),
        max_input_tokens = limits.max_input_tokens,
        max_output_tokens = limits.max_output_tokens,
        "📊 Service configuration"
    );

    // Loading runs next to the server so /health answers while the model is
    // still downloading. Paraphrase requests get 503 until it is Ready.
    let load_task = {
        let loader = Arc::clone(&loader);
        tokio::spawn(async move {
            match loader.acquire().await {
                Ok(handle) => tracing::info!(
                    model_id = %handle.model_id(),
                    device = %handle.device(),
                    loaded_at = %handle.loaded_at().to_rfc3339(),
                    "✅ Model ready"
                ),
                Err(e) => tracing::error!(
                    "❌ {}. Serving /health only; /paraphrase will return 503",
                    e
                ),
            }
        })
    };

    let app = api::router(AppState::new(service));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("🌐 Server starting on http://{}", addr);
    tracing::info!("📡 Available endpoints:");
    tracing::info!("  • GET  /health - Health and readiness");
    tracing::info!("  • POST /paraphrase - Text paraphrasing");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("🛑 Shutdown signal received");
    load_task.abort();
    tracing::info!("👋 Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
