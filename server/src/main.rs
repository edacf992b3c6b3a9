use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use unifetch_server::{app_at, DispatcherOptions, Registry, ServerConfig, TodoResource};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    let registry = Registry::new().with("todos", TodoResource::new());
    let router = app_at(&config.base_path, registry, DispatcherOptions::default());

    let addr = config.addr();
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, base_path = %config.base_path, "listening");
    unifetch_server::run(listener, router).await
}
