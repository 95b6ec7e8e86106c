//! Sparkops - control-panel backend for Spark clusters on Kubernetes

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use kube::{Api, Client};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sparkops::client::KubeResourceClient;
use sparkops::http::{self, AppState};
use sparkops::orchestrator::ClusterLifecycle;
use sparkops::registry::ClusterRegistry;

/// Sparkops - control-panel backend for Spark clusters on Kubernetes
#[derive(Parser, Debug)]
#[command(name = "sparkops", version, about, long_about = None)]
struct Cli {
    /// Kubernetes namespace the panel manages clusters in
    #[arg(short, long, env = "SPARKOPS_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Address to serve the HTTP API on
    #[arg(long, env = "SPARKOPS_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = Client::try_default().await?;

    let registry = ClusterRegistry::new();
    {
        let registry = registry.clone();
        let pods = Api::namespaced(client.clone(), &cli.namespace);
        tokio::spawn(async move { registry.watch_pods(pods).await });
    }
    {
        let registry = registry.clone();
        let services = Api::namespaced(client.clone(), &cli.namespace);
        tokio::spawn(async move { registry.watch_services(services).await });
    }

    let lifecycle = ClusterLifecycle::new(KubeResourceClient::new(client, &cli.namespace));
    let state = Arc::new(AppState::new(registry, lifecycle));
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    info!(addr = %cli.bind, namespace = %cli.namespace, "sparkops control panel listening");
    axum::serve(listener, app).await?;
    Ok(())
}
