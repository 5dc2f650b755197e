use clap::Parser;
use proxy::cluster::Cluster;
use proxy::config::{CliArgs, ProxyConfig};
use proxy::connection::{Connection, ConnectionDeps};
use proxy::health;
use proxy::listener::Instance;
use proxy::policy::{Policy, StaticClusterPolicy};
use proxy::stats::Stats;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config = Arc::new(ProxyConfig::load(args)?);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_line_number(true)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("proxy-worker")
        .build()?;

    info!(?config.listen_addr, cluster = ?config.cluster, "starting proxy");

    runtime.block_on(run(config))
}

async fn run(config: Arc<ProxyConfig>) -> Result<(), Box<dyn std::error::Error>> {
    let cluster = Arc::new(Cluster::new(config.cluster.clone()));
    let policy: Arc<dyn Policy> = Arc::new(StaticClusterPolicy::new(cluster.clone()));
    let stats = Arc::new(Stats::new());

    if let Some(addr) = config.metrics_addr {
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => info!(%addr, "metrics exporter listening"),
            Err(e) => warn!(%addr, error = %e, "failed to start metrics exporter"),
        }
    }

    {
        let cluster = cluster.clone();
        let stats = stats.clone();
        let interval = config.health_check_interval;
        let timeout = config.health_check_timeout;
        tokio::spawn(async move {
            health::run_scheduler(cluster, stats, interval, timeout, false).await;
        });
    }

    let instance = Instance::bind(config.clone()).await?;
    let registry = instance.registry.clone();

    if let Some(control_addr) = config.control_addr {
        let socket = tokio::net::UdpSocket::bind(control_addr).await?;
        let registry = registry.clone();
        info!(%control_addr, "admin control channel listening");
        tokio::spawn(async move {
            proxy::control::run(socket, registry).await;
        });
    }

    let deps = Arc::new(ConnectionDeps {
        cluster,
        policy,
        stats,
        idle_timeout: config.idle_timeout,
    });

    instance
        .serve(move |socket, peer_addr, id, registry, _stats, _config| {
            let deps = deps.clone();
            async move {
                let conn = Connection::new(peer_addr, id, registry.clone(), deps);
                if let Err(e) = conn.run(socket).await {
                    error!(%peer_addr, error = %e, "connection ended with error");
                }
                registry.unregister(id);
            }
        })
        .await?;

    Ok(())
}
