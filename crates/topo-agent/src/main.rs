//! Process wiring for the topology agent (§2 "System overview", §4.H,
//! §4.I): parses the CLI, loads configuration, constructs the graph at its
//! one explicit site, starts the configured probes, and serves the
//! websocket publisher until shut down.

mod config;

use std::sync::Arc;

use compact_str::CompactString;
use figue as args;
use tokio::net::TcpListener;
use topo_docker::DockerProbe;
use topo_graph::{Graph, InMemoryBackend};
use topo_netlink::{NetlinkProbe, RtNetlinkSource};
use topo_netns::NetnsProbe;
use topo_ovsdb::OvsdbProbe;
use topo_probe::Probe;
use tracing::{error, info, warn};

use config::{Config, ProbeKind};

#[derive(facet::Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    #[facet(args::named, default)]
    config: Option<CompactString>,
}

fn main() {
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to build tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(err) = rt.block_on(run()) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_log_filter())))
        .init();

    let cfg = config::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    let hostname = local_hostname();

    let backend: Box<dyn topo_graph::Backend> = match cfg.graph_backend {
        config::GraphBackendKind::Memory => Box::new(InMemoryBackend::new()),
        config::GraphBackendKind::GremlinWs | config::GraphBackendKind::GremlinRest => {
            let url = cfg
                .graph_backend_url
                .clone()
                .ok_or_else(|| "graph.backend_url is required for a non-memory backend".to_string())?;
            Box::new(topo_graph::ExternalBackend::new(Box::new(topo_graph::LoggingRemoteWriter { backend_url: url })))
        }
    };
    let graph = Arc::new(Graph::new(backend, &hostname));

    let probes = start_probes(&graph, &cfg);

    let state = topo_web::AppState::new(graph.clone(), hostname.as_str(), cfg.ws_pong_timeout);
    let router = topo_web::router(state);
    let addr = format!("0.0.0.0:{}", cfg.listen);
    let listener = TcpListener::bind(&addr).await.map_err(|e| format!("failed to bind websocket listener on {addr}: {e}"))?;
    info!(%addr, probes = ?cfg.probes.iter().map(|p| p.name()).collect::<Vec<_>>(), "topo-agent ready");

    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(e) = result {
                error!(%e, "websocket server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    for probe in &probes {
        probe.stop().await;
    }
    Ok(())
}

fn start_probes(graph: &Arc<Graph>, cfg: &Config) -> Vec<Arc<dyn Probe>> {
    let mut probes: Vec<Arc<dyn Probe>> = Vec::new();
    for kind in &cfg.probes {
        match kind {
            ProbeKind::Netlink => match RtNetlinkSource::open_current_namespace() {
                Ok(source) => {
                    let probe = NetlinkProbe::new(graph.clone(), graph.root().clone(), Arc::new(source));
                    probe.clone().start();
                    probes.push(probe);
                }
                Err(e) => warn!(error = %e, "failed to open root-namespace rtnetlink source, netlink probe not started"),
            },
            ProbeKind::Netns => {
                let probe = NetnsProbe::new(graph.clone(), topo_netns::DEFAULT_NETNS_DIR);
                probe.clone().start();
                probes.push(probe);
            }
            ProbeKind::Ovsdb => {
                let probe = OvsdbProbe::new(graph.clone(), "127.0.0.1", cfg.ovsdb_port);
                probe.clone().start();
                probes.push(probe);
            }
            ProbeKind::Docker => {
                let probe = DockerProbe::new(graph.clone(), topo_docker::DEFAULT_SOCKET);
                probe.clone().start();
                probes.push(probe);
            }
        }
    }
    probes
}

fn parse_cli() -> Result<Cli, String> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| h.program_name("topo-agent").description("per-host network topology agent").version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev")))
        .build();
    let cli = args::Driver::new(figue_config).run().into_result().map_err(|e| e.to_string())?;
    Ok(cli.value)
}

fn default_log_filter() -> String {
    if cfg!(debug_assertions) { "info,topo_=debug".to_string() } else { "info".to_string() }
}

/// `gethostname(2)`, matching the ethtool/netlink crates' preference for a
/// direct `libc` call over pulling in a dedicated crate for one syscall.
fn local_hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}
