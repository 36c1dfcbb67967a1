//! Configuration surface (§4.H, §6 "Configuration surface"): built-in
//! defaults, overlaid by an optional JSON config file, overlaid by
//! `TOPO_`-prefixed environment variables. Malformed configuration is the
//! one class of startup-fatal error (§7) — it happens before any probe or
//! client exists, so aborting the process is safe here and nowhere else.

use std::fmt;
use std::time::Duration;

use compact_str::CompactString;
use facet::Facet;

pub const DEFAULT_LISTEN_PORT: u16 = 8542;
pub const DEFAULT_WS_PONG_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OVSDB_PORT: u16 = 6640;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeKind {
    Netlink,
    Netns,
    Ovsdb,
    Docker,
}

impl ProbeKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "netlink" => Some(ProbeKind::Netlink),
            "netns" => Some(ProbeKind::Netns),
            "ovsdb" => Some(ProbeKind::Ovsdb),
            "docker" => Some(ProbeKind::Docker),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProbeKind::Netlink => "netlink",
            ProbeKind::Netns => "netns",
            ProbeKind::Ovsdb => "ovsdb",
            ProbeKind::Docker => "docker",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphBackendKind {
    Memory,
    GremlinWs,
    GremlinRest,
}

impl GraphBackendKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "memory" => Some(GraphBackendKind::Memory),
            "gremlin-ws" => Some(GraphBackendKind::GremlinWs),
            "gremlin-rest" => Some(GraphBackendKind::GremlinRest),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub listen: u16,
    pub probes: Vec<ProbeKind>,
    pub ws_pong_timeout: Duration,
    pub ovsdb_port: u16,
    pub graph_backend: GraphBackendKind,
    pub graph_backend_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_PORT,
            probes: vec![ProbeKind::Netlink],
            ws_pong_timeout: Duration::from_secs(DEFAULT_WS_PONG_TIMEOUT_SECS),
            ovsdb_port: DEFAULT_OVSDB_PORT,
            graph_backend: GraphBackendKind::Memory,
            graph_backend_url: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    File(String),
    Malformed(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::File(msg) => write!(f, "failed to read config file: {msg}"),
            ConfigError::Malformed(msg) => write!(f, "malformed configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The on-disk shape of an optional JSON config file (§4.H). Every field is
/// optional so a file only needs to mention what it overrides.
#[derive(Facet, Default)]
struct FileConfig {
    #[facet(default)]
    agent: Option<FileAgentConfig>,
    #[facet(default)]
    ws_pong_timeout: Option<u64>,
    #[facet(default)]
    ovs: Option<FileOvsConfig>,
    #[facet(default)]
    graph: Option<FileGraphConfig>,
}

#[derive(Facet, Default)]
struct FileAgentConfig {
    #[facet(default)]
    listen: Option<u16>,
    #[facet(default)]
    topology: Option<FileTopologyConfig>,
}

#[derive(Facet, Default)]
struct FileTopologyConfig {
    #[facet(default)]
    probes: Option<Vec<CompactString>>,
}

#[derive(Facet, Default)]
struct FileOvsConfig {
    #[facet(default)]
    ovsdb: Option<u16>,
}

#[derive(Facet, Default)]
struct FileGraphConfig {
    #[facet(default)]
    backend: Option<CompactString>,
    #[facet(default)]
    backend_url: Option<CompactString>,
}

/// Build the effective configuration: defaults, then `config_path` (if
/// given), then `TOPO_*` environment variables (§4.H).
pub fn load(config_path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Some(path) = config_path {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::File(format!("{path}: {e}")))?;
        let file: FileConfig = facet_json::from_str(&text).map_err(|e| ConfigError::Malformed(format!("{path}: {e}")))?;
        apply_file_config(&mut config, file)?;
    }

    apply_env(&mut config)?;
    Ok(config)
}

fn apply_file_config(config: &mut Config, file: FileConfig) -> Result<(), ConfigError> {
    if let Some(agent) = file.agent {
        if let Some(listen) = agent.listen {
            config.listen = listen;
        }
        if let Some(topology) = agent.topology
            && let Some(names) = topology.probes
        {
            config.probes = parse_probes(names.iter().map(CompactString::as_str))?;
        }
    }
    if let Some(secs) = file.ws_pong_timeout {
        config.ws_pong_timeout = Duration::from_secs(secs);
    }
    if let Some(ovs) = file.ovs
        && let Some(port) = ovs.ovsdb
    {
        config.ovsdb_port = port;
    }
    if let Some(graph) = file.graph {
        if let Some(backend) = graph.backend {
            config.graph_backend = GraphBackendKind::parse(&backend).ok_or_else(|| ConfigError::Malformed(format!("unknown graph.backend: {backend}")))?;
        }
        config.graph_backend_url = graph.backend_url.map(|s| s.to_string());
    }
    Ok(())
}

fn apply_env(config: &mut Config) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var("TOPO_AGENT_LISTEN") {
        config.listen = value.parse().map_err(|_| ConfigError::Malformed(format!("TOPO_AGENT_LISTEN: invalid port {value:?}")))?;
    }
    if let Ok(value) = std::env::var("TOPO_AGENT_TOPOLOGY_PROBES") {
        config.probes = parse_probes(value.split(','))?;
    }
    if let Ok(value) = std::env::var("TOPO_WS_PONG_TIMEOUT") {
        let secs: u64 = value.parse().map_err(|_| ConfigError::Malformed(format!("TOPO_WS_PONG_TIMEOUT: invalid seconds {value:?}")))?;
        config.ws_pong_timeout = Duration::from_secs(secs);
    }
    if let Ok(value) = std::env::var("TOPO_OVS_OVSDB") {
        config.ovsdb_port = value.parse().map_err(|_| ConfigError::Malformed(format!("TOPO_OVS_OVSDB: invalid port {value:?}")))?;
    }
    if let Ok(value) = std::env::var("TOPO_GRAPH_BACKEND") {
        config.graph_backend = GraphBackendKind::parse(&value).ok_or_else(|| ConfigError::Malformed(format!("TOPO_GRAPH_BACKEND: unknown backend {value:?}")))?;
    }
    if let Ok(value) = std::env::var("TOPO_GRAPH_BACKEND_URL") {
        config.graph_backend_url = Some(value);
    }
    Ok(())
}

fn parse_probes<'a>(names: impl Iterator<Item = &'a str>) -> Result<Vec<ProbeKind>, ConfigError> {
    names
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| ProbeKind::parse(name).ok_or_else(|| ConfigError::Malformed(format!("unknown probe: {name:?}"))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_only_the_netlink_probe() {
        let config = Config::default();
        assert_eq!(config.probes, vec![ProbeKind::Netlink]);
        assert_eq!(config.listen, DEFAULT_LISTEN_PORT);
    }

    #[test]
    fn file_config_overrides_listen_port_and_probe_set() {
        let mut config = Config::default();
        let file: FileConfig = facet_json::from_str(
            r#"{"agent": {"listen": 9000, "topology": {"probes": ["netlink", "ovsdb"]}}}"#,
        )
        .unwrap();
        apply_file_config(&mut config, file).unwrap();
        assert_eq!(config.listen, 9000);
        assert_eq!(config.probes, vec![ProbeKind::Netlink, ProbeKind::Ovsdb]);
    }

    #[test]
    fn unknown_probe_name_is_malformed_configuration() {
        let mut config = Config::default();
        let file: FileConfig = facet_json::from_str(r#"{"agent": {"topology": {"probes": ["bogus"]}}}"#).unwrap();
        assert!(apply_file_config(&mut config, file).is_err());
    }
}
