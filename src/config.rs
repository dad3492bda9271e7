//! Configuration: CLI flags (clap, individually env-overridable) for process-level settings,
//! plus an optional YAML file for cache policy, upstream timing, and network topology — the
//! part of the config shape that doesn't fit cleanly as flat flags. Scalar YAML values can in
//! turn be overridden by a handful of dedicated environment variables, so the precedence is
//! CLI flag > environment variable > YAML file > built-in default.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::network::{NetworkSpec, UpstreamSpec};

#[derive(Parser, Debug, Clone)]
#[command(name = "rpcproxy", about = "Caching, failover-aware JSON-RPC reverse proxy for EVM nodes")]
pub struct Cli {
    /// Path to the YAML config file. Optional — if absent, CLI/env/defaults apply.
    #[arg(long, env = "RPCPROXY_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Port to listen on.
    #[arg(long, env = "RPCPROXY_PORT", default_value = "9000")]
    pub port: u16,

    /// Health check interval in seconds.
    #[arg(long, env = "RPCPROXY_HEALTH_INTERVAL", default_value = "1800")]
    pub health_interval: u64,

    /// Bearer token for authenticating RPC requests. If set, all RPC requests must be sent to
    /// `POST /<token>` (or `POST /<token>/<network>`); `/readiness`, `/status`, `/stats`,
    /// `/cache/*` require `Authorization: Bearer <token>`. `/health` and `/metrics` stay open.
    #[arg(long, env = "RPCPROXY_TOKEN")]
    pub token: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, env = "RPCPROXY_VERBOSE", default_value = "false")]
    pub verbose: bool,

    /// Comma-separated upstream URLs used when the YAML file defines no networks (primary,
    /// then optional fallback) — registered under the network key "default".
    #[arg(
        long,
        env = "RPCPROXY_TARGETS",
        default_value = "http://localhost:8545",
        value_delimiter = ','
    )]
    pub targets: Vec<String>,

    /// Run a one-shot HTTP health check against a locally running instance and exit — used for
    /// `Docker HEALTHCHECK` without pulling in curl.
    #[arg(long)]
    pub health_check: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    cache: FileCacheConfig,
    #[serde(default)]
    rpc: FileRpcConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileCacheConfig {
    /// Seconds; `0` means infinite retention (sweep skipped, see §9 of the cache design notes).
    #[serde(default = "default_max_age")]
    max_age: u64,
    #[serde(default = "default_max_size")]
    max_size: usize,
    #[serde(default)]
    enable_db: bool,
    #[serde(default = "default_db_file")]
    db_file: PathBuf,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            max_age: default_max_age(),
            max_size: default_max_size(),
            enable_db: false,
            db_file: default_db_file(),
        }
    }
}

fn default_max_age() -> u64 {
    0
}
fn default_max_size() -> usize {
    10_000
}
fn default_db_file() -> PathBuf {
    PathBuf::from("./data/cache.sqlite3")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRpcConfig {
    #[serde(default = "default_timeout_ms")]
    timeout: u64,
    #[serde(default = "default_retries")]
    retries: u32,
    #[serde(default = "default_initial_timeout_ms")]
    initial_timeout_ms: u64,
    #[serde(default)]
    networks: HashMap<String, FileNetworkConfig>,
}

impl Default for FileRpcConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout_ms(),
            retries: default_retries(),
            initial_timeout_ms: default_initial_timeout_ms(),
            networks: HashMap::new(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}
fn default_retries() -> u32 {
    2
}
fn default_initial_timeout_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Deserialize)]
struct FileNetworkConfig {
    primary: FileUpstreamConfig,
    fallback: Option<FileUpstreamConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct FileUpstreamConfig {
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
}

/// Fully resolved configuration the rest of the process consumes. Unlike [`Cli`], this has no
/// notion of "file" vs "env" vs "flag" — by the time one of these exists, precedence has already
/// been applied.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub health_interval: u64,
    pub token: Option<String>,
    pub verbose: bool,
    pub health_check: bool,

    /// `None` means infinite retention — the hourly sweep is skipped entirely.
    pub cache_max_age: Option<Duration>,
    pub cache_max_size: usize,
    pub cache_enable_db: bool,
    pub cache_db_file: PathBuf,

    pub rpc_timeout: Duration,
    pub rpc_retries: u32,
    pub rpc_initial_backoff: Duration,

    pub networks: Vec<NetworkSpec>,
}

impl Config {
    /// Parses CLI flags, loads the optional YAML file, applies the env-variable overlay to its
    /// scalar fields, and builds the final [`NetworkSpec`] list. Returns an error on a missing
    /// mandatory setting (an empty network list) — the caller should exit with status `1`.
    pub fn load() -> Result<Self, String> {
        let cli = Cli::parse();
        Self::from_cli(cli)
    }

    fn from_cli(cli: Cli) -> Result<Self, String> {
        let file = read_file_config(&cli.config);
        let cache = apply_cache_env_overlay(file.cache);
        let rpc = apply_rpc_env_overlay(file.rpc);

        let networks = if rpc.networks.is_empty() {
            vec![default_network_from_targets(&cli.targets, &rpc)?]
        } else {
            build_networks(&rpc)
        };

        if networks.is_empty() {
            return Err("no upstream networks configured".to_string());
        }

        Ok(Config {
            port: cli.port,
            health_interval: cli.health_interval,
            token: cli.token.filter(|t| !t.is_empty()),
            verbose: cli.verbose,
            health_check: cli.health_check,
            cache_max_age: if cache.max_age == 0 { None } else { Some(Duration::from_secs(cache.max_age)) },
            cache_max_size: cache.max_size,
            cache_enable_db: cache.enable_db,
            cache_db_file: cache.db_file,
            rpc_timeout: Duration::from_millis(rpc.timeout),
            rpc_retries: rpc.retries,
            rpc_initial_backoff: Duration::from_millis(rpc.initial_timeout_ms),
            networks,
        })
    }
}

fn read_file_config(path: &std::path::Path) -> FileConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse config file, using defaults");
            FileConfig::default()
        }),
        Err(_) => FileConfig::default(),
    }
}

fn apply_cache_env_overlay(mut cache: FileCacheConfig) -> FileCacheConfig {
    if let Some(v) = env_u64("RPCPROXY_CACHE_MAX_AGE") {
        cache.max_age = v;
    }
    if let Some(v) = env_u64("RPCPROXY_CACHE_MAX_SIZE") {
        cache.max_size = v as usize;
    }
    if let Ok(v) = std::env::var("RPCPROXY_CACHE_ENABLE_DB") {
        cache.enable_db = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
    }
    if let Ok(v) = std::env::var("RPCPROXY_CACHE_DB_FILE") {
        cache.db_file = PathBuf::from(v);
    }
    cache
}

fn apply_rpc_env_overlay(mut rpc: FileRpcConfig) -> FileRpcConfig {
    if let Some(v) = env_u64("RPCPROXY_RPC_TIMEOUT") {
        rpc.timeout = v;
    }
    if let Some(v) = env_u64("RPCPROXY_RPC_RETRIES") {
        rpc.retries = v as u32;
    }
    if let Some(v) = env_u64("RPCPROXY_RPC_INITIAL_TIMEOUT_MS") {
        rpc.initial_timeout_ms = v;
    }
    rpc
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn build_networks(rpc: &FileRpcConfig) -> Vec<NetworkSpec> {
    let mut keys: Vec<&String> = rpc.networks.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| {
            let net = &rpc.networks[key];
            let primary = UpstreamSpec { url: net.primary.url.clone(), headers: net.primary.headers.clone() };
            let mut spec = NetworkSpec::new(key.clone(), primary)
                .with_request_timeout(Duration::from_millis(rpc.timeout))
                .with_max_fallback_retries(rpc.retries)
                .with_initial_backoff(Duration::from_millis(rpc.initial_timeout_ms));
            if let Some(fallback) = &net.fallback {
                spec = spec.with_fallback(UpstreamSpec { url: fallback.url.clone(), headers: fallback.headers.clone() });
            }
            spec
        })
        .collect()
}

fn default_network_from_targets(targets: &[String], rpc: &FileRpcConfig) -> Result<NetworkSpec, String> {
    let mut iter = targets.iter().filter(|t| !t.is_empty());
    let Some(primary_url) = iter.next() else {
        return Err("no upstream targets configured".to_string());
    };
    let mut spec = NetworkSpec::new("default", UpstreamSpec::new(primary_url.clone()))
        .with_request_timeout(Duration::from_millis(rpc.timeout))
        .with_max_fallback_retries(rpc.retries)
        .with_initial_backoff(Duration::from_millis(rpc.initial_timeout_ms));
    if let Some(fallback_url) = iter.next() {
        spec = spec.with_fallback(UpstreamSpec::new(fallback_url.clone()));
    }
    Ok(spec)
}
