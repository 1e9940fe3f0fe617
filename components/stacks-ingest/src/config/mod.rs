use std::fmt::Display;
use std::str::FromStr;

use crate::try_info;
use crate::utils::Context;

/// How the process participates in the cluster. Only `default` and
/// `writeonly` run the event ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMode {
    Default,
    ReadOnly,
    WriteOnly,
    Offline,
}

impl ApiMode {
    pub fn ingests_events(&self) -> bool {
        matches!(self, ApiMode::Default | ApiMode::WriteOnly)
    }
}

impl FromStr for ApiMode {
    type Err = String;

    fn from_str(value: &str) -> Result<ApiMode, String> {
        match value {
            "default" => Ok(ApiMode::Default),
            "readonly" => Ok(ApiMode::ReadOnly),
            "writeonly" => Ok(ApiMode::WriteOnly),
            "offline" => Ok(ApiMode::Offline),
            _ => Err(format!("unsupported api mode {}", value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
    ChainIdMismatch { configured: u32, reported: u32 },
    NodeUnreachable(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::Missing(variable) => {
                write!(f, "required environment variable {} is not set", variable)
            }
            ConfigError::Invalid(variable, detail) => {
                write!(f, "invalid value for {}: {}", variable, detail)
            }
            ConfigError::ChainIdMismatch {
                configured,
                reported,
            } => write!(
                f,
                "chain id mismatch: configured 0x{:08x}, node reports 0x{:08x}",
                configured, reported
            ),
            ConfigError::NodeUnreachable(detail) => {
                write!(f, "unable to query node info: {}", detail)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub event_host: String,
    pub event_port: u16,
    pub chain_id: u32,
    pub mode: ApiMode,
    pub node_rpc_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_vars(|variable| std::env::var(variable).ok())
    }

    /// Build from a variable lookup. Split out from [Config::from_env] so
    /// the parsing rules can be exercised without touching process state.
    pub fn from_vars<F>(get: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_host = get("STACKS_CORE_EVENT_HOST")
            .ok_or(ConfigError::Missing("STACKS_CORE_EVENT_HOST"))?;
        let event_host = raw_host
            .strip_prefix("http://")
            .or_else(|| raw_host.strip_prefix("http:"))
            .unwrap_or(&raw_host)
            .trim_matches('/')
            .to_string();

        let event_port = get("STACKS_CORE_EVENT_PORT")
            .ok_or(ConfigError::Missing("STACKS_CORE_EVENT_PORT"))?
            .parse::<u16>()
            .map_err(|e| ConfigError::Invalid("STACKS_CORE_EVENT_PORT", e.to_string()))?;

        let raw_chain_id =
            get("STACKS_CHAIN_ID").ok_or(ConfigError::Missing("STACKS_CHAIN_ID"))?;
        let chain_id = u32::from_str_radix(
            raw_chain_id.strip_prefix("0x").unwrap_or(&raw_chain_id),
            16,
        )
        .map_err(|e| ConfigError::Invalid("STACKS_CHAIN_ID", e.to_string()))?;

        let mode = match get("STACKS_API_MODE") {
            Some(value) => value
                .parse::<ApiMode>()
                .map_err(|e| ConfigError::Invalid("STACKS_API_MODE", e))?,
            None => {
                // Legacy switches, kept for compatibility with older
                // deployments.
                if flag_enabled(get("STACKS_API_OFFLINE_MODE")) {
                    ApiMode::Offline
                } else if flag_enabled(get("STACKS_READ_ONLY_MODE")) {
                    ApiMode::ReadOnly
                } else {
                    ApiMode::Default
                }
            }
        };

        let node_rpc_url = match (get("STACKS_CORE_RPC_HOST"), get("STACKS_CORE_RPC_PORT")) {
            (Some(host), Some(port)) => {
                let host = host
                    .strip_prefix("http://")
                    .unwrap_or(&host)
                    .trim_matches('/')
                    .to_string();
                Some(format!("http://{}:{}", host, port))
            }
            _ => None,
        };

        Ok(Config {
            event_host,
            event_port,
            chain_id,
            mode,
            node_rpc_url,
        })
    }

    pub fn devnet_default() -> Config {
        Config {
            event_host: "127.0.0.1".to_string(),
            event_port: crate::observer::DEFAULT_EVENT_PORT,
            chain_id: 0x80000000,
            mode: ApiMode::Default,
            node_rpc_url: None,
        }
    }
}

fn flag_enabled(value: Option<String>) -> bool {
    matches!(value.as_deref(), Some("1") | Some("true"))
}

#[derive(Debug, Deserialize)]
pub struct NodeInfo {
    pub network_id: u32,
}

/// Compare the configured chain id against the one the node reports on
/// `/v2/info`. A mismatch means this process is pointed at the wrong
/// network and must not ingest anything.
pub fn check_chain_id(config: &Config, ctx: &Context) -> Result<(), ConfigError> {
    let node_rpc_url = match &config.node_rpc_url {
        Some(url) => url,
        None => return Ok(()),
    };
    let request_url = format!("{}/v2/info", node_rpc_url);
    let info = reqwest::blocking::get(&request_url)
        .map_err(|e| ConfigError::NodeUnreachable(e.to_string()))?
        .json::<NodeInfo>()
        .map_err(|e| ConfigError::NodeUnreachable(e.to_string()))?;
    if info.network_id != config.chain_id {
        return Err(ConfigError::ChainIdMismatch {
            configured: config.chain_id,
            reported: info.network_id,
        });
    }
    try_info!(ctx, "Node chain id 0x{:08x} verified", info.network_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> + '_ {
        let map: HashMap<&'static str, &'static str> = vars.iter().copied().collect();
        move |variable| map.get(variable).map(|value| value.to_string())
    }

    #[test]
    fn parses_a_minimal_environment() {
        let config = Config::from_vars(lookup(&[
            ("STACKS_CORE_EVENT_HOST", "http://0.0.0.0"),
            ("STACKS_CORE_EVENT_PORT", "3700"),
            ("STACKS_CHAIN_ID", "0x80000000"),
        ]))
        .unwrap();
        assert_eq!(config.event_host, "0.0.0.0");
        assert_eq!(config.event_port, 3700);
        assert_eq!(config.chain_id, 0x80000000);
        assert_eq!(config.mode, ApiMode::Default);
        assert!(config.node_rpc_url.is_none());
    }

    #[test]
    fn missing_required_variables_fail() {
        let result = Config::from_vars(lookup(&[("STACKS_CORE_EVENT_PORT", "3700")]));
        assert_eq!(result.err(), Some(ConfigError::Missing("STACKS_CORE_EVENT_HOST")));
    }

    #[test]
    fn bad_port_and_chain_id_are_rejected() {
        let result = Config::from_vars(lookup(&[
            ("STACKS_CORE_EVENT_HOST", "0.0.0.0"),
            ("STACKS_CORE_EVENT_PORT", "not-a-port"),
            ("STACKS_CHAIN_ID", "0x1"),
        ]));
        assert!(matches!(
            result.err(),
            Some(ConfigError::Invalid("STACKS_CORE_EVENT_PORT", _))
        ));

        let result = Config::from_vars(lookup(&[
            ("STACKS_CORE_EVENT_HOST", "0.0.0.0"),
            ("STACKS_CORE_EVENT_PORT", "3700"),
            ("STACKS_CHAIN_ID", "mainnet"),
        ]));
        assert!(matches!(
            result.err(),
            Some(ConfigError::Invalid("STACKS_CHAIN_ID", _))
        ));
    }

    #[test]
    fn api_mode_parsing_and_legacy_flags() {
        let base = [
            ("STACKS_CORE_EVENT_HOST", "0.0.0.0"),
            ("STACKS_CORE_EVENT_PORT", "3700"),
            ("STACKS_CHAIN_ID", "0x00000001"),
        ];

        let mut vars = base.to_vec();
        vars.push(("STACKS_API_MODE", "writeonly"));
        let config = Config::from_vars(lookup(&vars)).unwrap();
        assert_eq!(config.mode, ApiMode::WriteOnly);
        assert!(config.mode.ingests_events());

        let mut vars = base.to_vec();
        vars.push(("STACKS_READ_ONLY_MODE", "1"));
        let config = Config::from_vars(lookup(&vars)).unwrap();
        assert_eq!(config.mode, ApiMode::ReadOnly);
        assert!(!config.mode.ingests_events());

        let mut vars = base.to_vec();
        vars.push(("STACKS_API_OFFLINE_MODE", "true"));
        let config = Config::from_vars(lookup(&vars)).unwrap();
        assert_eq!(config.mode, ApiMode::Offline);

        // The explicit mode wins over legacy switches.
        let mut vars = base.to_vec();
        vars.push(("STACKS_API_MODE", "default"));
        vars.push(("STACKS_READ_ONLY_MODE", "1"));
        let config = Config::from_vars(lookup(&vars)).unwrap();
        assert_eq!(config.mode, ApiMode::Default);

        let mut vars = base.to_vec();
        vars.push(("STACKS_API_MODE", "turbo"));
        assert!(Config::from_vars(lookup(&vars)).is_err());
    }

    #[test]
    fn devnet_default_ingests_on_the_default_port() {
        let config = Config::devnet_default();
        assert_eq!(config.event_port, crate::observer::DEFAULT_EVENT_PORT);
        assert!(config.mode.ingests_events());
    }

    #[test]
    fn node_rpc_url_requires_both_host_and_port() {
        let mut vars = vec![
            ("STACKS_CORE_EVENT_HOST", "0.0.0.0"),
            ("STACKS_CORE_EVENT_PORT", "3700"),
            ("STACKS_CHAIN_ID", "0x00000001"),
            ("STACKS_CORE_RPC_HOST", "http://127.0.0.1"),
        ];
        let config = Config::from_vars(lookup(&vars)).unwrap();
        assert!(config.node_rpc_url.is_none());

        vars.push(("STACKS_CORE_RPC_PORT", "20443"));
        let config = Config::from_vars(lookup(&vars)).unwrap();
        assert_eq!(
            config.node_rpc_url.as_deref(),
            Some("http://127.0.0.1:20443")
        );
    }
}
