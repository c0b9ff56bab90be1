//! Configuration Module for the PRE benchmark harness
//!
//! This module defines the protocol constants, the benchmark parameters set on
//! the command line, and the deployment endpoints loaded from the environment
//! (preferring environment variables, falling back to the local defaults).

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

// --- Protocol constants ---

/// Logical data identifier every entity encrypts and shares.
pub const DATA_ID: &str = "dataIdX";

/// Plaintext encrypted under each entity's key during provisioning.
pub const PLAINTEXT: &str = "0123456789";

/// Challenge the aggregator signs before retrieving re-encryption fragments.
pub const SIGNATURE_CHALLENGE: &str = "sign this pls";

/// Reasons attached to the aggregator's batched access request.
pub const ACCESS_REASONS: &str = "some reasons";

/// Serialized size of one key fragment.
pub const KFRAG_SIZE: usize = 259;

/// Voting period inputs of the aggregator contract.
pub const MILLIS_TO_WAIT: u64 = 9000;
pub const DEBATING_PERIOD_MUL: u64 = 2;

/// Parameters passed to `requestAccessToData`: release period in seconds,
/// followed by the DAO voting parameters.
pub fn access_parameters() -> Vec<u64> {
    let release_date_period = MILLIS_TO_WAIT * DEBATING_PERIOD_MUL * DEBATING_PERIOD_MUL / 1000;
    vec![release_date_period, 1, 1, 1, 1, 1000, 1]
}

// --- Key refresh ceremony defaults ---

pub const REFRESH_DH_POINT_HEX: &str = "03f85c10917d7761b9f75e93115a54018e09edcaa5856b6edd29b51e8eee6fe46b";
pub const REFRESH_PRECURSOR_HEX: &str = "0249842f8381001f70996b77584d82c67aa09518dce57f12ced2afd07585b6caba";
pub const REFRESH_DELEGATEE_KEY_HEX: &str = "02b1447d2c71a932e503ea4ece69e3a7f44cda85ff1d8c8ca07d84a591583d068b";

/// (participant id, secret share) pairs of the reference ceremony.
pub const REFRESH_PARTICIPANTS: [(&str, &str); 5] = [
    (
        "CFB8AA869E8941B58E680B88D9673EFBA345A38D37B00D6ADE35B00F67A08F80",
        "2caabb1aec356cacb326f4fb48f6b2d007816fce043716f988bd73a8f6d9f574",
    ),
    (
        "5959A6AE444C989EBD096EFDC46C8BFEBEA0D031D472008FFBB6F2347FC82CC0",
        "8f5f9823a27148126b68bb2c86026b25f8a1eaed2948f8b178933a4d82f4648e",
    ),
    (
        "93BEFAC409E4A863A0F26ADC6508C75A7D5FD7EBB479400206E8BBF5B0539EB7",
        "25b6846951b3a35ff80a1d48eb8036c85f633c2c97c94b1f82b51721ab9e9974",
    ),
    (
        "615FEB0C83CF9FA3B84AEFA1A29B9E380AA8BD64BC8F4A581E0B91B247CCF5E3",
        "4ebf71847ce8c780931aea85457c24937c0fca26ca67d72088a231f1f06f44cc",
    ),
    (
        "585B01A63A80C839EE73CA313E79C25710D78C9A11893C9BF4856EED02622637",
        "748dd85fed56444e856ad5d0775c7a21b78f9393c547e6d06de53e46c8040c27",
    ),
];

// --- Deployment defaults ---

pub const DEFAULT_NODE_HOST: &str = "http://127.0.0.1";
pub const DEFAULT_AUTH_BASE_PORT: u16 = 8021;
pub const DEFAULT_BROKER_BASE_PORT: u16 = 3161;
pub const DEFAULT_LEDGER_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
/// One ether.
pub const DEFAULT_FUNDING_WEI: u128 = 1_000_000_000_000_000_000;
pub const DEFAULT_MAX_KFRAG_ATTEMPTS: usize = 5;

/// Benchmark parameters, normally taken from the command line.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Number of simulated requesters.
    pub entity_count: usize,
    pub threshold: usize,
    pub node_count: usize,
    /// Number of test iterations, each with a fresh population.
    pub test_runs: usize,
    /// Cycles per test iteration.
    pub cycles: u32,
    /// Poisson rate parameter in milliseconds; cycle `c` waits with mean `lambda * c`.
    pub lambda_ms: f64,
    pub output_dir: PathBuf,
    pub key_refresh: bool,
    pub max_kfrag_attempts: usize,
    pub preflight: bool,
    /// Pause before provisioning each iteration.
    pub warmup: Duration,
    /// Pause between provisioning and the first cycle.
    pub settle: Duration,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            entity_count: 10,
            threshold: 2,
            node_count: 4,
            test_runs: 1,
            cycles: 20,
            lambda_ms: 1500.0,
            output_dir: PathBuf::from("outputDataset"),
            key_refresh: true,
            max_kfrag_attempts: DEFAULT_MAX_KFRAG_ATTEMPTS,
            preflight: false,
            warmup: Duration::from_millis(2000),
            settle: Duration::from_millis(5000),
        }
    }
}

impl BenchmarkConfig {
    pub fn validate(&self) -> HarnessResult<()> {
        if self.entity_count == 0 {
            return Err(HarnessError::Config("population must contain at least one entity".into()));
        }
        if self.node_count == 0 {
            return Err(HarnessError::Config("node count must be at least 1".into()));
        }
        if self.threshold == 0 || self.threshold > self.node_count {
            return Err(HarnessError::Config(format!(
                "threshold {} must be between 1 and the node count {}",
                self.threshold, self.node_count
            )));
        }
        if !(self.lambda_ms >= 0.0) || !self.lambda_ms.is_finite() {
            return Err(HarnessError::Config(format!("lambda must be a non-negative number, got {}", self.lambda_ms)));
        }
        if self.max_kfrag_attempts == 0 {
            return Err(HarnessError::Config("at least one key fragment attempt is required".into()));
        }
        Ok(())
    }
}

/// Auth and Broker endpoints of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    pub auth_url: String,
    pub broker_url: String,
}

impl FromStr for NodeEndpoint {
    type Err = anyhow::Error;

    /// Parses `auth_url|broker_url`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('|').map(str::trim);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(auth), Some(broker), None) if !auth.is_empty() && !broker.is_empty() => Ok(NodeEndpoint {
                auth_url: auth.to_string(),
                broker_url: broker.to_string(),
            }),
            _ => Err(anyhow!("Invalid node endpoint '{}', expected 'auth_url|broker_url'", s)),
        }
    }
}

/// Deployment endpoints, loaded from the environment.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub nodes: Vec<NodeEndpoint>,
    /// Auth endpoint used while provisioning identities.
    pub coordinator_auth_url: String,
    pub ledger_url: String,
    /// Per-call timeout applied to every collaborator request.
    pub request_timeout: Duration,
    pub funding_wei: u128,
}

impl EnvironmentConfig {
    /// Loads the endpoints of `node_count` nodes.
    ///
    /// `PRE_NODES` takes precedence; otherwise nodes are laid out on
    /// consecutive ports of `PRE_NODE_HOST`, starting at `PRE_AUTH_BASE_PORT`
    /// and `PRE_BROKER_BASE_PORT`.
    pub fn load(node_count: usize) -> Result<Self> {
        let nodes = match std::env::var("PRE_NODES") {
            Ok(list) => {
                info!("Loading node endpoints from PRE_NODES env var.");
                let parsed = list
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(NodeEndpoint::from_str)
                    .collect::<Result<Vec<_>>>()?;
                if parsed.len() < node_count {
                    return Err(anyhow!(
                        "PRE_NODES lists {} endpoints but {} nodes were requested",
                        parsed.len(),
                        node_count
                    ));
                }
                parsed.into_iter().take(node_count).collect()
            }
            Err(_) => {
                let host: String = env_or("PRE_NODE_HOST", DEFAULT_NODE_HOST.to_string())?;
                let auth_port: u16 = env_or("PRE_AUTH_BASE_PORT", DEFAULT_AUTH_BASE_PORT)?;
                let broker_port: u16 = env_or("PRE_BROKER_BASE_PORT", DEFAULT_BROKER_BASE_PORT)?;
                local_layout(&host, auth_port, broker_port, node_count)?
            }
        };

        let coordinator_auth_url = match std::env::var("PRE_COORDINATOR_AUTH_URL") {
            Ok(url) => url,
            Err(_) => nodes
                .first()
                .map(|n| n.auth_url.clone())
                .ok_or_else(|| anyhow!("No node endpoints configured"))?,
        };

        let timeout_ms: u64 = env_or("PRE_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?;

        Ok(Self {
            nodes,
            coordinator_auth_url,
            ledger_url: env_or("PRE_LEDGER_URL", DEFAULT_LEDGER_URL.to_string())?,
            request_timeout: Duration::from_millis(timeout_ms),
            funding_wei: env_or("PRE_FUNDING_WEI", DEFAULT_FUNDING_WEI)?,
        })
    }
}

/// Nodes on consecutive ports of one host, the layout of a local deployment.
pub fn local_layout(host: &str, auth_base_port: u16, broker_base_port: u16, node_count: usize) -> Result<Vec<NodeEndpoint>> {
    (0..node_count)
        .map(|n| {
            let offset = u16::try_from(n).context("node index does not fit a port offset")?;
            let auth_port = auth_base_port
                .checked_add(offset)
                .ok_or_else(|| anyhow!("Auth port overflow for node {}", n))?;
            let broker_port = broker_base_port
                .checked_add(offset)
                .ok_or_else(|| anyhow!("Broker port overflow for node {}", n))?;
            Ok(NodeEndpoint {
                auth_url: format!("{}:{}", host, auth_port),
                broker_url: format!("{}:{}", host, broker_port),
            })
        })
        .collect()
}

/// Reads `key` from the environment, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => {
            debug!("Using {} from environment.", key);
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("Failed to parse {}='{}': {}", key, raw, e))
        }
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_parameters_match_voting_period() {
        assert_eq!(access_parameters(), vec![36, 1, 1, 1, 1, 1000, 1]);
    }

    #[test]
    fn local_layout_uses_consecutive_ports() {
        let nodes = local_layout("http://127.0.0.1", 8021, 3161, 4).unwrap();
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].auth_url, "http://127.0.0.1:8021");
        assert_eq!(nodes[3].auth_url, "http://127.0.0.1:8024");
        assert_eq!(nodes[3].broker_url, "http://127.0.0.1:3164");
    }

    #[test]
    fn node_endpoint_parsing() {
        let node: NodeEndpoint = "http://a:1 | http://b:2".parse().unwrap();
        assert_eq!(node.auth_url, "http://a:1");
        assert_eq!(node.broker_url, "http://b:2");
        assert!("http://a:1".parse::<NodeEndpoint>().is_err());
        assert!("a|b|c".parse::<NodeEndpoint>().is_err());
    }

    #[test]
    fn validation_rejects_oversized_threshold() {
        let mut config = BenchmarkConfig::default();
        assert!(config.validate().is_ok());
        config.threshold = config.node_count + 1;
        assert!(config.validate().is_err());
        config.threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn refresh_defaults_decode() {
        for (_, sk) in REFRESH_PARTICIPANTS.iter() {
            assert_eq!(hex::decode(sk).unwrap().len(), 32);
        }
        assert_eq!(hex::decode(REFRESH_DH_POINT_HEX).unwrap().len(), 33);
    }
}
