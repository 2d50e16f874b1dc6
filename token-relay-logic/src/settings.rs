use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerSettings {
    /// Whether this instance is the designated scanner for its mode.
    pub enabled: bool,
    pub blocks_per_query: u64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub query_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub idle_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub head_wait_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reconnect_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub dispatch_error_cooldown: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub rotate_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub exhausted_retry_delay: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub head_refresh_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub contracts_refresh_interval: Duration,
    /// Per-endpoint request budget.
    pub max_rps: u32,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            blocks_per_query: 500,
            query_delay: Duration::from_millis(5000),
            idle_interval: Duration::from_millis(2000),
            head_wait_interval: Duration::from_millis(500),
            reconnect_delay: Duration::from_millis(5000),
            dispatch_error_cooldown: Duration::from_millis(10000),
            rotate_delay: Duration::from_millis(1000),
            exhausted_retry_delay: Duration::from_millis(10000),
            head_refresh_interval: Duration::from_millis(10000),
            contracts_refresh_interval: Duration::from_millis(5000),
            max_rps: 10,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RelaySettings {
    /// Base url of the meta-transaction relayer.
    pub url: String,
    /// Rpc endpoint used for nonce lookups and revert re-simulation.
    pub rpc_url: String,
    pub wallet: Address,
    pub signer_private_key: String,
    #[serde(default = "default_wait_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub wait_timeout: Duration,
    #[serde(default = "default_wait_poll_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub wait_poll_interval: Duration,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

fn default_wait_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_wait_poll_interval() -> Duration {
    Duration::from_millis(2000)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSettings {
    pub enabled: bool,
    pub max_batch: u64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub visibility_timeout: Duration,
    pub workers: usize,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub contract_cache_ttl: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_batch: 10,
            poll_interval: Duration::from_millis(1000),
            visibility_timeout: Duration::from_secs(30),
            workers: 1,
            contract_cache_ttl: Duration::from_secs(30),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct NotifierSettings {
    pub enabled: bool,
    pub url: Option<String>,
    pub channel_prefix: String,
    pub retry_count: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub retry_delay: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            channel_prefix: "token-relay".to_string(),
            retry_count: 5,
            retry_delay: Duration::from_millis(5000),
            request_timeout: default_request_timeout(),
        }
    }
}
