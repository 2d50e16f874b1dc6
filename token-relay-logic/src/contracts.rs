use crate::abi::IERC20;
use alloy::{
    network::{Ethereum, TransactionBuilder},
    primitives::{Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    sol_types::SolCall,
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use moka::future::Cache;
use std::{sync::Arc, time::Duration};
use token_relay_entity::blockchain_contracts;

const PREFERRED_ENDPOINT_MARKER: &str = "alchemy";
pub const GOLD_CONTRACT_CODE: &str = "GOLD_CONTRACT";

/// A contract row as seen by scanners and handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedContract {
    pub id: i32,
    pub code: String,
    pub mode: String,
    pub address: Address,
    pub providers: Vec<String>,
    pub next_block: u64,
    pub enabled: bool,
    pub token_type: Option<String>,
    pub abi: Option<serde_json::Value>,
}

impl TrackedContract {
    pub fn is_erc721(&self) -> bool {
        self.token_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("ERC721"))
    }
}

impl TryFrom<blockchain_contracts::Model> for TrackedContract {
    type Error = anyhow::Error;

    fn try_from(model: blockchain_contracts::Model) -> Result<Self> {
        let address = Address::try_from(model.address.as_slice())
            .map_err(|_| anyhow!("contract {} has invalid address", model.code))?;
        Ok(Self {
            id: model.id,
            providers: parse_providers(&model.providers),
            next_block: model.next_block.max(0) as u64,
            enabled: model.run_listener,
            token_type: model.token_type,
            abi: model.abi,
            code: model.code,
            mode: model.mode,
            address,
        })
    }
}

/// Splits the `|`-joined endpoint column into an ordered list.
pub fn parse_providers(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Endpoint used for one-shot calls (handlers, balance lookups).
pub fn preferred_endpoint(endpoints: &[String]) -> Option<&str> {
    endpoints
        .iter()
        .find(|e| e.contains(PREFERRED_ENDPOINT_MARKER))
        .or_else(|| endpoints.first())
        .map(String::as_str)
}

#[async_trait]
pub trait ContractSource: Send + Sync {
    async fn find_contract(&self, code: &str, mode: &str) -> Result<Option<TrackedContract>>;
}

pub struct ResolvedContract {
    pub contract: TrackedContract,
    pub provider: DynProvider<Ethereum>,
}

impl ResolvedContract {
    pub fn address(&self) -> Address {
        self.contract.address
    }
}

/// Resolves contract codes of one mode into addresses and ready providers.
#[derive(Clone)]
pub struct ContractDirectory {
    source: Arc<dyn ContractSource>,
    mode: String,
    cache: Cache<String, Arc<ResolvedContract>>,
    provider_override: Option<DynProvider<Ethereum>>,
}

impl ContractDirectory {
    pub fn new(source: Arc<dyn ContractSource>, mode: impl Into<String>, ttl: Duration) -> Self {
        Self {
            source,
            mode: mode.into(),
            cache: Cache::builder().time_to_live(ttl).max_capacity(1_000).build(),
            provider_override: None,
        }
    }

    /// Use one provider for every resolved contract instead of the stored endpoints.
    pub fn with_provider(mut self, provider: DynProvider<Ethereum>) -> Self {
        self.provider_override = Some(provider);
        self
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub async fn resolve(&self, code: &str) -> Result<Arc<ResolvedContract>> {
        let this = self.clone();
        let key = code.to_string();
        self.cache
            .try_get_with(key.clone(), async move {
                let contract = this
                    .source
                    .find_contract(&key, &this.mode)
                    .await
                    .with_context(|| format!("failed to load contract {key}"))?
                    .ok_or_else(|| anyhow!("contract {key} is not configured for mode {}", this.mode))?;
                let provider = match &this.provider_override {
                    Some(provider) => provider.clone(),
                    None => {
                        let endpoint = preferred_endpoint(&contract.providers)
                            .ok_or_else(|| anyhow!("contract {key} has no provider endpoints"))?;
                        ProviderBuilder::new()
                            .connect_http(endpoint.parse().context("invalid provider url")?)
                            .erased()
                    }
                };
                Ok::<_, anyhow::Error>(Arc::new(ResolvedContract { contract, provider }))
            })
            .await
            .map_err(|err| anyhow!(err.to_string()))
    }

    /// ERC-20 `balanceOf` against the contract registered under `code`.
    pub async fn token_balance(&self, code: &str, account: Address) -> Result<U256> {
        let token = self.resolve(code).await?;
        let request = TransactionRequest::default()
            .with_to(token.address())
            .with_input(IERC20::balanceOfCall { account }.abi_encode());
        let output = token
            .provider
            .call(request)
            .await
            .with_context(|| format!("balanceOf call to {code} failed"))?;
        Ok(IERC20::balanceOfCall::abi_decode_returns(&output)?)
    }
}
