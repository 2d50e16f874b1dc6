use crate::metrics;
use alloy::{
    network::Ethereum,
    providers::{DynProvider, Provider, ProviderBuilder},
};
use anyhow::{Context, Result, anyhow};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::{
    num::NonZeroU32,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};
use tokio::time::sleep;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Key shared by every contract that lists the same endpoints in the same order.
pub fn group_key(endpoints: &[String]) -> String {
    hex::encode(Sha256::digest(endpoints.concat().as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadRefresh {
    Updated(u64),
    /// The current provider failed and the group moved to the next one.
    Rotated,
    /// Every provider failed since the last success.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Rotated(usize),
    Exhausted,
}

/// Ordered endpoints shared by scanners, with one "current" provider and a
/// cached chain head.
pub struct ProviderGroup {
    key: String,
    endpoints: Vec<String>,
    providers: Vec<DynProvider<Ethereum>>,
    limiters: Vec<Limiter>,
    current: RwLock<usize>,
    head: RwLock<Option<u64>>,
    /// Providers left to try before the head refresh reports exhaustion.
    remaining: AtomicU32,
    refresh_started: AtomicBool,
}

impl ProviderGroup {
    pub fn new(endpoints: Vec<String>, max_rps: u32) -> Result<Self> {
        let providers = endpoints
            .iter()
            .map(|endpoint| -> Result<DynProvider<Ethereum>> {
                let url = endpoint
                    .parse()
                    .with_context(|| format!("invalid provider url: {endpoint}"))?;
                Ok(ProviderBuilder::new().connect_http(url).erased())
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_parts(endpoints, providers, max_rps)
    }

    /// Builds a group from pre-created providers; tests pass `mock::Asserter` backed ones.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn with_providers(
        endpoints: Vec<String>,
        providers: Vec<DynProvider<Ethereum>>,
    ) -> Result<Self> {
        Self::from_parts(endpoints, providers, u32::MAX)
    }

    fn from_parts(
        endpoints: Vec<String>,
        providers: Vec<DynProvider<Ethereum>>,
        max_rps: u32,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(anyhow!("provider group needs at least one endpoint"));
        }
        if endpoints.len() != providers.len() {
            return Err(anyhow!(
                "mismatch: {} endpoints but {} providers",
                endpoints.len(),
                providers.len()
            ));
        }
        let quota = Quota::per_second(NonZeroU32::new(max_rps.max(1)).unwrap_or(NonZeroU32::MIN));
        let limiters = endpoints.iter().map(|_| RateLimiter::direct(quota)).collect();
        Ok(Self {
            key: group_key(&endpoints),
            remaining: AtomicU32::new(endpoints.len() as u32),
            endpoints,
            providers,
            limiters,
            current: RwLock::new(0),
            head: RwLock::new(None),
            refresh_started: AtomicBool::new(false),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn current_index(&self) -> usize {
        *self.current.read()
    }

    pub fn current_endpoint(&self) -> &str {
        &self.endpoints[self.current_index()]
    }

    /// Current provider once its request budget allows another call.
    pub async fn current_provider(&self) -> DynProvider<Ethereum> {
        let idx = self.current_index();
        self.limiters[idx].until_ready().await;
        self.providers[idx].clone()
    }

    pub fn head(&self) -> Option<u64> {
        *self.head.read()
    }

    /// Records a head observation. The stored head never decreases.
    pub fn observe_head(&self, block: u64) -> u64 {
        let mut head = self.head.write();
        let value = head.map_or(block, |h| h.max(block));
        *head = Some(value);
        value
    }

    /// Advances the shared index. Every member scanner picks up the new
    /// provider on its next request.
    pub fn rotate(&self) -> usize {
        let mut current = self.current.write();
        *current = (*current + 1) % self.endpoints.len();
        metrics::PROVIDER_ROTATIONS
            .with_label_values(&[self.key.as_str()])
            .inc();
        tracing::warn!(
            group = %self.key,
            endpoint = %self.endpoints[*current],
            "switched to next provider"
        );
        *current
    }

    /// Rotates unless the caller's own budget of providers is spent. An
    /// exhausted budget is refilled so the next failure cycle starts over.
    pub fn try_rotate(&self, remaining: &mut u32) -> Rotation {
        if *remaining == 0 {
            *remaining = self.len() as u32;
            return Rotation::Exhausted;
        }
        *remaining -= 1;
        Rotation::Rotated(self.rotate())
    }

    pub async fn refresh_head_once(&self) -> HeadRefresh {
        let provider = self.current_provider().await;
        match provider.get_block_number().await {
            Ok(block) => {
                self.remaining.store(self.len() as u32, Ordering::Relaxed);
                HeadRefresh::Updated(self.observe_head(block))
            }
            Err(err) => {
                let mut remaining = self.remaining.load(Ordering::Relaxed);
                let outcome = self.try_rotate(&mut remaining);
                self.remaining.store(remaining, Ordering::Relaxed);
                match outcome {
                    Rotation::Rotated(_) => {
                        tracing::warn!(group = %self.key, err = ?err, "failed to get head block");
                        HeadRefresh::Rotated
                    }
                    Rotation::Exhausted => {
                        metrics::alert("providers_exhausted");
                        tracing::error!(
                            alert = "providers_exhausted",
                            group = %self.key,
                            err = ?err,
                            "failed to get the head block from any provider"
                        );
                        HeadRefresh::Exhausted
                    }
                }
            }
        }
    }

    /// Starts the group's head refresh task. Only the first call spawns it.
    pub fn spawn_head_refresh(self: &Arc<Self>, interval: Duration) -> bool {
        if self.refresh_started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let group = self.clone();
        tokio::spawn(async move {
            loop {
                match group.refresh_head_once().await {
                    HeadRefresh::Rotated => continue,
                    HeadRefresh::Updated(_) | HeadRefresh::Exhausted => sleep(interval).await,
                }
            }
        });
        true
    }
}

/// Groups shared by key. Owned by the process entry point.
#[derive(Default)]
pub struct ProviderGroupRegistry {
    groups: DashMap<String, Arc<ProviderGroup>>,
    max_rps: u32,
    head_refresh_interval: Duration,
}

impl ProviderGroupRegistry {
    pub fn new(max_rps: u32, head_refresh_interval: Duration) -> Self {
        Self {
            groups: DashMap::new(),
            max_rps,
            head_refresh_interval,
        }
    }

    /// Returns the group for these endpoints, creating it and its head
    /// refresh task on first use.
    pub fn get_or_create(&self, endpoints: &[String]) -> Result<Arc<ProviderGroup>> {
        let key = group_key(endpoints);
        if let Some(group) = self.groups.get(&key) {
            return Ok(group.clone());
        }
        let group = self
            .groups
            .entry(key)
            .or_try_insert_with(|| {
                ProviderGroup::new(endpoints.to_vec(), self.max_rps).map(Arc::new)
            })?
            .clone();
        group.spawn_head_refresh(self.head_refresh_interval);
        Ok(group)
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn insert(&self, group: Arc<ProviderGroup>) {
        self.groups.insert(group.key().to_string(), group);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
