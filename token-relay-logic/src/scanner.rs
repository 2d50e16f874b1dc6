//! Per-contract polling loop.
//!
//! Each step performs one transition of the scan state machine and returns
//! how long to wait before the next one:
//!
//! - idle while this instance is not the designated scanner or the contract
//!   is disabled;
//! - wait while the cursor is ahead of the group's known head;
//! - otherwise fetch `[cursor, min(cursor + window - 1, head)]` and dispatch.
//!
//! Fetch failures first halve the window. Once it cannot shrink further the
//! group's provider is rotated and the window starts over at full size. When
//! every provider failed the scanner either skips the offending block
//! (malformed responses) or backs off and retries (anything else).

use crate::{
    contracts::TrackedContract,
    cursor::CursorStore,
    dispatcher::{DispatchContext, EventDispatcher},
    error::{DispatchError, FetchError},
    metrics,
    provider_group::{ProviderGroup, Rotation},
    settings::ScannerSettings,
};
use alloy::{providers::Provider, rpc::types::Filter};
use rand::Rng;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::sleep};

pub struct ContractScanner {
    contract: TrackedContract,
    group: Arc<ProviderGroup>,
    dispatcher: Arc<dyn EventDispatcher>,
    cursors: Arc<dyn CursorStore>,
    settings: ScannerSettings,
    /// Whether this process is the designated scanner for the mode.
    active: Arc<AtomicBool>,
    /// Operator-controlled contract flag.
    enabled: Arc<AtomicBool>,
    current_block: u64,
    blocks_per_query: u64,
    providers_remaining: u32,
}

impl ContractScanner {
    pub fn new(
        contract: TrackedContract,
        group: Arc<ProviderGroup>,
        dispatcher: Arc<dyn EventDispatcher>,
        cursors: Arc<dyn CursorStore>,
        settings: ScannerSettings,
    ) -> Self {
        let blocks_per_query = settings.blocks_per_query.max(1);
        Self {
            current_block: contract.next_block,
            enabled: Arc::new(AtomicBool::new(contract.enabled)),
            active: Arc::new(AtomicBool::new(settings.enabled)),
            providers_remaining: group.len() as u32,
            contract,
            group,
            dispatcher,
            cursors,
            settings,
            blocks_per_query,
        }
    }

    pub fn with_active_flag(mut self, active: Arc<AtomicBool>) -> Self {
        self.active = active;
        self
    }

    /// Handle used by the contract refresh loop to toggle this scanner.
    pub fn enabled_handle(&self) -> Arc<AtomicBool> {
        self.enabled.clone()
    }

    pub fn contract(&self) -> &TrackedContract {
        &self.contract
    }

    pub fn current_block(&self) -> u64 {
        self.current_block
    }

    pub fn blocks_per_query(&self) -> u64 {
        self.blocks_per_query
    }

    fn reset_window(&mut self) {
        self.blocks_per_query = self.settings.blocks_per_query.max(1);
    }

    fn record(&self, result: &str) {
        metrics::SCANNER_RANGES
            .with_label_values(&[self.contract.code.as_str(), result])
            .inc();
    }

    pub async fn step(&mut self) -> Duration {
        if !self.active.load(Ordering::Relaxed) || !self.enabled.load(Ordering::Relaxed) {
            return self.settings.idle_interval;
        }
        let head = match self.group.head() {
            Some(head) if self.current_block <= head => head,
            _ => return self.settings.head_wait_interval,
        };

        let from_block = self.current_block;
        let to_block = (from_block + self.blocks_per_query - 1).min(head);

        match self.fetch(from_block, to_block).await {
            Ok(logs) => self.dispatch(from_block, to_block, logs).await,
            Err(err) => self.on_fetch_error(from_block, to_block, err).await,
        }
    }

    async fn fetch(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<alloy::rpc::types::Log>, FetchError> {
        let filter = Filter::new()
            .address(self.contract.address)
            .from_block(from_block)
            .to_block(to_block);
        let provider = self.group.current_provider().await;
        Ok(provider.get_logs(&filter).await?)
    }

    #[tracing::instrument(
        skip_all,
        fields(contract = %self.contract.code, from_block = from_block, to_block = to_block)
    )]
    async fn dispatch(
        &mut self,
        from_block: u64,
        to_block: u64,
        logs: Vec<alloy::rpc::types::Log>,
    ) -> Duration {
        let provider = self.group.current_provider().await;
        let ctx = DispatchContext {
            contract: &self.contract,
            provider: &provider,
        };
        let result = match self.dispatcher.parse_events(&logs, &ctx).await {
            Ok(()) => self
                .cursors
                .save_cursor(self.contract.id, to_block + 1)
                .await
                .map_err(DispatchError::Transient),
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {
                self.current_block = to_block + 1;
                self.reset_window();
                self.providers_remaining = self.group.len() as u32;
                metrics::SCANNER_CURSOR
                    .with_label_values(&[self.contract.code.as_str()])
                    .set(self.current_block as i64);
                self.record("ok");
                tracing::debug!(logs = logs.len(), next_block = self.current_block, "range processed");
                self.settings.query_delay
            }
            Err(err) if err.is_transient() => {
                self.record("dispatch_error");
                tracing::warn!(err = ?err, "lost connectivity while dispatching, reconnecting");
                if let Err(err) = self.cursors.reconnect().await {
                    tracing::error!(err = ?err, "failed to reconnect cursor store");
                }
                self.settings.reconnect_delay
            }
            Err(err) => {
                self.record("dispatch_error");
                tracing::error!(err = ?err, "failed to dispatch range, will retry");
                self.settings.dispatch_error_cooldown
            }
        }
    }

    async fn on_fetch_error(&mut self, from_block: u64, to_block: u64, err: FetchError) -> Duration {
        self.record("fetch_error");
        let halved = self.blocks_per_query / 2;
        if halved > 1 {
            self.blocks_per_query = halved;
            tracing::warn!(
                contract = %self.contract.code,
                from_block,
                to_block,
                blocks_per_query = self.blocks_per_query,
                err = ?err,
                "failed to fetch logs, shrinking query window"
            );
            return self.settings.query_delay;
        }

        self.reset_window();
        match self.group.try_rotate(&mut self.providers_remaining) {
            Rotation::Rotated(_) => {
                tracing::warn!(
                    contract = %self.contract.code,
                    block = from_block,
                    endpoint = %self.group.current_endpoint(),
                    err = ?err,
                    "failed to fetch logs with the smallest window, rotating provider"
                );
                self.settings.rotate_delay
            }
            Rotation::Exhausted if err.is_malformed() => self.skip_block(from_block, err).await,
            Rotation::Exhausted => {
                metrics::alert("providers_exhausted");
                tracing::error!(
                    alert = "providers_exhausted",
                    contract = %self.contract.code,
                    block = from_block,
                    err = ?err,
                    "every provider failed for block, retrying later"
                );
                self.settings.exhausted_retry_delay
            }
        }
    }

    /// Moves past a block no provider can serve. This drops the block's events.
    async fn skip_block(&mut self, block: u64, err: FetchError) -> Duration {
        metrics::alert("block_skipped");
        self.record("skipped");
        tracing::error!(
            alert = "block_skipped",
            contract = %self.contract.code,
            block,
            err = ?err,
            "no provider can serve block, skipping it"
        );
        if let Err(err) = self.cursors.save_cursor(self.contract.id, block + 1).await {
            tracing::error!(err = ?err, block, "failed to persist cursor after skip");
        }
        self.current_block = block + 1;
        self.settings.query_delay
    }

    pub async fn run(mut self) {
        let jitter_ms = self.settings.query_delay.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        } else {
            Duration::ZERO
        };
        tracing::info!(
            contract = %self.contract.code,
            next_block = self.current_block,
            endpoints = self.group.len(),
            "starting contract scanner"
        );
        sleep(jitter).await;
        loop {
            let delay = self.step().await;
            sleep(delay).await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
