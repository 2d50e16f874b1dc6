//! Keeps one running scanner per tracked contract row.
//!
//! Rows are re-read on an interval. New rows get a scanner, removed rows
//! have theirs aborted, and rows whose address or endpoints changed are
//! restarted from their stored cursor. The operator flag of a running
//! scanner is toggled in place.

use crate::{
    contracts::TrackedContract,
    cursor::CursorStore,
    dispatcher::EventDispatcher,
    provider_group::ProviderGroupRegistry,
    scanner::ContractScanner,
    settings::ScannerSettings,
};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::task::JoinHandle;

/// Source of the contract rows a mode should be scanning.
#[async_trait]
pub trait ContractRows: Send + Sync {
    async fn tracked_contracts(&self, mode: &str) -> anyhow::Result<Vec<TrackedContract>>;
}

pub type DispatcherFactory =
    Arc<dyn Fn(&TrackedContract) -> Option<Arc<dyn EventDispatcher>> + Send + Sync>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: usize,
    pub restarted: usize,
    pub stopped: usize,
    pub toggled: usize,
}

struct RunningScanner {
    address: Address,
    providers: Vec<String>,
    enabled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Drop for RunningScanner {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub struct ScannerSupervisor {
    registry: ProviderGroupRegistry,
    dispatchers: DispatcherFactory,
    cursors: Arc<dyn CursorStore>,
    settings: ScannerSettings,
    /// Shared by every scanner. Cleared when this process must not scan.
    active: Arc<AtomicBool>,
    running: HashMap<i32, RunningScanner>,
}

impl ScannerSupervisor {
    pub fn new(
        registry: ProviderGroupRegistry,
        dispatchers: DispatcherFactory,
        cursors: Arc<dyn CursorStore>,
        settings: ScannerSettings,
    ) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(settings.enabled)),
            registry,
            dispatchers,
            cursors,
            settings,
            running: HashMap::new(),
        }
    }

    pub fn active_handle(&self) -> Arc<AtomicBool> {
        self.active.clone()
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }

    pub fn is_running(&self, contract_id: i32) -> bool {
        self.running.contains_key(&contract_id)
    }

    pub fn provider_groups(&self) -> usize {
        self.registry.len()
    }

    /// Brings the running scanners in line with `rows`.
    pub fn reconcile(&mut self, rows: Vec<TrackedContract>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut seen = Vec::with_capacity(rows.len());

        for contract in rows {
            seen.push(contract.id);
            let existing = self.running.get(&contract.id).map(|running| {
                let unchanged = running.address == contract.address
                    && running.providers == contract.providers;
                (unchanged, running.enabled.clone())
            });
            match existing {
                Some((true, enabled)) => {
                    if enabled.swap(contract.enabled, Ordering::Relaxed) != contract.enabled {
                        tracing::info!(
                            contract = %contract.code,
                            enabled = contract.enabled,
                            "contract scanning toggled"
                        );
                        report.toggled += 1;
                    }
                }
                Some((false, _)) => {
                    tracing::info!(contract = %contract.code, "contract row changed, restarting scanner");
                    self.running.remove(&contract.id);
                    if self.start(contract) {
                        report.restarted += 1;
                    } else {
                        report.stopped += 1;
                    }
                }
                None => {
                    if self.start(contract) {
                        report.started += 1;
                    }
                }
            }
        }

        let removed: Vec<i32> = self
            .running
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for id in removed {
            tracing::info!(contract_id = id, "contract row removed, stopping scanner");
            self.running.remove(&id);
            report.stopped += 1;
        }
        report
    }

    fn start(&mut self, contract: TrackedContract) -> bool {
        let Some(dispatcher) = (self.dispatchers)(&contract) else {
            tracing::debug!(contract = %contract.code, "no dispatcher, not scanning");
            return false;
        };
        let group = match self.registry.get_or_create(&contract.providers) {
            Ok(group) => group,
            Err(err) => {
                tracing::error!(contract = %contract.code, err = ?err, "invalid provider endpoints");
                return false;
            }
        };
        let id = contract.id;
        let address = contract.address;
        let providers = contract.providers.clone();
        let scanner = ContractScanner::new(
            contract,
            group,
            dispatcher,
            self.cursors.clone(),
            self.settings.clone(),
        )
        .with_active_flag(self.active.clone());
        let enabled = scanner.enabled_handle();
        self.running.insert(
            id,
            RunningScanner {
                address,
                providers,
                enabled,
                handle: scanner.spawn(),
            },
        );
        true
    }

    /// Reloads rows forever. A failed reload keeps the current scanners.
    pub async fn run(mut self, rows: Arc<dyn ContractRows>, mode: String) {
        let mut interval = tokio::time::interval(self.settings.contracts_refresh_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match rows.tracked_contracts(&mode).await {
                Ok(contracts) => {
                    let report = self.reconcile(contracts);
                    if report != ReconcileReport::default() {
                        tracing::info!(
                            mode = %mode,
                            running = self.running(),
                            provider_groups = self.provider_groups(),
                            ?report,
                            "contract scanners reconciled"
                        );
                    }
                }
                Err(err) => tracing::warn!(err = ?err, "failed to reload tracked contracts"),
            }
        }
    }

    pub fn spawn(self, rows: Arc<dyn ContractRows>, mode: String) -> JoinHandle<()> {
        tokio::spawn(self.run(rows, mode))
    }
}
