use crate::settings::Settings;
use std::sync::Arc;
use tokio::task::JoinHandle;
use token_relay_logic::{
    ContractDirectory, DispatcherFactory, NotificationSink, ProviderGroupRegistry, RelayDatabase,
    ScannerSupervisor, TrackedContract, dispatcher_for,
};

/// Starts one scanner per tracked contract of the mode and keeps the set in
/// sync with the database.
pub async fn start(
    settings: &Settings,
    db: RelayDatabase,
    notifier: Arc<dyn NotificationSink>,
    directory: ContractDirectory,
) -> anyhow::Result<JoinHandle<()>> {
    let contracts = db.load_tracked_contracts(&settings.mode).await?;
    let registry = ProviderGroupRegistry::new(
        settings.scanner.max_rps,
        settings.scanner.head_refresh_interval,
    );
    let dispatchers: DispatcherFactory = {
        let db = db.clone();
        Arc::new(move |contract: &TrackedContract| {
            dispatcher_for(contract, db.clone(), notifier.clone(), directory.clone())
        })
    };

    let mut supervisor = ScannerSupervisor::new(
        registry,
        dispatchers,
        Arc::new(db.clone()),
        settings.scanner.clone(),
    );
    supervisor.reconcile(contracts);
    if !settings.scanner.enabled {
        tracing::warn!("this instance is not the designated scanner, scanners stay idle");
    }
    tracing::info!(
        mode = %settings.mode,
        scanners = supervisor.running(),
        provider_groups = supervisor.provider_groups(),
        "contract scanners started"
    );
    Ok(supervisor.spawn(Arc::new(db), settings.mode.clone()))
}
