//! Fakes and fixtures shared by unit tests.

use crate::{
    abi::IRelayWallet,
    contracts::{ContractDirectory, ContractSource, TrackedContract},
    cursor::CursorStore,
    database::RelayDatabase,
    dispatcher::{DispatchContext, EventDispatcher},
    error::{DispatchError, HandlerError, RelayError, WaitError},
    handlers::{
        FailureReport, GoldLedger, Guid, HandlerContext, MessageType, Notification,
        RequestHandler,
    },
    nonce::NonceSource,
    notify::NotificationSink,
    provider_group::ProviderGroup,
    relay::{BundleReceipt, MetaTransactionBundle, PendingBundle, Relayer},
};
use alloy::{
    network::Ethereum,
    primitives::{Address, B256, Bytes, LogData, U256},
    providers::{DynProvider, RootProvider},
    rpc::{client::RpcClient, types::Log},
    sol_types::{Revert, SolError, SolEvent},
    transports::mock::Asserter,
};
use anyhow::anyhow;
use async_trait::async_trait;
use blockscout_service_launcher::test_database::TestDbGuard;
use parking_lot::Mutex;
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const SCRIPTED_CONTRACT: &str = "SCRIPTED";

pub async fn init_db(name: &str) -> TestDbGuard {
    TestDbGuard::new::<migration::Migrator>(name).await
}

/// A database handle that fails every query. For code paths that never touch it.
pub fn lazy_database() -> RelayDatabase {
    RelayDatabase::new(Arc::new(DatabaseConnection::Disconnected))
}

pub fn mock_provider(asserter: Asserter) -> DynProvider<Ethereum> {
    DynProvider::new(RootProvider::<Ethereum>::new(RpcClient::mocked(asserter)))
}

/// Provider group of `n` mock endpoints, one asserter per endpoint.
pub fn mock_group(n: usize) -> (ProviderGroup, Vec<Asserter>) {
    let asserters: Vec<Asserter> = (0..n).map(|_| Asserter::new()).collect();
    let endpoints = (0..n).map(|i| format!("http://provider-{i}.test")).collect();
    let providers = asserters.iter().cloned().map(mock_provider).collect();
    let group = ProviderGroup::with_providers(endpoints, providers)
        .expect("mock group is valid");
    (group, asserters)
}

pub fn tracked_contract(id: i32, code: &str) -> TrackedContract {
    TrackedContract {
        id,
        code: code.to_string(),
        mode: "test".to_string(),
        address: Address::repeat_byte(id as u8),
        providers: vec!["http://localhost:8545".to_string()],
        next_block: 100,
        enabled: true,
        token_type: None,
        abi: None,
    }
}

pub fn log_at(block_number: u64, log_index: u64, data: LogData) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: Address::repeat_byte(0xcc),
            data,
        },
        block_hash: Some(B256::repeat_byte(0xbb)),
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(B256::repeat_byte(block_number as u8)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

/// Log the relay wallet emits for an executed sub-transaction.
pub fn executed_marker() -> Log {
    log_at(1, 0, LogData::new_unchecked(vec![], Bytes::new()))
}

/// `TxFailed` log carrying `reason` as an `Error(string)` payload, or no
/// payload at all when `reason` is empty.
pub fn failed_marker(reason: &str) -> Log {
    let reason = if reason.is_empty() {
        Bytes::new()
    } else {
        Revert {
            reason: reason.to_string(),
        }
        .abi_encode()
        .into()
    };
    let event = IRelayWallet::TxFailed {
        _tx: B256::ZERO,
        _reason: reason,
    };
    log_at(1, 0, event.encode_log_data())
}

pub fn empty_directory() -> ContractDirectory {
    ContractDirectory::new(
        Arc::new(StaticContracts::new(vec![])),
        "test",
        Duration::from_secs(60),
    )
}

/// Handler context over a fixed set of contracts. `provider` replaces the
/// endpoints stored with every contract.
pub fn handler_context(
    contracts: Vec<TrackedContract>,
    provider: Option<DynProvider<Ethereum>>,
) -> (HandlerContext, Arc<RecordingNotifier>) {
    let mut directory = ContractDirectory::new(
        Arc::new(StaticContracts::new(contracts)),
        "test",
        Duration::from_secs(60),
    );
    if let Some(provider) = provider {
        directory = directory.with_provider(provider);
    }
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = HandlerContext {
        notifier: notifier.clone(),
        ledger: Arc::new(StaticLedger::new(Vec::<String>::new())),
        directory,
    };
    (ctx, notifier)
}

pub struct StaticContracts {
    contracts: Vec<TrackedContract>,
    lookups: AtomicUsize,
}

impl StaticContracts {
    pub fn new(contracts: Vec<TrackedContract>) -> Self {
        Self {
            contracts,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContractSource for StaticContracts {
    async fn find_contract(&self, code: &str, _mode: &str) -> anyhow::Result<Option<TrackedContract>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.contracts.iter().find(|c| c.code == code).cloned())
    }
}

pub struct StaticLedger {
    known: Option<HashSet<String>>,
}

impl StaticLedger {
    pub fn new<I, S>(guids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: Some(guids.into_iter().map(Into::into).collect()),
        }
    }

    pub fn failing() -> Self {
        Self { known: None }
    }
}

#[async_trait]
impl GoldLedger for StaticLedger {
    async fn gold_transaction_exists(&self, guid: &str) -> anyhow::Result<bool> {
        match &self.known {
            Some(known) => Ok(known.contains(guid)),
            None => Err(anyhow!("connection refused")),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Value, Option<Address>)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(event, _, _)| event.clone()).collect()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.sent.lock().iter().map(|(_, payload, _)| payload.clone()).collect()
    }

    pub fn hints(&self) -> Vec<Option<Address>> {
        self.sent.lock().iter().map(|(_, _, hint)| *hint).collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn send(&self, event: &str, payload: Value, address_hint: Option<Address>) {
        self.sent.lock().push((event.to_string(), payload, address_hint));
    }
}

/// Records `(contract id, log count)` per dispatched range.
#[derive(Default)]
pub struct RecordingDispatcher {
    ranges: Mutex<Vec<(i32, usize)>>,
    failures: Mutex<VecDeque<DispatchError>>,
}

impl RecordingDispatcher {
    pub fn ranges(&self) -> Vec<(i32, usize)> {
        self.ranges.lock().clone()
    }

    /// Queues a failure for an upcoming dispatch.
    pub fn fail_next(&self, err: DispatchError) {
        self.failures.lock().push_back(err);
    }
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn parse_events(
        &self,
        logs: &[Log],
        ctx: &DispatchContext<'_>,
    ) -> Result<(), DispatchError> {
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        self.ranges.lock().push((ctx.contract.id, logs.len()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingCursors {
    saved: Mutex<Vec<(i32, u64)>>,
    reconnects: AtomicUsize,
    fail_next_save: Mutex<bool>,
}

impl RecordingCursors {
    pub fn saved(&self) -> Vec<(i32, u64)> {
        self.saved.lock().clone()
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn fail_next_save(&self) {
        *self.fail_next_save.lock() = true;
    }
}

#[async_trait]
impl CursorStore for RecordingCursors {
    async fn save_cursor(&self, contract_id: i32, next_block: u64) -> anyhow::Result<()> {
        if std::mem::take(&mut *self.fail_next_save.lock()) {
            anyhow::bail!("connection closed");
        }
        self.saved.lock().push((contract_id, next_block));
        Ok(())
    }

    async fn reconnect(&self) -> anyhow::Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Nonce source returning the same pending count every time.
pub struct StaticNonce {
    nonce: u64,
    loads: AtomicUsize,
}

impl StaticNonce {
    pub fn new(nonce: u64) -> Self {
        Self {
            nonce,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NonceSource for StaticNonce {
    async fn pending_nonce(&self, _wallet: Address) -> anyhow::Result<u64> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.nonce)
    }
}

enum WaitScript {
    Logs(Vec<Log>),
    Error(String),
}

/// Relayer that records bundles and answers waits from per-nonce scripts.
/// Unscripted bundles execute every sub-transaction.
#[derive(Default)]
pub struct RecordingRelayer {
    bundles: Mutex<Vec<MetaTransactionBundle>>,
    rejections: Mutex<HashMap<u64, String>>,
    waits: Mutex<HashMap<u64, WaitScript>>,
}

impl RecordingRelayer {
    pub fn bundles(&self) -> Vec<MetaTransactionBundle> {
        self.bundles.lock().clone()
    }

    pub fn reject(&self, nonce: u64, message: &str) {
        self.rejections.lock().insert(nonce, message.to_string());
    }

    pub fn accept(&self, nonce: u64) {
        self.rejections.lock().remove(&nonce);
    }

    pub fn script_logs(&self, nonce: u64, logs: Vec<Log>) {
        self.waits.lock().insert(nonce, WaitScript::Logs(logs));
    }

    pub fn script_wait_error(&self, nonce: u64, message: &str) {
        self.waits
            .lock()
            .insert(nonce, WaitScript::Error(message.to_string()));
    }

    fn receipt(nonce: u64, logs: Vec<Log>) -> BundleReceipt {
        BundleReceipt {
            transaction_hash: B256::from(U256::from(nonce)),
            block_number: None,
            logs,
        }
    }
}

#[async_trait]
impl Relayer for RecordingRelayer {
    fn wallet(&self) -> Address {
        Address::repeat_byte(0x77)
    }

    async fn send_bundle(
        &self,
        bundle: &MetaTransactionBundle,
    ) -> Result<PendingBundle, RelayError> {
        if let Some(message) = self.rejections.lock().get(&bundle.nonce) {
            return Err(RelayError::Submit(anyhow!(message.clone())));
        }
        self.bundles.lock().push(bundle.clone());
        Ok(PendingBundle {
            id: bundle.nonce.to_string(),
            tx_hash: None,
        })
    }

    async fn wait(&self, pending: &PendingBundle) -> Result<BundleReceipt, WaitError> {
        let nonce: u64 = pending
            .id
            .parse()
            .map_err(|_| WaitError::new("unknown bundle"))?;
        let script = self.waits.lock().remove(&nonce);
        match script {
            Some(WaitScript::Logs(logs)) => Ok(Self::receipt(nonce, logs)),
            Some(WaitScript::Error(message)) => Err(WaitError::new(message)),
            None => {
                let executed = self
                    .bundles
                    .lock()
                    .iter()
                    .find(|b| b.nonce == nonce)
                    .map(|b| b.transactions.len())
                    .unwrap_or_default();
                Ok(Self::receipt(nonce, vec![executed_marker(); executed]))
            }
        }
    }
}

/// Handler with `entries` calldata entries that records its callbacks.
pub struct ScriptedHandler {
    guid: Guid,
    entries: usize,
    max_grouping: usize,
    calldata_error: Option<String>,
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<Vec<FailureReport>>,
}

impl ScriptedHandler {
    pub fn new(id: u64, entries: usize) -> Arc<Self> {
        Arc::new(Self::build(id, entries))
    }

    fn build(id: u64, entries: usize) -> Self {
        Self {
            guid: format!("0x{id:x}").parse().expect("valid guid"),
            entries,
            max_grouping: crate::handlers::DEFAULT_MAX_GROUPING,
            calldata_error: None,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    fn rebuild(self: Arc<Self>, update: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut handler = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("handler is shared"));
        update(&mut handler);
        Arc::new(handler)
    }

    pub fn with_max_grouping(self: Arc<Self>, max_grouping: usize) -> Arc<Self> {
        self.rebuild(|h| h.max_grouping = max_grouping)
    }

    pub fn failing_calldata(self: Arc<Self>, message: &str) -> Arc<Self> {
        let message = message.to_string();
        self.rebuild(|h| h.calldata_error = Some(message))
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn failures(&self) -> Vec<FailureReport> {
        self.failures.lock().clone()
    }

    pub fn terminal_callbacks(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call != "sent")
            .count()
    }
}

#[async_trait]
impl RequestHandler for ScriptedHandler {
    fn message_type(&self) -> MessageType {
        MessageType::BuyBox
    }

    fn guid(&self) -> &Guid {
        &self.guid
    }

    fn contract_code(&self) -> &'static str {
        SCRIPTED_CONTRACT
    }

    fn origin(&self) -> Address {
        Address::repeat_byte(0x0a)
    }

    fn max_grouping(&self) -> usize {
        self.max_grouping
    }

    fn calldata(&self) -> Result<Vec<Bytes>, HandlerError> {
        if let Some(message) = &self.calldata_error {
            return Err(HandlerError::Contract(anyhow!(message.clone())));
        }
        Ok((0..self.entries)
            .map(|i| Bytes::from(format!("{}:{i}", self.guid).into_bytes()))
            .collect())
    }

    async fn success_notification(&self, _ctx: &HandlerContext) -> Notification {
        Notification {
            event: "scripted",
            payload: json!({"messageGuid": self.guid.message_guid()}),
        }
    }

    fn failure_message(&self) -> Value {
        json!({"messageGuid": self.guid.message_guid()})
    }

    async fn on_sent(&self, _ctx: &HandlerContext) {
        self.calls.lock().push("sent");
    }

    async fn on_success(&self, _ctx: &HandlerContext) {
        self.calls.lock().push("success");
    }

    async fn on_failure(&self, _ctx: &HandlerContext, failure: &FailureReport) {
        self.calls.lock().push("failure");
        self.failures.lock().push(failure.clone());
    }
}
