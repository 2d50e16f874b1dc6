pub mod abi;
pub mod contracts;
pub mod cursor;
mod database;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod nonce;
pub mod notify;
pub mod provider_group;
pub mod queue;
pub mod relay;
pub mod revert;
pub mod scanner;
pub mod settings;
pub mod supervisor;

#[cfg(test)]
pub mod test_utils;

pub use contracts::{ContractDirectory, ContractSource, ResolvedContract, TrackedContract};
pub use cursor::CursorStore;
pub use database::*;
pub use dispatcher::{DispatchContext, EventDispatcher, dispatcher_for};
pub use error::{DispatchError, FetchError, HandlerError, RelayError, WaitError};
pub use handlers::{GoldLedger, HandlerContext, RequestHandler};
pub use nonce::{NonceAllocator, NonceSource};
pub use notify::{NoopNotifier, NotificationSink, PusherNotifier};
pub use provider_group::{ProviderGroup, ProviderGroupRegistry};
pub use queue::{MemoryWorkQueue, PostgresWorkQueue, QueueConsumer, ReceivedMessage, WorkQueue};
pub use relay::{HttpRelayer, RelayBatcher, Relayer};
pub use scanner::ContractScanner;
pub use settings::{NotifierSettings, QueueSettings, RelaySettings, ScannerSettings};
pub use supervisor::{ContractRows, DispatcherFactory, ReconcileReport, ScannerSupervisor};
