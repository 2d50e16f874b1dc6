use super::{
    BundleReceipt, EntryRef, MetaTransaction, MetaTransactionBundle, PendingBundle, Relayer,
    resolution::{OUT_OF_GAS_BUNDLE, OUT_OF_GAS_TRANSACTION, SubTransactionOutcome, resolve_bundle},
};
use crate::{
    error::{HandlerError, RelayError, WaitError},
    handlers::{FailureReport, HandlerContext, RequestHandler, route},
    metrics,
    nonce::NonceAllocator,
    queue::{MessageProcessor, ReceivedMessage},
    revert::{Failure, RevertReasonExtractor},
};
use alloy::{
    network::Ethereum,
    primitives::{Address, B256, Bytes},
    providers::DynProvider,
};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A handler that made it through routing and calldata building.
struct Prepared {
    handler: Arc<dyn RequestHandler>,
    provider: DynProvider<Ethereum>,
    transactions: Vec<MetaTransaction>,
}

/// A handler waiting for the outcome of its bundles.
#[derive(Clone)]
struct Awaiting {
    handler: Arc<dyn RequestHandler>,
    provider: DynProvider<Ethereum>,
}

/// First failure seen for one handler.
struct ObservedFailure {
    message: String,
    transaction: Option<(B256, u64)>,
    call: (Address, Bytes),
}

/// What happened to one processed batch.
#[derive(Default)]
pub struct BatchReport {
    /// Bundles built for the batch, in nonce order.
    pub bundles: Vec<MetaTransactionBundle>,
    /// First submission or nonce error.
    pub error: Option<RelayError>,
    /// Nothing was submitted and no handler was called back, so the messages
    /// must be delivered again.
    pub redeliver: bool,
    /// Background task delivering the terminal callbacks of submitted bundles.
    pub resolution: Option<JoinHandle<()>>,
}

/// Turns a batch of work messages into nonce-ordered bundles, submits them
/// and delivers exactly one terminal callback per handler.
pub struct RelayBatcher {
    relayer: Arc<dyn Relayer>,
    nonces: Arc<NonceAllocator>,
    ctx: HandlerContext,
    /// Used for revert replays when a handler's contract could not be resolved.
    provider: DynProvider<Ethereum>,
}

impl RelayBatcher {
    pub fn new(
        relayer: Arc<dyn Relayer>,
        nonces: Arc<NonceAllocator>,
        ctx: HandlerContext,
        provider: DynProvider<Ethereum>,
    ) -> Self {
        Self {
            relayer,
            nonces,
            ctx,
            provider,
        }
    }

    #[tracing::instrument(skip_all, fields(messages = messages.len()))]
    pub async fn process(&self, messages: &[ReceivedMessage]) -> BatchReport {
        let handlers: Vec<Arc<dyn RequestHandler>> = messages
            .iter()
            .filter_map(|message| match route(&message.body) {
                Ok(Some(handler)) => Some(Arc::from(handler)),
                Ok(None) => {
                    tracing::debug!(id = %message.id, "dropping unroutable message");
                    None
                }
                Err(err) => {
                    tracing::warn!(id = %message.id, err = %err, "dropping malformed message");
                    None
                }
            })
            .collect();
        self.process_handlers(handlers).await
    }

    pub async fn process_handlers(&self, handlers: Vec<Arc<dyn RequestHandler>>) -> BatchReport {
        let total = handlers.len();
        let prepared = join_all(handlers.into_iter().map(|handler| self.prepare(handler)))
            .await
            .into_iter()
            .flatten();

        let mut ready = Vec::new();
        for item in prepared {
            if item.transactions.is_empty() {
                // Nothing to relay, so there is nothing that could fail either.
                item.handler.on_sent(&self.ctx).await;
                succeed(&self.ctx, item.handler.as_ref()).await;
            } else {
                ready.push(item);
            }
        }
        if ready.is_empty() {
            return BatchReport::default();
        }
        // Handlers that already got a callback must not see the batch again.
        let notified = ready.len() < total;

        let max_grouping = ready[0].handler.max_grouping().max(1);
        let entries: Vec<(EntryRef, MetaTransaction)> = ready
            .iter()
            .enumerate()
            .flat_map(|(handler, item)| {
                item.transactions
                    .iter()
                    .cloned()
                    .enumerate()
                    .map(move |(sub_index, tx)| (EntryRef { handler, sub_index }, tx))
            })
            .collect();
        let chunks: Vec<_> = entries.chunks(max_grouping).collect();

        let nonces = match self.nonces.reserve(chunks.len()).await {
            Ok(nonces) => nonces,
            Err(err) => {
                tracing::error!(err = %err, notified, "failed to reserve nonces");
                if notified {
                    let message = err.to_string();
                    for item in &ready {
                        self.fail(item.handler.as_ref(), &item.provider, Failure::new(&message))
                            .await;
                    }
                }
                return BatchReport {
                    error: Some(err),
                    redeliver: !notified,
                    ..Default::default()
                };
            }
        };
        let bundles: Vec<MetaTransactionBundle> = nonces
            .zip(chunks)
            .map(|(nonce, chunk)| MetaTransactionBundle {
                nonce,
                transactions: chunk.iter().map(|(_, tx)| tx.clone()).collect(),
                entries: chunk.iter().map(|(entry, _)| *entry).collect(),
            })
            .collect();
        tracing::info!(
            handlers = ready.len(),
            transactions = entries.len(),
            bundles = bundles.len(),
            max_grouping,
            "submitting batch"
        );

        let results = join_all(bundles.iter().map(|bundle| self.relayer.send_bundle(bundle))).await;

        let mut rejected: Vec<Option<Failure>> = vec![None; ready.len()];
        let mut submitted = Vec::new();
        let mut error = None;
        for (bundle, result) in bundles.iter().zip(results) {
            match result {
                Ok(pending) => {
                    metrics::RELAY_BUNDLES.with_label_values(&["ok"]).inc();
                    submitted.push((bundle.clone(), pending));
                }
                Err(err) => {
                    metrics::RELAY_BUNDLES.with_label_values(&["error"]).inc();
                    tracing::error!(nonce = bundle.nonce, err = %err, "bundle submission failed");
                    for (entry, tx) in bundle.entries.iter().zip(&bundle.transactions) {
                        rejected[entry.handler].get_or_insert_with(|| Failure {
                            call: Some((tx.to, tx.data.clone())),
                            ..Failure::new(err.to_string())
                        });
                    }
                    error.get_or_insert(err);
                }
            }
        }

        if error.is_some() {
            // Rejected nonces were never consumed.
            self.nonces.invalidate().await;
        }
        if submitted.is_empty() && !notified {
            return BatchReport {
                bundles,
                error,
                redeliver: true,
                resolution: None,
            };
        }

        let mut awaiting = Vec::with_capacity(ready.len());
        for (item, rejection) in ready.iter().zip(rejected) {
            match rejection {
                Some(failure) => {
                    self.fail(item.handler.as_ref(), &item.provider, failure).await;
                    awaiting.push(None);
                }
                None => {
                    item.handler.on_sent(&self.ctx).await;
                    awaiting.push(Some(Awaiting {
                        handler: item.handler.clone(),
                        provider: item.provider.clone(),
                    }));
                }
            }
        }

        let resolution = (!submitted.is_empty()).then(|| {
            tokio::spawn(resolve(
                self.relayer.clone(),
                self.ctx.clone(),
                awaiting,
                submitted,
            ))
        });
        BatchReport {
            bundles,
            error,
            redeliver: false,
            resolution,
        }
    }

    /// Resolves the target contract, runs the handler's checks and builds its
    /// transactions. Failures are reported to the handler right away.
    async fn prepare(&self, handler: Arc<dyn RequestHandler>) -> Option<Prepared> {
        let mut provider = None;
        let result = async {
            let contract = self
                .ctx
                .directory
                .resolve(handler.contract_code())
                .await
                .map_err(HandlerError::Contract)?;
            provider = Some(contract.provider.clone());
            handler.precheck(&self.ctx).await?;
            handler.transactions(contract.address())
        }
        .await;

        let provider = provider.unwrap_or_else(|| self.provider.clone());
        match result {
            Ok(transactions) => Some(Prepared {
                handler,
                provider,
                transactions,
            }),
            Err(err) => {
                let failure = Failure {
                    revert_data: err.revert_data(),
                    ..Failure::new(err.to_string())
                };
                self.fail(handler.as_ref(), &provider, failure).await;
                None
            }
        }
    }

    async fn fail(
        &self,
        handler: &dyn RequestHandler,
        provider: &DynProvider<Ethereum>,
        failure: Failure,
    ) {
        fail(&self.ctx, handler, provider, failure).await
    }
}

#[async_trait]
impl MessageProcessor for RelayBatcher {
    async fn process_batch(&self, messages: &[ReceivedMessage]) -> anyhow::Result<()> {
        let report = self.process(messages).await;
        match report.error {
            Some(err) if report.redeliver => Err(err.into()),
            _ => Ok(()),
        }
    }
}

async fn succeed(ctx: &HandlerContext, handler: &dyn RequestHandler) {
    handler.on_success(ctx).await;
    let message_type = handler.message_type().to_string();
    metrics::HANDLER_OUTCOMES
        .with_label_values(&[message_type.as_str(), "success"])
        .inc();
}

async fn fail(
    ctx: &HandlerContext,
    handler: &dyn RequestHandler,
    provider: &DynProvider<Ethereum>,
    failure: Failure,
) {
    let reason = RevertReasonExtractor::new(provider.clone())
        .extract(&failure)
        .await;
    let report = FailureReport {
        message: failure.message,
        reason,
    };
    handler.on_failure(ctx, &report).await;
    let message_type = handler.message_type().to_string();
    metrics::HANDLER_OUTCOMES
        .with_label_values(&[message_type.as_str(), "failure"])
        .inc();
}

fn mined_at(result: &Result<BundleReceipt, WaitError>) -> Option<(B256, u64)> {
    let receipt = match result {
        Ok(receipt) => receipt,
        Err(err) => err.receipt.as_ref()?,
    };
    receipt
        .block_number
        .map(|block_number| (receipt.transaction_hash, block_number))
}

/// Waits for every submitted bundle and delivers one callback per awaiting
/// handler. `awaiting[i]` is `None` for handlers that already failed.
async fn resolve(
    relayer: Arc<dyn Relayer>,
    ctx: HandlerContext,
    awaiting: Vec<Option<Awaiting>>,
    submitted: Vec<(MetaTransactionBundle, PendingBundle)>,
) {
    let waits = join_all(submitted.iter().map(|(_, pending)| relayer.wait(pending))).await;

    let mut failures: Vec<Option<ObservedFailure>> = awaiting.iter().map(|_| None).collect();
    for ((bundle, pending), result) in submitted.iter().zip(waits) {
        let transaction = mined_at(&result);
        let outcomes = resolve_bundle(bundle, result);
        tracing::debug!(
            id = %pending.id,
            nonce = bundle.nonce,
            failed = outcomes.iter().filter(|o| o.failure().is_some()).count(),
            "bundle resolved"
        );
        for ((entry, tx), outcome) in bundle
            .entries
            .iter()
            .zip(&bundle.transactions)
            .zip(outcomes)
        {
            if let SubTransactionOutcome::Failed(message) = outcome {
                tracing::debug!(
                    nonce = bundle.nonce,
                    handler = entry.handler,
                    sub_index = entry.sub_index,
                    failure = %message,
                    "sub-transaction failed"
                );
                failures[entry.handler].get_or_insert(ObservedFailure {
                    message,
                    transaction,
                    call: (tx.to, tx.data.clone()),
                });
            }
        }
    }

    for (item, failure) in awaiting.into_iter().zip(failures) {
        let Some(Awaiting { handler, provider }) = item else {
            continue;
        };
        match failure {
            None => succeed(&ctx, handler.as_ref()).await,
            Some(ObservedFailure {
                message,
                transaction,
                call,
            }) => {
                // Marker reasons are already decoded; fallbacks are worth a replay.
                let decoded = message != OUT_OF_GAS_BUNDLE && message != OUT_OF_GAS_TRANSACTION;
                let failure = Failure {
                    reason: decoded.then(|| message.clone()),
                    transaction: (!decoded).then_some(transaction).flatten(),
                    call: (!decoded).then_some(call),
                    ..Failure::new(message)
                };
                fail(&ctx, handler.as_ref(), &provider, failure).await;
            }
        }
    }
}
