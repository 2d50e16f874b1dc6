//! Best-effort recovery of human-readable revert reasons.

use alloy::{
    eips::BlockId,
    network::{Ethereum, TransactionBuilder},
    primitives::{Address, B256, Bytes},
    providers::{DynProvider, Provider},
    rpc::types::TransactionRequest,
    sol_types::{Revert, SolError},
    transports::TransportError,
};

pub const UNKNOWN_REASON: &str =
    "Unknown Reason - could not parse from error object returned from blockchain";
pub const NOT_REVERTED: &str = "not reverted";
const REASON_UNAVAILABLE: &str = "reason unavailable";

/// Selector plus offset and length words that precede an `Error(string)` text.
const REVERT_HEADER_LEN: usize = 68;

/// Everything known about one failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    /// Reason already decoded from a failure marker.
    pub reason: Option<String>,
    /// Mined transaction to replay at its block.
    pub transaction: Option<(B256, u64)>,
    /// Call that never made it on chain, e.g. because gas estimation failed.
    pub call: Option<(Address, Bytes)>,
    /// Raw revert payload taken from a provider error.
    pub revert_data: Option<Bytes>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Decodes an `Error(string)` revert payload. Payloads that do not decode
/// cleanly are read as a NUL terminated string after the standard header.
pub fn parse_reason_data(data: &[u8]) -> Option<String> {
    if data.len() < REVERT_HEADER_LEN {
        return None;
    }
    if let Ok(revert) = Revert::abi_decode(data) {
        return Some(revert.reason);
    }
    let tail = &data[REVERT_HEADER_LEN..];
    let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
    Some(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// Revert payload of the first rpc error response found in the error chain.
pub fn revert_data(err: &anyhow::Error) -> Option<Bytes> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<TransportError>())
        .find_map(|err| err.as_error_resp()?.as_revert_data())
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

fn reason_from_error(err: &TransportError) -> String {
    err.as_error_resp()
        .and_then(|payload| payload.as_revert_data())
        .and_then(|data| parse_reason_data(&data))
        .or_else(|| first_line(&err.to_string()))
        .unwrap_or_else(|| REASON_UNAVAILABLE.to_string())
}

pub struct RevertReasonExtractor {
    provider: DynProvider<Ethereum>,
}

impl RevertReasonExtractor {
    pub fn new(provider: DynProvider<Ethereum>) -> Self {
        Self { provider }
    }

    /// Never fails. Falls back to [`UNKNOWN_REASON`] when nothing else is known.
    pub async fn extract(&self, failure: &Failure) -> String {
        if let Some(reason) = failure.reason.as_ref().filter(|r| !r.is_empty()) {
            return reason.clone();
        }
        if let Some((tx_hash, block_number)) = failure.transaction {
            return self
                .replay(tx_hash, block_number)
                .await
                .unwrap_or_else(|| UNKNOWN_REASON.to_string());
        }
        if let Some((to, data)) = &failure.call {
            if let Some(reason) = self.simulate(*to, data.clone()).await {
                return reason;
            }
        }
        if let Some(reason) = failure
            .revert_data
            .as_ref()
            .and_then(|data| parse_reason_data(data))
        {
            return reason;
        }
        if !failure.message.is_empty() {
            return failure.message.clone();
        }
        UNKNOWN_REASON.to_string()
    }

    async fn replay(&self, tx_hash: B256, block_number: u64) -> Option<String> {
        let tx = match self.provider.get_transaction_by_hash(tx_hash).await {
            Ok(Some(tx)) => tx,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(%tx_hash, err = ?err, "failed to load transaction for replay");
                return None;
            }
        };
        let result = self
            .provider
            .call(tx.into_request())
            .block(BlockId::number(block_number))
            .await;
        Some(match result {
            Ok(_) => NOT_REVERTED.to_string(),
            Err(err) => reason_from_error(&err),
        })
    }

    async fn simulate(&self, to: Address, data: Bytes) -> Option<String> {
        let request = TransactionRequest::default().with_to(to).with_input(data);
        match self.provider.call(request).await {
            Ok(_) => None,
            Err(err) if err.as_error_resp().is_some() => Some(reason_from_error(&err)),
            Err(err) => {
                tracing::warn!(%to, err = ?err, "failed to simulate call");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_provider;
    use alloy::transports::mock::Asserter;
    use alloy::transports::RpcError;
    use alloy_json_rpc::ErrorPayload;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn revert_payload(reason: &str) -> Bytes {
        Revert {
            reason: reason.to_string(),
        }
        .abi_encode()
        .into()
    }

    #[rstest]
    #[case(revert_payload("Not enough gold").to_vec(), Some("Not enough gold"))]
    #[case(vec![0u8; 10], None)]
    #[case({
        let mut data = vec![0u8; 68];
        data.extend_from_slice(b"broken\0\0\0");
        data
    }, Some("broken"))]
    fn parses_revert_payloads(#[case] data: Vec<u8>, #[case] expected: Option<&str>) {
        assert_eq!(parse_reason_data(&data).as_deref(), expected);
    }

    #[tokio::test]
    async fn prefers_known_reason_then_message() {
        let extractor = RevertReasonExtractor::new(mock_provider(Asserter::new()));
        let failure = Failure {
            reason: Some("quest not active".to_string()),
            ..Failure::new("bundle failed")
        };
        assert_eq!(extractor.extract(&failure).await, "quest not active");
        assert_eq!(extractor.extract(&Failure::new("bundle failed")).await, "bundle failed");
        assert_eq!(extractor.extract(&Failure::default()).await, UNKNOWN_REASON);
    }

    #[tokio::test]
    async fn simulates_unmined_calls() {
        let asserter = Asserter::new();
        asserter.push_failure(ErrorPayload {
            code: 3,
            message: "execution reverted: Listing sold".to_string().into(),
            data: Some(
                serde_json::value::to_raw_value(&revert_payload("Listing sold")).unwrap(),
            ),
        });
        let extractor = RevertReasonExtractor::new(mock_provider(asserter));
        let failure = Failure {
            call: Some((Address::ZERO, Bytes::from(vec![1, 2, 3, 4]))),
            ..Failure::new("gas estimation failed")
        };
        assert_eq!(extractor.extract(&failure).await, "Listing sold");
    }

    #[tokio::test]
    async fn unreachable_simulation_keeps_message() {
        let extractor = RevertReasonExtractor::new(mock_provider(Asserter::new()));
        let failure = Failure {
            call: Some((Address::ZERO, Bytes::from(vec![1, 2, 3, 4]))),
            ..Failure::new("relayer rejected bundle")
        };
        assert_eq!(extractor.extract(&failure).await, "relayer rejected bundle");
    }

    #[test]
    fn finds_revert_data_behind_context() {
        let err: TransportError = RpcError::ErrorResp(ErrorPayload {
            code: 3,
            message: "execution reverted".to_string().into(),
            data: Some(serde_json::value::to_raw_value(&revert_payload("Paused")).unwrap()),
        });
        let err = anyhow::Error::from(err).context("balanceOf call to GOLD_CONTRACT failed");
        assert_eq!(revert_data(&err), Some(revert_payload("Paused")));
        assert_eq!(revert_data(&anyhow::anyhow!("plain error")), None);
    }

    #[tokio::test]
    async fn decodes_revert_data_without_provider() {
        let extractor = RevertReasonExtractor::new(mock_provider(Asserter::new()));
        let failure = Failure {
            revert_data: Some(revert_payload("Paused")),
            ..Failure::new("execution reverted")
        };
        assert_eq!(extractor.extract(&failure).await, "Paused");
    }

    #[tokio::test]
    async fn missing_transaction_is_unknown() {
        let asserter = Asserter::new();
        asserter.push_success(&serde_json::Value::Null);
        let extractor = RevertReasonExtractor::new(mock_provider(asserter));
        let failure = Failure {
            transaction: Some((B256::ZERO, 10)),
            ..Failure::new("reverted")
        };
        assert_eq!(extractor.extract(&failure).await, UNKNOWN_REASON);
    }
}
