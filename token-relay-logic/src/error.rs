use crate::relay::BundleReceipt;
use alloy::{
    primitives::Bytes,
    transports::{RpcError, TransportError},
};
use sea_orm::DbErr;

const INVALID_PARAMS_CODE: i64 = -32602;

/// Failure to fetch logs for a block range.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The provider could not encode or decode the range. Usually caused by a
    /// single block the provider cannot serve.
    #[error("malformed response: {0:#}")]
    Malformed(anyhow::Error),
    #[error(transparent)]
    Other(anyhow::Error),
}

impl FetchError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        let malformed = match &err {
            RpcError::SerError(_) | RpcError::DeserError { .. } => true,
            RpcError::ErrorResp(payload) => {
                payload.code == INVALID_PARAMS_CODE
                    || payload.message.to_lowercase().contains("invalid argument")
            }
            other => other.to_string().to_lowercase().contains("invalid argument"),
        };
        if malformed {
            Self::Malformed(err.into())
        } else {
            Self::Other(err.into())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Connectivity was lost; the same range is retried after reconnecting.
    #[error("transient dispatch failure: {0:#}")]
    Transient(anyhow::Error),
    #[error(transparent)]
    Other(anyhow::Error),
}

impl DispatchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<DbErr> for DispatchError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => Self::Transient(err.into()),
            _ => Self::Other(err.into()),
        }
    }
}

impl From<TransportError> for DispatchError {
    fn from(err: TransportError) -> Self {
        Self::Transient(err.into())
    }
}

/// Failure of a single request handler. The display text is delivered to clients.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("transaction has already been processed {guid}")]
    AlreadyProcessed { guid: String },
    #[error("invalid message payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("{0:#}")]
    Contract(anyhow::Error),
    #[error("{0}")]
    Relay(String),
}

impl HandlerError {
    /// Raw revert payload when the failure came from a reverted contract call.
    pub fn revert_data(&self) -> Option<Bytes> {
        match self {
            Self::Contract(err) => crate::revert::revert_data(err),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("bundle submission failed: {0:#}")]
    Submit(anyhow::Error),
    #[error("failed to read pending nonce: {0:#}")]
    NonceSource(anyhow::Error),
}

/// The relayer could not confirm the bundle outcome.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct WaitError {
    pub message: String,
    pub receipt: Option<BundleReceipt>,
}

impl WaitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            receipt: None,
        }
    }

    pub fn with_receipt(mut self, receipt: BundleReceipt) -> Self {
        self.receipt = Some(receipt);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_json_rpc::ErrorPayload;
    use rstest::rstest;

    fn error_resp(code: i64, message: &str) -> TransportError {
        RpcError::ErrorResp(ErrorPayload {
            code,
            message: message.to_string().into(),
            data: None,
        })
    }

    #[rstest]
    #[case(-32602, "invalid params", true)]
    #[case(-32000, "invalid argument 0: hex string without 0x prefix", true)]
    #[case(-32005, "query returned more than 10000 results", false)]
    #[case(429, "too many requests", false)]
    fn classifies_rpc_errors(#[case] code: i64, #[case] message: &str, #[case] malformed: bool) {
        assert_eq!(FetchError::from(error_resp(code, message)).is_malformed(), malformed);
    }

    #[test]
    fn classifies_deserialization_errors_as_malformed() {
        let err = serde_json::from_str::<u64>("\"nope\"").unwrap_err();
        let transport: TransportError = RpcError::DeserError {
            err,
            text: "\"nope\"".to_string(),
        };
        assert!(FetchError::from(transport).is_malformed());
    }

    #[test]
    fn connection_errors_are_transient() {
        let err = DbErr::Conn(sea_orm::RuntimeErr::Internal("closed".to_string()));
        assert!(DispatchError::from(err).is_transient());
        let err = DbErr::Custom("constraint".to_string());
        assert!(!DispatchError::from(err).is_transient());
    }

    #[test]
    fn already_processed_message_names_guid() {
        let err = HandlerError::AlreadyProcessed {
            guid: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "transaction has already been processed abc");
    }
}
