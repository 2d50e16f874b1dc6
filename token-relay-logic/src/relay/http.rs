use super::{BundleReceipt, MetaTransaction, MetaTransactionBundle, PendingBundle, Relayer};
use crate::{
    abi::MetaTxn,
    error::{RelayError, WaitError},
    settings::RelaySettings,
};
use alloy::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    signers::{SignerSync, local::PrivateKeySigner},
    sol_types::SolValue,
};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleTx<'a> {
    to: Address,
    data: &'a Bytes,
    gas_limit: u64,
    revert_on_error: bool,
}

#[derive(Debug, Serialize)]
struct BundleRequest<'a> {
    wallet: Address,
    nonce: u64,
    signature: Bytes,
    txs: Vec<BundleTx<'a>>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum BundleStatus {
    Pending,
    Executed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    status: BundleStatus,
    #[serde(default)]
    receipt: Option<BundleReceipt>,
    #[serde(default)]
    error: Option<String>,
}

fn meta_txns(transactions: &[MetaTransaction]) -> Vec<MetaTxn> {
    transactions
        .iter()
        .map(|tx| MetaTxn {
            delegateCall: false,
            revertOnError: false,
            gasLimit: U256::from(tx.gas_limit),
            target: tx.to,
            value: U256::ZERO,
            data: tx.data.clone(),
        })
        .collect()
}

/// Digest the relayer verifies before executing a bundle from `wallet`.
pub fn bundle_digest(wallet: Address, nonce: u64, transactions: &[MetaTransaction]) -> B256 {
    let txs_hash = keccak256(meta_txns(transactions).abi_encode());
    keccak256((wallet, U256::from(nonce), txs_hash).abi_encode())
}

/// Relayer reachable over HTTP. Bundles are signed with the relayer signer
/// key and polled for a receipt until `wait_timeout` runs out.
pub struct HttpRelayer {
    client: reqwest::Client,
    base_url: url::Url,
    wallet: Address,
    signer: PrivateKeySigner,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl HttpRelayer {
    pub fn new(settings: &RelaySettings) -> anyhow::Result<Self> {
        let signer: PrivateKeySigner = settings
            .signer_private_key
            .parse()
            .context("invalid relay signer private key")?;
        let mut base_url: url::Url = settings.url.parse().context("invalid relay url")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build relay http client")?;
        Ok(Self {
            client,
            base_url,
            wallet: settings.wallet,
            signer,
            wait_timeout: settings.wait_timeout,
            poll_interval: settings.wait_poll_interval,
        })
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<url::Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid relay path {path}"))
    }

    async fn fetch_receipt(&self, pending: &PendingBundle) -> anyhow::Result<Option<ReceiptResponse>> {
        let url = self.endpoint(&format!("bundles/{}/receipt", pending.id))?;
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }
}

#[async_trait]
impl Relayer for HttpRelayer {
    fn wallet(&self) -> Address {
        self.wallet
    }

    #[tracing::instrument(skip_all, fields(nonce = bundle.nonce, txs = bundle.transactions.len()))]
    async fn send_bundle(
        &self,
        bundle: &MetaTransactionBundle,
    ) -> Result<PendingBundle, RelayError> {
        let digest = bundle_digest(self.wallet, bundle.nonce, &bundle.transactions);
        let signature = self
            .signer
            .sign_message_sync(digest.as_slice())
            .map_err(|err| RelayError::Submit(err.into()))?;
        let request = BundleRequest {
            wallet: self.wallet,
            nonce: bundle.nonce,
            signature: Bytes::from(signature.as_bytes().to_vec()),
            txs: bundle
                .transactions
                .iter()
                .map(|tx| BundleTx {
                    to: tx.to,
                    data: &tx.data,
                    gas_limit: tx.gas_limit,
                    revert_on_error: false,
                })
                .collect(),
        };

        let url = self.endpoint("bundles").map_err(RelayError::Submit)?;
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|err| RelayError::Submit(err.into()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Submit(anyhow!(
                "relayer rejected bundle with {status}: {body}"
            )));
        }
        let pending: PendingBundle = response
            .json()
            .await
            .map_err(|err| RelayError::Submit(err.into()))?;
        tracing::info!(id = %pending.id, tx_hash = ?pending.tx_hash, "bundle accepted by relayer");
        Ok(pending)
    }

    async fn wait(&self, pending: &PendingBundle) -> Result<BundleReceipt, WaitError> {
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            match self.fetch_receipt(pending).await {
                Ok(Some(response)) => match response.status {
                    BundleStatus::Pending => {}
                    BundleStatus::Executed => {
                        return response.receipt.ok_or_else(|| {
                            WaitError::new(format!("bundle {} executed without receipt", pending.id))
                        });
                    }
                    BundleStatus::Failed => {
                        let message = response
                            .error
                            .unwrap_or_else(|| format!("bundle {} failed", pending.id));
                        let err = WaitError::new(message);
                        return Err(match response.receipt {
                            Some(receipt) => err.with_receipt(receipt),
                            None => err,
                        });
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(id = %pending.id, err = ?err, "failed to poll bundle receipt");
                }
            }
            if Instant::now() + self.poll_interval > deadline {
                return Err(WaitError::new(format!(
                    "timed out waiting for bundle {}",
                    pending.id
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Signature;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    fn relayer(server: &MockServer, signer: &PrivateKeySigner) -> HttpRelayer {
        let settings = RelaySettings {
            url: format!("{}/relay", server.uri()),
            rpc_url: "http://localhost:8545".to_string(),
            wallet: Address::repeat_byte(0x77),
            signer_private_key: hex::encode(signer.to_bytes()),
            wait_timeout: Duration::from_millis(500),
            wait_poll_interval: Duration::from_millis(20),
            request_timeout: Duration::from_secs(5),
        };
        HttpRelayer::new(&settings).unwrap()
    }

    fn bundle() -> MetaTransactionBundle {
        MetaTransactionBundle {
            nonce: 5,
            transactions: vec![MetaTransaction {
                to: Address::repeat_byte(1),
                data: Bytes::from(vec![0xde, 0xad]),
                gas_limit: 100_000,
            }],
            entries: vec![],
        }
    }

    #[tokio::test]
    async fn submits_signed_bundle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/relay/bundles"))
            .and(body_partial_json(json!({
                "wallet": Address::repeat_byte(0x77),
                "nonce": 5,
                "txs": [{"gasLimit": 100_000, "revertOnError": false, "data": "0xdead"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "b-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let signer = PrivateKeySigner::random();
        let relayer = relayer(&server, &signer);
        let pending = relayer.send_bundle(&bundle()).await.unwrap();
        assert_eq!(pending.id, "b-1");
        assert_eq!(pending.tx_hash, None);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let signature: Bytes = serde_json::from_value(body["signature"].clone()).unwrap();
        let signature = Signature::try_from(signature.as_ref()).unwrap();
        let digest = bundle_digest(Address::repeat_byte(0x77), 5, &bundle().transactions);
        assert_eq!(
            signature.recover_address_from_msg(digest.as_slice()).unwrap(),
            signer.address()
        );
    }

    #[tokio::test]
    async fn rejected_submission_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad nonce"))
            .mount(&server)
            .await;

        let err = relayer(&server, &PrivateKeySigner::random())
            .send_bundle(&bundle())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad nonce"));
    }

    #[tokio::test]
    async fn polls_until_receipt_is_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/relay/bundles/b-1/receipt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending"})))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/relay/bundles/b-1/receipt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "executed",
                "receipt": {
                    "transactionHash": B256::repeat_byte(2),
                    "blockNumber": "0x10",
                    "logs": [],
                },
            })))
            .mount(&server)
            .await;

        let pending = PendingBundle {
            id: "b-1".to_string(),
            tx_hash: None,
        };
        let receipt = relayer(&server, &PrivateKeySigner::random())
            .wait(&pending)
            .await
            .unwrap();
        assert_eq!(receipt.block_number, Some(16));
        assert_eq!(receipt.transaction_hash, B256::repeat_byte(2));
    }

    #[tokio::test]
    async fn failed_bundle_keeps_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failed",
                "error": "execution failed",
                "receipt": {"transactionHash": B256::repeat_byte(3), "logs": []},
            })))
            .mount(&server)
            .await;

        let pending = PendingBundle {
            id: "b-2".to_string(),
            tx_hash: None,
        };
        let err = relayer(&server, &PrivateKeySigner::random())
            .wait(&pending)
            .await
            .unwrap_err();
        assert_eq!(err.message, "execution failed");
        assert_eq!(err.receipt.unwrap().transaction_hash, B256::repeat_byte(3));
    }

    #[tokio::test]
    async fn gives_up_after_wait_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let pending = PendingBundle {
            id: "b-3".to_string(),
            tx_hash: None,
        };
        let err = relayer(&server, &PrivateKeySigner::random())
            .wait(&pending)
            .await
            .unwrap_err();
        assert!(err.receipt.is_none());
        assert!(err.message.contains("timed out"));
    }
}
