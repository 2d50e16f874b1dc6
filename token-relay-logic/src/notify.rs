//! Best-effort client notifications.
//!
//! Delivery never blocks or fails the caller: [`PusherNotifier`] retries in a
//! background task and drops the message once retries run out.

use crate::settings::NotifierSettings;
use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

const IDEMPOTENCY_NAMESPACE: Uuid = uuid::uuid!("609c1ac0-8218-49a7-ab19-4277cf90e899");
const MAX_TEXT_LEN: usize = 256;
const TRUNCATED_FIELDS: [&str; 2] = ["errorMessage", "reason"];

pub mod events {
    pub const BUY_BOX_TRANSACTION_SENT: &str = "buy-box-transaction-sent";
    pub const BUY_ACTION_TRANSACTION_SENT: &str = "buy-action-transaction-sent";
    pub const BOX_OPENED_TRANSACTION_SENT: &str = "box-opened-transaction-sent";
    pub const GOLD_CLAIM_TRANSACTION_SENT: &str = "gold-claim-transaction-sent";
    pub const GOLD_CLAIMED: &str = "gold-claimed";
    pub const USER_CONNECTED: &str = "user-connected";
    pub const USER_DISCONNECTED: &str = "user-disconnected";
    pub const BLOCKCHAIN_ERROR: &str = "blockchain-error";
    pub const DATABASE_ERROR: &str = "database-error";
    pub const PET_INTERACTION_TRANSACTION_SENT: &str = "pet-interaction-transaction-sent";
    pub const CREATE_LISTING_TRANSACTION_SENT: &str = "create-listing-transaction-sent";
    pub const REMOVE_LISTING_TRANSACTION_SENT: &str = "remove-listing-transaction-sent";
    pub const BUY_LISTING_TRANSACTION_SENT: &str = "buy-listing-transaction-sent";
    pub const ROLL_USER_QUEST_TRANSACTION_SENT: &str = "roll-user-quest-transaction-sent";
    pub const COMPLETE_QUEST_TRANSACTION_SENT: &str = "complete-quest-transaction-sent";
    pub const STAKE_PET_TRANSACTION_SENT: &str = "stake-pet-transaction-sent";
    pub const UN_STAKE_PET_TRANSACTION_SENT: &str = "un-stake-pet-transaction-sent";
    pub const ADVENTURE_GOLD_CLAIM_TRANSACTION_SENT: &str =
        "adventure-gold-claim-transaction-sent";
    pub const ADVENTURE_GOLD_CLAIMED: &str = "adventure-gold-claimed";
    pub const BUY_BOX_MINTED: &str = "buy-box-minted";
    pub const BOX_OPENED: &str = "box-opened";
    pub const PET_INTERACTION_APPLIED: &str = "pet-interaction-applied";
    pub const PET_STAGE_REACHED: &str = "pet-stage-reached";
    pub const LISTING_CREATED: &str = "listing-created";
    pub const LISTING_REMOVED: &str = "listing-removed";
    pub const LISTING_BOUGHT: &str = "listing-bought";
}

/// First ten hex characters of the address, uppercased.
fn address_suffix(address: &Address) -> String {
    hex::encode(address.as_slice())[..10].to_uppercase()
}

/// Event name scoped to one user, e.g. `gold-claimed-0A1B2C3D4E`.
pub fn event_with_address(event: &str, address: &Address) -> String {
    format!("{event}-{}", address_suffix(address))
}

pub trait NotificationSink: Send + Sync {
    /// Queues a notification. Never fails and never waits for delivery.
    fn send(&self, event: &str, payload: Value, address_hint: Option<Address>);
}

pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn send(&self, event: &str, _payload: Value, _address_hint: Option<Address>) {
        tracing::debug!(event, "notifications disabled, dropping");
    }
}

#[derive(Debug, Serialize)]
struct TriggerRequest<'a> {
    channel: String,
    event: &'a str,
    data: TriggerData,
}

#[derive(Debug, Serialize)]
struct TriggerData {
    message: Value,
}

/// Truncates client-facing texts and stamps the payload with a
/// deterministic `uuid` so receivers can drop duplicates.
pub fn prepare_payload(mut payload: Value) -> Value {
    if let Value::Object(map) = &mut payload {
        for field in TRUNCATED_FIELDS {
            if let Some(Value::String(text)) = map.get_mut(field) {
                if text.chars().count() > MAX_TEXT_LEN {
                    *text = text.chars().take(MAX_TEXT_LEN).collect();
                }
            }
        }
        let serialized = Value::Object(map.clone()).to_string();
        let key = Uuid::new_v5(&IDEMPOTENCY_NAMESPACE, serialized.as_bytes());
        map.insert("uuid".to_string(), Value::String(key.to_string()));
    }
    payload
}

#[derive(Clone)]
pub struct PusherNotifier {
    client: reqwest::Client,
    url: url::Url,
    channel_prefix: String,
    retry_count: u32,
    retry_delay: Duration,
}

impl PusherNotifier {
    pub fn new(url: url::Url, settings: &NotifierSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build notifier http client")?;
        Ok(Self {
            client,
            url,
            channel_prefix: settings.channel_prefix.clone(),
            retry_count: settings.retry_count,
            retry_delay: settings.retry_delay,
        })
    }

    /// Notifier configured by settings, or a no-op one when disabled.
    pub fn from_settings(settings: &NotifierSettings) -> Result<Arc<dyn NotificationSink>> {
        match (&settings.url, settings.enabled) {
            (Some(url), true) => {
                let url = url.parse().context("invalid notifier url")?;
                Ok(Arc::new(Self::new(url, settings)?))
            }
            _ => {
                tracing::info!("client notifications are disabled");
                Ok(Arc::new(NoopNotifier))
            }
        }
    }

    pub fn channel(&self, address_hint: Option<&Address>) -> String {
        match address_hint {
            Some(address) => format!("{}-{}", self.channel_prefix, address_suffix(address)),
            None => self.channel_prefix.clone(),
        }
    }

    async fn trigger(&self, request: &TriggerRequest<'_>) -> Result<()> {
        self.client
            .post(self.url.clone())
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Delivers one notification, retrying with a fixed delay. Returns
    /// whether the notification was accepted.
    pub async fn deliver(&self, event: &str, payload: Value, address_hint: Option<Address>) -> bool {
        let request = TriggerRequest {
            channel: self.channel(address_hint.as_ref()),
            event,
            data: TriggerData {
                message: prepare_payload(payload),
            },
        };

        let mut attempt = 0;
        loop {
            match self.trigger(&request).await {
                Ok(()) => return true,
                Err(err) if attempt < self.retry_count => {
                    attempt += 1;
                    tracing::warn!(event, attempt, err = ?err, "notification failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => {
                    tracing::error!(
                        event,
                        channel = %request.channel,
                        payload = %request.data.message,
                        err = ?err,
                        "dropping notification after retries"
                    );
                    return false;
                }
            }
        }
    }
}

impl NotificationSink for PusherNotifier {
    fn send(&self, event: &str, payload: Value, address_hint: Option<Address>) {
        let this = self.clone();
        let event = event.to_string();
        tokio::spawn(async move {
            this.deliver(&event, payload, address_hint).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    fn settings() -> NotifierSettings {
        NotifierSettings {
            enabled: true,
            retry_count: 2,
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn notifier(server: &MockServer) -> PusherNotifier {
        let url = format!("{}/events", server.uri()).parse().unwrap();
        PusherNotifier::new(url, &settings()).unwrap()
    }

    #[rstest]
    #[case("gold-claimed", address!("0x0a1b2c3d4e5f60718293a4b5c6d7e8f901234567"), "gold-claimed-0A1B2C3D4E")]
    #[case("blockchain-error", Address::ZERO, "blockchain-error-0000000000")]
    fn formats_event_with_address(#[case] event: &str, #[case] addr: Address, #[case] expected: &str) {
        assert_eq!(event_with_address(event, &addr), expected);
    }

    #[test]
    fn truncates_texts_and_adds_stable_key() {
        let long = "x".repeat(300);
        let payload = json!({"type": "BUY_BOX", "errorMessage": long, "reason": "short"});
        let first = prepare_payload(payload.clone());
        let second = prepare_payload(payload);

        assert_eq!(first["errorMessage"].as_str().unwrap().len(), MAX_TEXT_LEN);
        assert_eq!(first["reason"], "short");
        assert_eq!(first["uuid"], second["uuid"]);
        assert_ne!(
            prepare_payload(json!({"type": "OPEN_BOX"}))["uuid"],
            first["uuid"]
        );
    }

    #[tokio::test]
    async fn delivers_to_address_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .and(body_partial_json(json!({
                "channel": "token-relay-0A1B2C3D4E",
                "event": "user-connected-0A1B2C3D4E",
                "data": {"message": {"type": "CONNECT_USER"}},
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let user = address!("0x0a1b2c3d4e5f60718293a4b5c6d7e8f901234567");
        let delivered = notifier(&server)
            .await
            .deliver(
                &event_with_address(events::USER_CONNECTED, &user),
                json!({"type": "CONNECT_USER"}),
                Some(user),
            )
            .await;
        assert!(delivered);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let delivered = notifier(&server)
            .await
            .deliver(events::GOLD_CLAIMED, json!({}), None)
            .await;
        assert!(!delivered);
    }

    #[test]
    fn disabled_settings_build_noop() {
        assert!(PusherNotifier::from_settings(&NotifierSettings::default()).is_ok());
        let broken = NotifierSettings {
            enabled: true,
            url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(PusherNotifier::from_settings(&broken).is_err());
    }
}
