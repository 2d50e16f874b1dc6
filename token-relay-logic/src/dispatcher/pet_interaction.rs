use super::{BlockTimestamps, DispatchContext, EventDispatcher, Outgoing};
use crate::{
    abi::IPetInteraction,
    database::{PetInteractionRecord, RelayDatabase},
    error::DispatchError,
    notify::{NotificationSink, event_with_address, events},
};
use alloy::{
    primitives::{Address, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PetStage {
    BlobOne,
    BlobTwo,
    FinalForm,
}

impl PetStage {
    /// Stage name clients display.
    fn name(self) -> &'static str {
        match self {
            Self::BlobOne => "One",
            Self::BlobTwo => "Two",
            Self::FinalForm => "final_form",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PetEvent {
    Interaction(PetInteractionRecord),
    StageReached {
        account: Address,
        pet_token_id: U256,
        stage: PetStage,
    },
}

fn stage_of(log: &Log) -> Option<PetStage> {
    match log.topic0() {
        Some(&IPetInteraction::LogPetReachBlobOneEvent::SIGNATURE_HASH) => Some(PetStage::BlobOne),
        Some(&IPetInteraction::LogPetReachBlobTwoEvent::SIGNATURE_HASH) => Some(PetStage::BlobTwo),
        Some(&IPetInteraction::LogPetReachFinalFormEvent::SIGNATURE_HASH) => {
            Some(PetStage::FinalForm)
        }
        _ => None,
    }
}

fn is_pet_event(log: &Log) -> bool {
    log.topic0() == Some(&IPetInteraction::LogPetInteractionEvent::SIGNATURE_HASH)
        || stage_of(log).is_some()
}

pub(crate) fn decode_pet_event(
    log: &Log,
    timestamp: NaiveDateTime,
) -> Result<Option<PetEvent>, DispatchError> {
    if log.topic0() == Some(&IPetInteraction::LogPetInteractionEvent::SIGNATURE_HASH) {
        let event = log
            .log_decode::<IPetInteraction::LogPetInteractionEvent>()
            .context("failed to decode LogPetInteractionEvent")
            .map_err(DispatchError::Other)?
            .inner
            .data;
        return Ok(Some(PetEvent::Interaction(PetInteractionRecord {
            tx_hash: log.transaction_hash.unwrap_or_default(),
            log_index: log.log_index.unwrap_or_default(),
            block_number: log.block_number.unwrap_or_default(),
            account: event.from,
            pet_token_id: event.petTokenId,
            item_token_id: event.itemTokenId,
            timestamp,
        })));
    }

    // The three stage events share one layout.
    let Some(stage) = stage_of(log) else {
        return Ok(None);
    };
    let (account, pet_token_id) = match stage {
        PetStage::BlobOne => {
            let event = log
                .log_decode::<IPetInteraction::LogPetReachBlobOneEvent>()
                .context("failed to decode LogPetReachBlobOneEvent")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            (event.from, event.petTokenId)
        }
        PetStage::BlobTwo => {
            let event = log
                .log_decode::<IPetInteraction::LogPetReachBlobTwoEvent>()
                .context("failed to decode LogPetReachBlobTwoEvent")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            (event.from, event.petTokenId)
        }
        PetStage::FinalForm => {
            let event = log
                .log_decode::<IPetInteraction::LogPetReachFinalFormEvent>()
                .context("failed to decode LogPetReachFinalFormEvent")
                .map_err(DispatchError::Other)?
                .inner
                .data;
            (event.from, event.petTokenId)
        }
    };
    Ok(Some(PetEvent::StageReached {
        account,
        pet_token_id,
        stage,
    }))
}

fn notification(event: &PetEvent) -> Outgoing {
    match event {
        PetEvent::Interaction(record) => Outgoing {
            event: event_with_address(events::PET_INTERACTION_APPLIED, &record.account),
            payload: json!({
                "type": "PET_INTERACTION_APPLIED",
                "account": record.account,
                "coolpetTokenId": record.pet_token_id.to_string(),
                "itemTokenId": record.item_token_id.to_string(),
            }),
            address_hint: Some(record.account),
        },
        PetEvent::StageReached {
            account,
            pet_token_id,
            stage,
        } => Outgoing {
            event: event_with_address(events::PET_STAGE_REACHED, account),
            payload: json!({
                "type": "PET_STAGE_REACHED",
                "account": account,
                "petTokenId": pet_token_id.to_string(),
                "stage": stage.name(),
            }),
            address_hint: Some(*account),
        },
    }
}

/// Item interactions and stage changes of pets.
pub struct PetInteractionDispatcher {
    db: RelayDatabase,
    notifier: Arc<dyn NotificationSink>,
}

impl PetInteractionDispatcher {
    pub fn new(db: RelayDatabase, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { db, notifier }
    }
}

#[async_trait]
impl EventDispatcher for PetInteractionDispatcher {
    #[tracing::instrument(skip_all, fields(contract = %ctx.contract.code, logs = logs.len()))]
    async fn parse_events(
        &self,
        logs: &[Log],
        ctx: &DispatchContext<'_>,
    ) -> Result<(), DispatchError> {
        let mut timestamps = BlockTimestamps::default();
        let mut decoded = Vec::new();
        for log in logs {
            if !is_pet_event(log) {
                continue;
            }
            let timestamp = timestamps.get(ctx.provider, log).await?;
            if let Some(event) = decode_pet_event(log, timestamp)? {
                decoded.push(event);
            }
        }

        let interactions = decoded
            .iter()
            .filter_map(|event| match event {
                PetEvent::Interaction(record) => Some(record.clone()),
                PetEvent::StageReached { .. } => None,
            })
            .collect();
        self.db
            .record_pet_interactions(ctx.contract.id, interactions)
            .await?;
        for event in &decoded {
            notification(event).send(self.notifier.as_ref());
        }
        Ok(())
    }
}
