//! Facade wiring the signing components over one storage backend.

use crate::aggregator::{CompletionAggregator, ExecutionReport};
use crate::clock::Clock;
use crate::config::SigningConfig;
use crate::context::SigningContext;
use crate::dispatch::{EmailDelivery, InvitationDispatcher};
use crate::error::{SigningError, SigningResult};
use crate::machine::ParticipantStateMachine;
use crate::registry::ParticipantRegistry;
use crate::token::TokenIssuer;
use cosign_storage::{
    ContractStore, CosignStorage, InMemoryCosignStorage, QueryWindow, SigningEvent,
    SigningEventKind, SigningEventRecord, SigningEventStore, StorageError,
};
use cosign_types::{ContractId, ContractRecord, PrimarySignature};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// A contract announced by the contract source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractRegistration {
    /// Keep the caller's id when the contract already exists elsewhere.
    #[serde(default)]
    pub id: Option<ContractId>,
    pub contract_number: String,
    #[serde(default)]
    pub primary: PrimarySignature,
}

impl ContractRegistration {
    pub fn new(contract_number: impl Into<String>) -> Self {
        Self {
            id: None,
            contract_number: contract_number.into(),
            primary: PrimarySignature::NotRequested,
        }
    }

    pub fn with_primary(mut self, primary: PrimarySignature) -> Self {
        self.primary = primary;
        self
    }
}

/// Entry point to multi-party signing.
#[derive(Clone)]
pub struct SigningService {
    ctx: SigningContext,
    issuer: TokenIssuer,
    registry: ParticipantRegistry,
    dispatcher: InvitationDispatcher,
    machine: ParticipantStateMachine,
    aggregator: CompletionAggregator,
}

impl SigningService {
    pub fn new(
        storage: Arc<dyn CosignStorage>,
        mailer: Arc<dyn EmailDelivery>,
        clock: Arc<dyn Clock>,
        config: SigningConfig,
    ) -> SigningResult<Self> {
        let ctx = SigningContext::new(storage, clock, config)?;
        let aggregator = CompletionAggregator::new(ctx.clone());
        let issuer = TokenIssuer::new(ctx.clone());
        let registry = ParticipantRegistry::new(ctx.clone(), aggregator.clone());
        let dispatcher =
            InvitationDispatcher::new(ctx.clone(), issuer.clone(), mailer, aggregator.clone());
        let machine = ParticipantStateMachine::new(ctx.clone(), aggregator.clone());

        Ok(Self {
            ctx,
            issuer,
            registry,
            dispatcher,
            machine,
            aggregator,
        })
    }

    /// Service over a fresh in-memory backend.
    pub fn in_memory(
        mailer: Arc<dyn EmailDelivery>,
        clock: Arc<dyn Clock>,
        config: SigningConfig,
    ) -> SigningResult<Self> {
        Self::new(Arc::new(InMemoryCosignStorage::new()), mailer, clock, config)
    }

    pub fn context(&self) -> &SigningContext {
        &self.ctx
    }

    pub fn config(&self) -> &SigningConfig {
        &self.ctx.config
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &InvitationDispatcher {
        &self.dispatcher
    }

    pub fn machine(&self) -> &ParticipantStateMachine {
        &self.machine
    }

    pub fn aggregator(&self) -> &CompletionAggregator {
        &self.aggregator
    }

    // Contract source-of-truth hooks

    pub async fn register_contract(
        &self,
        registration: ContractRegistration,
        actor: &str,
    ) -> SigningResult<ContractRecord> {
        let number = registration.contract_number.trim();
        if number.is_empty() {
            return Err(SigningError::InvalidInput(
                "contract_number must not be empty".to_string(),
            ));
        }

        let now = self.ctx.now();
        let mut record = ContractRecord::new(number, now).with_primary(registration.primary);
        if let Some(id) = registration.id {
            record = record.with_id(id);
        }
        let contract_id = record.id;

        self.ctx
            .storage
            .create_contract(record)
            .await
            .map_err(|err| match err {
                StorageError::Conflict(_) => SigningError::InvalidState(format!(
                    "contract {} is already registered",
                    contract_id
                )),
                other => SigningError::Storage(other),
            })?;

        self.ctx
            .record(
                SigningEvent::contract(
                    contract_id,
                    SigningEventKind::ContractRegistered,
                    actor,
                    now,
                )
                .with_payload(json!({ "contract_number": number })),
            )
            .await;
        info!(contract_id = %contract_id, contract_number = %number, "Contract registered");

        self.aggregator.recompute(&contract_id, actor).await?;
        self.ctx.contract(&contract_id).await
    }

    pub async fn get_contract(&self, contract_id: &ContractId) -> SigningResult<ContractRecord> {
        self.ctx.contract(contract_id).await
    }

    pub async fn list_contracts(&self, window: QueryWindow) -> SigningResult<Vec<ContractRecord>> {
        Ok(self.ctx.storage.list_contracts(window).await?)
    }

    /// The primary counterparty has been asked to sign.
    pub async fn request_primary_signature(
        &self,
        contract_id: &ContractId,
        actor: &str,
    ) -> SigningResult<ExecutionReport> {
        self.set_primary(
            contract_id,
            PrimarySignature::Awaiting,
            SigningEventKind::PrimarySignatureRequested,
            actor,
        )
        .await
    }

    /// The primary counterparty has signed.
    pub async fn record_primary_signature(
        &self,
        contract_id: &ContractId,
        actor: &str,
    ) -> SigningResult<ExecutionReport> {
        self.set_primary(
            contract_id,
            PrimarySignature::Signed,
            SigningEventKind::PrimarySignatureRecorded,
            actor,
        )
        .await
    }

    /// Void the contract. Outstanding signing links stop working.
    pub async fn void_contract(
        &self,
        contract_id: &ContractId,
        actor: &str,
    ) -> SigningResult<ExecutionReport> {
        let now = self.ctx.now();
        let record = self
            .ctx
            .storage
            .mark_voided(contract_id, now)
            .await
            .map_err(|e| SigningError::from_contract_write(e, *contract_id))?;

        self.ctx
            .record(SigningEvent::contract(
                record.id,
                SigningEventKind::ContractVoided,
                actor,
                now,
            ))
            .await;
        info!(contract_id = %contract_id, "Contract voided");

        self.aggregator.recompute(contract_id, actor).await
    }

    /// Current execution report, without writing.
    pub async fn report(&self, contract_id: &ContractId) -> SigningResult<ExecutionReport> {
        self.aggregator.report(contract_id).await
    }

    /// Signing event log of one contract, newest first.
    pub async fn events(
        &self,
        contract_id: &ContractId,
        window: QueryWindow,
    ) -> SigningResult<Vec<SigningEventRecord>> {
        self.ctx.contract(contract_id).await?;
        Ok(self.ctx.storage.list_events(contract_id, window).await?)
    }

    async fn set_primary(
        &self,
        contract_id: &ContractId,
        primary: PrimarySignature,
        kind: SigningEventKind,
        actor: &str,
    ) -> SigningResult<ExecutionReport> {
        let contract = self.ctx.contract(contract_id).await?;
        if contract.voided {
            return Err(SigningError::InvalidState(format!(
                "contract {} has been voided",
                contract.contract_number
            )));
        }

        let now = self.ctx.now();
        self.ctx
            .storage
            .set_primary_signature(contract_id, primary, now)
            .await
            .map_err(|e| SigningError::from_contract_write(e, *contract_id))?;

        self.ctx
            .record(SigningEvent::contract(*contract_id, kind, actor, now))
            .await;
        info!(contract_id = %contract_id, primary = ?primary, "Primary signature state updated");

        self.aggregator.recompute(contract_id, actor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mocks::RecordingMailer;
    use cosign_types::ExecutionStatus;

    fn service() -> SigningService {
        SigningService::in_memory(
            Arc::new(RecordingMailer::new()),
            Arc::new(ManualClock::starting_now()),
            SigningConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn register_and_drive_primary_signature() {
        let service = service();
        let contract = service
            .register_contract(ContractRegistration::new("  CTR-9001 "), "admin")
            .await
            .unwrap();
        assert_eq!(contract.contract_number, "CTR-9001");
        assert_eq!(contract.execution_status, ExecutionStatus::Draft);

        let report = service
            .request_primary_signature(&contract.id, "admin")
            .await
            .unwrap();
        assert_eq!(report.status, ExecutionStatus::AwaitingSignatures);

        let report = service
            .record_primary_signature(&contract.id, "admin")
            .await
            .unwrap();
        assert_eq!(report.status, ExecutionStatus::Executed);

        let events = service
            .events(&contract.id, QueryWindow::latest(10))
            .await
            .unwrap();
        assert_eq!(events[0].kind, SigningEventKind::ExecutionStatusChanged);
        assert_eq!(
            events.last().map(|e| e.kind),
            Some(SigningEventKind::ContractRegistered)
        );
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let service = service();
        let contract = service
            .register_contract(ContractRegistration::new("CTR-1"), "admin")
            .await
            .unwrap();

        let mut again = ContractRegistration::new("CTR-1");
        again.id = Some(contract.id);
        assert!(matches!(
            service.register_contract(again, "admin").await,
            Err(SigningError::InvalidState(_))
        ));
        assert!(matches!(
            service
                .register_contract(ContractRegistration::new("  "), "admin")
                .await,
            Err(SigningError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn voiding_is_final() {
        let service = service();
        let contract = service
            .register_contract(ContractRegistration::new("CTR-2"), "admin")
            .await
            .unwrap();

        let report = service.void_contract(&contract.id, "admin").await.unwrap();
        assert_eq!(report.status, ExecutionStatus::Void);
        assert!(matches!(
            service.record_primary_signature(&contract.id, "admin").await,
            Err(SigningError::InvalidState(_))
        ));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = SigningConfig {
            token_ttl_days: 0,
            ..Default::default()
        };
        let result = SigningService::in_memory(
            Arc::new(RecordingMailer::new()),
            Arc::new(ManualClock::starting_now()),
            config,
        );
        assert!(matches!(result, Err(SigningError::Config(_))));
    }
}
