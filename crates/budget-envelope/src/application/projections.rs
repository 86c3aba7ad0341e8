//! Read-side projections of envelopes: one summary row per envelope and
//! one ledger row per balance movement.

use std::sync::Arc;

use async_trait::async_trait;
use budget_core::error::DomainError;
use budget_core::money::{Amount, Currency};
use budget_core::projection::{ProjectionHandler, ReadModel, ReadModelRepository};
use budget_core::registry::EventTypeRegistry;
use budget_core::repository::StoredEvent;
use budget_projection::is_stale;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::events::BudgetEnvelopeEventKind;

/// Denormalized view of one envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetEnvelopeSummary {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// The owner.
    pub user_id: Uuid,
    /// Display name.
    pub name: String,
    /// The most the envelope may hold.
    pub targeted_amount: Amount,
    /// What the envelope holds.
    pub current_amount: Amount,
    /// Envelope currency.
    pub currency: Currency,
    /// Set once the envelope is deleted.
    pub deleted: bool,
    /// Stream version of the last event folded in.
    pub last_version: i64,
}

impl ReadModel for BudgetEnvelopeSummary {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.budget_envelope_id
    }
}

/// Maintains [`BudgetEnvelopeSummary`] rows.
pub struct BudgetEnvelopeSummaryProjection {
    registry: Arc<EventTypeRegistry<BudgetEnvelopeEventKind>>,
    views: Arc<dyn ReadModelRepository<BudgetEnvelopeSummary>>,
}

impl std::fmt::Debug for BudgetEnvelopeSummaryProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetEnvelopeSummaryProjection")
            .finish_non_exhaustive()
    }
}

impl BudgetEnvelopeSummaryProjection {
    /// Creates the projection over a read-model repository.
    #[must_use]
    pub fn new(
        registry: Arc<EventTypeRegistry<BudgetEnvelopeEventKind>>,
        views: Arc<dyn ReadModelRepository<BudgetEnvelopeSummary>>,
    ) -> Self {
        Self { registry, views }
    }

    fn fold(
        existing: Option<BudgetEnvelopeSummary>,
        kind: BudgetEnvelopeEventKind,
        stream_version: i64,
    ) -> Result<Option<BudgetEnvelopeSummary>, DomainError> {
        let mut summary = match (existing, kind) {
            (_, BudgetEnvelopeEventKind::Created(p)) => BudgetEnvelopeSummary {
                budget_envelope_id: p.budget_envelope_id,
                user_id: p.user_id,
                name: p.name,
                targeted_amount: p.targeted_amount,
                current_amount: Amount::ZERO,
                currency: p.currency,
                deleted: false,
                last_version: stream_version,
            },
            (None, _) => return Ok(None),
            (Some(mut summary), BudgetEnvelopeEventKind::Credited(p)) => {
                summary.current_amount = summary.current_amount.checked_add(p.amount)?;
                summary
            }
            (Some(mut summary), BudgetEnvelopeEventKind::Debited(p)) => {
                summary.current_amount = summary.current_amount.checked_sub(p.amount)?;
                summary
            }
            (Some(mut summary), BudgetEnvelopeEventKind::Renamed(p)) => {
                summary.name = p.name;
                summary
            }
            (Some(mut summary), BudgetEnvelopeEventKind::TargetedAmountChanged(p)) => {
                summary.targeted_amount = p.targeted_amount;
                summary
            }
            (Some(mut summary), BudgetEnvelopeEventKind::Deleted(_)) => {
                summary.deleted = true;
                summary
            }
            (Some(mut summary), BudgetEnvelopeEventKind::Rewound(p)) => {
                summary.name = p.name;
                summary.targeted_amount = p.targeted_amount;
                summary.current_amount = p.current_amount;
                summary.currency = p.currency;
                summary
            }
        };
        summary.last_version = stream_version;
        Ok(Some(summary))
    }
}

#[async_trait]
impl ProjectionHandler for BudgetEnvelopeSummaryProjection {
    fn name(&self) -> &'static str {
        "budget_envelope_summary"
    }

    fn handles(&self, event_type: &str) -> bool {
        self.registry.contains(event_type)
    }

    async fn handle(&self, event: &StoredEvent) -> Result<(), DomainError> {
        let existing = self.views.find_one(&event.aggregate_id).await?;
        if is_stale(existing.as_ref().map(|s| s.last_version), event.stream_version) {
            debug!(
                budget_envelope_id = %event.aggregate_id,
                stream_version = event.stream_version,
                "stale event skipped"
            );
            return Ok(());
        }
        let kind = self.registry.decode(event)?;
        match Self::fold(existing, kind, event.stream_version)? {
            Some(summary) => self.views.save(summary).await,
            None => {
                warn!(
                    budget_envelope_id = %event.aggregate_id,
                    event_type = %event.event_type,
                    "event for an envelope with no summary row"
                );
                Ok(())
            }
        }
    }
}

/// What moved the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    /// Money came in.
    Credit,
    /// Money went out.
    Debit,
    /// The balance was reset by a rewind; `amount` is the new balance.
    Rewind,
}

/// One balance movement of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetEnvelopeLedgerEntry {
    /// The envelope identifier.
    pub budget_envelope_id: Uuid,
    /// Version of the event that moved the balance.
    pub stream_version: i64,
    /// The owner.
    pub user_id: Uuid,
    /// Kind of movement.
    pub kind: LedgerEntryKind,
    /// Amount moved.
    pub amount: Amount,
    /// Free-form note.
    pub description: String,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
}

impl ReadModel for BudgetEnvelopeLedgerEntry {
    type Key = (Uuid, i64);

    fn key(&self) -> (Uuid, i64) {
        (self.budget_envelope_id, self.stream_version)
    }
}

/// Maintains [`BudgetEnvelopeLedgerEntry`] rows. Each row is keyed by the
/// event that produced it, so a redelivered event overwrites its own row.
pub struct BudgetEnvelopeLedgerProjection {
    registry: Arc<EventTypeRegistry<BudgetEnvelopeEventKind>>,
    entries: Arc<dyn ReadModelRepository<BudgetEnvelopeLedgerEntry>>,
}

impl std::fmt::Debug for BudgetEnvelopeLedgerProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetEnvelopeLedgerProjection")
            .finish_non_exhaustive()
    }
}

impl BudgetEnvelopeLedgerProjection {
    /// Creates the projection over a read-model repository.
    #[must_use]
    pub fn new(
        registry: Arc<EventTypeRegistry<BudgetEnvelopeEventKind>>,
        entries: Arc<dyn ReadModelRepository<BudgetEnvelopeLedgerEntry>>,
    ) -> Self {
        Self { registry, entries }
    }
}

#[async_trait]
impl ProjectionHandler for BudgetEnvelopeLedgerProjection {
    fn name(&self) -> &'static str {
        "budget_envelope_ledger"
    }

    fn handles(&self, event_type: &str) -> bool {
        matches!(
            event_type,
            "budget_envelope.credited" | "budget_envelope.debited" | "budget_envelope.rewound"
        )
    }

    async fn handle(&self, event: &StoredEvent) -> Result<(), DomainError> {
        let (user_id, kind, amount, description) = match self.registry.decode(event)? {
            BudgetEnvelopeEventKind::Credited(p) => {
                (p.user_id, LedgerEntryKind::Credit, p.amount, p.description)
            }
            BudgetEnvelopeEventKind::Debited(p) => {
                (p.user_id, LedgerEntryKind::Debit, p.amount, p.description)
            }
            BudgetEnvelopeEventKind::Rewound(p) => (
                p.user_id,
                LedgerEntryKind::Rewind,
                p.current_amount,
                format!("rewound to {}", p.desired_date_time.to_rfc3339()),
            ),
            _ => return Ok(()),
        };
        self.entries
            .save(BudgetEnvelopeLedgerEntry {
                budget_envelope_id: event.aggregate_id,
                stream_version: event.stream_version,
                user_id,
                kind,
                amount,
                description,
                occurred_at: event.occurred_at,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use budget_core::clock::SystemClock;
    use budget_event_store::codec::PayloadDecoder;
    use budget_projection::bus::InlinePublisher;
    use budget_projection::checkpoint::InMemoryCheckpointStore;
    use budget_projection::dispatcher::ProjectionDispatcher;
    use budget_projection::read_model::InMemoryReadModelRepository;
    use budget_test_support::TestStore;

    use super::*;
    use crate::application::command_handlers::{
        BudgetEnvelopeRepository, budget_envelope_repository, handle_create, handle_credit,
        handle_debit,
    };
    use crate::domain::commands::{CreateBudgetEnvelope, CreditBudgetEnvelope, DebitBudgetEnvelope};
    use crate::domain::events::budget_envelope_event_registry;

    struct Fixture {
        store: TestStore,
        repo: BudgetEnvelopeRepository,
        views: Arc<InMemoryReadModelRepository<BudgetEnvelopeSummary>>,
        ledger: Arc<InMemoryReadModelRepository<BudgetEnvelopeLedgerEntry>>,
        handlers: Vec<Arc<dyn ProjectionHandler>>,
        decoder: Arc<PayloadDecoder>,
    }

    impl Fixture {
        /// A dispatcher over the shared log with its own, empty, checkpoints.
        fn dispatcher(&self) -> ProjectionDispatcher {
            dispatcher(&self.store, &self.decoder, &self.handlers)
        }
    }

    fn dispatcher(
        store: &TestStore,
        decoder: &Arc<PayloadDecoder>,
        handlers: &[Arc<dyn ProjectionHandler>],
    ) -> ProjectionDispatcher {
        handlers.iter().fold(
            ProjectionDispatcher::new(
                store.log.clone(),
                decoder.clone(),
                Arc::new(InMemoryCheckpointStore::new()),
            ),
            |dispatcher, handler| dispatcher.register(handler.clone()),
        )
    }

    fn fixture() -> Fixture {
        let store = TestStore::new();
        let registry = Arc::new(budget_envelope_event_registry().unwrap());
        let views = Arc::new(InMemoryReadModelRepository::<BudgetEnvelopeSummary>::new());
        let ledger = Arc::new(InMemoryReadModelRepository::<BudgetEnvelopeLedgerEntry>::new());
        let handlers: Vec<Arc<dyn ProjectionHandler>> = vec![
            Arc::new(BudgetEnvelopeSummaryProjection::new(registry.clone(), views.clone())),
            Arc::new(BudgetEnvelopeLedgerProjection::new(registry.clone(), ledger.clone())),
        ];
        let decoder = Arc::new(PayloadDecoder::new(store.context.codec.clone()).with_registry(&registry));
        let publisher = InlinePublisher::new(Arc::new(dispatcher(&store, &decoder, &handlers)));
        let context = store.context_with_publisher(Arc::new(publisher));
        Fixture {
            repo: budget_envelope_repository(context).unwrap(),
            store,
            views,
            ledger,
            handlers,
            decoder,
        }
    }

    async fn seed(fx: &Fixture, envelope_id: Uuid, user_id: Uuid) {
        handle_create(
            &CreateBudgetEnvelope {
                correlation_id: Uuid::new_v4(),
                budget_envelope_id: envelope_id,
                user_id,
                name: "Car".to_owned(),
                targeted_amount: "1000".parse().unwrap(),
                currency: Currency::new("EUR").unwrap(),
            },
            &SystemClock,
            &fx.repo,
        )
        .await
        .unwrap();
        handle_credit(
            &CreditBudgetEnvelope {
                correlation_id: Uuid::new_v4(),
                budget_envelope_id: envelope_id,
                user_id,
                amount: "300".parse().unwrap(),
                description: "january".to_owned(),
            },
            &SystemClock,
            &fx.repo,
        )
        .await
        .unwrap();
        handle_debit(
            &DebitBudgetEnvelope {
                correlation_id: Uuid::new_v4(),
                budget_envelope_id: envelope_id,
                user_id,
                amount: "45.5".parse().unwrap(),
                description: "tyres".to_owned(),
            },
            &SystemClock,
            &fx.repo,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_summary_and_ledger_follow_saved_events() {
        // Arrange
        let fx = fixture();
        let envelope_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        // Act
        seed(&fx, envelope_id, user_id).await;

        // Assert
        let summary = fx.views.find_one(&envelope_id).await.unwrap().unwrap();
        assert_eq!(summary.current_amount.cents(), 25_450);
        assert_eq!(summary.last_version, 2);
        let ledger = fx.ledger.find_all().await.unwrap();
        let kinds: Vec<_> = ledger.iter().map(|e| (e.stream_version, e.kind)).collect();
        assert_eq!(kinds, vec![(1, LedgerEntryKind::Credit), (2, LedgerEntryKind::Debit)]);
        assert_eq!(ledger[1].description, "tyres");
    }

    #[tokio::test]
    async fn test_redelivery_changes_nothing() {
        // Arrange
        let fx = fixture();
        let envelope_id = Uuid::new_v4();
        seed(&fx, envelope_id, Uuid::new_v4()).await;
        let summary_before = fx.views.find_one(&envelope_id).await.unwrap();
        let ledger_before = fx.ledger.find_all().await.unwrap();

        // Act
        let outcome = fx.dispatcher().catch_up().await;

        // Assert
        assert!(outcome.is_clean());
        assert_eq!(outcome.applied(), 5);
        assert_eq!(fx.views.find_one(&envelope_id).await.unwrap(), summary_before);
        assert_eq!(fx.ledger.find_all().await.unwrap(), ledger_before);
    }
}
