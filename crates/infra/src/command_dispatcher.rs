//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate's stream from the store
//!   ↓
//! 2. Validate and rehydrate (apply history to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed events to the bus (best-effort)
//! ```
//!
//! Step 4 is the serialization point for every shared piece of state in the
//! engine: a catalog item's stock, an order's status and an owner's active
//! order slot. When another writer commits first the append fails with
//! [`DispatchError::Concurrency`] and [`CommandDispatcher::dispatch_with_retry`]
//! re-runs steps 1–4 against the fresh stream.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use brewforce_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use brewforce_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The aggregate refused the command (deterministic; never retried).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Optimistic concurrency failure (stale stream version).
    #[error("optimistic concurrency conflict: {0}")]
    Concurrency(String),

    /// A historical payload does not decode into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// The loaded stream is out of order or belongs to another aggregate.
    #[error("corrupt event stream: {0}")]
    StreamIntegrity(String),

    /// The event store failed.
    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Result of a successful dispatch: the aggregate after the new events were
/// applied, plus the committed events (empty when the command was a no-op).
#[derive(Debug)]
pub struct Dispatched<A> {
    pub aggregate: A,
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and the bus so the same pipeline runs on
/// `InMemoryEventStore` in tests and on `PostgresEventStore` in production.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate from its stream without deciding anything.
    ///
    /// A missing stream yields the fresh aggregate from `make_aggregate`
    /// (version 0).
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce() -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate();
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command once through the full pipeline.
    ///
    /// Fails with [`DispatchError::Concurrency`] when another writer appended
    /// to the stream between load and append.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce() -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: brewforce_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load + rehydrate
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate();
        apply_history(&mut aggregate, &history)?;

        // 2) Decide (no mutation)
        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                committed: vec![],
            });
        }

        // 3) Persist (append-only, optimistic)
        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for ev in &decided {
            aggregate.apply(ev);
        }

        // 4) Publish after append. The store is the source of truth, so a
        //    failed publish is logged and the command still succeeds.
        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                warn!(
                    aggregate_id = %stored.aggregate_id,
                    sequence_number = stored.sequence_number,
                    event_type = %stored.event_type,
                    error = ?err,
                    "failed to publish committed event"
                );
            }
        }

        Ok(Dispatched { aggregate, committed })
    }

    /// Dispatch, re-deciding against fresh state on concurrency conflicts.
    ///
    /// Gives up after `max_attempts` attempts (at least one is always made) with
    /// [`DispatchError::Concurrency`]. Domain refusals are returned immediately.
    pub fn dispatch_with_retry<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        max_attempts: u32,
        make_aggregate: impl Fn() -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: brewforce_events::Event + Serialize + DeserializeOwned,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.dispatch(aggregate_id, aggregate_type, command, &make_aggregate) {
                Err(DispatchError::Concurrency(msg)) if attempt < max_attempts => {
                    debug!(
                        %aggregate_id,
                        aggregate_type,
                        attempt,
                        reason = %msg,
                        "optimistic conflict, retrying"
                    );
                    attempt += 1;
                }
                Err(DispatchError::Concurrency(msg)) => {
                    return Err(DispatchError::Concurrency(format!(
                        "gave up after {attempt} attempts: {msg}"
                    )));
                }
                other => return other,
            }
        }
    }

    /// Dispatch until the command commits or is refused, however many
    /// optimistic conflicts that takes.
    ///
    /// For compensations (giving stock back, freeing a slot) that must not be
    /// dropped once the step they undo is decided. Every conflict means another
    /// writer committed, so the loop always makes global progress.
    pub fn dispatch_until_committed<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn() -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: brewforce_events::Event + Serialize + DeserializeOwned,
    {
        let mut attempt: u64 = 1;
        loop {
            match self.dispatch(aggregate_id, aggregate_type, command, &make_aggregate) {
                Err(DispatchError::Concurrency(msg)) => {
                    debug!(
                        %aggregate_id,
                        aggregate_type,
                        attempt,
                        reason = %msg,
                        "optimistic conflict on compensation, retrying"
                    );
                    attempt += 1;
                    std::thread::yield_now();
                }
                other => return other,
            }
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    // Defend against a backend returning foreign or reordered events.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::StreamIntegrity(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::StreamIntegrity(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(format!("{} #{}: {e}", stored.event_type, stored.sequence_number)))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
