//! Ticket state transitions.
//!
//! `TicketLifecycle` owns the [`TicketStore`] behind a single async mutex.
//! Every create, claim and close runs its check and its write inside that
//! lock, so two staff members racing on the same claim prompt cannot both
//! observe the ticket as unclaimed.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::ids::{TicketId, UserId};
use crate::domain::ticket::Ticket;
use crate::errors::{DomainError, TicketError};
use crate::store::TicketStore;

pub struct TicketLifecycle {
    store: Mutex<TicketStore>,
    audit: Arc<dyn AuditSink>,
}

impl TicketLifecycle {
    pub fn new(store: TicketStore, audit: Arc<dyn AuditSink>) -> Self {
        Self { store: Mutex::new(store), audit }
    }

    pub async fn create(
        &self,
        owner_id: UserId,
        owner_display_name: &str,
        initial_message: &str,
    ) -> Result<Ticket, TicketError> {
        let mut store = self.store.lock().await;

        if let Some(existing) = store.open_ticket(owner_id) {
            let error = TicketError::AlreadyOpen { owner_id, ticket_id: existing.id };
            self.reject("ticket.create_rejected", Some(existing.id), owner_id, &error);
            return Err(error);
        }

        let ticket = Ticket::open(
            store.next_id(),
            owner_id,
            owner_display_name,
            initial_message,
            Utc::now(),
        );
        store.put(ticket.clone())?;

        info!(
            event_name = "ticket.created",
            ticket_id = ticket.id.0,
            user_id = owner_id.0,
            "ticket created"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(ticket.id),
                "ticket.created",
                AuditCategory::Lifecycle,
                actor(owner_id),
                AuditOutcome::Success,
            )
            .with_metadata("owner_display_name", owner_display_name),
        );
        Ok(ticket)
    }

    /// Assigns the owner's open ticket to `staff_id`.
    pub async fn claim(&self, owner_id: UserId, staff_id: UserId) -> Result<Ticket, TicketError> {
        self.claim_inner(None, owner_id, staff_id).await
    }

    /// Like [`claim`](Self::claim), but only if the owner's open ticket is
    /// still `ticket_id`. Claim prompts use this so a prompt issued for an
    /// old ticket cannot claim the owner's newer one.
    pub async fn claim_ticket(
        &self,
        ticket_id: TicketId,
        owner_id: UserId,
        staff_id: UserId,
    ) -> Result<Ticket, TicketError> {
        self.claim_inner(Some(ticket_id), owner_id, staff_id).await
    }

    async fn claim_inner(
        &self,
        expected: Option<TicketId>,
        owner_id: UserId,
        staff_id: UserId,
    ) -> Result<Ticket, TicketError> {
        let mut store = self.store.lock().await;

        let current = store
            .open_ticket(owner_id)
            .filter(|ticket| expected.map_or(true, |expected| ticket.id == expected))
            .cloned();
        let Some(mut ticket) = current else {
            let error = TicketError::NotFound(owner_id);
            self.reject("ticket.claim_rejected", expected, staff_id, &error);
            return Err(error);
        };

        if let Err(domain_error) = ticket.claim(staff_id) {
            let error = match domain_error {
                DomainError::TicketAlreadyClaimed { ticket_id, claimed_by } => {
                    TicketError::AlreadyClaimed { ticket_id, claimed_by }
                }
                _ => TicketError::NotFound(owner_id),
            };
            self.reject("ticket.claim_rejected", Some(ticket.id), staff_id, &error);
            return Err(error);
        }
        store.put(ticket.clone())?;

        info!(
            event_name = "ticket.claimed",
            ticket_id = ticket.id.0,
            user_id = owner_id.0,
            staff_id = staff_id.0,
            "ticket claimed"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(ticket.id),
                "ticket.claimed",
                AuditCategory::Lifecycle,
                actor(staff_id),
                AuditOutcome::Success,
            )
            .with_metadata("owner_id", owner_id.to_string()),
        );
        Ok(ticket)
    }

    /// Closes the open ticket `caller` owns, or failing that the open ticket
    /// `caller` has claimed.
    pub async fn close(&self, caller: UserId) -> Result<Ticket, TicketError> {
        let mut store = self.store.lock().await;

        let target = store
            .open_ticket(caller)
            .or_else(|| store.find_open_claimed_by(caller))
            .cloned();
        let Some(mut ticket) = target else {
            let error = TicketError::NotFound(caller);
            self.reject("ticket.close_rejected", None, caller, &error);
            return Err(error);
        };

        ticket.close(Utc::now()).map_err(|_| TicketError::NotFound(caller))?;
        store.put(ticket.clone())?;

        let closed_by_owner = ticket.owner_id == caller;
        info!(
            event_name = "ticket.closed",
            ticket_id = ticket.id.0,
            user_id = ticket.owner_id.0,
            closed_by = caller.0,
            closed_by_owner,
            "ticket closed"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(ticket.id),
                "ticket.closed",
                AuditCategory::Lifecycle,
                actor(caller),
                AuditOutcome::Success,
            )
            .with_metadata("closed_by", if closed_by_owner { "owner" } else { "claimer" }),
        );
        Ok(ticket)
    }

    pub async fn ticket_for(&self, owner_id: UserId) -> Option<Ticket> {
        self.store.lock().await.get(owner_id).cloned()
    }

    pub async fn open_tickets(&self) -> Vec<Ticket> {
        self.store.lock().await.all_open().into_iter().cloned().collect()
    }

    /// Runs `read` against the store while holding the lifecycle lock.
    pub async fn read<R, F>(&self, read: F) -> R
    where
        F: FnOnce(&TicketStore) -> R,
    {
        let store = self.store.lock().await;
        read(&store)
    }

    fn reject(
        &self,
        event_type: &str,
        ticket_id: Option<TicketId>,
        actor_id: UserId,
        error: &TicketError,
    ) {
        info!(
            event_name = event_type,
            ticket_id = ticket_id.map(|id| id.0).unwrap_or_default(),
            user_id = actor_id.0,
            reason = %error,
            "ticket operation rejected"
        );
        self.audit.emit(
            AuditEvent::new(
                ticket_id,
                event_type,
                AuditCategory::Lifecycle,
                actor(actor_id),
                AuditOutcome::Rejected,
            )
            .with_metadata("reason", error.to_string()),
        );
    }
}

fn actor(user_id: UserId) -> String {
    format!("user:{user_id}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::Utc;
    use tempfile::TempDir;

    use super::TicketLifecycle;
    use crate::audit::{AuditOutcome, InMemoryAuditSink};
    use crate::domain::ids::{TicketId, UserId};
    use crate::domain::ticket::{Ticket, TicketStatus};
    use crate::errors::TicketError;
    use crate::store::TicketStore;

    const ALICE: UserId = UserId(100);
    const BOB: UserId = UserId(200);
    const CAROL: UserId = UserId(300);

    fn lifecycle() -> (TicketLifecycle, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::default();
        (TicketLifecycle::new(TicketStore::in_memory(), Arc::new(sink.clone())), sink)
    }

    async fn assert_single_open_ticket_per_owner(lifecycle: &TicketLifecycle) {
        let open = lifecycle.open_tickets().await;
        let mut per_owner: HashMap<UserId, usize> = HashMap::new();
        for ticket in &open {
            *per_owner.entry(ticket.owner_id).or_default() += 1;
        }
        assert!(per_owner.values().all(|count| *count == 1), "owners with >1 open: {per_owner:?}");
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids_and_open_state() {
        let (lifecycle, sink) = lifecycle();

        let ticket = lifecycle.create(ALICE, "alice", "help").await.expect("create");
        assert_eq!(ticket.id, TicketId(1));
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.claimed_by, None);
        assert_eq!(ticket.initial_message, "help");

        let second = lifecycle.create(BOB, "bob", "also help").await.expect("create");
        assert_eq!(second.id, TicketId(2));
        assert_eq!(sink.events_of_type("ticket.created").len(), 2);
    }

    #[tokio::test]
    async fn create_rejects_second_open_ticket() {
        let (lifecycle, sink) = lifecycle();
        lifecycle.create(ALICE, "alice", "help").await.expect("create");

        let error = lifecycle.create(ALICE, "alice", "again").await.expect_err("already open");
        assert!(matches!(
            error,
            TicketError::AlreadyOpen { owner_id: ALICE, ticket_id: TicketId(1) }
        ));
        let rejected = sink.events_of_type("ticket.create_rejected");
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].outcome, AuditOutcome::Rejected);
        assert_single_open_ticket_per_owner(&lifecycle).await;
    }

    #[tokio::test]
    async fn second_claim_fails_without_overwriting() {
        let (lifecycle, _) = lifecycle();
        lifecycle.create(ALICE, "alice", "help").await.expect("create");

        let claimed = lifecycle.claim(ALICE, BOB).await.expect("bob claims");
        assert_eq!(claimed.claimed_by, Some(BOB));

        let error = lifecycle.claim(ALICE, CAROL).await.expect_err("carol loses");
        assert!(matches!(
            error,
            TicketError::AlreadyClaimed { ticket_id: TicketId(1), claimed_by: BOB }
        ));
        let stored = lifecycle.ticket_for(ALICE).await.expect("ticket");
        assert_eq!(stored.claimed_by, Some(BOB));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_have_exactly_one_winner() {
        let (lifecycle, _) = lifecycle();
        let lifecycle = Arc::new(lifecycle);
        lifecycle.create(ALICE, "alice", "help").await.expect("create");

        let handles: Vec<_> = (0..16)
            .map(|staff| {
                let lifecycle = Arc::clone(&lifecycle);
                tokio::spawn(async move { lifecycle.claim(ALICE, UserId(1_000 + staff)).await })
            })
            .collect();

        let mut winners = Vec::new();
        let mut already_claimed = 0;
        for handle in handles {
            match handle.await.expect("join") {
                Ok(ticket) => winners.push(ticket.claimed_by),
                Err(TicketError::AlreadyClaimed { .. }) => already_claimed += 1,
                Err(other) => panic!("unexpected claim error: {other}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(already_claimed, 15);
        let stored = lifecycle.ticket_for(ALICE).await.expect("ticket");
        assert_eq!(stored.claimed_by, winners[0]);
    }

    #[tokio::test]
    async fn claim_of_missing_or_closed_ticket_is_not_found() {
        let (lifecycle, _) = lifecycle();
        assert!(matches!(lifecycle.claim(ALICE, BOB).await, Err(TicketError::NotFound(ALICE))));

        lifecycle.create(ALICE, "alice", "help").await.expect("create");
        lifecycle.close(ALICE).await.expect("close");
        assert!(matches!(lifecycle.claim(ALICE, BOB).await, Err(TicketError::NotFound(ALICE))));
    }

    #[tokio::test]
    async fn stale_prompt_cannot_claim_newer_ticket() {
        let (lifecycle, _) = lifecycle();
        let first = lifecycle.create(ALICE, "alice", "first").await.expect("create");
        lifecycle.close(ALICE).await.expect("close");
        let second = lifecycle.create(ALICE, "alice", "second").await.expect("create again");
        assert_eq!(second.id, TicketId(2));

        assert!(matches!(
            lifecycle.claim_ticket(first.id, ALICE, BOB).await,
            Err(TicketError::NotFound(ALICE))
        ));
        let claimed = lifecycle.claim_ticket(second.id, ALICE, BOB).await.expect("claim");
        assert_eq!(claimed.claimed_by, Some(BOB));
    }

    #[tokio::test]
    async fn close_by_owner_then_again_is_not_found() {
        let (lifecycle, _) = lifecycle();
        lifecycle.create(ALICE, "alice", "help").await.expect("create");

        let closed = lifecycle.close(ALICE).await.expect("close");
        assert_eq!(closed.status, TicketStatus::Closed);
        assert!(closed.closed_at.is_some());

        assert!(matches!(lifecycle.close(ALICE).await, Err(TicketError::NotFound(ALICE))));
    }

    #[tokio::test]
    async fn claimer_can_close_and_owner_context_wins() {
        let (lifecycle, _) = lifecycle();
        lifecycle.create(ALICE, "alice", "help").await.expect("alice ticket");
        lifecycle.create(BOB, "bob", "bob needs help too").await.expect("bob ticket");
        lifecycle.claim(ALICE, BOB).await.expect("bob claims alice");

        let closed = lifecycle.close(BOB).await.expect("bob closes");
        assert_eq!(closed.owner_id, BOB, "bob's own ticket takes precedence");

        let closed = lifecycle.close(BOB).await.expect("bob closes claimed");
        assert_eq!(closed.owner_id, ALICE);
        assert_eq!(closed.claimed_by, Some(BOB));
    }

    #[tokio::test]
    async fn invariant_holds_across_mixed_operations() {
        let (lifecycle, _) = lifecycle();
        let owners = [ALICE, BOB, CAROL];
        for round in 0..3 {
            for owner in owners {
                let _ = lifecycle.create(owner, "user", "msg").await;
                let _ = lifecycle.create(owner, "user", "dup").await;
                assert_single_open_ticket_per_owner(&lifecycle).await;
            }
            if round % 2 == 0 {
                let _ = lifecycle.claim(ALICE, CAROL).await;
            }
            for owner in owners {
                let _ = lifecycle.close(owner).await;
                assert_single_open_ticket_per_owner(&lifecycle).await;
            }
        }
    }

    #[tokio::test]
    async fn mutations_survive_reload() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("tickets.json");
        {
            let lifecycle = TicketLifecycle::new(
                TicketStore::open(&path).expect("open"),
                Arc::new(InMemoryAuditSink::default()),
            );
            lifecycle.create(ALICE, "alice", "help").await.expect("create");
            lifecycle.claim(ALICE, BOB).await.expect("claim");
        }

        let store = TicketStore::open(&path).expect("reopen");
        let ticket: &Ticket = store.get(ALICE).expect("persisted");
        assert_eq!(ticket.claimed_by, Some(BOB));
        assert!(ticket.created_at <= Utc::now());
    }
}
