use std::sync::Arc;
use std::time::Duration;

use carepay_common::payment::ProviderKind;
use carepay_common::utils::time::current_time_millis;
use carepay_common::Amount;
use serde_json::Value;

use crate::core::ledger::transaction_engine::validation::ValidationHandler;
use crate::core::ledger::transaction_engine::Posting;
use crate::core::store::schema::{Channel, EntryStatus, LedgerEntry};
use crate::core::store::{LedgerStore, StoreTxn};
use crate::error::{LedgerError, Result};

/// Reservations older than this are failed by the janitor.
pub const DEFAULT_RESERVATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A pre-commit marker written before calling a provider.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub reference: String,
    pub account_id: String,
    pub amount: Amount,
    pub provider: ProviderKind,
    pub description: String,
    pub metadata: Option<Value>,
}

/// Durable reference uniqueness, backed by the `transactions` table.
///
/// The reference is the primary key of a ledger entry, so "seen before"
/// survives restarts and is shared by every engine using the same store.
pub struct IdempotencyGuard {
    store: Arc<LedgerStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// True only when a completed entry carries this reference.
    pub fn is_processed(&self, reference: &str) -> Result<bool> {
        Ok(self
            .store
            .entry(reference)?
            .map_or(false, |entry| entry.status == EntryStatus::Completed))
    }

    pub fn get(&self, reference: &str) -> Result<Option<LedgerEntry>> {
        self.store.entry(reference)
    }

    /// Writes a pending credit entry for `reservation`.
    ///
    /// An existing entry for the same account is returned unchanged, whatever
    /// its status. An entry for another account is a conflict.
    pub fn reserve(&self, reservation: Reservation) -> Result<LedgerEntry> {
        ValidationHandler::validate_reference(&reservation.reference)?;
        ValidationHandler::validate_amount(reservation.amount)?;

        let now = current_time_millis();
        let (entry, created) = self.store.write(|txn| {
            if let Some(existing) = StoreTxn::entry(txn, &reservation.reference)? {
                if existing.account_id != reservation.account_id {
                    return Err(LedgerError::ReferenceConflict(reservation.reference.clone()));
                }
                return Ok((existing, false));
            }

            let mut account = StoreTxn::account(txn, &reservation.account_id)?
                .ok_or_else(|| LedgerError::AccountNotFound(reservation.account_id.clone()))?;

            let mut posting = Posting::credit(&reservation.account_id, reservation.amount, &reservation.description)
                .with_provider(reservation.provider, Channel::from(reservation.provider));
            posting.metadata = reservation.metadata.clone();

            let entry = posting.open_entry(&mut account, &reservation.reference, now);
            StoreTxn::put_entry(txn, &entry)?;
            StoreTxn::mark_pending(txn, &entry.reference, now)?;
            StoreTxn::put_account(txn, &account)?;
            Ok((entry, true))
        })?;

        if created {
            tracing::info!(
                target: "ledger",
                "📝 Reserved {} for {} via {} ({})",
                entry.reference,
                entry.account_id,
                reservation.provider,
                entry.amount
            );
        }
        Ok(entry)
    }

    /// Moves a pending or failed reservation to failed. Completed entries are
    /// never touched. Returns the entry as stored afterwards.
    pub fn mark_failed(&self, reference: &str, reason: &str) -> Result<Option<LedgerEntry>> {
        let updated = self.store.write(|txn| {
            let Some(mut entry) = StoreTxn::entry(txn, reference)? else {
                return Ok(None);
            };
            if entry.status == EntryStatus::Completed {
                return Ok(Some(entry));
            }
            entry.status = EntryStatus::Failed;
            entry.failure_reason = Some(reason.to_string());
            entry.updated_at = current_time_millis();
            StoreTxn::put_entry(txn, &entry)?;
            StoreTxn::clear_pending(txn, reference)?;
            Ok(Some(entry))
        })?;

        if let Some(entry) = &updated {
            if entry.status == EntryStatus::Failed {
                tracing::warn!(target: "ledger", "⚠️ Reservation {} failed: {}", reference, reason);
            }
        }
        Ok(updated)
    }

    /// Pending reservations created at least `older_than` ago, oldest first.
    pub fn pending(&self, older_than: Duration) -> Result<Vec<LedgerEntry>> {
        let cutoff = current_time_millis().saturating_sub(older_than.as_millis() as u64);
        let mut references: Vec<(String, u64)> = self
            .store
            .pending_references()?
            .into_iter()
            .filter(|(_, created_at)| *created_at <= cutoff)
            .collect();
        references.sort_by_key(|(_, created_at)| *created_at);

        let mut entries = Vec::with_capacity(references.len());
        for (reference, _) in references {
            if let Some(entry) = self.store.entry(&reference)? {
                if entry.status == EntryStatus::Pending {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    /// Fails every reservation older than `max_age`. Returns how many.
    pub fn evict_stale(&self, max_age: Duration) -> Result<usize> {
        self.evict_stale_except(max_age, &[])
    }

    /// Like [`evict_stale`](Self::evict_stale), but leaves the references in
    /// `keep` pending.
    pub fn evict_stale_except(&self, max_age: Duration, keep: &[String]) -> Result<usize> {
        let stale = self.pending(max_age)?;
        let mut evicted = 0;
        for entry in stale.iter().filter(|entry| !keep.contains(&entry.reference)) {
            if let Some(updated) = self.mark_failed(&entry.reference, "reservation expired")? {
                if updated.status == EntryStatus::Failed {
                    evicted += 1;
                }
            }
        }
        if evicted > 0 {
            tracing::info!(target: "ledger", "🧹 Expired {} stale reservation(s)", evicted);
        }
        Ok(evicted)
    }
}
