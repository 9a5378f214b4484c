pub mod locks;
pub mod validation;

use std::sync::Arc;

use carepay_common::payment::{AccountHolder, ProviderKind};
use carepay_common::utils::time::current_time_millis;
use carepay_common::Amount;
use redb::WriteTransaction;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::core::store::schema::{Account, Channel, Direction, EntryStatus, LedgerEntry};
use crate::core::store::{LedgerStore, StoreTxn};
use crate::error::{LedgerError, Result};
use locks::AccountLocks;
use validation::ValidationHandler;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A single balance movement requested from the engine.
#[derive(Debug, Clone)]
pub struct Posting {
    pub account_id: String,
    pub direction: Direction,
    pub amount: Amount,
    pub description: String,
    /// Idempotency key. Generated when absent.
    pub reference: Option<String>,
    pub channel: Channel,
    pub provider: Option<ProviderKind>,
    pub metadata: Option<Value>,
}

impl Posting {
    pub fn credit(account_id: &str, amount: Amount, description: &str) -> Self {
        Self::new(account_id, Direction::Credit, amount, description)
    }

    pub fn debit(account_id: &str, amount: Amount, description: &str) -> Self {
        Self::new(account_id, Direction::Debit, amount, description)
    }

    fn new(account_id: &str, direction: Direction, amount: Amount, description: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            direction,
            amount,
            description: description.to_string(),
            reference: None,
            channel: Channel::Wallet,
            provider: None,
            metadata: None,
        }
    }

    pub fn with_reference(mut self, reference: Option<&str>) -> Self {
        self.reference = reference.map(str::to_string);
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind, channel: Channel) -> Self {
        self.provider = Some(provider);
        self.channel = channel;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Builds a fresh entry for this posting and advances the account's
    /// sequence. The entry starts out pending.
    pub(crate) fn open_entry(&self, account: &mut Account, reference: &str, now: u64) -> LedgerEntry {
        let sequence = account.next_sequence;
        account.next_sequence += 1;
        LedgerEntry {
            reference: reference.to_string(),
            account_id: account.patient_id.clone(),
            direction: self.direction,
            amount: self.amount,
            description: self.description.clone(),
            balance_after: None,
            status: EntryStatus::Pending,
            channel: self.channel,
            provider: self.provider,
            sequence,
            metadata: self.metadata.clone(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of [`TransactionEngine::apply`].
#[derive(Debug, Clone)]
pub struct PostingOutcome {
    pub account: Account,
    pub entry: LedgerEntry,
    /// The reference was already completed; nothing was applied.
    pub replayed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub from: Account,
    pub to: Account,
    pub reference: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "type")]
    pub direction: Option<Direction>,
    pub status: Option<EntryStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub transactions: Vec<LedgerEntry>,
    pub total: usize,
    pub page: u32,
    pub pages: u32,
}

/// The only component allowed to change a wallet balance.
///
/// Each operation holds the per-account lock(s) for its duration and commits
/// every record it touches in one redb write transaction.
pub struct TransactionEngine {
    store: Arc<LedgerStore>,
    locks: AccountLocks,
}

impl TransactionEngine {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store, locks: AccountLocks::new() }
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Opens a wallet for a patient. Opening an existing wallet returns it.
    pub async fn open_account(&self, patient_id: &str, holder: AccountHolder, currency: &str) -> Result<Account> {
        ValidationHandler::validate_account_id(patient_id)?;
        let _guard = self.locks.lock(patient_id).await;

        let (account, created) = self.store.write(|txn| {
            if let Some(existing) = StoreTxn::account(txn, patient_id)? {
                return Ok((existing, false));
            }
            let now = current_time_millis();
            let account = Account {
                patient_id: patient_id.to_string(),
                holder,
                balance: Amount::ZERO,
                currency: currency.to_string(),
                next_sequence: 0,
                created_at: now,
                updated_at: now,
            };
            StoreTxn::put_account(txn, &account)?;
            Ok((account, true))
        })?;

        if created {
            tracing::info!(target: "ledger", "🆕 Wallet opened for patient {} ({})", patient_id, account.currency);
        }
        Ok(account)
    }

    pub async fn account(&self, account_id: &str) -> Result<Account> {
        self.store
            .account(account_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    pub async fn credit(
        &self,
        account_id: &str,
        amount: Amount,
        description: &str,
        idempotency_ref: Option<&str>,
    ) -> Result<Account> {
        let posting = Posting::credit(account_id, amount, description).with_reference(idempotency_ref);
        Ok(self.apply(posting).await?.account)
    }

    pub async fn debit(
        &self,
        account_id: &str,
        amount: Amount,
        description: &str,
        idempotency_ref: Option<&str>,
    ) -> Result<Account> {
        let posting = Posting::debit(account_id, amount, description).with_reference(idempotency_ref);
        Ok(self.apply(posting).await?.account)
    }

    /// Applies a posting exactly once per reference.
    ///
    /// A completed reference is a no-op returning the current account. A
    /// pending or failed reference for the same account and direction is
    /// completed in place. Any other reuse is a [`LedgerError::ReferenceConflict`].
    pub async fn apply(&self, posting: Posting) -> Result<PostingOutcome> {
        // 1. Stateless validation
        ValidationHandler::validate_amount(posting.amount)?;
        let reference = match &posting.reference {
            Some(reference) => {
                ValidationHandler::validate_reference(reference)?;
                reference.clone()
            }
            None => generate_reference(match posting.direction {
                Direction::Credit => "CR",
                Direction::Debit => "DR",
            }),
        };

        // 2. Serialize on the account
        let _guard = self.locks.lock(&posting.account_id).await;

        // 3. Atomic commit
        let now = current_time_millis();
        let outcome = self
            .store
            .write(|txn| Self::post_in_txn(txn, &posting, &reference, now))
            .map_err(|e| {
                if !matches!(e, LedgerError::InsufficientFunds { .. }) {
                    tracing::error!(target: "ledger", "❌ Posting {} on {} failed: {}", reference, posting.account_id, e);
                }
                e
            })?;

        // 4. Audit
        if outcome.replayed {
            tracing::info!(target: "ledger", "🔁 Replay of {} on {} ignored", reference, posting.account_id);
        } else {
            tracing::info!(
                target: "ledger",
                "✅ {} {} {} on {} | ref={} | balance={}",
                posting.direction,
                outcome.entry.amount,
                outcome.account.currency,
                posting.account_id,
                reference,
                outcome.account.balance
            );
        }
        Ok(outcome)
    }

    fn post_in_txn(txn: &WriteTransaction, posting: &Posting, reference: &str, now: u64) -> Result<PostingOutcome> {
        let mut account = StoreTxn::account(txn, &posting.account_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(posting.account_id.clone()))?;

        let existing = StoreTxn::entry(txn, reference)?;
        if let Some(entry) = &existing {
            if entry.account_id != account.patient_id || entry.direction != posting.direction {
                return Err(LedgerError::ReferenceConflict(reference.to_string()));
            }
            if entry.status == EntryStatus::Completed {
                return Ok(PostingOutcome { account, entry: entry.clone(), replayed: true });
            }
        }

        let balance = next_balance(&account, posting.direction, posting.amount)?;

        let mut entry = match existing {
            // Completing a reservation keeps its position in the log.
            Some(mut reserved) => {
                reserved.amount = posting.amount;
                reserved.description = posting.description.clone();
                reserved.metadata = merge_metadata(reserved.metadata.take(), posting.metadata.clone());
                reserved.failure_reason = None;
                if posting.provider.is_some() {
                    reserved.provider = posting.provider;
                    reserved.channel = posting.channel;
                }
                reserved
            }
            None => posting.open_entry(&mut account, reference, now),
        };
        entry.status = EntryStatus::Completed;
        entry.balance_after = Some(balance);
        entry.updated_at = now;

        account.balance = balance;
        account.updated_at = now;

        StoreTxn::put_entry(txn, &entry)?;
        StoreTxn::clear_pending(txn, reference)?;
        StoreTxn::put_account(txn, &account)?;

        Ok(PostingOutcome { account, entry, replayed: false })
    }

    /// Moves funds between two wallets. Both legs commit together or not at all.
    pub async fn transfer(&self, from_id: &str, to_id: &str, amount: Amount, description: &str) -> Result<TransferReceipt> {
        ValidationHandler::validate_amount(amount)?;
        if from_id == to_id {
            return Err(LedgerError::SameAccount(from_id.to_string()));
        }
        let reference = generate_reference("TRF");

        let _guards = self.locks.lock_pair(from_id, to_id).await;

        let now = current_time_millis();
        let (from, to) = self.store.write(|txn| {
            let mut source = StoreTxn::account(txn, from_id)?
                .ok_or_else(|| LedgerError::AccountNotFound(from_id.to_string()))?;
            let mut destination = StoreTxn::account(txn, to_id)?
                .ok_or_else(|| LedgerError::AccountNotFound(to_id.to_string()))?;

            let source_balance = next_balance(&source, Direction::Debit, amount)?;
            let destination_balance = next_balance(&destination, Direction::Credit, amount)?;

            let out_leg = Posting::debit(from_id, amount, description)
                .with_metadata(json!({ "transfer_reference": reference, "counterparty": to_id }));
            let in_leg = Posting::credit(to_id, amount, description)
                .with_metadata(json!({ "transfer_reference": reference, "counterparty": from_id }));

            let mut out_entry = Posting { channel: Channel::Transfer, ..out_leg }.open_entry(
                &mut source,
                &format!("{}-OUT", reference),
                now,
            );
            let mut in_entry = Posting { channel: Channel::Transfer, ..in_leg }.open_entry(
                &mut destination,
                &format!("{}-IN", reference),
                now,
            );

            out_entry.status = EntryStatus::Completed;
            out_entry.balance_after = Some(source_balance);
            in_entry.status = EntryStatus::Completed;
            in_entry.balance_after = Some(destination_balance);

            source.balance = source_balance;
            source.updated_at = now;
            destination.balance = destination_balance;
            destination.updated_at = now;

            StoreTxn::put_entry(txn, &out_entry)?;
            StoreTxn::put_entry(txn, &in_entry)?;
            StoreTxn::put_account(txn, &source)?;
            StoreTxn::put_account(txn, &destination)?;
            Ok((source, destination))
        })?;

        tracing::info!(target: "ledger", "✅ Transfer {} {} -> {} | ref={}", amount, from_id, to_id, reference);
        Ok(TransferReceipt { from, to, reference })
    }

    /// Recomputes the balance from the completed entries and overwrites the
    /// stored value.
    pub async fn recalculate_balance(&self, account_id: &str) -> Result<Account> {
        let _guard = self.locks.lock(account_id).await;

        let (account, previous) = self.store.write(|txn| {
            let mut account = StoreTxn::account(txn, account_id)?
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
            let entries = StoreTxn::entries_for(txn, account_id)?;
            let computed = fold_balance(&entries)?;

            let previous = account.balance;
            account.balance = computed;
            account.updated_at = current_time_millis();
            StoreTxn::put_account(txn, &account)?;
            Ok((account, previous))
        })?;

        if previous != account.balance {
            tracing::warn!(
                target: "ledger",
                "⚠️ Balance drift on {}: stored {} recomputed {}",
                account_id,
                previous,
                account.balance
            );
        }
        if account.balance.is_negative() {
            tracing::error!(target: "ledger", "❌ Recomputed balance of {} is negative: {}", account_id, account.balance);
        }
        Ok(account)
    }

    /// Newest-first page of an account's entries.
    pub async fn history(&self, account_id: &str, query: &HistoryQuery) -> Result<HistoryPage> {
        self.account(account_id).await?;

        let mut entries: Vec<LedgerEntry> = self
            .store
            .entries_for(account_id)?
            .into_iter()
            .filter(|e| query.direction.map_or(true, |d| e.direction == d))
            .filter(|e| query.status.map_or(true, |s| e.status == s))
            .collect();
        entries.reverse();

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        let total = entries.len();
        let pages = total.div_ceil(limit as usize) as u32;

        let transactions = entries
            .into_iter()
            .skip((page as usize - 1) * limit as usize)
            .take(limit as usize)
            .collect();

        Ok(HistoryPage { transactions, total, page, pages })
    }
}

fn generate_reference(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

fn next_balance(account: &Account, direction: Direction, amount: Amount) -> Result<Amount> {
    match direction {
        Direction::Credit => account
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{} overflows the balance", amount))),
        Direction::Debit => {
            if account.balance < amount {
                return Err(LedgerError::InsufficientFunds { available: account.balance, requested: amount });
            }
            account
                .balance
                .checked_sub(amount)
                .ok_or_else(|| LedgerError::InvalidAmount(format!("{} is out of range", amount)))
        }
    }
}

/// Sum of the signed effects of every completed entry.
pub fn fold_balance(entries: &[LedgerEntry]) -> Result<Amount> {
    entries.iter().try_fold(Amount::ZERO, |acc, entry| {
        entry
            .delta()
            .and_then(|delta| acc.checked_add(delta))
            .ok_or_else(|| LedgerError::InvalidAmount(format!("entry {} overflows the balance", entry.reference)))
    })
}

fn merge_metadata(existing: Option<Value>, incoming: Option<Value>) -> Option<Value> {
    match (existing, incoming) {
        (Some(Value::Object(mut base)), Some(Value::Object(extra))) => {
            base.extend(extra);
            Some(Value::Object(base))
        }
        (existing, None) => existing,
        (_, incoming) => incoming,
    }
}
