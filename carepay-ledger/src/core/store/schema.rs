use carepay_common::payment::{AccountHolder, ProviderKind};
use carepay_common::Amount;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A patient wallet.
///
/// `balance` is only ever written by the transaction engine and always equals
/// the fold of the account's completed entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub patient_id: String,
    pub holder: AccountHolder,
    pub balance: Amount,
    pub currency: String,
    /// Position assigned to the next entry written for this account.
    pub next_sequence: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How the money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Wallet,
    Transfer,
    Paystack,
    Monnify,
    BankTransfer,
}

impl From<ProviderKind> for Channel {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Paystack => Channel::Paystack,
            ProviderKind::Monnify => Channel::Monnify,
        }
    }
}

/// One row of an account's transaction log, keyed by its globally unique
/// `reference`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub reference: String,
    pub account_id: String,
    pub direction: Direction,
    pub amount: Amount,
    pub description: String,
    /// Balance right after this entry was applied. `None` until completed.
    pub balance_after: Option<Amount>,
    pub status: EntryStatus,
    pub channel: Channel,
    pub provider: Option<ProviderKind>,
    pub sequence: u64,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl LedgerEntry {
    /// Signed balance effect. Only completed entries move money.
    pub fn delta(&self) -> Option<Amount> {
        if self.status != EntryStatus::Completed {
            return Some(Amount::ZERO);
        }
        match self.direction {
            Direction::Credit => Some(self.amount),
            Direction::Debit => Amount::ZERO.checked_sub(self.amount),
        }
    }
}
