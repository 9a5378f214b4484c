use serde::Serialize;

use crate::core::store::schema::{Account, EntryStatus};

/// Lifecycle of one inbound webhook.
///
/// `Ignored`, `Credited`, `ReconciliationFailed`, `Rejected` and
/// `Unresolved` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookState {
    Received,
    SignatureVerified,
    EventClassified,
    Ignored,
    AccountResolved,
    Credited,
    ReconciliationFailed,
    /// Bad or missing signature.
    Rejected,
    /// Verified and funds-bearing, but no wallet matched.
    Unresolved,
}

impl WebhookState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WebhookState::Ignored
                | WebhookState::Credited
                | WebhookState::ReconciliationFailed
                | WebhookState::Rejected
                | WebhookState::Unresolved
        )
    }

    /// Whether the provider should be told the delivery succeeded.
    pub fn acknowledges(&self) -> bool {
        !matches!(self, WebhookState::Rejected)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub state: WebhookState,
    pub reference: Option<String>,
    pub account_id: Option<String>,
    /// The reference had already been credited.
    pub replayed: bool,
    pub detail: Option<String>,
}

impl WebhookOutcome {
    pub(crate) fn new(state: WebhookState) -> Self {
        Self { state, reference: None, account_id: None, replayed: false, detail: None }
    }

    pub(crate) fn with_reference(mut self, reference: Option<&str>) -> Self {
        self.reference = reference.map(str::to_string);
        self
    }

    pub(crate) fn with_account(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Result of settling one reservation against the provider.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub reference: String,
    pub status: EntryStatus,
    pub account: Account,
    pub replayed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub credited: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
    /// References the provider could not be asked about in this run.
    pub unsettled: Vec<String>,
}
