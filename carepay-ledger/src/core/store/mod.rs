pub mod schema;

use std::fmt;
use std::path::Path;

use carepay_common::payment::{ProviderKind, VirtualAccount};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{storage_err, Result};
use schema::{Account, LedgerEntry};

const ACCOUNTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");
const TRANSACTIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");
/// `{account}:{sequence:020}` -> reference
const ACCOUNT_ENTRIES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("account_entries");
/// reference -> created_at of a pending reservation
const PENDING_TABLE: TableDefinition<&str, u64> = TableDefinition::new("pending");
/// `{provider}:{patient}` -> VirtualAccount
const VIRTUAL_ACCOUNTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("virtual_accounts");
/// `{provider}:acct:{number}` / `{provider}:cust:{customer}` -> patient
const VIRTUAL_ACCOUNT_INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("virtual_account_index");
/// `{provider}:{patient}` -> provider customer id
const PROVIDER_CUSTOMERS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("provider_customers");

fn entry_key(account_id: &str, sequence: u64) -> String {
    format!("{}:{:020}", account_id, sequence)
}

fn provider_key(provider: ProviderKind, patient_id: &str) -> String {
    format!("{}:{}", provider, patient_id)
}

fn account_number_key(provider: ProviderKind, account_number: &str) -> String {
    format!("{}:acct:{}", provider, account_number)
}

fn customer_key(provider: ProviderKind, customer_id: &str) -> String {
    format!("{}:cust:{}", provider, customer_id)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Durable wallet storage on a single redb file.
///
/// Every mutation runs inside one redb write transaction, so a multi-record
/// change (account + entry + indices) commits completely or not at all.
pub struct LedgerStore {
    db: Database,
}

impl fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerStore").field("db", &"Redb").finish()
    }
}

impl LedgerStore {
    pub fn open(data_dir: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = Path::new(data_dir).join("ledger.redb");
        let db = Database::create(path).map_err(storage_err)?;

        // Initialize tables so read transactions never see a missing table.
        let write_txn = db.begin_write().map_err(storage_err)?;
        {
            write_txn.open_table(ACCOUNTS_TABLE).map_err(storage_err)?;
            write_txn.open_table(TRANSACTIONS_TABLE).map_err(storage_err)?;
            write_txn.open_table(ACCOUNT_ENTRIES_TABLE).map_err(storage_err)?;
            write_txn.open_table(PENDING_TABLE).map_err(storage_err)?;
            write_txn.open_table(VIRTUAL_ACCOUNTS_TABLE).map_err(storage_err)?;
            write_txn.open_table(VIRTUAL_ACCOUNT_INDEX_TABLE).map_err(storage_err)?;
            write_txn.open_table(PROVIDER_CUSTOMERS_TABLE).map_err(storage_err)?;
        }
        write_txn.commit().map_err(storage_err)?;

        tracing::info!("💾 Ledger store opened at {}", data_dir);
        Ok(Self { db })
    }

    /// Runs `f` inside a single write transaction.
    ///
    /// The transaction commits only when `f` returns `Ok`; on `Err` it is
    /// dropped and nothing `f` wrote becomes visible.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&WriteTransaction) -> Result<T>,
    {
        let write_txn = self.db.begin_write().map_err(storage_err)?;
        let value = f(&write_txn)?;
        write_txn.commit().map_err(storage_err)?;
        Ok(value)
    }

    pub fn account(&self, account_id: &str) -> Result<Option<Account>> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(ACCOUNTS_TABLE).map_err(storage_err)?;
        let value = table.get(account_id).map_err(storage_err)?;
        value.map(|v| decode(v.value())).transpose()
    }

    pub fn entry(&self, reference: &str) -> Result<Option<LedgerEntry>> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(TRANSACTIONS_TABLE).map_err(storage_err)?;
        let value = table.get(reference).map_err(storage_err)?;
        value.map(|v| decode(v.value())).transpose()
    }

    /// All entries of an account in sequence order, oldest first.
    pub fn entries_for(&self, account_id: &str) -> Result<Vec<LedgerEntry>> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let index = read_txn.open_table(ACCOUNT_ENTRIES_TABLE).map_err(storage_err)?;
        let transactions = read_txn.open_table(TRANSACTIONS_TABLE).map_err(storage_err)?;

        let start = format!("{}:", account_id);
        let end = format!("{};", account_id);
        let mut entries = Vec::new();
        for item in index.range(start.as_str()..end.as_str()).map_err(storage_err)? {
            let (_, reference) = item.map_err(storage_err)?;
            if let Some(value) = transactions.get(reference.value()).map_err(storage_err)? {
                entries.push(decode(value.value())?);
            }
        }
        Ok(entries)
    }

    /// Pending reservations as `(reference, created_at)`.
    pub fn pending_references(&self) -> Result<Vec<(String, u64)>> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(PENDING_TABLE).map_err(storage_err)?;
        let mut pending = Vec::new();
        for item in table.iter().map_err(storage_err)? {
            let (reference, created_at) = item.map_err(storage_err)?;
            pending.push((reference.value().to_string(), created_at.value()));
        }
        Ok(pending)
    }

    // --- Virtual accounts ---

    pub fn put_virtual_account(&self, account: &VirtualAccount) -> Result<()> {
        let value = serde_json::to_vec(account)?;
        self.write(|txn| {
            let mut records = txn.open_table(VIRTUAL_ACCOUNTS_TABLE).map_err(storage_err)?;
            records
                .insert(provider_key(account.provider, &account.patient_id).as_str(), value.as_slice())
                .map_err(storage_err)?;

            let mut index = txn.open_table(VIRTUAL_ACCOUNT_INDEX_TABLE).map_err(storage_err)?;
            index
                .insert(
                    account_number_key(account.provider, &account.account_number).as_str(),
                    account.patient_id.as_str(),
                )
                .map_err(storage_err)?;
            if let Some(customer_id) = &account.customer_id {
                index
                    .insert(customer_key(account.provider, customer_id).as_str(), account.patient_id.as_str())
                    .map_err(storage_err)?;
            }
            Ok(())
        })
    }

    pub fn virtual_account(&self, provider: ProviderKind, patient_id: &str) -> Result<Option<VirtualAccount>> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(VIRTUAL_ACCOUNTS_TABLE).map_err(storage_err)?;
        let value = table.get(provider_key(provider, patient_id).as_str()).map_err(storage_err)?;
        value.map(|v| decode(v.value())).transpose()
    }

    pub fn virtual_accounts_for(&self, patient_id: &str) -> Result<Vec<VirtualAccount>> {
        let mut accounts = Vec::new();
        for provider in [ProviderKind::Paystack, ProviderKind::Monnify] {
            if let Some(account) = self.virtual_account(provider, patient_id)? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    pub fn virtual_account_by_number(&self, provider: ProviderKind, account_number: &str) -> Result<Option<VirtualAccount>> {
        self.virtual_account_by_index(provider, &account_number_key(provider, account_number))
    }

    pub fn virtual_account_by_customer(&self, provider: ProviderKind, customer_id: &str) -> Result<Option<VirtualAccount>> {
        self.virtual_account_by_index(provider, &customer_key(provider, customer_id))
    }

    fn virtual_account_by_index(&self, provider: ProviderKind, key: &str) -> Result<Option<VirtualAccount>> {
        let patient_id = {
            let read_txn = self.db.begin_read().map_err(storage_err)?;
            let index = read_txn.open_table(VIRTUAL_ACCOUNT_INDEX_TABLE).map_err(storage_err)?;
            let value = index.get(key).map_err(storage_err)?;
            match value {
                Some(patient) => patient.value().to_string(),
                None => return Ok(None),
            }
        };
        self.virtual_account(provider, &patient_id)
    }

    // --- Provider customers ---

    pub fn put_provider_customer(&self, provider: ProviderKind, patient_id: &str, customer_id: &str) -> Result<()> {
        self.write(|txn| {
            let mut table = txn.open_table(PROVIDER_CUSTOMERS_TABLE).map_err(storage_err)?;
            table
                .insert(provider_key(provider, patient_id).as_str(), customer_id)
                .map_err(storage_err)?;
            Ok(())
        })
    }

    pub fn provider_customer(&self, provider: ProviderKind, patient_id: &str) -> Result<Option<String>> {
        let read_txn = self.db.begin_read().map_err(storage_err)?;
        let table = read_txn.open_table(PROVIDER_CUSTOMERS_TABLE).map_err(storage_err)?;
        let value = table.get(provider_key(provider, patient_id).as_str()).map_err(storage_err)?;
        Ok(value.map(|v| v.value().to_string()))
    }
}

/// Typed record access inside an open write transaction.
pub struct StoreTxn;

impl StoreTxn {
    fn get<T: DeserializeOwned>(
        txn: &WriteTransaction,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>> {
        let table = txn.open_table(table).map_err(storage_err)?;
        let value = table.get(key).map_err(storage_err)?;
        value.map(|v| decode(v.value())).transpose()
    }

    fn put<T: Serialize>(
        txn: &WriteTransaction,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        record: &T,
    ) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        let mut table = txn.open_table(table).map_err(storage_err)?;
        table.insert(key, value.as_slice()).map_err(storage_err)?;
        Ok(())
    }

    pub fn account(txn: &WriteTransaction, account_id: &str) -> Result<Option<Account>> {
        Self::get(txn, ACCOUNTS_TABLE, account_id)
    }

    pub fn put_account(txn: &WriteTransaction, account: &Account) -> Result<()> {
        Self::put(txn, ACCOUNTS_TABLE, &account.patient_id, account)
    }

    pub fn entry(txn: &WriteTransaction, reference: &str) -> Result<Option<LedgerEntry>> {
        Self::get(txn, TRANSACTIONS_TABLE, reference)
    }

    /// Writes the entry record and its per-account ordering key.
    pub fn put_entry(txn: &WriteTransaction, entry: &LedgerEntry) -> Result<()> {
        Self::put(txn, TRANSACTIONS_TABLE, &entry.reference, entry)?;
        let mut index = txn.open_table(ACCOUNT_ENTRIES_TABLE).map_err(storage_err)?;
        index
            .insert(entry_key(&entry.account_id, entry.sequence).as_str(), entry.reference.as_str())
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn mark_pending(txn: &WriteTransaction, reference: &str, created_at: u64) -> Result<()> {
        let mut table = txn.open_table(PENDING_TABLE).map_err(storage_err)?;
        table.insert(reference, created_at).map_err(storage_err)?;
        Ok(())
    }

    pub fn clear_pending(txn: &WriteTransaction, reference: &str) -> Result<()> {
        let mut table = txn.open_table(PENDING_TABLE).map_err(storage_err)?;
        table.remove(reference).map_err(storage_err)?;
        Ok(())
    }

    pub fn entries_for(txn: &WriteTransaction, account_id: &str) -> Result<Vec<LedgerEntry>> {
        let references: Vec<String> = {
            let index = txn.open_table(ACCOUNT_ENTRIES_TABLE).map_err(storage_err)?;
            let start = format!("{}:", account_id);
            let end = format!("{};", account_id);
            let mut references = Vec::new();
            for item in index.range(start.as_str()..end.as_str()).map_err(storage_err)? {
                let (_, reference) = item.map_err(storage_err)?;
                references.push(reference.value().to_string());
            }
            references
        };

        let mut entries = Vec::with_capacity(references.len());
        for reference in references {
            if let Some(entry) = Self::entry(txn, &reference)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}
