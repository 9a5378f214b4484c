use std::{fs, io};

use carepay_bank::providers::{MonnifyConfig, PaystackConfig};
use carepay_common::money::DEFAULT_CURRENCY;
use carepay_common::CarePayError;
use serde::{Deserialize, Serialize};

/// Settings of one payment provider plus its on/off switch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSection<C> {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: C,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Query the provider before crediting any webhook.
    #[serde(default = "default_true")]
    pub reverify_webhooks: bool,
    /// HS256 secret shared with the service that issues access tokens.
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default)]
    pub paystack: ProviderSection<PaystackConfig>,
    #[serde(default)]
    pub monnify: ProviderSection<MonnifyConfig>,
    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_secs: u64,
    /// Upper bound for one janitor run.
    #[serde(default = "default_janitor_timeout")]
    pub janitor_timeout_secs: u64,
    /// Reservations are re-verified once they are this old.
    #[serde(default = "default_sweep_after")]
    pub sweep_after_secs: u64,
    /// Reservations still pending after this long are failed.
    #[serde(default = "default_pending_max_age")]
    pub pending_max_age_secs: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data/ledger".to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_true() -> bool {
    true
}

fn default_janitor_interval() -> u64 {
    600
}

fn default_janitor_timeout() -> u64 {
    120
}

fn default_sweep_after() -> u64 {
    300
}

fn default_pending_max_age() -> u64 {
    24 * 60 * 60
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
            currency: default_currency(),
            reverify_webhooks: true,
            jwt_secret: String::new(),
            paystack: ProviderSection::default(),
            monnify: ProviderSection::default(),
            janitor_interval_secs: default_janitor_interval(),
            janitor_timeout_secs: default_janitor_timeout(),
            sweep_after_secs: default_sweep_after(),
            pending_max_age_secs: default_pending_max_age(),
        }
    }
}

impl NodeConfig {
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(path, json)
    }

    pub fn load_from_file(path: &str) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        let parsed = serde_json::from_str::<NodeConfig>(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(parsed)
    }

    /// Secrets and deployment paths from the process environment win over
    /// the file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(v) = get("PAYSTACK_SECRET_KEY") {
            self.paystack.settings.secret_key = v;
            self.paystack.enabled = true;
        }
        if let Some(v) = get("PAYSTACK_BASE_URL") {
            self.paystack.settings.base_url = v;
        }
        if let Some(v) = get("MONNIFY_API_KEY") {
            self.monnify.settings.api_key = v;
            self.monnify.enabled = true;
        }
        if let Some(v) = get("MONNIFY_SECRET_KEY") {
            self.monnify.settings.secret_key = v;
        }
        if let Some(v) = get("MONNIFY_CONTRACT_CODE") {
            self.monnify.settings.contract_code = v;
        }
        if let Some(v) = get("MONNIFY_BASE_URL") {
            self.monnify.settings.base_url = v;
        }
        if let Some(v) = get("JWT_SECRET") {
            self.jwt_secret = v;
        }
        if let Some(v) = get("CAREPAY_DATA_DIR") {
            self.data_dir = v;
        }
        if let Some(port) = get("CAREPAY_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), CarePayError> {
        if self.jwt_secret.is_empty() {
            return Err(CarePayError::Config("jwt_secret must be set".into()));
        }
        if self.paystack.enabled && self.paystack.settings.secret_key.is_empty() {
            return Err(CarePayError::Config("paystack is enabled without a secret_key".into()));
        }
        if self.monnify.enabled {
            let monnify = &self.monnify.settings;
            if monnify.api_key.is_empty() || monnify.secret_key.is_empty() || monnify.contract_code.is_empty() {
                return Err(CarePayError::Config(
                    "monnify is enabled without api_key, secret_key and contract_code".into(),
                ));
            }
        }
        if self.janitor_interval_secs == 0 {
            return Err(CarePayError::Config("janitor_interval_secs must be positive".into()));
        }
        Ok(())
    }
}
