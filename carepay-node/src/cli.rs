use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "carepay-node", about = "Hospital wallet ledger with Paystack/Monnify reconciliation")]
pub struct Args {
    /// Path to the JSON config. Generated with defaults when missing.
    #[arg(long = "config", default_value = "config.json")]
    pub config_path: String,

    /// Overrides `port` from the config file.
    #[arg(long)]
    pub port: Option<u16>,

    /// Overrides `data_dir` from the config file.
    #[arg(long)]
    pub data_dir: Option<String>,
}

impl Args {
    pub fn apply_to(&self, config: &mut crate::config::NodeConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
    }
}
