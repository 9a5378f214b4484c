use std::path::Path;

use tracing::{info, warn};

use crate::config::NodeConfig;

/// Writes a default config to `path` when none exists.
///
/// The generated JWT secret is random and must be replaced with the token
/// issuer's secret.
pub fn ensure_config(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if Path::new(path).exists() {
        return Ok(());
    }
    warn!("⚠️ Config not found. Generating defaults at {}...", path);

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let config = NodeConfig {
        jwt_secret: uuid::Uuid::new_v4().simple().to_string(),
        ..Default::default()
    };
    config.save_to_file(path)?;
    info!("✅ Config generated. Providers are disabled until keys are set.");
    Ok(())
}
