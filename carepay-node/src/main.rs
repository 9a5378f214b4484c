use carepay_ledger::core::reconciliation::RECONCILIATION_TARGET;
use carepay_node::{api::rest::start_rest_api, build_runtime, cli::Args, setup::ensure_config, NodeConfig};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

/// Targets mirrored into the audit log for manual reconciliation.
fn is_audit_target(target: &str) -> bool {
    target == RECONCILIATION_TARGET || target == "ledger"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Parse Arguments
    let args = Args::parse();

    // 2. Initialize Logging
    std::panic::set_hook(Box::new(|info| {
        let msg = match info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match info.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<Any>",
            },
        };
        let location = match info.location() {
            Some(l) => format!("at {}:{}:{}", l.file(), l.line(), l.column()),
            None => "unknown location".to_string(),
        };
        let err_msg = format!("CRASH: {} {}\n", msg, location);
        eprintln!("{}", err_msg);
        let _ = std::fs::write("panic.log", err_msg);
    }));

    std::fs::create_dir_all("logs")?;
    let file_appender = tracing_appender::rolling::never("logs", "audit.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let audit_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| is_audit_target(metadata.target())));

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,carepay_node=debug".into()),
    );

    tracing_subscriber::registry().with(audit_layer).with(stdout_layer).init();

    info!("--- STARTING CAREPAY NODE ---");
    info!("Config: {}", args.config_path);

    // 3. Setup Config
    if let Err(e) = ensure_config(&args.config_path) {
        error!("Config bootstrap failed: {}", e);
        return Err(e);
    }

    let mut config = NodeConfig::load_from_file(&args.config_path)?;
    config.apply_env();
    args.apply_to(&mut config);
    config.validate()?;

    // 4. Start Runtime
    let runtime = match build_runtime(config) {
        Ok(rt) => rt,
        Err(e) => {
            error!("Node failed to start: {}", e);
            return Err(e.into());
        }
    };

    // 5. Janitor
    runtime.janitor().spawn();

    // 6. Start REST API
    let port = runtime.config.port;
    start_rest_api(port, runtime.app_state()).await?;

    Ok(())
}
