//! Sniffer Service (`sniffsrv`)

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use common::{LogConfig, ServiceArgs};
use sniffsrv::{LogPublisher, SnifferConfig, SnifferServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServiceArgs::parse();

    let mut config = SnifferConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let _log_guard = common::logging::init_with_config(LogConfig {
        service_name: "sniffsrv".to_string(),
        level: args.effective_log_level(&config.logging.level),
        log_dir: config.logging.log_dir(),
        ansi: !args.no_color,
    })?;

    let addr = config.listen_addr()?;
    let registers = config.decoder.build_register_map()?;
    info!(
        "Configuration loaded: {} registers, {} status bits, stats every {} frames",
        registers.register_count(),
        registers.status_bit_count(),
        config.stats.publish_interval
    );
    debug!("Binary sensors: {}", registers.binary_sensor_names().join(", "));

    // Validation mode: validate and exit
    if args.validate {
        info!("Validation completed successfully");
        return Ok(());
    }

    let publisher = Arc::new(LogPublisher::new(config.devices.clone()));
    let server = SnifferServer::from_config(&config, publisher)?;
    let listener = SnifferServer::bind(addr).await?;

    let shutdown = common::shutdown::shutdown_token();
    server.run(listener, shutdown).await?;

    info!("Service shutdown complete");
    Ok(())
}
