mod config;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use config::ServiceConfig;
use fleetgate_postgres::{
    PostgresClient, PostgresConfig, PostgresDeviceRepository, PostgresTelemetryRepository,
    PostgresTenantRepository,
};
use fleetgate_runner::Runner;
use ingest_gateway::{IngestGateway, IngestGatewayConfig};
use telemetry::init_telemetry;

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&config.log_level) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(bind_addr = %config.bind_addr, "starting fleetgate service");
    debug!("Configuration: {:?}", config);

    let postgres_config = PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_pool_size,
    };
    let postgres_client = match PostgresClient::new(&postgres_config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create PostgreSQL client: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = postgres_client.ping().await {
        error!("Failed to reach PostgreSQL: {}", e);
        std::process::exit(1);
    }

    let device_repository = Arc::new(PostgresDeviceRepository::new(postgres_client.clone()));
    let tenant_repository = Arc::new(PostgresTenantRepository::new(postgres_client.clone()));
    let telemetry_repository = Arc::new(PostgresTelemetryRepository::new(postgres_client));

    let gateway = IngestGateway::new(
        device_repository,
        tenant_repository,
        telemetry_repository,
        IngestGatewayConfig {
            bind_addr: config.bind_addr.clone(),
            idle_timeout_secs: config.idle_timeout_secs,
            max_frame_len: config.max_frame_len,
            queue_capacity: config.queue_capacity,
            queue_low_watermark: config.queue_low_watermark,
            queue_high_watermark: config.queue_high_watermark,
            critical_admission_timeout_ms: config.critical_admission_timeout_ms,
            writer_count: config.writer_count,
            batch_max_size: config.batch_max_size,
            batch_linger_ms: config.batch_linger_ms,
            quota_reset_interval_secs: config.quota_reset_interval_secs,
        },
    );

    let mut runner =
        Runner::new().with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs));
    for process in gateway.into_runner_processes() {
        runner = runner.with_process(process);
    }

    if let Err(e) = runner.run().await {
        error!("fleetgate exited with error: {:#}", e);
        std::process::exit(1);
    }
    info!("fleetgate exited normally");
}
