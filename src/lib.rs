pub mod channels;
pub mod codec;
pub mod command;
pub mod config;
pub mod control_store;
pub mod coordinator;
pub mod error;
pub mod mqtt;
pub mod options;
pub mod plan;
pub mod prelude;
pub mod profile;
pub mod scheduler;
pub mod transport;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::prelude::*;

use std::io::Write;

use crate::coordinator::Coordinator;
use crate::mqtt::Mqtt;
use crate::profile::DeviceProfile;
use crate::scheduler::Scheduler;
use crate::transport::modbus::ModbusChannel;
use crate::transport::TransportArbiter;

pub async fn app(options: Options) -> Result<()> {
    let config = ConfigWrapper::new(options.config_file.clone())?;

    init_logger(&config.loglevel());
    info!("tou-bridge {} starting with config file: {}", CARGO_PKG_VERSION, options.config_file);
    config.log_summary();

    if options.schema {
        let profile = DeviceProfile::for_kind(config.device().profile());
        profile.validate()?;
        println!("{}", serde_json::to_string_pretty(&profile.schemas())?);
        return Ok(());
    }

    let channels = Channels::new();
    let channel = ModbusChannel::connect(&config.device()).await?;
    let arbiter = TransportArbiter::new(Box::new(channel));
    let coordinator = Coordinator::new(config.clone(), channels.clone(), arbiter)?;

    if let Some(name) = &options.dispatch {
        let result = coordinator.dispatch(name).await?;
        println!("{}", result.payload()?.unwrap_or_else(|| "OK".to_string()));
        coordinator.transport_stats().print_summary();
        return Ok(());
    }

    info!("Initializing components...");

    let coordinator_clone = coordinator.clone();
    let coordinator_handle = tokio::spawn(async move {
        if let Err(e) = coordinator_clone.start().await {
            error!("Coordinator task failed: {}", e);
        }
    });

    let scheduler = Scheduler::new(config.clone(), channels.clone(), coordinator.clone());
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            error!("Scheduler task failed: {}", e);
        }
    });

    let on_connect = vec![mqtt::Message::for_schema(&coordinator.domain_schemas())?];
    let mqtt = Mqtt::new(config.clone(), channels.clone(), on_connect);
    let mqtt_clone = mqtt.clone();
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt_clone.start().await {
            error!("MQTT task failed: {}", e);
        }
    });

    info!("Waiting for shutdown signal...");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, stopping components...");
    let _ = channels.shutdown.send(());
    coordinator.stop();
    mqtt.stop();

    for (name, handle) in [
        ("coordinator", coordinator_handle),
        ("scheduler", scheduler_handle),
        ("mqtt", mqtt_handle),
    ] {
        if let Err(e) = handle.await {
            error!("Error waiting for {} task: {}", name, e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_logger(level: &str) {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();

    if let Err(e) = result {
        eprintln!("Failed to initialise logging: {}", e);
    }
}
