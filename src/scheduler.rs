use crate::prelude::*;

use crate::coordinator::Coordinator;

/// Polls the sensors on a fixed interval and publishes each snapshot.
#[derive(Clone)]
pub struct Scheduler {
    config: ConfigWrapper,
    channels: Channels,
    coordinator: Coordinator,
}

impl Scheduler {
    pub fn new(config: ConfigWrapper, channels: Channels, coordinator: Coordinator) -> Self {
        Self {
            config,
            channels,
            coordinator,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let scheduler = match self.config.scheduler() {
            Some(scheduler) if scheduler.enabled() => scheduler,
            _ => {
                info!("scheduler disabled, skipping");
                return Ok(());
            }
        };

        let mut shutdown = self.channels.shutdown.subscribe();
        let mut interval = tokio::time::interval(scheduler.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = interval.tick() => self.poll().await?,
            }
        }

        info!("scheduler exiting");
        Ok(())
    }

    async fn poll(&self) -> Result<()> {
        let snapshot = match self.coordinator.sensor_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                // try again next tick
                warn!("sensor poll failed: {}", err);
                return Ok(());
            }
        };
        debug!("polled {} sensor values", snapshot.values.len());

        if self.config.mqtt().enabled() {
            let message = mqtt::Message::for_snapshot(&snapshot)?;
            if self
                .channels
                .to_mqtt
                .send(mqtt::ChannelData::Message(message))
                .is_err()
            {
                bail!("send(to_mqtt) failed - channel closed?");
            }
        }

        Ok(())
    }
}
