use crate::prelude::*;

pub mod commands;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::command::{Command, CommandEnvelope, CommandResult, Operation};
use crate::control_store::{ControlDomainState, ControlStateStore, DomainPhase};
use crate::error::Error;
use crate::profile::{DeviceProfile, Domain, DomainSchema};
use crate::transport::{TransportArbiter, TransportStats};

use commands::read_domain::ReadDomain;
use commands::read_sensors::{ReadSensors, SensorSnapshot};
use commands::read_time::ReadTime;
use commands::write_domain::WriteDomain;

type CoreResult<T> = crate::error::Result<T>;

/// Routes named commands and control updates to the store and the device.
#[derive(Clone)]
pub struct Coordinator {
    config: ConfigWrapper,
    channels: Channels,
    profile: Arc<DeviceProfile>,
    arbiter: TransportArbiter,
    store: Arc<Mutex<ControlStateStore>>,
}

impl Coordinator {
    pub fn new(
        config: ConfigWrapper,
        channels: Channels,
        arbiter: TransportArbiter,
    ) -> CoreResult<Self> {
        let profile = DeviceProfile::for_kind(config.device().profile());
        profile.validate()?;
        let profile = Arc::new(profile);

        Ok(Self {
            config,
            channels,
            store: Arc::new(Mutex::new(ControlStateStore::new(profile.clone()))),
            profile,
            arbiter,
        })
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.mqtt().enabled() {
            return Ok(());
        }

        let mut receiver = self.channels.from_mqtt.subscribe();

        loop {
            match receiver.recv().await {
                Ok(mqtt::ChannelData::Message(message)) => {
                    if let Err(err) = self.process_message(message).await {
                        error!("{:?}", err);
                    }
                }
                Ok(mqtt::ChannelData::Shutdown) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("coordinator fell behind, {} bus messages dropped", skipped);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.from_mqtt.send(mqtt::ChannelData::Shutdown);
        self.arbiter.stats().print_summary();
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Parses and runs a named command.
    pub async fn dispatch(&self, name: &str) -> CoreResult<CommandResult> {
        let command: Command = name.parse()?;
        info!("dispatching {}", command);

        self.process_command(command).await
    }

    pub async fn process_command(&self, command: Command) -> CoreResult<CommandResult> {
        match command {
            Command::Get(domain) => {
                let state = self.refresh(domain).await?;
                Ok(CommandResult::Domain(CommandEnvelope {
                    domain,
                    operation: Operation::Get,
                    state,
                }))
            }
            Command::Set(domain) => {
                let state = self.flush(domain).await?;
                Ok(CommandResult::Written(CommandEnvelope {
                    domain,
                    operation: Operation::Set,
                    state,
                }))
            }
            Command::GetTime => {
                let clock = ReadTime::new(self.arbiter.clone(), &self.profile.clock)
                    .run()
                    .await?;
                Ok(CommandResult::Time(clock))
            }
        }
    }

    /// Reads `domain` from the device and replaces the cached copy.
    pub async fn refresh(&self, domain: Domain) -> CoreResult<ControlDomainState> {
        let map = self.profile.domain(domain)?;
        let fresh = ReadDomain::new(self.arbiter.clone(), map).run().await?;

        self.store().apply_refresh(domain, fresh)
    }

    /// Writes the cached state of `domain` to the device, as it is when the
    /// write is planned.
    pub async fn flush(&self, domain: Domain) -> CoreResult<ControlDomainState> {
        if self.config.read_only() {
            warn!("refusing to write {} in read-only mode", domain);
            return Err(Error::ReadOnly);
        }

        if self.store().needs_device_context(domain)? {
            // shared words would otherwise be rebuilt from seed values
            let map = self.profile.domain(domain)?;
            let fresh = ReadDomain::new(self.arbiter.clone(), map).run().await?;
            self.store().apply_device_context(domain, fresh)?;
        }

        let plan = self.store().plan_flush(domain)?;
        WriteDomain::new(self.arbiter.clone(), &plan)
            .run()
            .await
            .map_err(|err| {
                if matches!(err, Error::FlushIncomplete { .. }) {
                    warn!("{} is partially written, get it again to see what the device holds", domain);
                }
                err
            })?;
        self.store().mark_flushed(&plan)?;
        info!("{} written", domain);

        Ok(plan.state)
    }

    /// Merges a raw control message into the cached state of `domain`.
    pub fn merge_control(&self, domain: &str, raw: &str) -> CoreResult<ControlDomainState> {
        let domain: Domain = domain.parse()?;
        self.store().merge(domain, raw)
    }

    pub async fn sensor_snapshot(&self) -> CoreResult<SensorSnapshot> {
        ReadSensors::new(self.arbiter.clone(), &self.profile.sensors)
            .run()
            .await
    }

    pub fn domain_schemas(&self) -> Vec<DomainSchema> {
        self.profile.schemas()
    }

    pub fn cached_state(&self, domain: Domain) -> CoreResult<ControlDomainState> {
        self.store().snapshot(domain)
    }

    pub fn domain_phase(&self, domain: Domain) -> CoreResult<DomainPhase> {
        self.store().phase(domain)
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.arbiter.stats()
    }

    async fn process_message(&self, message: mqtt::Message) -> Result<()> {
        match message.to_request()? {
            mqtt::Request::Command(name) => {
                let payload = match self.dispatch(&name).await {
                    Ok(result) => {
                        if let Some(envelope) = result.envelope() {
                            self.publish(mqtt::Message::for_state(envelope.domain, &envelope.state)?)?;
                        }
                        result.payload()?.unwrap_or_else(|| "OK".to_string())
                    }
                    Err(err) => {
                        error!("{}: {}", name, err);
                        "FAIL".to_string()
                    }
                };
                self.publish(mqtt::Message::for_result(&name, payload))?;
            }
            mqtt::Request::Control(domain) => match self.merge_control(&domain, &message.payload) {
                Ok(state) => {
                    let domain: Domain = domain.parse()?;
                    self.publish(mqtt::Message::for_state(domain, &state)?)?;
                }
                Err(err) => warn!("{}", err),
            },
        }

        Ok(())
    }

    fn publish(&self, message: mqtt::Message) -> Result<()> {
        if self
            .channels
            .to_mqtt
            .send(mqtt::ChannelData::Message(message))
            .is_err()
        {
            bail!("send(to_mqtt) failed - channel closed?");
        }

        Ok(())
    }

    fn store(&self) -> MutexGuard<'_, ControlStateStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
