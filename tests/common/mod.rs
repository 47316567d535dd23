#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tou_bridge::channels::Channels;
use tou_bridge::config::{Config, ConfigWrapper};
use tou_bridge::coordinator::Coordinator;
use tou_bridge::error::{Error, Result};
use tou_bridge::profile::ProfileKind;
use tou_bridge::transport::{RegisterChannel, TransportArbiter};

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    ReadHolding(u16, u16),
    ReadInput(u16, u16),
    Write(u16, Vec<u16>),
}

#[derive(Default)]
struct DeviceState {
    holding: BTreeMap<u16, u16>,
    input: BTreeMap<u16, u16>,
    calls: Vec<Call>,
    in_flight: usize,
    overlapped: bool,
    delay: Option<Duration>,
    time_out_next: bool,
    failing_writes: BTreeSet<u16>,
}

/// In-memory register device. Clones share the same registers and call log.
#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel(&self) -> Box<dyn RegisterChannel> {
        Box::new(FakeChannel {
            device: self.clone(),
        })
    }

    pub fn set_holding(&self, address: u16, words: &[u16]) {
        let mut state = self.state.lock().unwrap();
        for (offset, word) in words.iter().enumerate() {
            state.holding.insert(address + offset as u16, *word);
        }
    }

    pub fn set_input(&self, address: u16, words: &[u16]) {
        let mut state = self.state.lock().unwrap();
        for (offset, word) in words.iter().enumerate() {
            state.input.insert(address + offset as u16, *word);
        }
    }

    pub fn holding(&self, address: u16) -> u16 {
        self.state.lock().unwrap().holding.get(&address).copied().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Write(..)))
            .collect()
    }

    /// Whether two calls were ever inside the device at the same time.
    pub fn overlapped(&self) -> bool {
        self.state.lock().unwrap().overlapped
    }

    /// Every call takes this long to answer.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    /// The next call answers nothing and fails with a timeout.
    pub fn time_out_next(&self) {
        self.state.lock().unwrap().time_out_next = true;
    }

    /// Writes starting at `address` fail with a transport error.
    pub fn fail_writes_at(&self, address: u16) {
        self.state.lock().unwrap().failing_writes.insert(address);
    }

    async fn exchange<T>(&self, call: Call, answer: impl FnOnce(&mut DeviceState) -> Result<T>) -> Result<T> {
        let (delay, time_out) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            state.in_flight += 1;
            if state.in_flight > 1 {
                state.overlapped = true;
            }
            (state.delay, std::mem::take(&mut state.time_out_next))
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        if time_out {
            return Err(Error::TransportTimeout(Duration::from_millis(50)));
        }
        answer(&mut state)
    }
}

struct FakeChannel {
    device: FakeDevice,
}

fn words(registers: &BTreeMap<u16, u16>, address: u16, count: u16) -> Vec<u16> {
    (address..address + count)
        .map(|a| registers.get(&a).copied().unwrap_or_default())
        .collect()
}

#[async_trait]
impl RegisterChannel for FakeChannel {
    async fn read_holding(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.device
            .exchange(Call::ReadHolding(address, count), |state| {
                Ok(words(&state.holding, address, count))
            })
            .await
    }

    async fn read_input(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.device
            .exchange(Call::ReadInput(address, count), |state| {
                Ok(words(&state.input, address, count))
            })
            .await
    }

    async fn write_multiple(&mut self, address: u16, words: &[u16]) -> Result<()> {
        let words = words.to_vec();
        self.device
            .exchange(Call::Write(address, words.clone()), move |state| {
                if state.failing_writes.contains(&address) {
                    return Err(Error::Transport("injected write failure".to_string()));
                }
                for (offset, word) in words.into_iter().enumerate() {
                    state.holding.insert(address + offset as u16, word);
                }
                Ok(())
            })
            .await
    }
}

pub struct Factory;

impl Factory {
    pub fn config(profile: ProfileKind) -> Config {
        Config::from_yaml(&format!(
            r#"
device:
  profile: {}
  link:
    type: tcp
    host: localhost
"#,
            profile
        ))
        .unwrap()
    }

    pub fn mqtt_config(profile: ProfileKind) -> Config {
        let mut config = Self::config(profile);
        config.mqtt.enabled = true;
        config
    }

    pub fn arbiter(device: &FakeDevice) -> TransportArbiter {
        TransportArbiter::new(device.channel())
    }

    pub fn coordinator(profile: ProfileKind, device: &FakeDevice) -> Coordinator {
        Self::coordinator_with(Self::config(profile), device, Channels::new())
    }

    pub fn coordinator_with(config: Config, device: &FakeDevice, channels: Channels) -> Coordinator {
        Coordinator::new(ConfigWrapper::from_config(config), channels, Self::arbiter(device)).unwrap()
    }
}
