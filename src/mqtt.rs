use crate::prelude::*;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, Publish, QoS};

use crate::control_store::ControlDomainState;
use crate::coordinator::commands::read_sensors::SensorSnapshot;
use crate::profile::{Domain, DomainSchema};

// Message {{{
/// A message on the bus. `topic` never includes the namespace.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

/// What an inbound message asks the bridge to do.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Request {
    /// `cmd/{name}`
    Command(String),
    /// `control/{domain}`
    Control(String),
}

impl Message {
    pub fn for_result(command: &str, payload: String) -> Message {
        Message {
            topic: format!("result/{}", command),
            retain: false,
            payload,
        }
    }

    pub fn for_state(domain: Domain, state: &ControlDomainState) -> Result<Message> {
        Ok(Message {
            topic: format!("state/{}", domain),
            retain: true,
            payload: serde_json::to_string(state)?,
        })
    }

    pub fn for_schema(schemas: &[DomainSchema]) -> Result<Message> {
        Ok(Message {
            topic: "schema".to_string(),
            retain: true,
            payload: serde_json::to_string(schemas)?,
        })
    }

    pub fn for_snapshot(snapshot: &SensorSnapshot) -> Result<Message> {
        Ok(Message {
            topic: "sensors".to_string(),
            retain: false,
            payload: serde_json::to_string(snapshot)?,
        })
    }

    // eg cmd/getTouCharging => Command("getTouCharging")
    pub fn to_request(&self) -> Result<Request> {
        let parts: Vec<&str> = self.topic.split('/').collect();

        let r = match parts[..] {
            ["cmd", name] if !name.is_empty() => Request::Command(name.to_string()),
            ["control", domain] if !domain.is_empty() => Request::Control(domain.to_string()),
            [..] => bail!("ignoring badly formed MQTT topic: {}", self.topic),
        };

        Ok(r)
    }
} // }}}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ChannelData {
    Message(Message),
    Shutdown,
}

pub type Sender = broadcast::Sender<ChannelData>;

#[derive(Clone)]
pub struct Mqtt {
    config: ConfigWrapper,
    channels: Channels,
    /// Published once the broker connection is up.
    on_connect: Vec<Message>,
}

impl Mqtt {
    pub fn new(config: ConfigWrapper, channels: Channels, on_connect: Vec<Message>) -> Self {
        Self {
            config,
            channels,
            on_connect,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let c = self.config.mqtt();

        if !c.enabled() {
            info!("mqtt disabled, skipping");
            return Ok(());
        }

        let mut options = MqttOptions::new("tou-bridge", c.host(), c.port());

        let will = LastWill {
            topic: self.lwt_topic(),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);

        options.set_keep_alive(std::time::Duration::from_secs(60));
        if let (Some(u), Some(p)) = (c.username(), c.password()) {
            options.set_credentials(u, p);
        }

        info!("initializing mqtt at {}:{}", c.host(), c.port());

        let (client, eventloop) = AsyncClient::new(options, 10);

        futures::try_join!(
            self.setup(client.clone()),
            self.receiver(eventloop),
            self.sender(client)
        )?;

        Ok(())
    }

    pub fn stop(&self) {
        info!("Stopping MQTT client...");
        let _ = self.channels.to_mqtt.send(ChannelData::Shutdown);
    }

    async fn setup(&self, client: AsyncClient) -> Result<()> {
        let namespace = self.config.mqtt().namespace().to_owned();

        client
            .publish(self.lwt_topic(), QoS::AtLeastOnce, true, "online")
            .await?;

        for section in ["cmd", "control"] {
            client
                .subscribe(format!("{}/{}/#", namespace, section), QoS::AtMostOnce)
                .await?;
        }

        for message in &self.on_connect {
            client
                .publish(
                    format!("{}/{}", namespace, message.topic),
                    QoS::AtLeastOnce,
                    message.retain,
                    message.payload.clone(),
                )
                .await?;
        }

        Ok(())
    }

    // mqtt -> coordinator
    async fn receiver(&self, mut eventloop: EventLoop) -> Result<()> {
        let mut shutdown = self.channels.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("MQTT receiver shutting down");
                    break;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        self.handle_message(publish)?;
                    }
                    Err(e) => {
                        error!("{}", e);
                        info!("reconnecting in 5s");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                    _ => {} // keepalives etc
                },
            }
        }

        Ok(())
    }

    fn handle_message(&self, publish: Publish) -> Result<()> {
        // strip "{namespace}/"; works even if the namespace itself contains a /
        let prefix_len = self.config.mqtt().namespace().len() + 1;
        let Some(topic) = publish.topic.get(prefix_len..) else {
            warn!("ignoring message on {}", publish.topic);
            return Ok(());
        };

        let payload = match String::from_utf8(publish.payload.to_vec()) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("ignoring non-UTF-8 payload on {}: {}", publish.topic, err);
                return Ok(());
            }
        };

        let message = Message {
            topic: topic.to_owned(),
            retain: publish.retain,
            payload,
        };
        debug!("RX: {:?}", message);
        if self
            .channels
            .from_mqtt
            .send(ChannelData::Message(message))
            .is_err()
        {
            bail!("send(from_mqtt) failed - channel closed?");
        }

        Ok(())
    }

    // coordinator -> mqtt
    async fn sender(&self, client: AsyncClient) -> Result<()> {
        use ChannelData::*;

        let mut receiver = self.channels.to_mqtt.subscribe();

        loop {
            let data = match receiver.recv().await {
                Ok(data) => data,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("MQTT sender fell behind, {} messages dropped", skipped);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            match data {
                Shutdown => {
                    info!("MQTT sender received shutdown signal");
                    let _ = client.disconnect().await;
                    break;
                }
                Message(message) => {
                    let topic = format!("{}/{}", self.config.mqtt().namespace(), message.topic);
                    debug!("publishing: {} = {}", topic, message.payload);

                    let mut attempt = 1;
                    while let Err(err) = client
                        .publish(&topic, QoS::AtLeastOnce, message.retain, message.payload.as_bytes())
                        .await
                    {
                        if attempt == 3 {
                            error!("MQTT publish to {} failed, dropping: {:?}", topic, err);
                            break;
                        }
                        error!("MQTT publish failed: {:?} - retrying in 10s (attempt {}/3)", err, attempt);
                        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                        attempt += 1;
                    }
                }
            }
        }

        info!("MQTT sender loop exiting");
        Ok(())
    }

    fn lwt_topic(&self) -> String {
        format!("{}/LWT", self.config.mqtt().namespace())
    }
}
