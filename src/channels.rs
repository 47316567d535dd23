use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Channels {
    pub from_mqtt: broadcast::Sender<mqtt::ChannelData>,
    pub to_mqtt: broadcast::Sender<mqtt::ChannelData>,
    /// Fired once when the process is asked to stop.
    pub shutdown: broadcast::Sender<()>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            from_mqtt: Self::channel(),
            to_mqtt: Self::channel(),
            shutdown: broadcast::channel(1).0,
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(2048).0
    }
}
