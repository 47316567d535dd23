//! Serialised access to the device link.
//!
//! The device answers one request at a time, so every read and write goes
//! through a `TransportArbiter`. Callers queue on it in arrival order.

pub mod modbus;

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use log::{debug, info, warn};

use crate::codec::{RegisterSpace, RegisterWindow};
use crate::error::{Error, Result};
use crate::plan::{ReadRequest, WriteGroup};

/// One request/response exchange with the device. Implementations need not be
/// safe to call concurrently; the arbiter guarantees they never are.
#[async_trait]
pub trait RegisterChannel: Send {
    async fn read_holding(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;

    async fn read_input(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;

    async fn write_multiple(&mut self, address: u16, words: &[u16]) -> Result<()>;
}

pub type BoxedChannel = Box<dyn RegisterChannel>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub reads: u64,
    pub writes: u64,
    pub timeouts: u64,
    pub failures: u64,
}

impl TransportStats {
    pub fn print_summary(&self) {
        info!("Transport Statistics:");
        info!("  Reads: {}", self.reads);
        info!("  Writes: {}", self.writes);
        info!("  Timeouts: {}", self.timeouts);
        info!("  Other failures: {}", self.failures);
    }
}

#[derive(Clone)]
pub struct TransportArbiter {
    // tokio's Mutex hands the lock out in FIFO order
    channel: Arc<tokio::sync::Mutex<BoxedChannel>>,
    stats: Arc<Mutex<TransportStats>>,
}

impl TransportArbiter {
    pub fn new(channel: BoxedChannel) -> Self {
        Self {
            channel: Arc::new(tokio::sync::Mutex::new(channel)),
            stats: Arc::new(Mutex::new(TransportStats::default())),
        }
    }

    /// Runs `operation` while holding the link.
    ///
    /// The lock is released when `operation` finishes, fails, times out or
    /// the returned future is dropped.
    pub async fn with_exclusive_access<T, F>(&self, operation: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut BoxedChannel) -> BoxFuture<'a, Result<T>>,
    {
        let mut channel = self.channel.lock().await;
        let result = operation(&mut *channel).await;
        drop(channel);

        if let Err(err) = &result {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            if err.is_timeout() {
                stats.timeouts += 1;
            } else {
                stats.failures += 1;
            }
            warn!("transport: {}", err);
        }

        result
    }

    pub async fn read(&self, request: ReadRequest) -> Result<RegisterWindow> {
        debug!(
            "read {:?} registers {}..={}",
            request.space,
            request.address,
            request.last_address()
        );

        let words = self
            .with_exclusive_access(move |channel| match request.space {
                RegisterSpace::Holding => channel.read_holding(request.address, request.count),
                RegisterSpace::Input => channel.read_input(request.address, request.count),
            })
            .await?;

        if words.len() < usize::from(request.count) {
            return Err(Error::Transport(format!(
                "short read at {}: wanted {} words, got {}",
                request.address,
                request.count,
                words.len()
            )));
        }

        self.bump(|stats| stats.reads += 1);
        Ok(RegisterWindow::new(request.space, request.address, words))
    }

    pub async fn write(&self, group: &WriteGroup) -> Result<()> {
        debug!("write {} words at {}", group.words.len(), group.address);

        let address = group.address;
        let words = group.words.clone();
        self.with_exclusive_access(move |channel| {
            async move { channel.write_multiple(address, &words).await }.boxed()
        })
        .await?;

        self.bump(|stats| stats.writes += 1);
        Ok(())
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn bump(&self, f: impl FnOnce(&mut TransportStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}
