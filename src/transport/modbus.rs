use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use tokio_modbus::client::{rtu, tcp, Context};
use tokio_modbus::prelude::{Reader, Writer};
use tokio_modbus::slave::Slave;
use tokio_serial::SerialPortBuilderExt;

use super::RegisterChannel;
use crate::config::{self, Link};
use crate::error::{Error, Result};

/// Modbus RTU or TCP link to a single unit.
pub struct ModbusChannel {
    ctx: Context,
    timeout: Duration,
}

impl ModbusChannel {
    pub async fn connect(device: &config::Device) -> anyhow::Result<Self> {
        let slave = Slave(device.unit_id());

        let ctx = match device.link() {
            Link::Rtu { path, baud_rate } => {
                info!("opening {} at {} baud, unit {}", path, baud_rate, device.unit_id());
                let port = tokio_serial::new(path.as_str(), *baud_rate).open_native_async()?;
                rtu::attach_slave(port, slave)
            }
            Link::Tcp { host, port } => {
                info!("connecting to {}:{}, unit {}", host, port, device.unit_id());
                let address = tokio::net::lookup_host((host.as_str(), *port))
                    .await?
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("{} did not resolve", host))?;
                tcp::connect_slave(address, slave).await?
            }
        };

        Ok(Self {
            ctx,
            timeout: device.timeout(),
        })
    }

    async fn bounded<T, F>(timeout: Duration, request: F) -> Result<T>
    where
        F: Future<Output = tokio_modbus::Result<T>>,
    {
        match tokio::time::timeout(timeout, request).await {
            Err(_) => Err(Error::TransportTimeout(timeout)),
            Ok(Err(err)) => Err(Error::Transport(err.to_string())),
            Ok(Ok(Err(exception))) => Err(Error::Transport(format!("device exception {:?}", exception))),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }
}

#[async_trait]
impl RegisterChannel for ModbusChannel {
    async fn read_holding(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let timeout = self.timeout;
        Self::bounded(timeout, self.ctx.read_holding_registers(address, count)).await
    }

    async fn read_input(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let timeout = self.timeout;
        Self::bounded(timeout, self.ctx.read_input_registers(address, count)).await
    }

    async fn write_multiple(&mut self, address: u16, words: &[u16]) -> Result<()> {
        let timeout = self.timeout;
        Self::bounded(timeout, self.ctx.write_multiple_registers(address, words)).await
    }
}
