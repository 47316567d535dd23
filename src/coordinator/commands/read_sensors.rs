use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::codec::{FieldRule, Value};
use crate::error::Result;
use crate::transport::TransportArbiter;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, Value>,
}

pub struct ReadSensors<'a> {
    arbiter: TransportArbiter,
    sensors: &'a [FieldRule],
}

impl<'a> ReadSensors<'a> {
    pub fn new(arbiter: TransportArbiter, sensors: &'a [FieldRule]) -> Self {
        Self { arbiter, sensors }
    }

    pub async fn run(&self) -> Result<SensorSnapshot> {
        let values = super::read_fields(&self.arbiter, self.sensors).await?;

        Ok(SensorSnapshot {
            timestamp: Utc::now(),
            values,
        })
    }
}
