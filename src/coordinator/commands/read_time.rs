use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use serde::Serialize;

use crate::codec::Value;
use crate::error::{Error, Result};
use crate::profile::ClockLayout;
use crate::transport::TransportArbiter;

/// The device's real-time clock, as the device reports it. No timezone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceClock {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DeviceClock {
    /// `None` if the device holds an impossible date.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), u32::from(self.day))?
            .and_hms_opt(
                u32::from(self.hour),
                u32::from(self.minute),
                u32::from(self.second),
            )
    }
}

pub struct ReadTime<'a> {
    arbiter: TransportArbiter,
    clock: &'a ClockLayout,
}

impl<'a> ReadTime<'a> {
    pub fn new(arbiter: TransportArbiter, clock: &'a ClockLayout) -> Self {
        Self { arbiter, clock }
    }

    pub async fn run(&self) -> Result<DeviceClock> {
        let values = super::read_fields(&self.arbiter, &self.clock.fields).await?;

        let part = |name: &str| -> Result<u16> {
            match values.get(name) {
                Some(Value::Number(n)) => Ok(*n as u16),
                other => Err(Error::InvalidFieldValue {
                    field: name.to_string(),
                    value: other.map(Value::to_string).unwrap_or_else(|| "<missing>".to_string()),
                    reason: "clock field did not decode to a number".to_string(),
                }),
            }
        };
        let byte = |name: &str| -> Result<u8> {
            let raw = part(name)?;
            u8::try_from(raw).map_err(|_| Error::InvalidFieldValue {
                field: name.to_string(),
                value: raw.to_string(),
                reason: "clock field does not fit in a byte".to_string(),
            })
        };

        let clock = DeviceClock {
            year: part("year")?.saturating_add(self.clock.year_base),
            month: byte("month")?,
            day: byte("day")?,
            hour: byte("hour")?,
            minute: byte("minute")?,
            second: byte("second")?,
        };
        debug!("device clock {:?}", clock);

        Ok(clock)
    }
}
