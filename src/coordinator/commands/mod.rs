pub mod read_domain;
pub mod read_sensors;
pub mod read_time;
pub mod write_domain;

use std::collections::BTreeMap;

use crate::codec::{self, FieldRule, Value};
use crate::error::Result;
use crate::plan;
use crate::transport::TransportArbiter;

/// Reads every register behind `rules`, one arbitrated call per planned window,
/// and decodes the fields.
pub(crate) async fn read_fields(
    arbiter: &TransportArbiter,
    rules: &[FieldRule],
) -> Result<BTreeMap<String, Value>> {
    let mut windows = Vec::new();
    for request in plan::plan_reads(rules) {
        windows.push(arbiter.read(request).await?);
    }

    codec::decode_all(&windows, rules)
}
