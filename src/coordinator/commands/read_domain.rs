use log::info;

use crate::control_store::ControlDomainState;
use crate::error::Result;
use crate::profile::DomainMap;
use crate::transport::TransportArbiter;

pub struct ReadDomain<'a> {
    arbiter: TransportArbiter,
    map: &'a DomainMap,
}

impl<'a> ReadDomain<'a> {
    pub fn new(arbiter: TransportArbiter, map: &'a DomainMap) -> Self {
        Self { arbiter, map }
    }

    pub async fn run(&self) -> Result<ControlDomainState> {
        info!("reading {} from device", self.map.domain);

        super::read_fields(&self.arbiter, &self.map.fields).await
    }
}
