use log::{error, info};

use crate::control_store::FlushPlan;
use crate::error::{Error, Result};
use crate::transport::TransportArbiter;

/// Writes an encoded domain, one group of consecutive registers at a time.
///
/// Stops at the first failed group. Groups already written stay written; the
/// device has no way to undo them.
pub struct WriteDomain<'a> {
    arbiter: TransportArbiter,
    plan: &'a FlushPlan,
}

impl<'a> WriteDomain<'a> {
    pub fn new(arbiter: TransportArbiter, plan: &'a FlushPlan) -> Self {
        Self { arbiter, plan }
    }

    pub async fn run(&self) -> Result<()> {
        let total = self.plan.groups.len();
        info!("writing {} in {} group(s)", self.plan.domain, total);

        for (completed, group) in self.plan.groups.iter().enumerate() {
            if let Err(err) = self.arbiter.write(group).await {
                if completed == 0 {
                    return Err(err);
                }

                error!(
                    "{} left partially written: {} of {} groups done",
                    self.plan.domain, completed, total
                );
                return Err(Error::FlushIncomplete {
                    domain: self.plan.domain,
                    completed,
                    total,
                    source: Box::new(err),
                });
            }
        }

        Ok(())
    }
}
