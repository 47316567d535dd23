use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::codec::{self, FieldKind, FieldRule, Switch, Value};
use crate::error::{Error, Result, Violation};
use crate::plan::{self, WriteGroup};
use crate::profile::{DeviceProfile, Domain, DomainMap};

/// Field name -> value for one writable domain.
pub type ControlDomainState = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainPhase {
    /// Seed values, the device has not been contacted.
    Default,
    /// Last refresh from the device, possibly with local edits merged on top.
    Cached,
    /// Written to the device and unchanged since.
    Flushed,
}

#[derive(Clone, Debug)]
struct DomainEntry {
    phase: DomainPhase,
    values: ControlDomainState,
    /// Fields merged locally since the last refresh or flush.
    pending: BTreeSet<String>,
    /// Whether the values have ever come from, or gone to, the device.
    synced: bool,
}

/// Everything needed to write one domain, computed from a single snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct FlushPlan {
    pub domain: Domain,
    pub state: ControlDomainState,
    pub groups: Vec<WriteGroup>,
}

/// In-memory copy of the device's writable configuration, per domain.
#[derive(Clone, Debug)]
pub struct ControlStateStore {
    profile: Arc<DeviceProfile>,
    entries: BTreeMap<Domain, DomainEntry>,
}

impl ControlStateStore {
    pub fn new(profile: Arc<DeviceProfile>) -> Self {
        let entries = profile
            .domains
            .iter()
            .map(|map| {
                (
                    map.domain,
                    DomainEntry {
                        phase: DomainPhase::Default,
                        values: map.default_state(),
                        pending: BTreeSet::new(),
                        synced: false,
                    },
                )
            })
            .collect();

        Self { profile, entries }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn domains(&self) -> impl Iterator<Item = Domain> + '_ {
        self.entries.keys().copied()
    }

    pub fn phase(&self, domain: Domain) -> Result<DomainPhase> {
        Ok(self.entry(domain)?.phase)
    }

    pub fn snapshot(&self, domain: Domain) -> Result<ControlDomainState> {
        Ok(self.entry(domain)?.values.clone())
    }

    /// True when a write would otherwise rebuild shared words from seed values
    /// the device never reported.
    pub fn needs_device_context(&self, domain: Domain) -> Result<bool> {
        let entry = self.entry(domain)?;
        Ok(!entry.synced && self.profile.domain(domain)?.has_packed_words())
    }

    /// Merges a JSON object of field values into `domain`.
    ///
    /// Unknown keys are ignored. If the message cannot be read as a field-value
    /// mapping the store is left untouched.
    pub fn merge(&mut self, domain: Domain, raw: &str) -> Result<ControlDomainState> {
        let malformed = |reason: String| Error::MalformedControlMessage {
            domain: domain.to_string(),
            reason,
        };

        let message: serde_json::Value =
            serde_json::from_str(raw).map_err(|err| malformed(err.to_string()))?;
        let object = message
            .as_object()
            .ok_or_else(|| malformed(format!("expected a JSON object, got {}", message)))?;

        let map = self.profile.domain(domain)?;
        let mut update = ControlDomainState::new();
        for (key, json) in object {
            let Some(rule) = map.field(key) else {
                debug!("{}: ignoring unknown field {}", domain, key);
                continue;
            };
            let value = coerce(rule, json)
                .ok_or_else(|| malformed(format!("{} has unusable value {}", key, json)))?;
            update.insert(key.clone(), value);
        }

        self.merge_values(domain, update)
    }

    /// Merges already-typed values. Unknown keys are ignored.
    pub fn merge_values(
        &mut self,
        domain: Domain,
        update: ControlDomainState,
    ) -> Result<ControlDomainState> {
        let map = self.profile.domain(domain)?;
        let known: Vec<(String, Value)> = update
            .into_iter()
            .filter(|(key, _)| map.field(key).is_some())
            .collect();

        let entry = self.entry_mut(domain)?;
        for (key, value) in known {
            entry.pending.insert(key.clone());
            entry.values.insert(key, value);
        }
        entry.phase = DomainPhase::Cached;

        Ok(entry.values.clone())
    }

    /// Checks every field of `domain` is present and inside its declared range.
    pub fn validate(&self, domain: Domain) -> Result<()> {
        let entry = self.entry(domain)?;
        validate_state(self.profile.domain(domain)?, &entry.values)
    }

    /// Replaces the whole domain with values read from the device.
    pub fn apply_refresh(
        &mut self,
        domain: Domain,
        fresh: ControlDomainState,
    ) -> Result<ControlDomainState> {
        let entry = self.entry_mut(domain)?;
        entry.values = fresh;
        entry.pending.clear();
        entry.synced = true;
        entry.phase = DomainPhase::Cached;
        info!("{} refreshed from device", domain);

        Ok(entry.values.clone())
    }

    /// Like `apply_refresh`, but fields merged locally since the last sync win
    /// over what the device reported.
    pub fn apply_device_context(
        &mut self,
        domain: Domain,
        fresh: ControlDomainState,
    ) -> Result<ControlDomainState> {
        let entry = self.entry_mut(domain)?;
        for (key, value) in fresh {
            if !entry.pending.contains(&key) {
                entry.values.insert(key, value);
            }
        }
        entry.synced = true;
        entry.phase = DomainPhase::Cached;

        Ok(entry.values.clone())
    }

    /// Validates and encodes the current snapshot of `domain`.
    ///
    /// Fails with `ValidationFailed` or `InvalidFieldValue`; either way nothing
    /// has been written.
    pub fn plan_flush(&self, domain: Domain) -> Result<FlushPlan> {
        let map = self.profile.domain(domain)?;
        let state = self.entry(domain)?.values.clone();

        validate_state(map, &state)?;
        let words = codec::encode_domain(map.fields.iter(), &state)?;

        Ok(FlushPlan {
            domain,
            state,
            groups: plan::write_groups(&words),
        })
    }

    /// Records that `plan` reached the device.
    ///
    /// Edits merged while the write was in flight stay pending.
    pub fn mark_flushed(&mut self, plan: &FlushPlan) -> Result<()> {
        let entry = self.entry_mut(plan.domain)?;
        entry
            .pending
            .retain(|key| entry.values.get(key) != plan.state.get(key));
        entry.synced = true;
        entry.phase = if entry.values == plan.state {
            DomainPhase::Flushed
        } else {
            DomainPhase::Cached
        };

        Ok(())
    }

    fn entry(&self, domain: Domain) -> Result<&DomainEntry> {
        self.entries
            .get(&domain)
            .ok_or_else(|| Error::UnknownDomain(domain.to_string()))
    }

    fn entry_mut(&mut self, domain: Domain) -> Result<&mut DomainEntry> {
        self.entries
            .get_mut(&domain)
            .ok_or_else(|| Error::UnknownDomain(domain.to_string()))
    }
}

fn validate_state(map: &DomainMap, state: &ControlDomainState) -> Result<()> {
    let violations: Vec<Violation> = map
        .fields
        .iter()
        .filter_map(|rule| match state.get(rule.name) {
            None => Some(Violation::new(rule.name, "missing")),
            Some(value) => rule.violation(value).map(|reason| Violation::new(rule.name, reason)),
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::ValidationFailed {
            domain: map.domain,
            violations,
        })
    }
}

/// Reads a JSON value as the field's type where that is unambiguous.
///
/// Values of the wrong type are kept so `validate` can name them; only
/// null, arrays and objects have no representation at all.
fn coerce(rule: &FieldRule, json: &serde_json::Value) -> Option<Value> {
    use serde_json::Value as Json;

    match (rule.kind, json) {
        (_, Json::Null | Json::Array(_) | Json::Object(_)) => None,
        (FieldKind::Switch, Json::Bool(b)) => Some(Value::Switch(Switch::from(*b))),
        (FieldKind::Switch, Json::String(s)) => Some(
            Switch::parse(s)
                .map(Value::Switch)
                .unwrap_or_else(|| Value::Text(s.clone())),
        ),
        (FieldKind::Switch, Json::Number(n)) => match n.as_f64() {
            Some(x) if x == 0.0 => Some(Value::Switch(Switch::Off)),
            Some(x) if x == 1.0 => Some(Value::Switch(Switch::On)),
            other => other.map(Value::Number),
        },
        (_, Json::Number(n)) => n.as_f64().map(Value::Number),
        (FieldKind::Enumerated(_), Json::String(s)) => Some(Value::Text(s.clone())),
        (_, Json::String(s)) => Some(
            s.trim()
                .parse::<f64>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::Text(s.clone())),
        ),
        (_, Json::Bool(b)) => Some(Value::Text(b.to_string())),
    }
}
