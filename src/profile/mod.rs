//! Register maps for the supported firmware layouts.
//!
//! A profile is data: which fields exist, where they live and how they are
//! encoded. Nothing outside this module knows a register address.

pub mod extended;
pub mod packed;
pub mod tenths;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::codec::{EnumTable, FieldKind, FieldRule, RegisterSpace, Value};
use crate::error::{Error, Result};
use crate::plan;

pub const STATUS_CODES: EnumTable = &[
    (0, "Standby"),
    (1, "PV & Grid"),
    (2, "Discharge"),
    (3, "Fault"),
    (4, "Flash"),
    (5, "PV Charge"),
    (6, "AC Charge"),
    (7, "Combined Charge"),
    (8, "Combined Charge & Bypass"),
    (9, "PV Charge & Bypass"),
    (10, "AC Charge & Bypass"),
    (11, "Bypass"),
    (12, "PV Charge & Discharge"),
];

pub const FAULT_CODES: EnumTable = &[
    (0, "OK"),
    (1, "Fan fault"),
    (2, "Over temperature"),
    (3, "Battery voltage high"),
    (4, "Battery voltage low"),
    (5, "Output short circuit"),
    (6, "Output voltage high"),
    (7, "Overload timeout"),
    (8, "Bus voltage high"),
    (9, "Bus soft start failed"),
    (51, "Over current"),
    (52, "Bus voltage low"),
    (53, "Inverter soft start failed"),
    (55, "DC voltage in AC output"),
    (57, "Current sensor failed"),
    (58, "Output voltage low"),
];

// Domain {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    #[serde(rename = "touCharging")]
    TouCharging,
    #[serde(rename = "touDischarging")]
    TouDischarging,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::TouCharging, Domain::TouDischarging];

    pub fn name(&self) -> &'static str {
        match self {
            Domain::TouCharging => "touCharging",
            Domain::TouDischarging => "touDischarging",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "touCharging" | "tou_charging" => Ok(Domain::TouCharging),
            "touDischarging" | "tou_discharging" => Ok(Domain::TouDischarging),
            other => Err(Error::UnknownDomain(other.to_string())),
        }
    }
} // }}}

// Schema {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    Switch,
    Enum,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Smallest change the device can store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<&'static str>,
}

impl FieldSchema {
    fn for_rule(rule: &FieldRule) -> Self {
        let (field_type, step, options) = match rule.kind {
            FieldKind::Switch => (FieldType::Switch, None, vec!["ON", "OFF"]),
            FieldKind::Enumerated(table) => (
                FieldType::Enum,
                None,
                table.iter().map(|(_, name)| *name).collect(),
            ),
            FieldKind::Scaled { scale } | FieldKind::Combined32 { scale } => {
                (FieldType::Number, Some(1.0 / f64::from(scale.max(1))), Vec::new())
            }
            FieldKind::HighByte | FieldKind::LowByte => (FieldType::Number, Some(1.0), Vec::new()),
        };

        Self {
            name: rule.name,
            field_type,
            min: rule.bounds.map(|(min, _)| min),
            max: rule.bounds.map(|(_, max)| max),
            step,
            options,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DomainSchema {
    pub domain: Domain,
    pub fields: Vec<FieldSchema>,
}
// }}}

/// Writable fields that are always written together.
#[derive(Clone, Debug, PartialEq)]
pub struct DomainMap {
    pub domain: Domain,
    pub fields: Vec<FieldRule>,
    pub defaults: Vec<(&'static str, Value)>,
}

impl DomainMap {
    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether any register word is shared between two fields of this domain.
    pub fn has_packed_words(&self) -> bool {
        self.fields.iter().any(|f| f.kind.is_packed())
    }

    pub fn default_state(&self) -> BTreeMap<String, Value> {
        self.defaults
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    pub fn schema(&self) -> DomainSchema {
        DomainSchema {
            domain: self.domain,
            fields: self.fields.iter().map(FieldSchema::for_rule).collect(),
        }
    }
}

/// Where the device keeps its real-time clock.
#[derive(Clone, Debug, PartialEq)]
pub struct ClockLayout {
    /// `year`, `month`, `day`, `hour`, `minute` and `second`.
    pub fields: Vec<FieldRule>,
    /// Added to the stored year (2000 on devices that keep two digits).
    pub year_base: u16,
}

pub const CLOCK_FIELDS: [&str; 6] = ["year", "month", "day", "hour", "minute", "second"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Hour and minute packed into one word, percentages unscaled.
    Packed,
    /// Percentages and voltages in 0.1 units, hour and minute in separate words.
    Tenths,
    /// Three enable-able windows per domain in the extended bank.
    Extended,
}

impl std::fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileKind::Packed => f.write_str("packed"),
            ProfileKind::Tenths => f.write_str("tenths"),
            ProfileKind::Extended => f.write_str("extended"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceProfile {
    pub kind: ProfileKind,
    pub sensors: Vec<FieldRule>,
    pub domains: Vec<DomainMap>,
    pub clock: ClockLayout,
}

impl DeviceProfile {
    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Packed => packed::profile(),
            ProfileKind::Tenths => tenths::profile(),
            ProfileKind::Extended => extended::profile(),
        }
    }

    pub fn domain(&self, domain: Domain) -> Result<&DomainMap> {
        self.domains
            .iter()
            .find(|d| d.domain == domain)
            .ok_or_else(|| Error::UnknownDomain(domain.to_string()))
    }

    pub fn schemas(&self) -> Vec<DomainSchema> {
        self.domains.iter().map(DomainMap::schema).collect()
    }

    /// Checks the register map against the rules the store and codec rely on.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidProfile {
            profile: self.kind.to_string(),
            reason,
        };

        let all_rules = self
            .sensors
            .iter()
            .chain(self.domains.iter().flat_map(|d| d.fields.iter()))
            .chain(self.clock.fields.iter());
        for rule in all_rules {
            if plan::crosses_block_boundary(rule.address, rule.word_span()) {
                return Err(invalid(format!(
                    "{} at {} crosses a {}-register block boundary",
                    rule.name,
                    rule.address,
                    plan::BLOCK_SIZE
                )));
            }
        }

        for map in &self.domains {
            self.validate_domain(map).map_err(invalid)?;
        }

        for (i, a) in self.domains.iter().enumerate() {
            for b in &self.domains[i + 1..] {
                for fa in &a.fields {
                    if let Some(fb) = b.fields.iter().find(|fb| fa.overlaps(fb)) {
                        return Err(invalid(format!(
                            "{}.{} and {}.{} share register {}",
                            a.domain, fa.name, b.domain, fb.name, fa.address
                        )));
                    }
                }
            }
        }

        let clock_names: BTreeSet<&str> = self.clock.fields.iter().map(|f| f.name).collect();
        if let Some(missing) = CLOCK_FIELDS.iter().find(|n| !clock_names.contains(*n)) {
            return Err(invalid(format!("clock has no {} field", missing)));
        }

        Ok(())
    }

    fn validate_domain(&self, map: &DomainMap) -> std::result::Result<(), String> {
        let mut names = BTreeSet::new();

        for (i, field) in map.fields.iter().enumerate() {
            if !names.insert(field.name) {
                return Err(format!("{} declares {} twice", map.domain, field.name));
            }
            if field.space != RegisterSpace::Holding {
                return Err(format!("{}.{} is not a holding register", map.domain, field.name));
            }
            let numeric = !matches!(field.kind, FieldKind::Switch | FieldKind::Enumerated(_));
            if numeric && field.bounds.is_none() {
                return Err(format!("{}.{} has no bounds", map.domain, field.name));
            }
            if !map.defaults.iter().any(|(name, _)| *name == field.name) {
                return Err(format!("{}.{} has no default", map.domain, field.name));
            }

            for other in &map.fields[i + 1..] {
                if !field.overlaps(other) {
                    continue;
                }
                let pair = matches!(
                    (field.kind, other.kind),
                    (FieldKind::HighByte, FieldKind::LowByte) | (FieldKind::LowByte, FieldKind::HighByte)
                );
                if !(pair && field.same_range(other)) {
                    return Err(format!(
                        "{}.{} partially aliases {}",
                        map.domain, field.name, other.name
                    ));
                }
            }

            if field.kind.is_packed() {
                let partners = map
                    .fields
                    .iter()
                    .filter(|f| f.address == field.address && f.kind.is_packed())
                    .count();
                if partners != 2 {
                    return Err(format!(
                        "{}.{} shares register {} without a complete byte pair",
                        map.domain, field.name, field.address
                    ));
                }
            }
        }

        Ok(())
    }
}

// Field helpers shared by the profile tables.

pub(crate) fn percent(name: &'static str, address: u16, scale: u16) -> FieldRule {
    FieldRule::holding(name, address, FieldKind::Scaled { scale }).bounded(0.0, 100.0)
}

pub(crate) fn hour(name: &'static str, address: u16, kind: FieldKind) -> FieldRule {
    FieldRule::holding(name, address, kind).bounded(0.0, 23.0)
}

pub(crate) fn minute(name: &'static str, address: u16, kind: FieldKind) -> FieldRule {
    FieldRule::holding(name, address, kind).bounded(0.0, 59.0)
}

pub(crate) fn switch(name: &'static str, address: u16) -> FieldRule {
    FieldRule::holding(name, address, FieldKind::Switch)
}

pub(crate) fn word(name: &'static str, address: u16) -> FieldRule {
    FieldRule::holding(name, address, FieldKind::Scaled { scale: 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, RegisterWindow, Switch};

    const KINDS: [ProfileKind; 3] = [ProfileKind::Packed, ProfileKind::Tenths, ProfileKind::Extended];

    fn round_trip(rule: &FieldRule, value: &Value) {
        let mut words = vec![0u16; usize::from(rule.word_span())];
        for part in codec::encode_field(rule, value).unwrap() {
            let slot = &mut words[usize::from(part.address - rule.address)];
            *slot = (*slot & !part.mask) | (part.bits & part.mask);
        }
        assert_eq!(codec::decode_words(rule.kind, &words), *value, "{}", rule.name);
    }

    #[test]
    fn every_field_round_trips_across_its_range() {
        for kind in KINDS {
            let profile = DeviceProfile::for_kind(kind);
            let rules = profile
                .domains
                .iter()
                .flat_map(|d| d.fields.iter())
                .chain(profile.sensors.iter())
                .chain(profile.clock.fields.iter());

            for rule in rules {
                match rule.kind {
                    FieldKind::Switch => {
                        round_trip(rule, &Value::Switch(Switch::On));
                        round_trip(rule, &Value::Switch(Switch::Off));
                    }
                    FieldKind::Enumerated(table) => {
                        for (_, label) in table {
                            round_trip(rule, &Value::Text(label.to_string()));
                        }
                    }
                    FieldKind::Scaled { scale } | FieldKind::Combined32 { scale } => {
                        let Some((min, max)) = rule.bounds else { continue };
                        let scale = f64::from(scale.max(1));
                        let (lo, hi) = ((min * scale).round() as u32, (max * scale).round() as u32);
                        for raw in lo..=hi {
                            round_trip(rule, &Value::Number(f64::from(raw) / scale));
                        }
                    }
                    FieldKind::HighByte | FieldKind::LowByte => {
                        let (min, max) = rule.bounds.unwrap_or((0.0, 255.0));
                        for raw in min as u32..=max as u32 {
                            round_trip(rule, &Value::Number(f64::from(raw)));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn packed_pairs_round_trip_through_whole_domain() {
        let profile = DeviceProfile::for_kind(ProfileKind::Packed);

        for map in &profile.domains {
            let first = map.fields.iter().map(|f| f.address).min().unwrap();
            let last = map.fields.iter().map(FieldRule::last_address).max().unwrap();

            let highs = map.fields.iter().filter(|f| f.kind == FieldKind::HighByte);
            for high in highs {
                let low = map
                    .fields
                    .iter()
                    .find(|f| f.kind == FieldKind::LowByte && f.address == high.address)
                    .unwrap();
                let (high_max, low_max) = (high.bounds.unwrap().1 as u16, low.bounds.unwrap().1 as u16);

                for h in 0..=high_max {
                    for l in 0..=low_max {
                        let mut state = map.default_state();
                        state.insert(high.name.to_string(), Value::Number(f64::from(h)));
                        state.insert(low.name.to_string(), Value::Number(f64::from(l)));

                        let encoded = codec::encode_domain(map.fields.iter(), &state).unwrap();
                        assert_eq!(encoded[&high.address], (h << 8) | l);
                        let words = (first..=last)
                            .map(|a| encoded.get(&a).copied().unwrap_or_default())
                            .collect();
                        let window = RegisterWindow::new(RegisterSpace::Holding, first, words);

                        assert_eq!(codec::decode_all(&[window], &map.fields).unwrap(), state);
                    }
                }
            }
        }
    }

    #[test]
    fn shipped_profiles_are_valid() {
        for kind in KINDS {
            let profile = DeviceProfile::for_kind(kind);
            assert_eq!(profile.validate().map_err(|e| e.to_string()), Ok(()), "{}", kind);
            assert_eq!(profile.domains.len(), 2);
        }
    }

    #[test]
    fn partial_alias_is_rejected() {
        let mut profile = DeviceProfile::for_kind(ProfileKind::Tenths);
        let map = &mut profile.domains[0];
        map.fields.push(
            FieldRule::holding("overlap", 100, FieldKind::Combined32 { scale: 1 }).bounded(0.0, 1.0),
        );
        map.defaults.push(("overlap", Value::Number(0.0)));

        assert!(matches!(profile.validate(), Err(Error::InvalidProfile { .. })));
    }

    #[test]
    fn lone_packed_half_is_rejected() {
        let mut profile = DeviceProfile::for_kind(ProfileKind::Packed);
        let map = &mut profile.domains[1];
        map.fields.retain(|f| f.name != "stopMinute1");

        assert!(profile.validate().is_err());
    }

    #[test]
    fn domains_must_not_share_registers() {
        let mut profile = DeviceProfile::for_kind(ProfileKind::Packed);
        let address = profile.domains[0].fields[0].address;
        profile.domains[1].fields.push(switch("stray", address));
        profile.domains[1].defaults.push(("stray", Value::Switch(Switch::Off)));

        assert!(profile.validate().is_err());
    }

    #[test]
    fn domain_names_round_trip() {
        for domain in Domain::ALL {
            assert_eq!(domain.name().parse::<Domain>().unwrap(), domain);
        }
        assert!(matches!("touNothing".parse::<Domain>(), Err(Error::UnknownDomain(_))));
    }

    #[test]
    fn schema_lists_bounds_and_options() {
        let profile = DeviceProfile::for_kind(ProfileKind::Tenths);
        let schema = profile.domain(Domain::TouCharging).unwrap().schema();

        let voltage = schema.fields.iter().find(|f| f.name == "chargeStopVoltage").unwrap();
        assert_eq!(voltage.field_type, FieldType::Number);
        assert_eq!(voltage.step, Some(0.1));
        assert!(voltage.min.unwrap() > 0.0);

        let enable = schema.fields.iter().find(|f| f.name == "acChargeEnable").unwrap();
        assert_eq!(enable.options, vec!["ON", "OFF"]);
    }
}
