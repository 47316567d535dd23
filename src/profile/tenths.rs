//! Later firmware: percentages and battery voltages in 0.1 units, hour and
//! minute each in a word of their own.

use super::{hour, minute, percent, switch, word, ClockLayout, DeviceProfile, Domain, DomainMap, ProfileKind};
use crate::codec::{FieldKind, FieldRule, Switch, Value};

const WHOLE: FieldKind = FieldKind::Scaled { scale: 1 };

fn voltage(name: &'static str, address: u16, min: f64, max: f64) -> FieldRule {
    FieldRule::holding(name, address, FieldKind::Scaled { scale: 10 }).bounded(min, max)
}

pub fn profile() -> DeviceProfile {
    DeviceProfile {
        kind: ProfileKind::Tenths,
        sensors: sensors(),
        domains: vec![tou_charging(), tou_discharging()],
        clock: ClockLayout {
            fields: vec![
                word("year", 45),
                word("month", 46),
                word("day", 47),
                word("hour", 48),
                word("minute", 49),
                word("second", 50),
            ],
            year_base: 0,
        },
    }
}

fn sensors() -> Vec<FieldRule> {
    // same input map as the packed firmware, with state of charge and load in 0.1 %
    super::packed::sensors()
        .into_iter()
        .map(|mut rule| {
            if matches!(rule.name, "batterySoc" | "loadPercent") {
                rule.kind = FieldKind::Scaled { scale: 10 };
            }
            rule
        })
        .collect()
}

fn tou_charging() -> DomainMap {
    DomainMap {
        domain: Domain::TouCharging,
        fields: vec![
            percent("chargePowerRate", 100, 10),
            percent("chargeStopSOC", 101, 10),
            voltage("chargeStopVoltage", 102, 48.0, 58.4),
            switch("acChargeEnable", 103),
            hour("startHour1", 104, WHOLE),
            minute("startMinute1", 105, WHOLE),
            hour("stopHour1", 106, WHOLE),
            minute("stopMinute1", 107, WHOLE),
        ],
        defaults: vec![
            ("chargePowerRate", Value::Number(100.0)),
            ("chargeStopSOC", Value::Number(100.0)),
            ("chargeStopVoltage", Value::Number(56.0)),
            ("acChargeEnable", Value::Switch(Switch::Off)),
            ("startHour1", Value::Number(0.0)),
            ("startMinute1", Value::Number(0.0)),
            ("stopHour1", Value::Number(0.0)),
            ("stopMinute1", Value::Number(0.0)),
        ],
    }
}

fn tou_discharging() -> DomainMap {
    DomainMap {
        domain: Domain::TouDischarging,
        fields: vec![
            percent("dischargePowerRate", 110, 10),
            percent("dischargeStopSOC", 111, 10),
            voltage("dischargeStopVoltage", 112, 42.0, 54.0),
            hour("startHour1", 113, WHOLE),
            minute("startMinute1", 114, WHOLE),
            hour("stopHour1", 115, WHOLE),
            minute("stopMinute1", 116, WHOLE),
        ],
        defaults: vec![
            ("dischargePowerRate", Value::Number(100.0)),
            ("dischargeStopSOC", Value::Number(10.0)),
            ("dischargeStopVoltage", Value::Number(46.0)),
            ("startHour1", Value::Number(0.0)),
            ("startMinute1", Value::Number(0.0)),
            ("stopHour1", Value::Number(0.0)),
            ("stopMinute1", Value::Number(0.0)),
        ],
    }
}
