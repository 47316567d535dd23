//! Original firmware layout: each schedule boundary packs `hour << 8 | minute`
//! into one word, percentages are whole numbers.

use super::{hour, minute, percent, switch, ClockLayout, DeviceProfile, Domain, DomainMap, ProfileKind};
use super::{FAULT_CODES, STATUS_CODES};
use crate::codec::{FieldKind, FieldRule, Switch, Value};

const TENTHS: FieldKind = FieldKind::Scaled { scale: 10 };
const WHOLE: FieldKind = FieldKind::Scaled { scale: 1 };
const TENTHS_32: FieldKind = FieldKind::Combined32 { scale: 10 };

pub fn profile() -> DeviceProfile {
    DeviceProfile {
        kind: ProfileKind::Packed,
        sensors: sensors(),
        domains: vec![tou_charging(), tou_discharging()],
        clock: ClockLayout {
            fields: vec![
                FieldRule::holding("year", 45, FieldKind::HighByte),
                FieldRule::holding("month", 45, FieldKind::LowByte),
                FieldRule::holding("day", 46, FieldKind::HighByte),
                FieldRule::holding("hour", 46, FieldKind::LowByte),
                FieldRule::holding("minute", 47, FieldKind::HighByte),
                FieldRule::holding("second", 47, FieldKind::LowByte),
            ],
            year_base: 2000,
        },
    }
}

pub(crate) fn sensors() -> Vec<FieldRule> {
    vec![
        FieldRule::input("systemStatus", 0, FieldKind::Enumerated(STATUS_CODES)),
        FieldRule::input("pvVoltage", 1, TENTHS),
        FieldRule::input("pvPower", 3, TENTHS_32),
        FieldRule::input("outputPower", 9, TENTHS_32),
        FieldRule::input("batteryVoltage", 17, TENTHS),
        FieldRule::input("batterySoc", 18, WHOLE),
        FieldRule::input("gridVoltage", 20, TENTHS),
        FieldRule::input("gridFrequency", 21, TENTHS),
        FieldRule::input("outputVoltage", 22, TENTHS),
        FieldRule::input("inverterTemperature", 25, TENTHS),
        FieldRule::input("loadPercent", 27, WHOLE),
        FieldRule::input("faultCode", 40, FieldKind::Enumerated(FAULT_CODES)),
        FieldRule::input("warningCode", 41, WHOLE),
        FieldRule::input("pvEnergyToday", 48, TENTHS_32),
        FieldRule::input("pvEnergyTotal", 50, TENTHS_32),
        FieldRule::input("acChargeEnergyToday", 56, TENTHS_32),
        FieldRule::input("batteryDischargeEnergyToday", 60, TENTHS_32),
    ]
}

fn tou_charging() -> DomainMap {
    DomainMap {
        domain: Domain::TouCharging,
        fields: vec![
            percent("chargePowerRate", 90, 1),
            percent("chargeStopSOC", 91, 1),
            switch("acChargeEnable", 92),
            hour("startHour1", 93, FieldKind::HighByte),
            minute("startMinute1", 93, FieldKind::LowByte),
            hour("stopHour1", 94, FieldKind::HighByte),
            minute("stopMinute1", 94, FieldKind::LowByte),
        ],
        defaults: vec![
            ("chargePowerRate", Value::Number(100.0)),
            ("chargeStopSOC", Value::Number(100.0)),
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
            percent("dischargePowerRate", 95, 1),
            percent("dischargeStopSOC", 96, 1),
            hour("startHour1", 97, FieldKind::HighByte),
            minute("startMinute1", 97, FieldKind::LowByte),
            hour("stopHour1", 98, FieldKind::HighByte),
            minute("stopMinute1", 98, FieldKind::LowByte),
        ],
        defaults: vec![
            ("dischargePowerRate", Value::Number(100.0)),
            ("dischargeStopSOC", Value::Number(10.0)),
            ("startHour1", Value::Number(0.0)),
            ("startMinute1", Value::Number(0.0)),
            ("stopHour1", Value::Number(0.0)),
            ("stopMinute1", Value::Number(0.0)),
        ],
    }
}
