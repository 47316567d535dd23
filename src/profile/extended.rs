//! Extended-schedule firmware: three independently enabled windows per
//! domain, relocated to the 1000+ register bank.

use super::{hour, minute, percent, switch, word, ClockLayout, DeviceProfile, Domain, DomainMap, ProfileKind};
use super::{FAULT_CODES, STATUS_CODES};
use crate::codec::{FieldKind, FieldRule, Switch, Value};

const TENTHS: FieldKind = FieldKind::Scaled { scale: 10 };
const WHOLE: FieldKind = FieldKind::Scaled { scale: 1 };
const TENTHS_32: FieldKind = FieldKind::Combined32 { scale: 10 };

/// Words per schedule window: enable, start hour, start minute, stop hour, stop minute.
const WINDOW_WORDS: u16 = 5;

static WINDOWS: [[&str; 5]; 3] = [
    ["enable1", "startHour1", "startMinute1", "stopHour1", "stopMinute1"],
    ["enable2", "startHour2", "startMinute2", "stopHour2", "stopMinute2"],
    ["enable3", "startHour3", "startMinute3", "stopHour3", "stopMinute3"],
];

pub fn profile() -> DeviceProfile {
    DeviceProfile {
        kind: ProfileKind::Extended,
        sensors: sensors(),
        domains: vec![
            domain(Domain::TouCharging, 1000, [
                percent("chargePowerRate", 1000, 1),
                percent("chargeStopSOC", 1001, 1),
                switch("acChargeEnable", 1002),
            ]),
            domain(Domain::TouDischarging, 1040, [
                percent("dischargePowerRate", 1040, 1),
                percent("dischargeStopSOC", 1041, 1),
                switch("gridDischargeEnable", 1042),
            ]),
        ],
        clock: ClockLayout {
            fields: vec![
                word("year", 1080),
                word("month", 1081),
                word("day", 1082),
                word("hour", 1083),
                word("minute", 1084),
                word("second", 1085),
            ],
            year_base: 0,
        },
    }
}

fn sensors() -> Vec<FieldRule> {
    vec![
        FieldRule::input("systemStatus", 1000, FieldKind::Enumerated(STATUS_CODES)),
        FieldRule::input("pvVoltage", 1001, TENTHS),
        FieldRule::input("pvPower", 1002, TENTHS_32),
        FieldRule::input("outputPower", 1004, TENTHS_32),
        FieldRule::input("batteryVoltage", 1006, TENTHS),
        FieldRule::input("batterySoc", 1007, WHOLE),
        FieldRule::input("gridVoltage", 1008, TENTHS),
        FieldRule::input("gridFrequency", 1009, TENTHS),
        FieldRule::input("outputVoltage", 1010, TENTHS),
        FieldRule::input("inverterTemperature", 1011, TENTHS),
        FieldRule::input("loadPercent", 1012, WHOLE),
        FieldRule::input("faultCode", 1013, FieldKind::Enumerated(FAULT_CODES)),
        FieldRule::input("warningCode", 1014, WHOLE),
        FieldRule::input("pvEnergyToday", 1016, TENTHS_32),
        FieldRule::input("pvEnergyTotal", 1018, TENTHS_32),
        FieldRule::input("acChargeEnergyToday", 1020, TENTHS_32),
        FieldRule::input("batteryDischargeEnergyToday", 1022, TENTHS_32),
    ]
}

/// Three leading settings words at `base`, followed by the three windows.
fn domain(domain: Domain, base: u16, settings: [FieldRule; 3]) -> DomainMap {
    let mut defaults: Vec<(&'static str, Value)> = vec![
        (settings[0].name, Value::Number(100.0)),
        (settings[1].name, Value::Number(if domain == Domain::TouCharging { 100.0 } else { 10.0 })),
        (settings[2].name, Value::Switch(Switch::Off)),
    ];
    let mut fields = settings.to_vec();

    for (n, &[enable, start_hour, start_minute, stop_hour, stop_minute]) in WINDOWS.iter().enumerate() {
        let at = base + 3 + n as u16 * WINDOW_WORDS;
        fields.extend([
            switch(enable, at),
            hour(start_hour, at + 1, WHOLE),
            minute(start_minute, at + 2, WHOLE),
            hour(stop_hour, at + 3, WHOLE),
            minute(stop_minute, at + 4, WHOLE),
        ]);
        defaults.push((enable, Value::Switch(Switch::Off)));
        for name in [start_hour, start_minute, stop_hour, stop_minute] {
            defaults.push((name, Value::Number(0.0)));
        }
    }

    DomainMap {
        domain,
        fields,
        defaults,
    }
}
