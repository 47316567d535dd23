mod common;
use common::*;

use tou_bridge::channels::Channels;
use tou_bridge::codec::{Switch, Value};
use tou_bridge::command::{CommandResult, Operation};
use tou_bridge::control_store::DomainPhase;
use tou_bridge::coordinator::commands::read_time::DeviceClock;
use tou_bridge::error::Error;
use tou_bridge::profile::{Domain, ProfileKind};

#[tokio::test]
async fn unknown_command_leaves_caches_unchanged() {
    common_setup();

    let device = FakeDevice::new();
    let coordinator = Factory::coordinator(ProfileKind::Packed, &device);
    coordinator
        .merge_control("touCharging", r#"{"chargeStopSOC": 80}"#)
        .unwrap();
    let before: Vec<_> = Domain::ALL
        .iter()
        .map(|d| (coordinator.cached_state(*d).unwrap(), coordinator.domain_phase(*d).unwrap()))
        .collect();

    match coordinator.dispatch("unknownThing").await {
        Err(Error::UnknownCommand(name)) => assert_eq!(name, "unknownThing"),
        other => panic!("unexpected {:?}", other),
    }

    let after: Vec<_> = Domain::ALL
        .iter()
        .map(|d| (coordinator.cached_state(*d).unwrap(), coordinator.domain_phase(*d).unwrap()))
        .collect();
    assert_eq!(before, after);
    assert!(device.calls().is_empty());
}

#[tokio::test]
async fn get_reads_and_caches_the_domain() {
    common_setup();

    let device = FakeDevice::new();
    device.set_holding(90, &[80, 95, 1, 0x061E, 0x0800]);
    let coordinator = Factory::coordinator(ProfileKind::Packed, &device);

    let result = coordinator.dispatch("getTouCharging").await.unwrap();
    let envelope = result.envelope().unwrap();
    assert_eq!(envelope.domain, Domain::TouCharging);
    assert_eq!(envelope.operation, Operation::Get);

    let state = &envelope.state;
    assert_eq!(state["chargePowerRate"], Value::Number(80.0));
    assert_eq!(state["chargeStopSOC"], Value::Number(95.0));
    assert_eq!(state["acChargeEnable"], Value::Switch(Switch::On));
    assert_eq!(state["startHour1"], Value::Number(6.0));
    assert_eq!(state["startMinute1"], Value::Number(30.0));
    assert_eq!(state["stopHour1"], Value::Number(8.0));
    assert_eq!(state["stopMinute1"], Value::Number(0.0));

    assert_eq!(device.calls(), vec![Call::ReadHolding(90, 5)]);
    assert_eq!(
        coordinator.domain_phase(Domain::TouCharging).unwrap(),
        DomainPhase::Cached
    );
    assert_eq!(coordinator.cached_state(Domain::TouCharging).unwrap(), *state);
}

#[tokio::test]
async fn get_scales_tenths_profile() {
    common_setup();

    let device = FakeDevice::new();
    device.set_holding(110, &[955, 105, 462, 22, 0, 6, 30]);
    let coordinator = Factory::coordinator(ProfileKind::Tenths, &device);

    let result = coordinator.dispatch("getTouDischarging").await.unwrap();
    let state = &result.envelope().unwrap().state;

    assert_eq!(state["dischargePowerRate"], Value::Number(95.5));
    assert_eq!(state["dischargeStopSOC"], Value::Number(10.5));
    assert_eq!(state["dischargeStopVoltage"], Value::Number(46.2));
    assert_eq!(state["startHour1"], Value::Number(22.0));
    assert_eq!(state["stopMinute1"], Value::Number(30.0));
}

#[tokio::test]
async fn get_time_unpacks_byte_pairs() {
    common_setup();

    let device = FakeDevice::new();
    device.set_holding(45, &[(24 << 8) | 3, (9 << 8) | 14, (5 << 8) | 59]);
    let coordinator = Factory::coordinator(ProfileKind::Packed, &device);

    let result = coordinator.dispatch("getTime").await.unwrap();
    let expected = DeviceClock {
        year: 2024,
        month: 3,
        day: 9,
        hour: 14,
        minute: 5,
        second: 59,
    };
    assert_eq!(result, CommandResult::Time(expected));

    let payload = result.payload().unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(json["year"], 2024);
    assert_eq!(json["second"], 59);
    assert_eq!(device.calls(), vec![Call::ReadHolding(45, 3)]);
}

#[tokio::test]
async fn get_time_reads_whole_words() {
    common_setup();

    let device = FakeDevice::new();
    device.set_holding(1080, &[2025, 12, 31, 23, 59, 0]);
    let coordinator = Factory::coordinator(ProfileKind::Extended, &device);

    match coordinator.dispatch("getTime").await.unwrap() {
        CommandResult::Time(clock) => {
            assert_eq!(clock.year, 2025);
            assert_eq!(clock.day, 31);
            assert!(clock.to_naive().is_some());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn get_time_rejects_out_of_range_word() {
    common_setup();

    let device = FakeDevice::new();
    device.set_holding(1080, &[2025, 12, 31, 300, 59, 0]);
    let coordinator = Factory::coordinator(ProfileKind::Extended, &device);

    match coordinator.dispatch("getTime").await {
        Err(Error::InvalidFieldValue { field, value, .. }) => {
            assert_eq!(field, "hour");
            assert_eq!(value, "300");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn read_only_refuses_set_without_touching_device() {
    common_setup();

    let device = FakeDevice::new();
    let mut config = Factory::config(ProfileKind::Packed);
    config.read_only = true;
    let coordinator = Factory::coordinator_with(config, &device, Channels::new());

    coordinator
        .merge_control("touCharging", r#"{"acChargeEnable": "ON"}"#)
        .unwrap();
    assert!(matches!(
        coordinator.dispatch("setTouCharging").await,
        Err(Error::ReadOnly)
    ));
    assert!(device.calls().is_empty());

    // reads still work
    coordinator.dispatch("getTouCharging").await.unwrap();
    assert_eq!(device.calls().len(), 1);
}

#[tokio::test]
async fn sensor_snapshot_decodes_every_sensor() {
    common_setup();

    let device = FakeDevice::new();
    device.set_input(0, &[1, 2301, 0, 0x0001, 0x0000]);
    device.set_input(18, &[87]);
    device.set_input(40, &[99]);
    let coordinator = Factory::coordinator(ProfileKind::Packed, &device);

    let snapshot = coordinator.sensor_snapshot().await.unwrap();
    let values = &snapshot.values;

    assert_eq!(values.len(), coordinator.profile().sensors.len());
    assert_eq!(values["systemStatus"], Value::Text("PV & Grid".to_string()));
    assert_eq!(values["pvVoltage"], Value::Number(230.1));
    assert_eq!(values["pvPower"], Value::Number(6553.6));
    assert_eq!(values["batterySoc"], Value::Number(87.0));
    // not in the fault table
    assert_eq!(values["faultCode"], Value::Number(99.0));

    // one read per 40-register block
    assert_eq!(
        device.calls(),
        vec![Call::ReadInput(0, 28), Call::ReadInput(40, 22)]
    );
}

#[tokio::test]
async fn merge_control_rejects_unknown_domain_and_bad_payload() {
    common_setup();

    let device = FakeDevice::new();
    let coordinator = Factory::coordinator(ProfileKind::Extended, &device);

    assert!(matches!(
        coordinator.merge_control("touNothing", "{}"),
        Err(Error::UnknownDomain(_))
    ));
    assert!(matches!(
        coordinator.merge_control("touCharging", "enable1=ON"),
        Err(Error::MalformedControlMessage { .. })
    ));

    let state = coordinator
        .merge_control("touCharging", r#"{"enable2": "ON", "startHour2": 7}"#)
        .unwrap();
    assert_eq!(state["enable2"], Value::Switch(Switch::On));
    assert_eq!(state["startHour2"], Value::Number(7.0));
    assert_eq!(state["enable1"], Value::Switch(Switch::Off));
}
