mod common;
use common::*;

use std::collections::BTreeMap;
use std::time::Duration;

use tou_bridge::channels::Channels;
use tou_bridge::codec::{Switch, Value};
use tou_bridge::mqtt::{ChannelData, Message, Request};
use tou_bridge::profile::{DeviceProfile, Domain, ProfileKind};

fn message(topic: &str, payload: &str) -> Message {
    Message {
        topic: topic.to_string(),
        retain: false,
        payload: payload.to_string(),
    }
}

#[test]
fn topics_map_to_requests() {
    assert_eq!(
        message("cmd/getTime", "").to_request().unwrap(),
        Request::Command("getTime".to_string())
    );
    assert_eq!(
        message("control/touCharging", "{}").to_request().unwrap(),
        Request::Control("touCharging".to_string())
    );

    for topic in ["cmd", "cmd/", "control/a/b", "state/touCharging"] {
        assert!(message(topic, "").to_request().is_err(), "{}", topic);
    }
}

#[test]
fn state_is_retained_json() {
    let mut state = BTreeMap::new();
    state.insert("acChargeEnable".to_string(), Value::Switch(Switch::On));
    state.insert("chargeStopSOC".to_string(), Value::Number(90.0));

    let m = Message::for_state(Domain::TouCharging, &state).unwrap();
    assert_eq!(m.topic, "state/touCharging");
    assert!(m.retain);
    assert_eq!(m.payload, r#"{"acChargeEnable":"ON","chargeStopSOC":90.0}"#);
}

#[test]
fn schema_lists_every_domain() {
    let profile = DeviceProfile::for_kind(ProfileKind::Packed);
    let m = Message::for_schema(&profile.schemas()).unwrap();

    assert_eq!(m.topic, "schema");
    assert!(m.retain);
    let json: serde_json::Value = serde_json::from_str(&m.payload).unwrap();
    assert_eq!(json[0]["domain"], "touCharging");
    assert_eq!(json[1]["domain"], "touDischarging");
    assert_eq!(json[0]["fields"][0]["name"], "chargePowerRate");
    assert_eq!(json[0]["fields"][0]["max"], 100.0);
}

async fn next_message(receiver: &mut tokio::sync::broadcast::Receiver<ChannelData>) -> Message {
    match tokio::time::timeout(Duration::from_secs(5), receiver.recv()).await {
        Ok(Ok(ChannelData::Message(message))) => message,
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn coordinator_answers_bus_requests() {
    common_setup();

    let device = FakeDevice::new();
    device.set_holding(90, &[100, 100, 0, 0x1600, 0x0600]);
    let channels = Channels::new();
    let coordinator = Factory::coordinator_with(
        Factory::mqtt_config(ProfileKind::Packed),
        &device,
        channels.clone(),
    );
    let mut to_mqtt = channels.to_mqtt.subscribe();

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.start().await })
    };
    while channels.from_mqtt.receiver_count() == 0 {
        tokio::task::yield_now().await;
    }

    let send = |m: Message| channels.from_mqtt.send(ChannelData::Message(m)).unwrap();

    send(message("control/touCharging", r#"{"acChargeEnable": true}"#));
    let state = next_message(&mut to_mqtt).await;
    assert_eq!(state.topic, "state/touCharging");
    assert!(state.payload.contains(r#""acChargeEnable":"ON""#));

    send(message("cmd/unknownThing", ""));
    assert_eq!(
        next_message(&mut to_mqtt).await,
        Message::for_result("unknownThing", "FAIL".to_string())
    );

    send(message("cmd/setTouCharging", ""));
    let state = next_message(&mut to_mqtt).await;
    assert_eq!(state.topic, "state/touCharging");
    assert_eq!(
        next_message(&mut to_mqtt).await,
        Message::for_result("setTouCharging", "OK".to_string())
    );
    // start/stop times came from the device, the switch from the bus
    assert_eq!(
        device.writes(),
        vec![Call::Write(90, vec![100, 100, 1, 0x1600, 0x0600])]
    );

    send(message("cmd/getTouCharging", ""));
    next_message(&mut to_mqtt).await;
    let result = next_message(&mut to_mqtt).await;
    assert_eq!(result.topic, "result/getTouCharging");
    let json: serde_json::Value = serde_json::from_str(&result.payload).unwrap();
    assert_eq!(json["startHour1"], 22.0);

    coordinator.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn coordinator_keeps_going_after_falling_behind() {
    common_setup();

    let device = FakeDevice::new();
    let channels = Channels::new();
    let coordinator = Factory::coordinator_with(
        Factory::mqtt_config(ProfileKind::Packed),
        &device,
        channels.clone(),
    );
    let mut to_mqtt = channels.to_mqtt.subscribe();

    let task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.start().await })
    };
    while channels.from_mqtt.receiver_count() == 0 {
        tokio::task::yield_now().await;
    }

    // more than the bus holds, sent before the coordinator gets to run
    for _ in 0..3000 {
        channels
            .from_mqtt
            .send(ChannelData::Message(message("control/touCharging", "not json")))
            .unwrap();
    }
    channels
        .from_mqtt
        .send(ChannelData::Message(message(
            "control/touCharging",
            r#"{"chargeStopSOC": 70}"#,
        )))
        .unwrap();

    let state = next_message(&mut to_mqtt).await;
    assert_eq!(state.topic, "state/touCharging");
    assert!(state.payload.contains(r#""chargeStopSOC":70.0"#));

    coordinator.stop();
    task.await.unwrap().unwrap();
}
