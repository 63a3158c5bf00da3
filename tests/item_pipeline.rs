mod common;

use std::time::Duration;

use common::{detection, engine, source, RecordingPeer, Write};
use vision_plc_bridge::detect::AllowList;
use vision_plc_bridge::preview::NullPreview;
use vision_plc_bridge::{
    FrameLoop, ItemPipeline, ItemPressureMap, ItemTags, QuitSignal, StopReason, TagValue,
};

fn tags() -> ItemTags {
    ItemTags {
        index: "Vision_Item_Index".into(),
        pressure: "Vision_Pressure".into(),
        new_data: "Vision_NewData".into(),
    }
}

fn pipeline(peer: &RecordingPeer, allow: &[&str], map: &str) -> ItemPipeline<RecordingPeer> {
    ItemPipeline::new(
        AllowList::new(allow.iter().copied()),
        ItemPressureMap::from_json(map).unwrap(),
        Some(peer.clone()),
        tags(),
        Duration::ZERO,
    )
}

#[test]
fn new_apple_writes_index_pressure_and_pulse_in_order() {
    let peer = RecordingPeer::new();
    let mut items = pipeline(&peer, &["apple", "banana"], r#"{"apple": 30}"#);
    let mut engine = engine(0.6).then(vec![detection("apple", 0.8)]);

    let stats = FrameLoop::new(QuitSignal::new())
        .run(&mut source(1), &mut engine, &mut items, &mut NullPreview)
        .unwrap();

    assert_eq!(stats.stop, StopReason::EndOfStream);
    assert_eq!(
        peer.writes(),
        vec![
            Write::Tag("Vision_Item_Index".into(), TagValue::Dint(1)),
            Write::Tag("Vision_Pressure".into(), TagValue::Real(30.0)),
            Write::Tag("Vision_NewData".into(), TagValue::Bool(true)),
            Write::Tag("Vision_NewData".into(), TagValue::Bool(false)),
        ]
    );
    assert_eq!(items.summary(), vec!["[1] apple  ->  30 kPa"]);
}

#[test]
fn repeated_label_is_notified_once() {
    let peer = RecordingPeer::new();
    let mut items = pipeline(&peer, &["apple"], r#"{"apple": 30}"#);
    let mut engine = engine(0.6)
        .then(vec![detection("apple", 0.8), detection("apple", 0.9)])
        .then(vec![detection("apple", 0.7)])
        .idle(vec![detection("apple", 0.95)]);

    FrameLoop::new(QuitSignal::new())
        .run(&mut source(6), &mut engine, &mut items, &mut NullPreview)
        .unwrap();

    assert_eq!(peer.writes().len(), 4);
    assert_eq!(items.seen().labels(), ["apple"]);
}

#[test]
fn labels_outside_allow_list_are_ignored() {
    let peer = RecordingPeer::new();
    let mut items = pipeline(&peer, &["apple"], r#"{"apple": 30, "person": 10}"#);

    let overlays = items
        .handle_detections(&[detection("person", 0.99), detection("car", 0.9)])
        .unwrap();

    assert!(overlays.is_empty());
    assert!(items.seen().is_empty());
    assert!(peer.writes().is_empty());
}

#[test]
fn below_threshold_detections_never_reach_the_pipeline() {
    let peer = RecordingPeer::new();
    let mut items = pipeline(&peer, &["apple"], r#"{"apple": 30}"#);
    let mut engine = engine(0.6).then(vec![detection("apple", 0.5)]);

    FrameLoop::new(QuitSignal::new())
        .run(&mut source(1), &mut engine, &mut items, &mut NullPreview)
        .unwrap();

    assert!(items.seen().is_empty());
    assert!(peer.writes().is_empty());
}

#[test]
fn second_item_uses_map_order_for_index() {
    let peer = RecordingPeer::new();
    let mut items = pipeline(
        &peer,
        &["apple", "banana", "orange"],
        r#"{"apple": 30, "banana": 22.5}"#,
    );
    items
        .handle_detections(&[detection("banana", 0.9), detection("orange", 0.9)])
        .unwrap();

    let writes = peer.writes();
    assert_eq!(writes.len(), 4);
    assert_eq!(writes[0], Write::Tag("Vision_Item_Index".into(), TagValue::Dint(2)));
    assert_eq!(writes[1], Write::Tag("Vision_Pressure".into(), TagValue::Real(22.5)));
    assert_eq!(
        items.summary(),
        vec!["[1] banana  ->  22.5 kPa", "[2] orange  ->  50 kPa"]
    );
}

#[test]
fn failed_write_stops_the_loop() {
    let peer = RecordingPeer::failing_on("Vision_Pressure");
    let mut items = pipeline(&peer, &["apple"], r#"{"apple": 30}"#);
    let mut engine = engine(0.6).then(vec![detection("apple", 0.8)]);

    let err = FrameLoop::new(QuitSignal::new())
        .run(&mut source(3), &mut engine, &mut items, &mut NullPreview)
        .unwrap_err();

    assert!(format!("{:#}", err).contains("controller rejected Vision_Pressure"));
    assert_eq!(
        peer.writes(),
        vec![Write::Tag("Vision_Item_Index".into(), TagValue::Dint(1))]
    );
}
