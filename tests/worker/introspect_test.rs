//! Tests for the `__info__` introspection handler.

use serde_json::Value;

use straylight::broker::Delivery;
use straylight::introspect::{handle_info, operator_info, OperatorInfo};
use straylight::ops;
use straylight::registry::Registry;

use super::support::{MockBroker, TAG};

fn registry() -> Registry {
    let qualified = vec![
        "straylight.ops.Sum".to_owned(),
        "straylight.ops.Sequence".to_owned(),
    ];
    Registry::build(&ops::catalog(), &qualified).expect("registry")
}

#[tokio::test]
async fn info_reply_lists_every_operator_in_order() {
    let broker = MockBroker::new();
    let delivery = Delivery {
        delivery_tag: Some(TAG),
        reply_to: Some("q".to_owned()),
        correlation_id: Some("corr".to_owned()),
        body: Vec::new(),
    };

    handle_info(&broker, &registry(), delivery)
        .await
        .expect("handle");

    let published = broker.published();
    assert_eq!(published.len(), 1);

    let message = &published[0];
    assert_eq!(message.routing_key, "q");
    assert_eq!(message.properties.correlation_id.as_deref(), Some("corr"));
    assert_eq!(message.properties.reply_to, None);

    let info: Vec<OperatorInfo> = serde_json::from_slice(&message.body).expect("info array");
    let names: Vec<_> = info.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["Sum", "Sequence"]);

    assert_eq!(broker.acks(), vec![TAG]);
}

#[tokio::test]
async fn info_schemas_name_the_declared_fields() {
    let broker = MockBroker::new();
    let delivery = Delivery {
        delivery_tag: Some(TAG),
        reply_to: Some("q".to_owned()),
        correlation_id: None,
        body: Vec::new(),
    };

    handle_info(&broker, &registry(), delivery)
        .await
        .expect("handle");

    let message = &broker.published()[0];
    let info: Vec<OperatorInfo> = serde_json::from_slice(&message.body).expect("info array");

    let input_properties = info[0]
        .input
        .get("properties")
        .expect("input schema properties");
    assert!(input_properties.get("a").is_some());
    assert!(input_properties.get("b").is_some());

    let output_properties = info[0]
        .output
        .get("properties")
        .expect("output schema properties");
    assert!(output_properties.get("c").is_some());
}

#[tokio::test]
async fn info_without_reply_to_only_acks() {
    let broker = MockBroker::new();
    let delivery = Delivery {
        delivery_tag: Some(TAG),
        reply_to: None,
        correlation_id: Some("corr".to_owned()),
        body: Vec::new(),
    };

    handle_info(&broker, &registry(), delivery)
        .await
        .expect("handle");

    assert!(broker.published().is_empty(), "nothing published");
    assert!(broker.declared_queues().is_empty(), "no dead-lettering");
    assert_eq!(broker.acks(), vec![TAG]);
}

#[tokio::test]
async fn info_without_correlation_id_omits_it() {
    let broker = MockBroker::new();
    let delivery = Delivery {
        delivery_tag: Some(TAG),
        reply_to: Some("q".to_owned()),
        correlation_id: None,
        body: Vec::new(),
    };

    handle_info(&broker, &registry(), delivery)
        .await
        .expect("handle");

    let message = &broker.published()[0];
    assert_eq!(message.properties.correlation_id, None);
}

#[test]
fn operator_info_preserves_registration_order() {
    let info = operator_info(&registry());
    let names: Vec<_> = info.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["Sum", "Sequence"]);
    for entry in &info {
        assert_ne!(entry.input, Value::Null);
        assert_ne!(entry.output, Value::Null);
    }
}
