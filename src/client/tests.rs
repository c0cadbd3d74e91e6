use super::Publisher;
use crate::broker::flusher;
use crate::broker::{
    BatchedDeliveryStrategy, Broker, EventRecorder, HandlerError, MessageStatus, Subscriber,
};
use serde_json::json;

#[test]
fn test_publisher_forwards_to_broker() {
    let shared = flusher::shared(Broker::new());
    flusher::lock(&shared).add_subscriber("chat", Subscriber::from_fn("echo", |_| Ok(())));

    let publisher = Publisher::new(shared.clone());
    let msg = publisher.publish("chat", json!({"text": "hi"}));

    assert_eq!(msg.status, MessageStatus::Delivered);
    assert_eq!(msg.payload, json!({"text": "hi"}));
    let summary = flusher::lock(&shared).summarize();
    assert_eq!(summary["chat"].published, 1);
    assert_eq!(summary["chat"].delivered, 1);
}

#[test]
fn test_publishers_share_one_broker() {
    let shared = flusher::shared(
        Broker::new().with_strategy(Box::new(BatchedDeliveryStrategy::new(2))),
    );
    let a = Publisher::new(shared.clone());
    let b = a.clone();

    let first = a.publish("t", "one");
    let second = b.publish("t", "two");

    assert_eq!(first.status, MessageStatus::Queued);
    assert_eq!(second.status, MessageStatus::Delivered);
    assert!(std::sync::Arc::ptr_eq(a.broker(), b.broker()));
    let broker = flusher::lock(&shared);
    assert_eq!(broker.message(first.id).map(|m| m.status), Some(MessageStatus::Delivered));
}

#[test]
fn test_handler_failure_never_reaches_publisher() {
    let shared = flusher::shared(Broker::new());
    let recorder = EventRecorder::new();
    {
        let mut broker = flusher::lock(&shared);
        broker.add_listener(recorder.clone());
        broker.add_subscriber(
            "t",
            Subscriber::from_fn("broken", |_| Err(HandlerError::new("nope"))),
        );
    }

    let msg = Publisher::new(shared).publish("t", 1);

    assert_eq!(msg.status, MessageStatus::DeadLetter);
    assert_eq!(recorder.count("failed"), 3);
}
