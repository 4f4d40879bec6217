//! Hub-owned synchronization stream under concurrent writers.
//!
//! Many client tasks post increments at one state-bearing hub; every
//! increment lands exactly once, versions advance once per accepted update,
//! and a reduce subscriber observes a monotone sequence ending at the final
//! state.

use e2e_tests::fixtures::CounterIncrement;
use e2e_tests::framework::init_tracing;
use messaging_hub::{MessageHub, MessageHubConfiguration, PostOptions};
use serde_json::{json, Value};
use std::time::Duration;
use sync_stream::Reference;
use types::Address;

#[derive(Debug)]
struct Drain;

fn counter_hub() -> MessageHubConfiguration {
    MessageHubConfiguration::new("counter")
        .with_handler::<CounterIncrement, _, _>(|hub, delivery| async move {
            let by = delivery.message().by;
            hub.synchronization_stream()
                .update(move |state| {
                    let current = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                    Ok(json!({ "count": current + by }))
                })
                .await?;
            Ok(())
        })
        .with_handler::<Drain, _, _>(|hub, delivery| async move {
            hub.post(Drain, PostOptions::reply_to(delivery.delivery()))?;
            Ok(())
        })
}

#[tokio::test]
async fn test_concurrent_posters_never_lose_an_increment() {
    init_tracing();
    let hub = MessageHub::spawn(counter_hub()).unwrap();
    let stream = hub.synchronization_stream();
    let mut projection = stream.reduce(
        Reference::pointer("/count"),
        Address::new("observer", "1"),
    );

    // Initial projection arrives before any update.
    let initial = projection.recv().await.unwrap();
    assert_eq!(initial.value, Value::Null);

    let writers: Vec<_> = (0..8)
        .map(|_| {
            let hub = hub.clone();
            tokio::spawn(async move {
                for _ in 0..25 {
                    hub.post(CounterIncrement { by: 1 }, PostOptions::default())
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }
    hub.await_response(Drain, PostOptions::default(), Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(stream.snapshot(), json!({ "count": 200 }));
    assert_eq!(stream.version(), 200);

    // The subscriber saw a strictly monotone sequence ending at the final
    // count; suppression may skip nothing here since every update changes it.
    let mut last_version = 0;
    let mut last_value = 0;
    while let Some(update) = projection.try_recv() {
        assert!(update.version > last_version);
        let count = update.value.as_i64().unwrap();
        assert!(count > last_value);
        last_version = update.version;
        last_value = count;
    }
    assert_eq!(last_value, 200);

    hub.dispose().await;
}

#[tokio::test]
async fn test_disposing_the_hub_completes_its_stream() {
    init_tracing();
    let hub = MessageHub::spawn(counter_hub()).unwrap();
    let stream = hub.synchronization_stream();
    let mut projection = stream.reduce(Reference::root(), Address::new("observer", "1"));
    projection.recv().await.unwrap();

    hub.dispose().await;

    assert!(stream.is_disposed());
    assert!(projection.recv().await.is_none());
    assert!(stream.update(|_| Ok(json!({}))).await.is_err());
}
