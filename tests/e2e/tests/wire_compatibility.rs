//! Wire-name compatibility between nodes.
//!
//! Two nodes register structurally compatible but locally distinct types
//! under the same stable wire alias. Dispatch on the receiving side is
//! keyed by the wire name, so neither node needs the other's Rust types.

use e2e_tests::framework::{init_tracing, transport_into};
use messaging_hub::{MessageHub, MessageHubConfiguration, PostOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use types::Address;

#[derive(Debug, Serialize, Deserialize)]
struct PriceRequestV1 {
    symbol: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PriceReplyV1 {
    symbol: String,
    price_cents: u64,
}

// The serving node's own view of the same wire contract.
#[derive(Debug, Serialize, Deserialize)]
struct QuoteQuery {
    symbol: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct QuoteAnswer {
    symbol: String,
    price_cents: u64,
}

const REQUEST_ALIAS: &str = "pricing.request.v1";
const REPLY_ALIAS: &str = "pricing.reply.v1";

#[tokio::test]
async fn test_shared_alias_bridges_distinct_local_types() {
    init_tracing();
    let node_a = MessageHub::spawn(MessageHubConfiguration::new("node-a")).unwrap();
    let node_b = MessageHub::spawn(MessageHubConfiguration::new("node-b")).unwrap();

    node_b
        .host_at(
            Address::new("pricing", "1"),
            MessageHubConfiguration::new("pricing")
                .with_type_alias::<QuoteQuery>(REQUEST_ALIAS)
                .with_type_alias::<QuoteAnswer>(REPLY_ALIAS)
                .with_transport("back", transport_into(&node_a))
                .forward_through("back", |delivery| {
                    (delivery.target().kind() == "client").then(|| "node-a".to_string())
                })
                .with_handler::<QuoteQuery, _, _>(|hub, request| async move {
                    let answer = QuoteAnswer {
                        symbol: request.message().symbol.clone(),
                        price_cents: 101_250,
                    };
                    hub.post(answer, PostOptions::reply_to(request.delivery()))?;
                    Ok(())
                }),
        )
        .unwrap();

    let client = node_a
        .host_at(
            Address::new("client", "1"),
            MessageHubConfiguration::new("client")
                .with_type_alias::<PriceRequestV1>(REQUEST_ALIAS)
                .with_type_alias::<PriceReplyV1>(REPLY_ALIAS)
                .with_transport("out", transport_into(&node_b))
                .forward_through("out", |delivery| {
                    (delivery.target().kind() == "pricing").then(|| "node-b".to_string())
                }),
        )
        .unwrap();

    let response = client
        .await_response(
            PriceRequestV1 {
                symbol: "XAU".into(),
            },
            PostOptions::target(Address::new("pricing", "1")),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

    let reply = response.downcast::<PriceReplyV1>().unwrap();
    assert_eq!(reply.symbol, "XAU");
    assert_eq!(reply.price_cents, 101_250);

    node_a.dispose().await;
    node_b.dispose().await;
}
