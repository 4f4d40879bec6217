//! Request/response between two in-process nodes.
//!
//! Each node is a root hub with its own arena and type registry. Deliveries
//! cross node boundaries through loopback transports, so requests and
//! responses both travel the full encode/decode envelope path.

use e2e_tests::fixtures::{InvoiceQuery, InvoiceQuoted};
use e2e_tests::framework::{init_tracing, transport_into};
use messaging_hub::{HubTransport, MessageHub, MessageHubConfiguration, PostOptions};
use std::sync::Arc;
use std::time::Duration;
use types::{Address, HubError};

/// Billing service hosted on the remote node, replying over the transport
/// back to the client's node.
fn billing_service(back_to_client_node: Arc<dyn HubTransport>) -> MessageHubConfiguration {
    MessageHubConfiguration::new("billing")
        .with_type::<InvoiceQuery>()
        .with_type::<InvoiceQuoted>()
        .with_transport("client-node", back_to_client_node)
        .forward_through("client-node", |delivery| {
            (delivery.target().kind() == "client").then(|| "client-node".to_string())
        })
        .with_handler::<InvoiceQuery, _, _>(|hub, request| async move {
            let quoted = InvoiceQuoted {
                invoice_id: request.message().invoice_id.clone(),
                amount_cents: 12_500,
            };
            hub.post(quoted, PostOptions::reply_to(request.delivery()))?;
            Ok(())
        })
}

fn client(to_billing_node: Arc<dyn HubTransport>) -> MessageHubConfiguration {
    MessageHubConfiguration::new("client")
        .with_type::<InvoiceQuery>()
        .with_type::<InvoiceQuoted>()
        .with_transport("billing-node", to_billing_node)
        .forward_through("billing-node", |delivery| {
            (delivery.target().kind() == "billing").then(|| "billing-node".to_string())
        })
}

#[tokio::test]
async fn test_request_response_round_trip_across_nodes() {
    init_tracing();
    let node_a = MessageHub::spawn(MessageHubConfiguration::new("node-a")).unwrap();
    let node_b = MessageHub::spawn(MessageHubConfiguration::new("node-b")).unwrap();

    let client = node_a
        .host_at(Address::new("client", "1"), client(transport_into(&node_b)))
        .unwrap();
    node_b
        .host_at(
            Address::new("billing", "1"),
            billing_service(transport_into(&node_a)),
        )
        .unwrap();

    let response = client
        .await_response(
            InvoiceQuery {
                invoice_id: "inv-42".into(),
            },
            PostOptions::target(Address::new("billing", "1")),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

    let quoted = response.downcast::<InvoiceQuoted>().unwrap();
    assert_eq!(quoted.invoice_id, "inv-42");
    assert_eq!(quoted.amount_cents, 12_500);

    node_a.dispose().await;
    node_b.dispose().await;
}

#[tokio::test]
async fn test_missing_remote_hub_fails_the_request_back_to_caller() {
    init_tracing();
    let node_a = MessageHub::spawn(MessageHubConfiguration::new("node-a")).unwrap();
    let node_b = MessageHub::spawn(MessageHubConfiguration::new("node-b")).unwrap();

    // The rule forwards "billing" traffic to node B, but nothing is hosted
    // there. The transport failure must come back as a routing error, not
    // hang until the timeout.
    let client = node_a
        .host_at(Address::new("client", "1"), client(transport_into(&node_b)))
        .unwrap();

    let err = client
        .await_response(
            InvoiceQuery {
                invoice_id: "inv-1".into(),
            },
            PostOptions::target(Address::new("billing", "1")),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

    match err {
        HubError::Routing { reason, .. } => assert!(reason.contains("transport")),
        other => panic!("expected routing failure, got {other}"),
    }

    node_a.dispose().await;
    node_b.dispose().await;
}

#[tokio::test]
async fn test_per_sender_order_survives_node_crossing() {
    init_tracing();
    let node_a = MessageHub::spawn(MessageHubConfiguration::new("node-a")).unwrap();
    let node_b = MessageHub::spawn(MessageHubConfiguration::new("node-b")).unwrap();

    let received: Arc<parking_lot::Mutex<Vec<String>>> = Arc::default();
    let sink_log = Arc::clone(&received);
    let collector = MessageHubConfiguration::new("billing")
        .with_type::<InvoiceQuery>()
        .with_type::<InvoiceQuoted>()
        .with_transport("client-node", transport_into(&node_a))
        .forward_through("client-node", |delivery| {
            (delivery.target().kind() == "client").then(|| "client-node".to_string())
        })
        .with_handler::<InvoiceQuery, _, _>(move |hub, request| {
            let log = Arc::clone(&sink_log);
            async move {
                log.lock().push(request.message().invoice_id.clone());
                if request.message().invoice_id == "inv-9" {
                    let done = InvoiceQuoted {
                        invoice_id: "inv-9".into(),
                        amount_cents: 0,
                    };
                    hub.post(done, PostOptions::reply_to(request.delivery()))?;
                }
                Ok(())
            }
        });

    let client = node_a
        .host_at(Address::new("client", "1"), client(transport_into(&node_b)))
        .unwrap();
    node_b
        .host_at(Address::new("billing", "1"), collector)
        .unwrap();

    for n in 0..9 {
        client
            .post(
                InvoiceQuery {
                    invoice_id: format!("inv-{n}"),
                },
                PostOptions::target(Address::new("billing", "1")),
            )
            .unwrap();
    }
    // The last query doubles as a flush: its reply proves everything
    // posted before it was processed.
    client
        .await_response(
            InvoiceQuery {
                invoice_id: "inv-9".into(),
            },
            PostOptions::target(Address::new("billing", "1")),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

    let expected: Vec<String> = (0..10).map(|n| format!("inv-{n}")).collect();
    assert_eq!(*received.lock(), expected);

    node_a.dispose().await;
    node_b.dispose().await;
}
