//! Catalog-driven routing between nodes.
//!
//! The client node carries no explicit routing rule for the billing kind.
//! Resolution goes through the mesh catalog, populated by installing a
//! startup module that declares the billing node.

use e2e_tests::fixtures::{InvoiceQuery, InvoiceQuoted};
use e2e_tests::framework::{init_tracing, transport_into, wait_for_status};
use mesh::{MeshCatalog, MeshConfig, InMemoryNodeStore, StaticModuleLoader};
use messaging_hub::{HubStatus, MessageHub, MessageHubConfiguration, PostOptions};
use std::sync::Arc;
use std::time::Duration;
use types::{Address, HubError, MeshNode};

fn billing_service(back: Arc<dyn messaging_hub::HubTransport>) -> MessageHubConfiguration {
    MessageHubConfiguration::new("billing")
        .with_type::<InvoiceQuery>()
        .with_type::<InvoiceQuoted>()
        .with_transport("client-node", back)
        .forward_through("client-node", |delivery| {
            (delivery.target().kind() == "client").then(|| "client-node".to_string())
        })
        .with_handler::<InvoiceQuery, _, _>(|hub, request| async move {
            let quoted = InvoiceQuoted {
                invoice_id: request.message().invoice_id.clone(),
                amount_cents: 9_900,
            };
            hub.post(quoted, PostOptions::reply_to(request.delivery()))?;
            Ok(())
        })
}

fn catalog_declaring_billing() -> (Arc<MeshCatalog>, MeshConfig) {
    let loader = StaticModuleLoader::new();
    loader.register("modules/billing", || {
        Ok(vec![
            MeshNode::new("billing-node", "/srv/mesh/billing")
                .with_module_ref("modules/billing")
                .with_address_kind("billing"),
        ])
    });
    let catalog = Arc::new(MeshCatalog::new(
        Arc::new(InMemoryNodeStore::new()),
        Arc::new(loader),
    ));
    let config = MeshConfig::default().with_startup_module("modules/billing");
    (catalog, config)
}

#[tokio::test]
async fn test_catalog_resolves_and_routes_to_owning_node() {
    init_tracing();
    let node_a = MessageHub::spawn(MessageHubConfiguration::new("node-a")).unwrap();
    let node_b = MessageHub::spawn(MessageHubConfiguration::new("node-b")).unwrap();

    let (catalog, mesh_config) = catalog_declaring_billing();
    node_b
        .host_at(
            Address::new("billing", "1"),
            billing_service(transport_into(&node_a)),
        )
        .unwrap();

    // The client defers its own traffic until the catalog finishes
    // installing startup modules.
    let startup_catalog = Arc::clone(&catalog);
    let client_config = MessageHubConfiguration::new("client")
        .with_type::<InvoiceQuery>()
        .with_type::<InvoiceQuoted>()
        .with_transport("mesh", transport_into(&node_b))
        .with_node_resolver(Arc::clone(&catalog) as Arc<dyn messaging_hub::NodeResolver>, "mesh")
        .with_startup(move |hub| {
            let catalog = Arc::clone(&startup_catalog);
            let mesh_config = mesh_config.clone();
            async move {
                catalog.initialize(&mesh_config, hub.defer(|_| true)).await;
                Ok(())
            }
        });
    let client = node_a
        .host_at(Address::new("client", "1"), client_config)
        .unwrap();

    // Posted while the startup deferral is still buffering; the reply still
    // arrives once the catalog is ready.
    let response = client
        .await_response(
            InvoiceQuery {
                invoice_id: "inv-7".into(),
            },
            PostOptions::target(Address::new("billing", "any")),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

    assert!(wait_for_status(&client, HubStatus::Running, Duration::from_secs(1)).await);
    assert_eq!(response.downcast::<InvoiceQuoted>().unwrap().amount_cents, 9_900);
    assert_eq!(
        catalog.get_node_id(&Address::new("billing", "any")),
        Some("billing-node".into())
    );

    node_a.dispose().await;
    node_b.dispose().await;
}

#[tokio::test]
async fn test_unresolved_kind_fails_back_to_caller() {
    init_tracing();
    let node_a = MessageHub::spawn(MessageHubConfiguration::new("node-a")).unwrap();
    let node_b = MessageHub::spawn(MessageHubConfiguration::new("node-b")).unwrap();

    let catalog = Arc::new(MeshCatalog::new(
        Arc::new(InMemoryNodeStore::new()),
        Arc::new(StaticModuleLoader::new()),
    ));
    let client = node_a
        .host_at(
            Address::new("client", "1"),
            MessageHubConfiguration::new("client")
                .with_type::<InvoiceQuery>()
                .with_transport("mesh", transport_into(&node_b))
                .with_node_resolver(catalog as Arc<dyn messaging_hub::NodeResolver>, "mesh"),
        )
        .unwrap();

    let err = client
        .await_response(
            InvoiceQuery {
                invoice_id: "inv-1".into(),
            },
            PostOptions::target(Address::new("nowhere", "1")),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

    match err {
        HubError::Routing { target, reason } => {
            assert!(target.contains("nowhere"));
            assert!(reason.contains("no route"));
        }
        other => panic!("expected routing failure, got {other}"),
    }

    node_a.dispose().await;
    node_b.dispose().await;
}

#[tokio::test]
async fn test_address_mapping_overrides_kind_index() {
    init_tracing();
    let (catalog, mesh_config) = catalog_declaring_billing();
    let hub = MessageHub::spawn(MessageHubConfiguration::new("mesh")).unwrap();
    catalog.initialize(&mesh_config, hub.defer(|_| true)).await;

    catalog.add_address_mapping(|address| {
        (address.id() == "vip").then(|| "dedicated-node".to_string())
    });

    assert_eq!(
        catalog.get_node_id(&Address::new("billing", "vip")),
        Some("dedicated-node".into())
    );
    assert_eq!(
        catalog.get_node_id(&Address::new("billing", "ordinary")),
        Some("billing-node".into())
    );
    hub.dispose().await;
}
