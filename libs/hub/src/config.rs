//! Hub Configuration
//!
//! Immutable description of one hub: its handlers, hosted children, routing
//! rules and type registrations. Built once, validated at spawn; the
//! dispatch table is closed at that point, so handler selection costs one
//! map lookup per delivery.
//!
//! Handler tie-break: registering a second handler for the same message type
//! overwrites the table entry, so the most recently registered handler wins.

use crate::handler::{erase, ErasedHandler, TypedDelivery};
use crate::hub::MessageHub;
use crate::transport::{HubTransport, NodeResolver};
use codec::TypeRegistry;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use types::{Address, Delivery, HubError, Result};

pub(crate) type HostedHubFactory =
    Arc<dyn Fn(&Address) -> MessageHubConfiguration + Send + Sync>;
pub(crate) type KeySelector = Arc<dyn Fn(&Delivery) -> Option<String> + Send + Sync>;
pub(crate) type TypeRegistration = Arc<dyn Fn(&TypeRegistry) -> Result<()> + Send + Sync>;
pub(crate) type StartupFn =
    Arc<dyn Fn(MessageHub) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One routing rule; rules are consulted in registration order and the
/// first match wins.
#[derive(Clone)]
pub enum RouteRule {
    /// Route deliveries for an address kind to a hosted hub, cold-starting
    /// it from the factory on first use.
    HostedHub {
        kind: String,
        factory: HostedHubFactory,
    },
    /// Forward through a named transport; the rule matches when the key
    /// selector yields a routing key for the delivery.
    Transport {
        transport: String,
        key_selector: KeySelector,
    },
}

/// Plugins bundle handler/type registrations so collaborators can extend a
/// hub without owning its configuration.
pub trait HubPlugin {
    fn configure(&self, config: MessageHubConfiguration) -> MessageHubConfiguration;
}

/// Immutable builder describing a hub before it starts.
#[derive(Clone)]
pub struct MessageHubConfiguration {
    pub(crate) kind: String,
    pub(crate) address: Option<Address>,
    pub(crate) handlers: HashMap<TypeId, ErasedHandler>,
    pub(crate) default_sink: Option<ErasedHandler>,
    pub(crate) hosted: Vec<(Address, MessageHubConfiguration)>,
    pub(crate) routes: Vec<RouteRule>,
    pub(crate) transports: HashMap<String, Arc<dyn HubTransport>>,
    pub(crate) node_resolver: Option<Arc<dyn NodeResolver>>,
    pub(crate) mesh_transport: Option<String>,
    pub(crate) registry: Option<Arc<TypeRegistry>>,
    pub(crate) type_registrations: Vec<TypeRegistration>,
    pub(crate) startup: Option<StartupFn>,
}

impl MessageHubConfiguration {
    /// Configuration for a hub of the given address kind. The instance id is
    /// minted at spawn unless [`Self::at_address`] pins one.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            address: None,
            handlers: HashMap::new(),
            default_sink: None,
            hosted: Vec::new(),
            routes: Vec::new(),
            transports: HashMap::new(),
            node_resolver: None,
            mesh_transport: None,
            registry: None,
            type_registrations: Vec::new(),
            startup: None,
        }
    }

    /// Pin the hub to an explicit address instead of a minted one.
    pub fn at_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Register a typed handler. Re-registering the same message type
    /// replaces the previous entry (most recent wins).
    pub fn with_handler<T, F, Fut>(mut self, handler: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(MessageHub, TypedDelivery<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers.insert(TypeId::of::<T>(), erase(handler));
        self
    }

    /// Handler of last resort for deliveries no table entry matches.
    /// Without one, such deliveries are marked `Ignored`.
    pub fn with_default_sink<F, Fut>(mut self, sink: F) -> Self
    where
        F: Fn(MessageHub, Delivery) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.default_sink = Some(Arc::new(move |hub, delivery| sink(hub, delivery).boxed()));
        self
    }

    /// Host a child hub at a fixed address, started eagerly with the parent.
    /// The child keeps an independent mailbox but inherits cascading
    /// disposal from the parent.
    pub fn with_hosted_hub(mut self, address: Address, config: MessageHubConfiguration) -> Self {
        self.hosted.push((address, config));
        self
    }

    /// Route deliveries targeting the given address kind to a hosted hub
    /// cold-started from the factory on first delivery.
    pub fn route_to_hosted_hub<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Address) -> MessageHubConfiguration + Send + Sync + 'static,
    {
        self.routes.push(RouteRule::HostedHub {
            kind: kind.into(),
            factory: Arc::new(factory),
        });
        self
    }

    /// Forward matching deliveries through a named transport. The selector
    /// returns a routing key to match, or `None` to pass the rule over.
    pub fn forward_through<F>(mut self, transport: impl Into<String>, key_selector: F) -> Self
    where
        F: Fn(&Delivery) -> Option<String> + Send + Sync + 'static,
    {
        self.routes.push(RouteRule::Transport {
            transport: transport.into(),
            key_selector: Arc::new(key_selector),
        });
        self
    }

    /// Register a named transport implementation.
    pub fn with_transport(
        mut self,
        name: impl Into<String>,
        transport: Arc<dyn HubTransport>,
    ) -> Self {
        self.transports.insert(name.into(), transport);
        self
    }

    /// Resolve otherwise-unroutable addresses through a mesh catalog and
    /// forward them across the named transport.
    pub fn with_node_resolver(
        mut self,
        resolver: Arc<dyn NodeResolver>,
        via_transport: impl Into<String>,
    ) -> Self {
        self.node_resolver = Some(resolver);
        self.mesh_transport = Some(via_transport.into());
        self
    }

    /// Share a type registry with other hubs (one per process is typical).
    pub fn with_type_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register a message type for wire transfer under its derived name.
    /// Registration runs at spawn; conflicts abort startup.
    pub fn with_type<T>(mut self) -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.type_registrations
            .push(Arc::new(|registry| registry.with_type::<T>().map(|_| ())));
        self
    }

    /// Register a message type under an explicit wire alias.
    pub fn with_type_alias<T>(mut self, alias: impl Into<String>) -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let alias = alias.into();
        self.type_registrations.push(Arc::new(move |registry| {
            registry.with_type_alias::<T>(alias.clone()).map(|_| ())
        }));
        self
    }

    /// Asynchronous initialization run after spawn while a startup deferral
    /// buffers all mailbox traffic; the deferral releases when the future
    /// completes, successfully or not. Initialization code must not await
    /// a response through this hub's own mailbox; the request would sit
    /// behind the gate until the future completes.
    pub fn with_startup<F, Fut>(mut self, startup: F) -> Self
    where
        F: Fn(MessageHub) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.startup = Some(Arc::new(move |hub| startup(hub).boxed()));
        self
    }

    /// Apply a plugin's registrations.
    pub fn with_plugin<P: HubPlugin>(self, plugin: P) -> Self {
        plugin.configure(self)
    }

    /// Configuration-time validation; errors here abort startup.
    pub fn validate(&self) -> Result<()> {
        for route in &self.routes {
            if let RouteRule::Transport { transport, .. } = route {
                if !self.transports.contains_key(transport) {
                    return Err(HubError::registration(format!(
                        "route references unknown transport '{}'",
                        transport
                    )));
                }
            }
        }
        if let Some(name) = &self.mesh_transport {
            if !self.transports.contains_key(name) {
                return Err(HubError::registration(format!(
                    "mesh forwarding references unknown transport '{}'",
                    name
                )));
            }
        }
        for (address, hosted) in &self.hosted {
            hosted.validate().map_err(|e| {
                HubError::registration(format!("hosted hub {}: {}", address, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_unknown_route_transport() {
        let config = MessageHubConfiguration::new("svc")
            .forward_through("missing", |_| Some("key".into()));

        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validate_rejects_unknown_mesh_transport() {
        struct NoResolver;
        #[async_trait::async_trait]
        impl NodeResolver for NoResolver {
            async fn resolve_node(&self, _address: &Address) -> Option<String> {
                None
            }
        }

        let config = MessageHubConfiguration::new("svc")
            .with_node_resolver(Arc::new(NoResolver), "mesh");
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_plugin_registrations_apply_to_the_hub() {
        use crate::{MessageHub, PostOptions};
        use serde::{Deserialize, Serialize};
        use std::time::Duration;

        #[derive(Debug, Serialize, Deserialize)]
        struct AuditEntry {
            line: String,
        }

        /// Bundles the audit type and its handler for reuse across hubs.
        struct AuditPlugin {
            log: Arc<parking_lot::Mutex<Vec<String>>>,
        }

        impl HubPlugin for AuditPlugin {
            fn configure(&self, config: MessageHubConfiguration) -> MessageHubConfiguration {
                let log = Arc::clone(&self.log);
                config
                    .with_type::<AuditEntry>()
                    .with_handler::<AuditEntry, _, _>(move |_hub, delivery| {
                        let log = Arc::clone(&log);
                        async move {
                            log.lock().push(delivery.message().line.clone());
                            Ok(())
                        }
                    })
            }
        }

        let log: Arc<parking_lot::Mutex<Vec<String>>> = Arc::default();
        let hub = MessageHub::spawn(
            MessageHubConfiguration::new("svc").with_plugin(AuditPlugin {
                log: Arc::clone(&log),
            }),
        )
        .unwrap();

        hub.post(
            AuditEntry {
                line: "first".into(),
            },
            PostOptions::default(),
        )
        .unwrap();
        hub.post(
            AuditEntry {
                line: "second".into(),
            },
            PostOptions::default(),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*log.lock(), vec!["first".to_string(), "second".to_string()]);
        hub.dispose().await;
    }

    #[test]
    fn test_validate_recurses_into_hosted_configs() {
        let bad_child = MessageHubConfiguration::new("child")
            .forward_through("missing", |_| Some("key".into()));
        let config = MessageHubConfiguration::new("parent")
            .with_hosted_hub(Address::new("child", "1"), bad_child);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("child/1"));
    }
}
