//! Handler registry ("router"): maps topic to `(schema, handler)`.
//!
//! Frozen before the dispatch loop starts: the registry is read-only once
//! the engine begins running, so [`Router`] becomes a plain
//! `Arc<HashMap<..>>` at that point, with no `RwLock` in the hot path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::codec::Schema;
use crate::error::RegistryError;

/// Error type a [`Handler`] implementation returns on failure. The dispatch
/// loop logs it and releases the consume lease so the timer is retried.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A user-registered callback invoked with the decoded, schema-validated
/// payload for a due timer.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, payload: serde_json::Value) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), HandlerError>> + Send,
{
    async fn call(&self, payload: serde_json::Value) -> Result<(), HandlerError> {
        (self)(payload).await
    }
}

/// A topic's binding: the schema that validates its payloads, and the
/// handler invoked with the validated value.
#[derive(Clone)]
pub struct Route {
    pub schema: Arc<dyn Schema>,
    pub handler: Arc<dyn Handler>,
}

/// Builder and, once passed to [`crate::Engine`], the frozen handler
/// registry. `handler` is fluent sugar over the plain `register` call; the
/// topic is always explicit since Rust has no decorator syntax to infer it
/// from a function name (see DESIGN.md's Open Question resolution).
#[derive(Default, Clone)]
pub struct Router {
    routes: HashMap<String, Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `topic`. Fails with `DuplicateHandler` if the
    /// topic is already bound in this router.
    pub fn register(
        &mut self,
        topic: impl Into<String>,
        schema: Arc<dyn Schema>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RegistryError> {
        let topic = topic.into();
        if self.routes.contains_key(&topic) {
            return Err(RegistryError::DuplicateHandler(topic));
        }
        self.routes.insert(topic, Route { schema, handler });
        Ok(())
    }

    /// Fluent form of [`Router::register`]: `router.handler(topic, schema,
    /// handler)?` chains naturally against `?` in a builder-style startup
    /// function.
    pub fn handler(
        mut self,
        topic: impl Into<String>,
        schema: Arc<dyn Schema>,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, RegistryError> {
        self.register(topic, schema, handler)?;
        Ok(self)
    }

    /// Merge another router into this one ("include_router"). Fails with
    /// `DuplicateHandler` at merge time, before the engine starts, if any
    /// topic collides.
    pub fn merge(mut self, other: Router) -> Result<Self, RegistryError> {
        for (topic, route) in other.routes {
            if self.routes.contains_key(&topic) {
                return Err(RegistryError::DuplicateHandler(topic));
            }
            self.routes.insert(topic, route);
        }
        Ok(self)
    }

    pub fn lookup(&self, topic: &str) -> Option<&Route> {
        self.routes.get(topic)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonSchema;

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn call(&self, _payload: serde_json::Value) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn register_then_lookup() {
        let mut router = Router::new();
        router
            .register("ping", Arc::new(JsonSchema), Arc::new(Noop))
            .unwrap();

        assert!(router.lookup("ping").is_some());
        assert!(router.lookup("missing").is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut router = Router::new();
        router
            .register("ping", Arc::new(JsonSchema), Arc::new(Noop))
            .unwrap();

        let err = router
            .register("ping", Arc::new(JsonSchema), Arc::new(Noop))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateHandler(_)));
    }

    #[test]
    fn merge_disjoint_routers_succeeds() {
        let mut a = Router::new();
        a.register("ping", Arc::new(JsonSchema), Arc::new(Noop)).unwrap();

        let mut b = Router::new();
        b.register("pong", Arc::new(JsonSchema), Arc::new(Noop)).unwrap();

        let merged = a.merge(b).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_colliding_routers_fails() {
        let mut a = Router::new();
        a.register("ping", Arc::new(JsonSchema), Arc::new(Noop)).unwrap();

        let mut b = Router::new();
        b.register("ping", Arc::new(JsonSchema), Arc::new(Noop)).unwrap();

        let err = a.merge(b).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateHandler(_)));
    }
}
