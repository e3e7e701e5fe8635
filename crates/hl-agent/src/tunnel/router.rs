//! Path-based handler table

use std::collections::BTreeMap;
use std::sync::Arc;

use hl_core::error::SessionError;
use hl_core::traits::Handler;

/// Immutable map from path prefixes to handlers.
///
/// Built once at startup and shared by every connection. Lookup tries an
/// exact match first, then the longest registered prefix. One trailing slash
/// is ignored on both the registered and the requested path.
#[derive(Clone, Default)]
pub struct HandlerTable {
    routes: BTreeMap<String, Arc<dyn Handler>>,
}

impl HandlerTable {
    /// Start building a table
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    /// Find the handler for a request path
    pub fn lookup(&self, path: &str) -> Option<&Arc<dyn Handler>> {
        let path = trim_slash(path);
        if let Some(handler) = self.routes.get(path) {
            return Some(handler);
        }

        self.routes
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, handler)| handler)
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are registered
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Builder for [`HandlerTable`]
#[derive(Default)]
pub struct HandlerTableBuilder {
    routes: BTreeMap<String, Arc<dyn Handler>>,
}

impl HandlerTableBuilder {
    /// Register a handler under a path prefix
    pub fn register(
        mut self,
        prefix: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, SessionError> {
        let route = trim_slash(prefix);
        if self.routes.contains_key(route) {
            return Err(SessionError::DuplicateRoute(prefix.to_string()));
        }
        self.routes.insert(route.to_string(), handler);
        Ok(self)
    }

    /// Freeze the table
    pub fn build(self) -> HandlerTable {
        HandlerTable {
            routes: self.routes,
        }
    }
}

fn trim_slash(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hl_protocol::{Message, SessionKey};
    use tokio::sync::mpsc;

    struct Named(&'static str);

    #[async_trait]
    impl Handler for Named {
        async fn handle(
            &self,
            _key: SessionKey,
            _initial_message: String,
            _inbound: mpsc::Receiver<String>,
            _outbound: mpsc::Sender<Message>,
        ) {
        }
    }

    fn table() -> (HandlerTable, Vec<Arc<dyn Handler>>) {
        let proxy: Arc<dyn Handler> = Arc::new(Named("proxy"));
        let logs: Arc<dyn Handler> = Arc::new(Named("logs"));
        let exact: Arc<dyn Handler> = Arc::new(Named("exact"));
        let table = HandlerTable::builder()
            .register("/v1/container-proxy/", Arc::clone(&proxy))
            .unwrap()
            .register("/v1/logs", Arc::clone(&logs))
            .unwrap()
            .register("/v1/logs/follow/", Arc::clone(&exact))
            .unwrap()
            .build();
        (table, vec![proxy, logs, exact])
    }

    fn same(a: Option<&Arc<dyn Handler>>, b: &Arc<dyn Handler>) -> bool {
        a.map_or(false, |a| Arc::ptr_eq(a, b))
    }

    #[test]
    fn test_exact_match_ignores_trailing_slash() {
        let (table, handlers) = table();
        assert!(same(table.lookup("/v1/container-proxy"), &handlers[0]));
        assert!(same(table.lookup("/v1/container-proxy/"), &handlers[0]));
        assert!(same(table.lookup("/v1/logs/"), &handlers[1]));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let (table, handlers) = table();
        assert!(same(table.lookup("/v1/container-proxy/abc"), &handlers[0]));
        assert!(same(table.lookup("/v1/logs/123"), &handlers[1]));
        assert!(same(table.lookup("/v1/logs/follow/123"), &handlers[2]));
    }

    #[test]
    fn test_unknown_path() {
        let (table, _) = table();
        assert!(table.lookup("/v1/stats").is_none());
        assert!(table.lookup("/").is_none());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let result = HandlerTable::builder()
            .register("/v1/exec/", Arc::new(Named("a")))
            .unwrap()
            .register("/v1/exec", Arc::new(Named("b")));
        assert!(matches!(result, Err(SessionError::DuplicateRoute(p)) if p == "/v1/exec"));
    }
}
