//! Static dispatch table.
//!
//! Handlers are registered against a `(controller, action)` key when the
//! pipeline is built. Lookups are case-insensitive; an unregistered key is a
//! [`DispatchError`], never a dynamic call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::auth::AuthRecord;
use crate::envelope::Reply;
use crate::error::DispatchError;
use crate::request::RequestContext;

/// Lowercased `(controller, action)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionKey {
    controller: String,
    action: String,
}

impl ActionKey {
    /// Creates a key, normalizing case.
    pub fn new(controller: &str, action: &str) -> Self {
        Self {
            controller: controller.trim().to_ascii_lowercase(),
            action: action.trim().to_ascii_lowercase(),
        }
    }

    /// Controller part.
    pub fn controller(&self) -> &str {
        &self.controller
    }

    /// Action part.
    pub fn action(&self) -> &str {
        &self.action
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.controller, self.action)
    }
}

/// The business logic behind one action.
///
/// Handlers see the request after validation, authentication and every
/// before-action hook have passed.
pub trait Handler: Send + Sync {
    /// Produces the reply for this request.
    fn handle(&self, ctx: &RequestContext, auth: &AuthRecord) -> Reply;
}

impl<F> Handler for F
where
    F: Fn(&RequestContext, &AuthRecord) -> Reply + Send + Sync,
{
    fn handle(&self, ctx: &RequestContext, auth: &AuthRecord) -> Reply {
        self(ctx, auth)
    }
}

/// `(controller, action)` to handler.
#[derive(Clone, Default)]
pub struct DispatchTable {
    routes: HashMap<ActionKey, Arc<dyn Handler>>,
}

impl DispatchTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler`, replacing any previous one for the same key.
    pub fn route<H>(&mut self, controller: &str, action: &str, handler: H) -> &mut Self
    where
        H: Handler + 'static,
    {
        self.routes
            .insert(ActionKey::new(controller, action), Arc::new(handler));
        self
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the handler for a controller/action pair.
    ///
    /// # Examples
    ///
    /// ```
    /// use gateway_pipeline::auth::AuthRecord;
    /// use gateway_pipeline::dispatch::DispatchTable;
    /// use gateway_pipeline::envelope::Reply;
    /// use gateway_pipeline::request::RequestContext;
    ///
    /// let mut table = DispatchTable::new();
    /// table.route("User", "Info", |_: &RequestContext, _: &AuthRecord| Reply::success(""));
    ///
    /// assert!(table.resolve("user", "info").is_ok());
    /// assert!(table.resolve("user", "ban").is_err());
    /// ```
    pub fn resolve(&self, controller: &str, action: &str) -> Result<Arc<dyn Handler>, DispatchError> {
        self.routes
            .get(&ActionKey::new(controller, action))
            .cloned()
            .ok_or_else(|| DispatchError::UnknownAction {
                controller: controller.to_string(),
                action: action.to_string(),
            })
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.routes.keys().map(ToString::to_string).collect();
        keys.sort();
        f.debug_struct("DispatchTable").field("routes", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthStatus;
    use crate::web::RawRequest;
    use serde_json::json;

    struct Echo;

    impl Handler for Echo {
        fn handle(&self, _ctx: &RequestContext, auth: &AuthRecord) -> Reply {
            Reply::success("").with_data(json!({ "caller": auth.id }))
        }
    }

    #[test]
    fn keys_are_case_insensitive() {
        assert_eq!(ActionKey::new(" User", "GetInfo"), ActionKey::new("user", "getinfo"));
        assert_eq!(ActionKey::new("User", "GetInfo").to_string(), "user/getinfo");
    }

    #[test]
    fn trait_objects_and_closures_both_route() {
        let mut table = DispatchTable::new();
        table
            .route("user", "echo", Echo)
            .route("user", "ping", |_: &RequestContext, _: &AuthRecord| {
                Reply::success("pong")
            });
        assert_eq!(table.len(), 2);

        let ctx = RequestContext::new(RawRequest::new("user", "echo"), serde_json::Map::new());
        let auth = AuthRecord::new("svc-1", AuthStatus::Active);

        let reply = table.resolve("user", "echo").unwrap().handle(&ctx, &auth);
        assert_eq!(reply.data["caller"], "svc-1");

        let reply = table.resolve("USER", "PING").unwrap().handle(&ctx, &auth);
        assert_eq!(reply.message, "pong");
    }

    #[test]
    fn unknown_action_keeps_requested_names() {
        let table = DispatchTable::new();
        assert_eq!(
            table.resolve("Order", "Refund").err().unwrap(),
            DispatchError::UnknownAction {
                controller: "Order".to_string(),
                action: "Refund".to_string(),
            }
        );
    }
}
