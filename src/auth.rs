//! Credential registry and the auth gate.
//!
//! The gate resolves the caller's `auth_id` against an external registry and
//! admits only rows whose status is active. The registry is read-only from the
//! pipeline's point of view and is looked up once per request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AuthError, RegistryError};

/// Activation status of a registry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    /// The credential may call the gateway.
    Active,
    /// The credential has been switched off.
    Disabled,
    /// Any status the registry reports that the gateway does not recognize.
    Unknown,
}

impl AuthStatus {
    /// Maps the registry's numeric status column.
    ///
    /// # Examples
    ///
    /// ```
    /// use gateway_pipeline::auth::AuthStatus;
    ///
    /// assert_eq!(AuthStatus::from_code(1), AuthStatus::Active);
    /// assert_eq!(AuthStatus::from_code(0), AuthStatus::Disabled);
    /// assert_eq!(AuthStatus::from_code(9), AuthStatus::Unknown);
    /// ```
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => AuthStatus::Active,
            0 => AuthStatus::Disabled,
            _ => AuthStatus::Unknown,
        }
    }

    /// Returns true for [`AuthStatus::Active`].
    pub fn is_active(self) -> bool {
        matches!(self, AuthStatus::Active)
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStatus::Active => write!(f, "active"),
            AuthStatus::Disabled => write!(f, "disabled"),
            AuthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRecord {
    /// Registry identifier.
    pub id: String,
    /// Activation status.
    pub status: AuthStatus,
    /// Caller-defined columns.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AuthRecord {
    /// Creates a record with no metadata.
    pub fn new(id: impl Into<String>, status: AuthStatus) -> Self {
        Self {
            id: id.into(),
            status,
            metadata: Map::new(),
        }
    }

    /// Attaches a metadata column.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Read access to the external credential registry.
///
/// Implementations must give up after `timeout` and report
/// [`RegistryError::Timeout`] instead of blocking the request.
pub trait Registry: Send + Sync {
    /// Looks up a single row by identifier. `Ok(None)` means no such row.
    fn find(&self, auth_id: &str, timeout: Duration)
        -> Result<Option<AuthRecord>, RegistryError>;
}

/// In-memory registry, for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    rows: RwLock<HashMap<String, AuthRecord>>,
}

impl MemoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a row, keyed by its id.
    pub fn insert(&self, record: AuthRecord) {
        self.rows.write().insert(record.id.clone(), record);
    }

    /// Removes a row.
    pub fn remove(&self, auth_id: &str) -> Option<AuthRecord> {
        self.rows.write().remove(auth_id)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl<I> FromIterator<I> for MemoryRegistry
where
    I: Into<AuthRecord>,
{
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        let registry = Self::new();
        for record in iter {
            registry.insert(record.into());
        }
        registry
    }
}

impl Registry for MemoryRegistry {
    fn find(
        &self,
        auth_id: &str,
        _timeout: Duration,
    ) -> Result<Option<AuthRecord>, RegistryError> {
        Ok(self.rows.read().get(auth_id).cloned())
    }
}

/// Admits requests whose credential is active in the registry.
#[derive(Clone)]
pub struct AuthGate {
    registry: Arc<dyn Registry>,
    timeout: Duration,
}

impl AuthGate {
    /// Creates a gate over `registry` with a per-lookup budget.
    pub fn new(registry: Arc<dyn Registry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Resolves `auth_id` to an active record.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`] when the registry has no such row
    /// - [`AuthError::Inactive`] when the row is not active
    /// - [`AuthError::Registry`] when the lookup fails or times out
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use gateway_pipeline::auth::{AuthGate, AuthRecord, AuthStatus, MemoryRegistry};
    /// use gateway_pipeline::error::AuthError;
    ///
    /// let registry = MemoryRegistry::new();
    /// registry.insert(AuthRecord::new("svc-1", AuthStatus::Active));
    /// registry.insert(AuthRecord::new("svc-2", AuthStatus::Disabled));
    ///
    /// let gate = AuthGate::new(Arc::new(registry), Duration::from_secs(1));
    /// assert!(gate.authenticate("svc-1").is_ok());
    /// assert_eq!(
    ///     gate.authenticate("svc-2").unwrap_err(),
    ///     AuthError::Inactive(AuthStatus::Disabled)
    /// );
    /// assert_eq!(gate.authenticate("svc-3").unwrap_err(), AuthError::NotFound);
    /// ```
    pub fn authenticate(&self, auth_id: &str) -> Result<AuthRecord, AuthError> {
        let record = self
            .registry
            .find(auth_id, self.timeout)?
            .ok_or(AuthError::NotFound)?;

        if !record.status.is_active() {
            return Err(AuthError::Inactive(record.status));
        }

        Ok(record)
    }
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct SlowRegistry;

    impl Registry for SlowRegistry {
        fn find(
            &self,
            _auth_id: &str,
            timeout: Duration,
        ) -> Result<Option<AuthRecord>, RegistryError> {
            Err(RegistryError::Timeout(timeout))
        }
    }

    #[test]
    fn active_record_is_returned_with_metadata() {
        let registry = MemoryRegistry::new();
        registry.insert(AuthRecord::new("a1", AuthStatus::Active).with_metadata("tier", json!(2)));

        let gate = AuthGate::new(Arc::new(registry), Duration::from_millis(10));
        let record = gate.authenticate("a1").unwrap();
        assert_eq!(record.metadata["tier"], 2);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let registry: MemoryRegistry =
            [AuthRecord::new("a1", AuthStatus::from_code(7))].into_iter().collect();
        let gate = AuthGate::new(Arc::new(registry), Duration::from_millis(10));

        let err = gate.authenticate("a1").unwrap_err();
        assert_eq!(err, AuthError::Inactive(AuthStatus::Unknown));
        assert_eq!(err.observed_status(), "unknown");
    }

    #[test]
    fn timeout_surfaces_as_auth_error() {
        let gate = AuthGate::new(Arc::new(SlowRegistry), Duration::from_millis(3));
        assert_eq!(
            gate.authenticate("a1").unwrap_err(),
            AuthError::Registry(RegistryError::Timeout(Duration::from_millis(3)))
        );
    }

    #[test]
    fn removed_rows_are_not_found() {
        let registry = MemoryRegistry::new();
        registry.insert(AuthRecord::new("a1", AuthStatus::Active));
        assert_eq!(registry.len(), 1);
        registry.remove("a1");
        assert!(registry.is_empty());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(AuthStatus::Disabled).unwrap(), json!("disabled"));
        assert_eq!(AuthStatus::Active.to_string(), "active");
    }
}
