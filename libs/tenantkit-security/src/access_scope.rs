use uuid::Uuid;

/// Access scope defining which tenants and resources a query may touch.
///
/// A scope without tenants is a "deny all" scope, whatever resources it names.
/// Resource ids only ever narrow a tenant scope.
/// Tenant ids are opaque strings compared by exact equality.
#[derive(Clone, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct AccessScope {
    pub(crate) tenant_ids: Vec<String>,
    pub(crate) resource_ids: Vec<Uuid>,
}

impl AccessScope {
    #[inline]
    #[must_use]
    pub fn tenant_ids(&self) -> &[String] {
        &self.tenant_ids
    }

    #[inline]
    #[must_use]
    pub fn resource_ids(&self) -> &[Uuid] {
        &self.resource_ids
    }

    /// Returns true if this scope names no tenant.
    /// An empty scope results in a "deny all" condition in queries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tenant_ids.is_empty()
    }

    #[must_use]
    pub fn has_tenants(&self) -> bool {
        !self.tenant_ids.is_empty()
    }

    #[must_use]
    pub fn has_resources(&self) -> bool {
        !self.resource_ids.is_empty()
    }

    /// Returns true if `tenant_id` is one of the scope's tenants.
    #[must_use]
    pub fn contains_tenant(&self, tenant_id: &str) -> bool {
        self.tenant_ids.iter().any(|t| t == tenant_id)
    }

    /// Scope for a single tenant context value.
    ///
    /// The empty string is "no tenant" and yields the deny-all scope.
    #[must_use]
    pub fn for_tenant(tenant_id: &str) -> Self {
        if tenant_id.is_empty() {
            return Self::default();
        }
        Self {
            tenant_ids: vec![tenant_id.to_owned()],
            resource_ids: vec![],
        }
    }

    /// Narrow a tenant scope to specific resources (AND).
    #[must_use]
    pub fn with_resources(mut self, resource_ids: Vec<Uuid>) -> Self {
        self.resource_ids = resource_ids;
        self
    }
}
