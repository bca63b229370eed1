use parking_lot::RwLock;

/// Holds the "current tenant" of exactly one unit of work.
///
/// The value is an opaque string. An empty string means "no tenant": every
/// tenant-scoped read built from this store matches nothing and every write
/// is rejected. The store never validates what it is given; a value that
/// does not name a real tenant simply matches no rows.
///
/// A store is owned by a single unit of work. It is never shared between
/// units of work, so concurrent requests for different tenants cannot
/// observe each other's value.
#[derive(Debug, Default)]
pub struct TenantContextStore {
    current: RwLock<String>,
}

impl TenantContextStore {
    /// Create a store with no tenant set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already bound to `tenant_id`.
    #[must_use]
    pub fn with_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(tenant_id.into()),
        }
    }

    /// Store `tenant_id` verbatim, replacing whatever was there before.
    pub fn set_context(&self, tenant_id: impl Into<String>) {
        *self.current.write() = tenant_id.into();
    }

    /// Reset to "no tenant". Same as `set_context("")`.
    pub fn clear_context(&self) {
        self.current.write().clear();
    }

    /// Current value, possibly empty.
    #[must_use]
    pub fn get_context(&self) -> String {
        self.current.read().clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}
