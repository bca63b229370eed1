use crate::AccessScope;
use uuid::Uuid;

/// `SecurityContext` carries the verified identity of a request or job.
///
/// It is produced by the authentication layer after the caller's tenant
/// claim has been verified. It is the only input from which a unit of work
/// takes its tenant.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SecurityContext {
    tenant_id: String,
    subject_id: Uuid,
    subject_type: Option<String>,
}

impl SecurityContext {
    /// Create a new `SecurityContext` builder
    #[must_use]
    pub fn builder() -> SecurityContextBuilder {
        SecurityContextBuilder::default()
    }

    /// Create an anonymous `SecurityContext` with no tenant and no subject
    #[must_use]
    pub fn anonymous() -> Self {
        SecurityContextBuilder::default().build()
    }

    /// Tenant the caller was verified for. Empty for anonymous callers.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Acting user, service or system
    #[must_use]
    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    #[must_use]
    pub fn subject_type(&self) -> Option<&str> {
        self.subject_type.as_deref()
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.tenant_id.is_empty()
    }

    /// Scope for the caller's own tenant; deny-all for anonymous callers.
    #[must_use]
    pub fn scope(&self) -> AccessScope {
        AccessScope::for_tenant(&self.tenant_id)
    }

    /// Same subject, different tenant. Used by jobs that iterate tenants.
    #[must_use]
    pub fn for_tenant(&self, tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            subject_id: self.subject_id,
            subject_type: self.subject_type.clone(),
        }
    }
}

#[derive(Default)]
pub struct SecurityContextBuilder {
    tenant_id: Option<String>,
    subject_id: Option<Uuid>,
    subject_type: Option<String>,
}

impl SecurityContextBuilder {
    #[must_use]
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn subject_id(mut self, subject_id: Uuid) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    #[must_use]
    pub fn subject_type(mut self, subject_type: &str) -> Self {
        self.subject_type = Some(subject_type.to_owned());
        self
    }

    #[must_use]
    pub fn build(self) -> SecurityContext {
        SecurityContext {
            tenant_id: self.tenant_id.unwrap_or_default(),
            subject_id: self.subject_id.unwrap_or_default(),
            subject_type: self.subject_type,
        }
    }
}
