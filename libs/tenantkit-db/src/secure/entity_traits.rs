use sea_orm::EntityTrait;

/// Declares which columns of an entity carry its tenant and resource identity.
///
/// Both dimensions must be declared explicitly. Implement it with the derive:
///
/// ```rust,ignore
/// use tenantkit_db::secure::Scopable;
///
/// #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Scopable)]
/// #[sea_orm(table_name = "transactions")]
/// #[secure(tenant_col = "tenant_id", resource_col = "id")]
/// pub struct Model {
///     #[sea_orm(primary_key, auto_increment = false)]
///     pub id: Uuid,
///     pub tenant_id: String,
///     pub amount_cents: i64,
/// }
/// ```
///
/// The tenant root table is scoped on its own primary key:
///
/// ```rust,ignore
/// #[secure(tenant_col = "id", no_resource)]
/// ```
///
/// Global tables (lookup data, policy registry) use `#[secure(unrestricted)]`.
pub trait ScopableEntity: EntityTrait {
    /// Set by `#[secure(unrestricted)]`; all column methods then return `None`.
    const IS_UNRESTRICTED: bool = false;

    /// Column holding the owning tenant id.
    fn tenant_col() -> Option<Self::Column>;

    /// Column holding the resource id, typically the primary key.
    fn resource_col() -> Option<Self::Column>;
}
