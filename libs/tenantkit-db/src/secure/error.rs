/// Errors that can occur during scoped query execution.
#[derive(thiserror::Error, Debug)]
pub enum ScopeError {
    /// Database error occurred during query execution.
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// Invalid scope configuration.
    #[error("invalid scope: {0}")]
    Invalid(&'static str),

    /// Write rejected by the tenant policy.
    #[error("access denied: {0}")]
    Denied(&'static str),

    /// Target row is not visible in the current scope.
    ///
    /// Rows of other tenants and rows that never existed produce this same value.
    #[error("not found")]
    NotFound,
}
