// Declaring the tenant column twice is rejected.

use tenantkit_db_macros::Scopable;

#[derive(Scopable)]
#[secure(tenant_col = "tenant_id", tenant_col = "other_id", resource_col = "id")]
struct Model;

fn main() {}
