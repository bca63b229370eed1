// Unknown attribute keys are rejected.

use tenantkit_db_macros::Scopable;

#[derive(Scopable)]
#[secure(tenant_col = "tenant_id", resource_col = "id", owner_col = "owner_id")]
struct Model;

fn main() {}
