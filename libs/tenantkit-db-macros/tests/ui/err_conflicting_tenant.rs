// A tenant column and `no_tenant` cannot both be declared.

use tenantkit_db_macros::Scopable;

#[derive(Scopable)]
#[secure(tenant_col = "tenant_id", no_tenant, resource_col = "id")]
struct Model;

fn main() {}
