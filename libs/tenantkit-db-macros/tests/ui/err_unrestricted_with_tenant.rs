// `unrestricted` forbids every other attribute.

use tenantkit_db_macros::Scopable;

#[derive(Scopable)]
#[secure(unrestricted, tenant_col = "tenant_id")]
struct Model;

fn main() {}
