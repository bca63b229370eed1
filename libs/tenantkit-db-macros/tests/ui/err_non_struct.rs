// Only structs can derive Scopable.

use tenantkit_db_macros::Scopable;

#[derive(Scopable)]
enum Model {
    A,
}

fn main() {}
