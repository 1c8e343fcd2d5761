use sea_orm_migration::prelude::*;

mod m20250901000000_baseline;
mod m20251015000000_graph_lookup_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901000000_baseline::Migration),
            Box::new(m20251015000000_graph_lookup_indexes::Migration),
        ]
    }
}
