use db::DBService;

/// Fresh in-memory database with the full schema applied.
pub async fn memory_db() -> DBService {
    DBService::connect_in_memory()
        .await
        .expect("in-memory database")
}
