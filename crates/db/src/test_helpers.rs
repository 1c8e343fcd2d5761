use crate::{DBService, DbErr};

pub(crate) async fn memory_db() -> Result<DBService, DbErr> {
    DBService::connect_in_memory().await
}
