//! Schema initialization against an embedded SurrealDB.

use evalboard_state::migrations::init_schema;
use evalboard_state::{NewRun, RunStore, SurrealHandle, SurrealRunStore};

#[tokio::test]
async fn schema_applies_and_reapplies_cleanly() {
    let handle = SurrealHandle::in_memory().await.unwrap();
    init_schema(handle.db()).await.unwrap();
    init_schema(handle.db()).await.unwrap();
}

#[tokio::test]
async fn unique_snapshot_ids_are_enforced() {
    let handle = SurrealHandle::in_memory().await.unwrap();
    let insert = "CREATE score_snapshots CONTENT { snapshot_id: 'dup', model: 'm', \
                  total_score: 0.5, scores: {}, created_at: time::now() }";

    handle.db().query(insert).await.unwrap().check().unwrap();
    let second = handle.db().query(insert).await.and_then(|res| res.check());
    assert!(second.is_err());
}

#[tokio::test]
async fn stores_work_on_a_fresh_handle() {
    let store = SurrealRunStore::new(SurrealHandle::in_memory().await.unwrap());
    let run = store.create_run(NewRun::new("m")).await.unwrap();
    store.complete_run(&run.id, 1).await.unwrap();
    assert!(store.get_run(&run.id).await.unwrap().unwrap().status.is_terminal());
}
