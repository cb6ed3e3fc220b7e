mod common;

use common::{
    count_rows, now_ms, open_store, row_id_of, sleep_session, stages, DAY_MS, SLEEP_TABLE,
    SLEEP_TYPE, STAGES_TABLE,
};
use healthstore_core::{
    CascadeMode, DeleteTableRequest, DeleteTransactionRequest, SqlCommand, StoreError,
};

fn delete_session(uuid: &str, read_columns: &str) -> DeleteTableRequest {
    DeleteTableRequest::new(
        SLEEP_TABLE,
        SqlCommand::new("DELETE FROM sleep_session_record_table WHERE uuid = ?")
            .bind(uuid.to_string()),
    )
    .with_read(
        SLEEP_TYPE,
        SqlCommand::new(format!(
            "SELECT {read_columns} FROM sleep_session_record_table WHERE uuid = ?"
        ))
        .bind(uuid.to_string()),
    )
}

#[test]
fn store_without_cascading_keys_rejects_orphaning_parent_deletes() {
    let store = open_store(CascadeMode::Manual);
    store
        .manager
        .insert(&sleep_session("s", 1, 10, "night", &[1]))
        .unwrap();

    let err = store
        .manager
        .delete(&DeleteTableRequest::new(
            STAGES_TABLE,
            SqlCommand::new("DELETE FROM sleep_session_record_table"),
        ))
        .unwrap_err();

    assert!(matches!(err, StoreError::Execution(_)));
    assert_eq!(count_rows(&store.manager, SLEEP_TABLE), 1);
}

#[test]
fn manual_cascade_deletes_children_before_the_parent() {
    let store = open_store(CascadeMode::Manual);
    store
        .manager
        .insert_all(&[
            sleep_session("keep", 1, 10, "nap", &[9]),
            sleep_session("drop", 1, 20, "night", &[1, 2]),
        ])
        .unwrap();
    let keep = row_id_of(&store.manager, SLEEP_TABLE, "keep").unwrap();

    store
        .manager
        .delete_all(
            DeleteTransactionRequest::new(1).add(delete_session("drop", "row_id, uuid")),
        )
        .unwrap();

    assert_eq!(count_rows(&store.manager, SLEEP_TABLE), 1);
    assert_eq!(stages(&store.manager), vec![(keep, 9)]);
    assert_eq!(count_rows(&store.manager, "change_logs"), 1);
}

#[test]
fn manual_cascade_needs_row_ids_from_the_read() {
    let store = open_store(CascadeMode::Manual);
    store
        .manager
        .insert(&sleep_session("s", 1, 10, "night", &[1]))
        .unwrap();

    let err = store
        .manager
        .delete_all(DeleteTransactionRequest::new(1).add(delete_session("s", "uuid")))
        .unwrap_err();

    assert!(matches!(err, StoreError::InvalidArgument(_)));
    assert_eq!(count_rows(&store.manager, SLEEP_TABLE), 1);
    assert_eq!(count_rows(&store.manager, "change_logs"), 0);
}

#[test]
fn manual_cascade_supports_update_with_children() {
    let store = open_store(CascadeMode::Manual);
    store
        .manager
        .insert(&sleep_session("s", 1, 10, "night", &[1, 2]))
        .unwrap();

    store
        .manager
        .update_all(&[sleep_session("s", 1, 10, "night", &[5])])
        .unwrap();

    let parent = row_id_of(&store.manager, SLEEP_TABLE, "s").unwrap();
    assert_eq!(stages(&store.manager), vec![(parent, 5)]);
}

#[test]
fn manual_cascade_applies_to_retention_sweeps() {
    let store = open_store(CascadeMode::Manual);
    let now = now_ms();
    store
        .manager
        .insert_all(&[
            sleep_session("old", 1, now - 10 * DAY_MS, "n", &[1, 2]),
            sleep_session("new", 1, now, "n", &[3]),
        ])
        .unwrap();

    store.manager.delete_stale_record_entries(5).unwrap();

    let parent = row_id_of(&store.manager, SLEEP_TABLE, "new").unwrap();
    assert_eq!(count_rows(&store.manager, SLEEP_TABLE), 1);
    assert_eq!(stages(&store.manager), vec![(parent, 3)]);
}
