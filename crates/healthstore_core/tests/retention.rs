mod common;

use common::{
    count_rows, now_ms, open_store, read_steps, sleep_session, stages, steps, DAY_MS,
    SLEEP_TABLE, STAGES_TABLE, STEPS_TABLE,
};
use healthstore_core::{
    CascadeMode, ChangeLogTokenRequest, ChangeLogs, ChangeOperation, ReadTransactionRequest,
};

#[test]
fn zero_retention_days_is_a_no_op() {
    let store = open_store(CascadeMode::Store);
    store
        .manager
        .insert_all(&[steps("ancient", 1, 0, 1), sleep_session("old", 1, 0, "n", &[1])])
        .unwrap();

    store.manager.delete_stale_record_entries(0).unwrap();

    assert_eq!(count_rows(&store.manager, STEPS_TABLE), 1);
    assert_eq!(count_rows(&store.manager, SLEEP_TABLE), 1);
    assert_eq!(count_rows(&store.manager, STAGES_TABLE), 1);
}

#[test]
fn retention_sweep_removes_old_records_across_registered_tables() {
    let store = open_store(CascadeMode::Store);
    let now = now_ms();
    store
        .manager
        .insert_all(&[
            steps("old", 1, now - 40 * DAY_MS, 1),
            steps("recent", 1, now - DAY_MS, 2),
            sleep_session("old_sleep", 1, now - 31 * DAY_MS, "n", &[1, 2]),
            sleep_session("new_sleep", 1, now, "n", &[3]),
        ])
        .unwrap();

    store.manager.delete_stale_record_entries(30).unwrap();

    let remaining = read_steps(&store.manager);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].uuid, "recent");
    assert_eq!(count_rows(&store.manager, SLEEP_TABLE), 1);
    assert_eq!(
        stages(&store.manager)
            .into_iter()
            .map(|(_, stage)| stage)
            .collect::<Vec<_>>(),
        vec![3]
    );
    assert_eq!(count_rows(&store.manager, "change_logs"), 0);
}

#[test]
fn change_log_sweep_prunes_old_entries_and_tokens_together() {
    let store = open_store(CascadeMode::Store);
    let now = now_ms();

    let mut old_logs = ChangeLogs::at(ChangeOperation::Insert, now - 40 * DAY_MS);
    old_logs.add(1, "old".to_string(), 1);
    let mut new_logs = ChangeLogs::at(ChangeOperation::Delete, now);
    new_logs.add(1, "new".to_string(), 1);
    store
        .manager
        .insert_all(
            &old_logs
                .upsert_requests()
                .into_iter()
                .chain(new_logs.upsert_requests())
                .collect::<Vec<_>>(),
        )
        .unwrap();

    let mut stale_token = ChangeLogTokenRequest::new(1, vec![1, 2], 0);
    stale_token.created_at = now - 33 * DAY_MS;
    let fresh_token = ChangeLogTokenRequest::new(1, vec![1], 1);
    let stale = store.manager.insert(&stale_token.upsert_request()).unwrap();
    let fresh = store.manager.insert(&fresh_token.upsert_request()).unwrap();

    store.manager.delete_stale_change_log_entries().unwrap();

    assert_eq!(count_rows(&store.manager, "change_logs"), 1);
    let gone = store
        .manager
        .read_records(&ReadTransactionRequest::single(
            ChangeLogTokenRequest::read_request(stale),
        ))
        .unwrap();
    assert!(gone.is_empty());
    let kept = store
        .manager
        .read_records(&ReadTransactionRequest::single(
            ChangeLogTokenRequest::read_request(fresh),
        ))
        .unwrap();
    assert_eq!(kept, vec![fresh_token]);
    assert_eq!(kept[0].next_change_row_id(), 2);
}
