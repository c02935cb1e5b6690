#![cfg(feature = "sqlite-tests")]

use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};
use prover_backend_lib::db::sqlite_test::setup_in_memory_sqlite;

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(QueryableByName)]
struct NameRow {
    #[diesel(sql_type = Text)]
    name: String,
}

#[test]
fn sqlite_harness_runs_expected_schema_migrations() {
    let mut conn = setup_in_memory_sqlite();

    let rows: Vec<NameRow> = sql_query(
        "
        SELECT name
        FROM sqlite_master
        WHERE type = 'table'
          AND name IN ('witness', 'proof', 'userproof')
        ORDER BY name
        ",
    )
    .load(&mut conn)
    .expect("failed to query sqlite_master");

    let names: Vec<String> = rows.into_iter().map(|row| row.name).collect();
    assert_eq!(
        names,
        vec![
            "proof".to_string(),
            "userproof".to_string(),
            "witness".to_string(),
        ]
    );
}

#[test]
fn sqlite_harness_creates_witness_status_index() {
    let mut conn = setup_in_memory_sqlite();

    let index_count: CountRow = sql_query(
        "
        SELECT COUNT(*) AS count
        FROM sqlite_master
        WHERE type = 'index'
          AND name = 'idx_witness_status'
        ",
    )
    .get_result(&mut conn)
    .expect("failed to query sqlite index metadata");

    assert_eq!(
        index_count.count, 1,
        "expected idx_witness_status index to exist"
    );
}

#[test]
fn sqlite_harness_enforces_height_uniqueness() {
    let mut conn = setup_in_memory_sqlite();

    sql_query(
        "
        INSERT INTO witness (height, witness_data, status)
        VALUES (1, 'payload', 0)
        ",
    )
    .execute(&mut conn)
    .expect("failed to insert witness row");

    let duplicate = sql_query(
        "
        INSERT INTO witness (height, witness_data, status)
        VALUES (1, 'payload-2', 0)
        ",
    )
    .execute(&mut conn)
    .expect_err("expected duplicate height to violate uniqueness");
    assert!(
        duplicate.to_string().contains("UNIQUE constraint failed"),
        "unexpected sqlite error: {duplicate}"
    );
}
