// Integration tests for the migration framework

use rusqlite::Connection;

fn setup_test_db() -> Connection {
    Connection::open_in_memory().expect("Failed to create in-memory database")
}

fn get_table_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

#[test]
fn test_apply_migrations_on_empty_db() {
    // Given: An empty SQLite database
    let mut conn = setup_test_db();

    // When: Migrations are applied
    let result = scdx_store::migrations::apply_migrations(&mut conn);

    // Then: All migrations succeed and the expected tables exist
    assert!(result.is_ok(), "Migrations should succeed: {:?}", result.err());
    let tables = get_table_names(&conn);
    for expected in ["schema_version", "history", "target_columns", "runs"] {
        assert!(tables.contains(&expected.to_string()), "Missing table: {}", expected);
    }
}

#[test]
fn test_migrations_are_idempotent() {
    let mut conn = setup_test_db();
    scdx_store::migrations::apply_migrations(&mut conn).unwrap();
    scdx_store::migrations::apply_migrations(&mut conn).unwrap();

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_tampered_checksum_fails() {
    // Given: A migrated database whose recorded checksum was altered
    let mut conn = setup_test_db();
    scdx_store::migrations::apply_migrations(&mut conn).unwrap();
    conn.execute(
        "UPDATE schema_version SET checksum = 'deadbeef' WHERE migration_id = '001_history'",
        [],
    )
    .unwrap();

    // When: Migrations run again
    let err = scdx_store::migrations::apply_migrations(&mut conn).unwrap_err();

    // Then: The mismatch is reported
    assert_eq!(err.op(), Some("migration_checksum"));
    assert!(err.message().contains("001_history"));
}

#[test]
fn test_unknown_migration_fails() {
    // Given: A database migrated by a newer build
    let mut conn = setup_test_db();
    scdx_store::migrations::apply_migrations(&mut conn).unwrap();
    conn.execute(
        "INSERT INTO schema_version (migration_id, applied_at, checksum) VALUES ('999_future', 0, NULL)",
        [],
    )
    .unwrap();

    // Then: This build refuses to touch it
    let err = scdx_store::migrations::apply_migrations(&mut conn).unwrap_err();
    assert!(err.message().contains("999_future"));
}

#[test]
fn test_second_current_interval_rejected_by_schema() {
    let mut conn = setup_test_db();
    scdx_store::migrations::apply_migrations(&mut conn).unwrap();

    let insert = "INSERT INTO history (target, scd_id, natural_key, attributes, updated_at, valid_from, valid_to)
                  VALUES ('dim', ?1, '1', '{}', 0, ?2, NULL)";
    conn.execute(insert, rusqlite::params!["a", 0]).unwrap();
    assert!(conn.execute(insert, rusqlite::params!["b", 10]).is_err());
}
