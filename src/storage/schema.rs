//! Database schema definitions
//!
//! Bookkeeping tables are created up front. Data tables are named by the
//! configuration and created on replacement from the column lists below.

/// SQL schema for the bookkeeping tables
pub const SCHEMA_SQL: &str = r#"
-- Track pipeline runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Fetch statistics per category and run
CREATE TABLE IF NOT EXISTS category_stats (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    subject_type INTEGER NOT NULL,
    collection_type INTEGER NOT NULL,
    expected_total INTEGER NOT NULL,
    fetched_items INTEGER NOT NULL,
    pages_fetched INTEGER NOT NULL,
    pages_failed INTEGER NOT NULL,
    rate_limit_waits INTEGER NOT NULL,
    consecutive_failures INTEGER NOT NULL,
    aborted INTEGER NOT NULL,
    total_unresolved INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (run_id, subject_type, collection_type)
);
"#;

/// Columns of the raw table, in insert order
pub const RAW_COLUMNS: &str = "
    user_id TEXT NOT NULL,
    subject_id INTEGER,
    subject_type INTEGER NOT NULL,
    collection_type INTEGER NOT NULL,
    created_at TEXT,
    updated_at TEXT,
    ep_status INTEGER,
    vol_status INTEGER,
    name TEXT,
    name_cn TEXT,
    score REAL,
    rank INTEGER,
    collection_total INTEGER,
    eps INTEGER,
    volumes INTEGER,
    date TEXT,
    type INTEGER,
    short_summary TEXT,
    tags TEXT,
    tags_raw TEXT,
    infobox_raw TEXT
";

/// Columns of the fact and incremental tables, in insert order
pub const FACT_COLUMNS: &str = "
    subject_id INTEGER,
    subject_type INTEGER NOT NULL,
    collection_type INTEGER NOT NULL,
    name_cn TEXT,
    score REAL,
    rank INTEGER,
    collection_total INTEGER,
    created_at TEXT,
    updated_at TEXT,
    eps INTEGER,
    air_date TEXT,
    all_tags TEXT
";

/// Number of columns in [`RAW_COLUMNS`]
pub const RAW_COLUMN_COUNT: usize = 21;

/// Number of columns in [`FACT_COLUMNS`]
pub const FACT_COLUMN_COUNT: usize = 12;

/// Statement dropping and recreating a data table
///
/// `table` must already be a validated identifier.
pub fn recreate_table_sql(table: &str, columns: &str) -> String {
    format!(
        "DROP TABLE IF EXISTS \"{table}\";\nCREATE TABLE \"{table}\" ({columns});\n\
         CREATE INDEX \"idx_{table}_subject\" ON \"{table}\"(subject_id);"
    )
}

/// Positional insert statement for a data table
pub fn insert_sql(table: &str, column_count: usize) -> String {
    let placeholders = (1..=column_count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO \"{}\" VALUES ({})", table, placeholders)
}

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
