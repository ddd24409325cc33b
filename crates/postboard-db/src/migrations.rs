use anyhow::Result;
use rusqlite::{Connection, Transaction};
use tracing::info;

use crate::queries::{reconcile_tags, set_message_tags};

type Step = fn(&Transaction<'_>) -> Result<()>;

/// Ordered schema history. Each step runs in its own transaction together
/// with its `schema_version` bump.
const MIGRATIONS: &[(i64, &str, Step)] = &[
    (1, "initial schema", v1_initial),
    (2, "thumbnail and csv tags", v2_thumbnail_and_tags),
    (3, "tags table", v3_tags_table),
    (4, "video and transcript", v4_video_and_transcript),
];

pub fn run(conn: &mut Connection) -> Result<()> {
    run_to(conn, i64::MAX)
}

pub(crate) fn run_to(conn: &mut Connection, target: i64) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    for (step_version, name, step) in MIGRATIONS {
        if *step_version <= version || *step_version > target {
            continue;
        }
        info!("DB: running migration v{} ({})", step_version, name);
        let tx = conn.transaction()?;
        step(&tx)?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [step_version],
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}

fn v1_initial(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "
        CREATE TABLE messages (
            id          INTEGER PRIMARY KEY,
            title       TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

fn v2_thumbnail_and_tags(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "
        ALTER TABLE messages ADD COLUMN thumbnail TEXT;
        ALTER TABLE messages ADD COLUMN tags TEXT;
        ",
    )?;
    Ok(())
}

/// Moves the comma-separated `messages.tags` column into a real join table.
fn v3_tags_table(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "
        CREATE TABLE tags (
            id      INTEGER PRIMARY KEY,
            name    TEXT NOT NULL UNIQUE
        );

        CREATE TABLE message_tags (
            message_id  INTEGER NOT NULL REFERENCES messages(id),
            tag_id      INTEGER NOT NULL REFERENCES tags(id),
            PRIMARY KEY (message_id, tag_id)
        );

        CREATE INDEX idx_message_tags_tag
            ON message_tags(tag_id);
        ",
    )?;

    let legacy: Vec<(i64, String)> = {
        let mut stmt =
            tx.prepare("SELECT id, tags FROM messages WHERE tags IS NOT NULL AND tags != ''")?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?
    };

    for (message_id, csv) in &legacy {
        let names: Vec<&str> = csv
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        let tags = reconcile_tags(tx, &names)?;
        set_message_tags(tx, *message_id, &tags)?;
    }
    if !legacy.is_empty() {
        info!("DB: migrated csv tags of {} messages", legacy.len());
    }

    tx.execute_batch("ALTER TABLE messages DROP COLUMN tags;")?;
    Ok(())
}

fn v4_video_and_transcript(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "
        ALTER TABLE messages ADD COLUMN video TEXT;
        ALTER TABLE messages ADD COLUMN transcript TEXT;
        ",
    )?;
    Ok(())
}
