use std::collections::{BTreeMap, BTreeSet, HashMap};

use postboard_types::models::{Message, Tag};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::is_unique_violation;
use crate::models::{MessageFields, MessageRow, TagRow};
use crate::{Database, DbError};

type Result<T> = std::result::Result<T, DbError>;

const MESSAGE_COLUMNS: &str = "m.id, m.title, m.description, m.thumbnail, m.video, m.transcript";

/// Filters for [`find_messages`]. Each present filter narrows the result
/// (AND); a present but empty list matches nothing.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub ids: Option<Vec<i64>>,
    pub titles: Option<Vec<String>>,
    /// Messages carrying at least one of these tag names.
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    pub ids: Option<Vec<i64>>,
    pub names: Option<Vec<String>>,
    /// Case-insensitive substrings of the titles of tagged messages.
    pub message_titles: Option<Vec<String>>,
}

impl Database {
    pub fn messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        self.with_conn(|conn| find_messages_with_tags(conn, filter))
    }

    pub fn tags(&self, filter: &TagFilter) -> Result<Vec<Tag>> {
        self.with_conn(|conn| {
            Ok(find_tags(conn, filter)?.into_iter().map(Tag::from).collect())
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| get_message(conn, id))
    }

    pub fn message_title_exists(&self, title: &str) -> Result<bool> {
        self.with_conn(|conn| message_title_exists(conn, title))
    }
}

// -- Messages --

pub fn insert_message(conn: &Connection, title: &str, fields: &MessageFields<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (title, description, thumbnail, video, transcript)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            title,
            fields.description,
            fields.thumbnail,
            fields.video,
            fields.transcript
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            DbError::Conflict("A message with this title already exists".into())
        } else {
            e.into()
        }
    })?;

    Ok(conn.last_insert_rowid())
}

/// Overwrites every mutable column; `None` clears.
pub fn update_message(conn: &Connection, id: i64, fields: &MessageFields<'_>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE messages
         SET description = ?2, thumbnail = ?3, video = ?4, transcript = ?5
         WHERE id = ?1",
        rusqlite::params![
            id,
            fields.description,
            fields.thumbnail,
            fields.video,
            fields.transcript
        ],
    )?;

    if changed == 0 {
        return Err(DbError::NotFound("Message not found".into()));
    }
    Ok(())
}

pub fn get_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1");
    let row = conn.query_row(&sql, [id], message_from_row).optional()?;
    Ok(row)
}

pub fn message_title_exists(conn: &Connection, title: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM messages WHERE title = ?1", [title], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Runs the filtered message query. The tag filter is a semi-join, so a
/// message matching several requested tags still appears once.
pub fn find_messages(conn: &Connection, filter: &MessageFilter) -> Result<Vec<MessageRow>> {
    let mut clauses = Clauses::default();

    if let Some(ids) = &filter.ids {
        clauses.push_in("m.id", ids.iter().map(|id| Value::Integer(*id)));
    }
    if let Some(titles) = &filter.titles {
        clauses.push_in("m.title", titles.iter().map(|t| Value::Text(t.clone())));
    }
    if let Some(tags) = &filter.tags {
        clauses.push_in_subquery(
            "m.id IN (SELECT mt.message_id FROM message_tags mt
                      JOIN tags t ON t.id = mt.tag_id
                      WHERE t.name IN ({}))",
            tags.iter().map(|t| Value::Text(t.clone())),
        );
    }

    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages m{} ORDER BY m.id",
        clauses.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(clauses.params.iter()), message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Batch-fetch tag names for a set of message ids, each list sorted by name.
pub fn tag_names_for_messages(
    conn: &Connection,
    message_ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>> {
    let mut names: HashMap<i64, Vec<String>> = HashMap::new();
    if message_ids.is_empty() {
        return Ok(names);
    }

    let sql = format!(
        "SELECT mt.message_id, t.name FROM message_tags mt
         JOIN tags t ON t.id = mt.tag_id
         WHERE mt.message_id IN ({})
         ORDER BY t.name",
        placeholders(message_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(message_ids.iter()))?;
    while let Some(row) = rows.next()? {
        let message_id: i64 = row.get(0)?;
        names.entry(message_id).or_default().push(row.get(1)?);
    }

    Ok(names)
}

pub fn find_messages_with_tags(conn: &Connection, filter: &MessageFilter) -> Result<Vec<Message>> {
    let rows = find_messages(conn, filter)?;
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut names = tag_names_for_messages(conn, &ids)?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let tags = names.remove(&row.id).unwrap_or_default();
            row.into_message(tags)
        })
        .collect())
}

// -- Tags --

/// Find-or-create every name (trimmed, exact match) and return the resolved
/// tags once each, ordered by id. Inserts land in the caller's transaction.
pub fn reconcile_tags<S: AsRef<str>>(conn: &Connection, names: &[S]) -> Result<Vec<TagRow>> {
    let mut insert = conn.prepare_cached("INSERT OR IGNORE INTO tags (name) VALUES (?1)")?;
    let mut select = conn.prepare_cached("SELECT id, name FROM tags WHERE name = ?1")?;

    let mut resolved: BTreeMap<i64, TagRow> = BTreeMap::new();
    for raw in names {
        let name = raw.as_ref().trim();
        insert.execute([name])?;
        let tag = select.query_row([name], tag_from_row)?;
        resolved.entry(tag.id).or_insert(tag);
    }

    Ok(resolved.into_values().collect())
}

/// Replace the message's whole tag set.
pub fn set_message_tags(conn: &Connection, message_id: i64, tags: &[TagRow]) -> Result<()> {
    conn.execute("DELETE FROM message_tags WHERE message_id = ?1", [message_id])?;

    let mut stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO message_tags (message_id, tag_id) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute([message_id, tag.id])?;
    }
    Ok(())
}

pub fn find_tags(conn: &Connection, filter: &TagFilter) -> Result<Vec<TagRow>> {
    let mut clauses = Clauses::default();

    if let Some(ids) = &filter.ids {
        clauses.push_in("t.id", ids.iter().map(|id| Value::Integer(*id)));
    }
    if let Some(names) = &filter.names {
        clauses.push_in("t.name", names.iter().map(|n| Value::Text(n.clone())));
    }
    if let Some(fragments) = &filter.message_titles {
        if fragments.is_empty() {
            clauses.push_never();
        } else {
            let likes = vec!["m.title LIKE ? ESCAPE '\\'"; fragments.len()].join(" OR ");
            clauses.push(
                format!(
                    "t.id IN (SELECT mt.tag_id FROM message_tags mt
                              JOIN messages m ON m.id = mt.message_id
                              WHERE {likes})"
                ),
                fragments
                    .iter()
                    .map(|f| Value::Text(format!("%{}%", escape_like(f)))),
            );
        }
    }

    let sql = format!(
        "SELECT t.id, t.name FROM tags t{} ORDER BY t.id",
        clauses.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(clauses.params.iter()), tag_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

// -- Message tags --

/// Link every message to every tag. Existing pairs are left alone; returns
/// the number of pairs that were actually inserted.
pub fn link_messages_tags(conn: &Connection, message_ids: &[i64], tag_ids: &[i64]) -> Result<usize> {
    let message_ids: BTreeSet<i64> = message_ids.iter().copied().collect();
    let tag_ids: BTreeSet<i64> = tag_ids.iter().copied().collect();

    for id in &message_ids {
        if !row_exists(conn, "SELECT 1 FROM messages WHERE id = ?1", *id)? {
            return Err(DbError::NotFound(format!("Message not found: {}", id)));
        }
    }
    for id in &tag_ids {
        if !row_exists(conn, "SELECT 1 FROM tags WHERE id = ?1", *id)? {
            return Err(DbError::NotFound(format!("Tag not found: {}", id)));
        }
    }

    let mut stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO message_tags (message_id, tag_id) VALUES (?1, ?2)")?;
    let mut inserted = 0;
    for message_id in &message_ids {
        for tag_id in &tag_ids {
            inserted += stmt.execute([message_id, tag_id])?;
        }
    }

    Ok(inserted)
}

// -- Helpers --

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        thumbnail: row.get(3)?,
        video: row.get(4)?,
        transcript: row.get(5)?,
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<TagRow> {
    Ok(TagRow {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn row_exists(conn: &Connection, sql: &str, id: i64) -> Result<bool> {
    let mut stmt = conn.prepare_cached(sql)?;
    Ok(stmt.exists([id])?)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn escape_like(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// WHERE-clause accumulator for the dynamic filter queries. Parameters are
/// positional `?` in push order.
#[derive(Default)]
struct Clauses {
    sql: Vec<String>,
    params: Vec<Value>,
}

impl Clauses {
    fn push(&mut self, clause: String, params: impl IntoIterator<Item = Value>) {
        self.sql.push(clause);
        self.params.extend(params);
    }

    fn push_never(&mut self) {
        self.sql.push("0".into());
    }

    fn push_in(&mut self, column: &str, values: impl IntoIterator<Item = Value>) {
        self.push_in_subquery(&format!("{column} IN ({{}})"), values);
    }

    /// `template` contains one `{}` that receives the placeholder list.
    fn push_in_subquery(&mut self, template: &str, values: impl IntoIterator<Item = Value>) {
        let values: Vec<Value> = values.into_iter().collect();
        if values.is_empty() {
            self.push_never();
            return;
        }
        let clause = template.replacen("{}", &placeholders(values.len()), 1);
        self.push(clause, values);
    }

    fn where_sql(&self) -> String {
        if self.sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql.join(" AND "))
        }
    }
}
