use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// One extracted pin. Immutable after creation; the collection loop owns
/// records until they are handed to the store and the image fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct PinRecord {
    pub pinterest_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: String,
    pub board_url: String,
    pub pin_url: Option<String>,
    pub collected_at: DateTime<Utc>,
}

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pins (
            id           INTEGER PRIMARY KEY,
            pinterest_id TEXT UNIQUE NOT NULL,
            title        TEXT,
            description  TEXT,
            image_url    TEXT NOT NULL,
            board_url    TEXT NOT NULL,
            pin_url      TEXT,
            local_path   TEXT,
            collected_at TEXT NOT NULL,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pins_board ON pins(board_url);
        ",
    )?;
    Ok(())
}

/// Insert a pin, idempotent on `pinterest_id`. A duplicate insert is a
/// silent no-op; returns whether a row was actually written.
pub fn insert_pin(
    conn: &Connection,
    record: &PinRecord,
    local_path: Option<&str>,
) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO pins
         (pinterest_id, title, description, image_url, board_url, pin_url, local_path, collected_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            record.pinterest_id,
            record.title,
            record.description,
            record.image_url,
            record.board_url,
            record.pin_url,
            local_path,
            record.collected_at.to_rfc3339(),
        ],
    )?;
    Ok(changed > 0)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub downloaded: usize,
    pub boards: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM pins", [], |r| r.get(0))?;
    let downloaded: usize = conn.query_row(
        "SELECT COUNT(*) FROM pins WHERE local_path IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let boards: usize =
        conn.query_row("SELECT COUNT(DISTINCT board_url) FROM pins", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        downloaded,
        boards,
    })
}

// ── Recent listing ──

pub struct RecentRow {
    pub pinterest_id: String,
    pub title: String,
    pub board_url: String,
    pub local_path: Option<String>,
    pub collected_at: String,
}

pub fn fetch_recent(conn: &Connection, limit: usize) -> Result<Vec<RecentRow>> {
    let mut stmt = conn.prepare(
        "SELECT pinterest_id, COALESCE(title,''), board_url, local_path, collected_at
         FROM pins
         ORDER BY collected_at DESC, id DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok(RecentRow {
                pinterest_id: row.get(0)?,
                title: row.get(1)?,
                board_url: row.get(2)?,
                local_path: row.get(3)?,
                collected_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn record(id: &str) -> PinRecord {
        PinRecord {
            pinterest_id: id.to_string(),
            title: Some("A pin".into()),
            description: None,
            image_url: format!("https://i.pinimg.com/736x/{}.jpg", id),
            board_url: "https://br.pinterest.com/feed/".into(),
            pin_url: Some(format!("https://br.pinterest.com/pin/{}/", id)),
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn insert_is_idempotent_on_pinterest_id() {
        let conn = memory_db();
        assert!(insert_pin(&conn, &record("111"), None).unwrap());
        assert!(!insert_pin(&conn, &record("111"), Some("images/111.jpg")).unwrap());

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.total, 1);
        // First write wins; the duplicate no-op must not update local_path.
        assert_eq!(stats.downloaded, 0);
    }

    #[test]
    fn stats_count_downloads_and_boards() {
        let conn = memory_db();
        insert_pin(&conn, &record("1"), Some("images/1.jpg")).unwrap();
        insert_pin(&conn, &record("2"), None).unwrap();
        let mut other = record("3");
        other.board_url = "https://br.pinterest.com/cats/".into();
        insert_pin(&conn, &other, Some("images/3.jpg")).unwrap();

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.downloaded, 2);
        assert_eq!(stats.boards, 2);
    }

    #[test]
    fn recent_returns_newest_first() {
        let conn = memory_db();
        for i in 0..5 {
            let mut r = record(&format!("{}", i));
            r.collected_at = Utc::now() + chrono::Duration::seconds(i);
            insert_pin(&conn, &r, None).unwrap();
        }
        let rows = fetch_recent(&conn, 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].pinterest_id, "4");
        assert_eq!(rows[2].pinterest_id, "2");
    }
}
