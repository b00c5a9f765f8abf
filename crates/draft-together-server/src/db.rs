// SQLite persistence layer for the champion catalog and draft sessions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use draft_together_core::champion::{Champion, ChampionId, ChampionIdsList, ChampionRole};
use draft_together_core::draft::{Draft, DraftId};
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite-backed persistence for champions, drafts, and key-value server
/// state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS champions (
                id                               INTEGER PRIMARY KEY,
                riot_id                          TEXT NOT NULL UNIQUE,
                name                             TEXT NOT NULL,
                default_skin_image_path          TEXT NOT NULL,
                centered_default_skin_image_path TEXT NOT NULL,
                positions                        TEXT NOT NULL DEFAULT '[]',
                updated_at                       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS drafts (
                client_id      TEXT PRIMARY KEY,
                blue_champions TEXT NOT NULL,
                red_champions  TEXT NOT NULL,
                blue_bans      TEXT NOT NULL,
                red_bans       TEXT NOT NULL,
                created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS server_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Champions
    // ------------------------------------------------------------------

    /// Insert or refresh every champion in a single transaction. Rows are
    /// keyed by the numeric champion id, so re-importing is idempotent.
    ///
    /// Positions are only written for champions not stored yet; existing
    /// rows keep theirs until [`Database::update_positions`] replaces them.
    pub fn upsert_champions(&self, champions: &[Champion]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin champion import")?;

        for champion in champions {
            let positions_json = serde_json::to_string(&champion.positions)
                .context("failed to serialize positions")?;
            tx.execute(
                "INSERT INTO champions
                    (id, riot_id, name, default_skin_image_path, centered_default_skin_image_path, positions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    riot_id                          = excluded.riot_id,
                    name                             = excluded.name,
                    default_skin_image_path          = excluded.default_skin_image_path,
                    centered_default_skin_image_path = excluded.centered_default_skin_image_path,
                    updated_at                       = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    champion.id.0,
                    champion.riot_id,
                    champion.name,
                    champion.default_skin_image_path,
                    champion.centered_default_skin_image_path,
                    positions_json,
                ],
            )
            .with_context(|| format!("failed to upsert champion {}", champion.riot_id))?;
        }

        tx.commit().context("failed to commit champion import")?;
        Ok(())
    }

    /// Load every stored champion, ordered by name.
    pub fn load_champions(&self) -> Result<Vec<Champion>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, riot_id, name, default_skin_image_path, centered_default_skin_image_path, positions
                 FROM champions ORDER BY name",
            )
            .context("failed to prepare load_champions query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    Champion {
                        id: row.get::<_, i32>(0)?.into(),
                        riot_id: row.get(1)?,
                        name: row.get(2)?,
                        default_skin_image_path: row.get(3)?,
                        centered_default_skin_image_path: row.get(4)?,
                        positions: Vec::new(),
                    },
                    row.get::<_, String>(5)?,
                ))
            })
            .context("failed to query champions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map champion rows")?;

        rows.into_iter()
            .map(|(mut champion, positions_json)| -> Result<Champion> {
                champion.positions = serde_json::from_str(&positions_json).with_context(|| {
                    format!(
                        "malformed positions {positions_json:?} for champion {}",
                        champion.riot_id
                    )
                })?;
                Ok(champion)
            })
            .collect()
    }

    /// Replace the positions of every listed champion in one transaction.
    /// Champions missing from `positions` keep what is stored. Returns the
    /// number of rows changed.
    pub fn update_positions(
        &self,
        positions: &HashMap<ChampionId, Vec<ChampionRole>>,
    ) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin positions update")?;

        let mut changed = 0;
        for (id, roles) in positions {
            let positions_json =
                serde_json::to_string(roles).context("failed to serialize positions")?;
            changed += tx
                .execute(
                    "UPDATE champions
                     SET positions = ?1,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![positions_json, id.0],
                )
                .with_context(|| format!("failed to update positions of champion {id}"))?;
        }

        tx.commit().context("failed to commit positions update")?;
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Drafts
    // ------------------------------------------------------------------

    /// Persist a draft, creating the row on first save.
    pub fn save_draft(&self, draft_id: &DraftId, draft: &Draft) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO drafts (client_id, blue_champions, red_champions, blue_bans, red_bans)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(client_id) DO UPDATE SET
                blue_champions = excluded.blue_champions,
                red_champions  = excluded.red_champions,
                blue_bans      = excluded.blue_bans,
                red_bans       = excluded.red_bans,
                updated_at     = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![
                draft_id.to_string(),
                encode_list(&draft.blue_champions)?,
                encode_list(&draft.red_champions)?,
                encode_list(&draft.blue_bans)?,
                encode_list(&draft.red_bans)?,
            ],
        )
        .with_context(|| format!("failed to save draft {draft_id}"))?;
        Ok(())
    }

    /// Load a stored draft. Returns `None` if the draft was never saved.
    pub fn load_draft(&self, draft_id: &DraftId) -> Result<Option<Draft>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT blue_champions, red_champions, blue_bans, red_bans
                 FROM drafts WHERE client_id = ?1",
                params![draft_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("failed to query draft {draft_id}"))?;

        let Some((blue_champions, red_champions, blue_bans, red_bans)) = row else {
            return Ok(None);
        };

        Ok(Some(Draft {
            blue_champions: decode_list(&blue_champions)?,
            red_champions: decode_list(&red_champions)?,
            blue_bans: decode_list(&blue_bans)?,
            red_bans: decode_list(&red_bans)?,
        }))
    }

    pub fn draft_exists(&self, draft_id: &DraftId) -> Result<bool> {
        let conn = self.conn();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM drafts WHERE client_id = ?1)",
                params![draft_id.to_string()],
                |row| row.get(0),
            )
            .context("failed to check draft existence")?;
        Ok(exists)
    }

    pub fn draft_count(&self) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM drafts", [], |row| row.get(0))
            .context("failed to count drafts")?;
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Key-value server state
    // ------------------------------------------------------------------

    /// Persist an arbitrary JSON value under `key`, overwriting any previous
    /// value.
    pub fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn();
        let json_str =
            serde_json::to_string(value).context("failed to serialize state value")?;
        conn.execute(
            "INSERT OR REPLACE INTO server_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )
        .context("failed to save state")?;
        Ok(())
    }

    /// Load a previously saved JSON value by `key`.
    pub fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn();
        let json_str: Option<String> = conn
            .query_row(
                "SELECT value FROM server_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query server state")?;

        json_str
            .map(|s| serde_json::from_str(&s).context("failed to deserialize state value"))
            .transpose()
    }

    const DATA_VERSION_KEY: &'static str = "data_dragon_version";

    /// Game data version the stored catalog was built from.
    pub fn get_data_version(&self) -> Result<Option<String>> {
        let value = self.load_state(Self::DATA_VERSION_KEY)?;
        Ok(value.and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    pub fn set_data_version(&self, version: &str) -> Result<()> {
        self.save_state(
            Self::DATA_VERSION_KEY,
            &serde_json::Value::String(version.to_string()),
        )
    }

    const CATALOG_CHECKED_KEY: &'static str = "catalog_checked_at";

    /// Record that the catalog source was just consulted.
    pub fn record_catalog_check(&self) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        self.save_state(
            Self::CATALOG_CHECKED_KEY,
            &serde_json::Value::String(now.to_rfc3339()),
        )?;
        Ok(now)
    }

    /// When the catalog source was last consulted, if ever.
    pub fn last_catalog_check(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(value) = self.load_state(Self::CATALOG_CHECKED_KEY)? else {
            return Ok(None);
        };
        let text = value.as_str().unwrap_or_default();
        let parsed = DateTime::parse_from_rfc3339(text)
            .with_context(|| format!("malformed catalog check timestamp {text:?}"))?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }
}

fn encode_list(list: &ChampionIdsList) -> Result<String> {
    serde_json::to_string(list).context("failed to serialize slot list")
}

fn decode_list(json: &str) -> Result<ChampionIdsList> {
    serde_json::from_str(json).with_context(|| format!("malformed slot list {json:?}"))
}
