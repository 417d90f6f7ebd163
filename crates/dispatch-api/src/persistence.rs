//! SQLite run store: runs, command audit, events, and snapshots. This
//! records runs only; engine caches are soft state and are never persisted.

use std::fmt;
use std::path::Path;

use contracts::{Command, CommandResult, Event, RunConfig, RunStatus, Snapshot, Tick};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCommandEntry {
    pub command: Command,
    pub result: CommandResult,
    pub effective_tick: Tick,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedRunSummary {
    pub run_id: String,
    pub current_tick: Tick,
    pub max_ticks: Tick,
    pub event_count: usize,
    pub snapshot_count: usize,
}

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    NotAttached,
    RunAlreadyExists(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
            Self::NotAttached => write!(f, "sqlite store is not attached"),
            Self::RunAlreadyExists(run_id) => write!(f, "run {run_id} already exists"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

#[derive(Debug)]
pub struct SqliteRunStore {
    conn: Connection,
}

impl SqliteRunStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                config_json TEXT NOT NULL,
                status_json TEXT NOT NULL,
                updated_at_tick INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS commands (
                run_id TEXT NOT NULL,
                command_id TEXT NOT NULL,
                command_json TEXT NOT NULL,
                result_json TEXT NOT NULL,
                effective_tick INTEGER NOT NULL,
                PRIMARY KEY (run_id, command_id)
            );
            CREATE TABLE IF NOT EXISTS events (
                run_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                tick INTEGER NOT NULL,
                event_json TEXT NOT NULL,
                PRIMARY KEY (run_id, event_id)
            );
            CREATE TABLE IF NOT EXISTS snapshots (
                run_id TEXT NOT NULL,
                tick INTEGER NOT NULL,
                snapshot_json TEXT NOT NULL,
                PRIMARY KEY (run_id, tick)
            );",
        )?;
        Ok(())
    }

    /// Append-only delta write inside one transaction: upsert the run row,
    /// then insert new commands, events, and an optional snapshot.
    pub fn persist_delta(
        &mut self,
        config: &RunConfig,
        status: &RunStatus,
        commands: &[PersistedCommandEntry],
        events: &[Event],
        snapshot: Option<&Snapshot>,
    ) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO runs (run_id, config_json, status_json, updated_at_tick)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(run_id) DO UPDATE SET
                 config_json = excluded.config_json,
                 status_json = excluded.status_json,
                 updated_at_tick = excluded.updated_at_tick",
            params![
                status.run_id,
                serde_json::to_string(config)?,
                serde_json::to_string(status)?,
                status.current_tick,
            ],
        )?;

        for entry in commands {
            tx.execute(
                "INSERT OR REPLACE INTO commands
                     (run_id, command_id, command_json, result_json, effective_tick)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.command.run_id,
                    entry.command.command_id,
                    serde_json::to_string(&entry.command)?,
                    serde_json::to_string(&entry.result)?,
                    entry.effective_tick,
                ],
            )?;
        }

        for event in events {
            tx.execute(
                "INSERT OR REPLACE INTO events (run_id, event_id, tick, event_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    event.run_id,
                    event.event_id,
                    event.tick,
                    serde_json::to_string(event)?,
                ],
            )?;
        }

        if let Some(snapshot) = snapshot {
            tx.execute(
                "INSERT OR REPLACE INTO snapshots (run_id, tick, snapshot_json)
                 VALUES (?1, ?2, ?3)",
                params![
                    snapshot.run_id,
                    snapshot.tick,
                    serde_json::to_string(snapshot)?,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn run_exists(&self, run_id: &str) -> Result<bool, PersistenceError> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT run_id FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn delete_run(&mut self, run_id: &str) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM runs WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM commands WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM events WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM snapshots WHERE run_id = ?1", params![run_id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_runs(&self) -> Result<Vec<PersistedRunSummary>, PersistenceError> {
        let mut statement = self.conn.prepare(
            "SELECT r.run_id,
                    r.status_json,
                    (SELECT COUNT(*) FROM events e WHERE e.run_id = r.run_id),
                    (SELECT COUNT(*) FROM snapshots s WHERE s.run_id = r.run_id)
             FROM runs r
             ORDER BY r.run_id",
        )?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (run_id, status_json, event_count, snapshot_count) = row?;
            let status: RunStatus = serde_json::from_str(&status_json)?;
            summaries.push(PersistedRunSummary {
                run_id,
                current_tick: status.current_tick,
                max_ticks: status.max_ticks,
                event_count: event_count.max(0) as usize,
                snapshot_count: snapshot_count.max(0) as usize,
            });
        }
        Ok(summaries)
    }

    pub fn events_for_run(&self, run_id: &str) -> Result<Vec<Event>, PersistenceError> {
        let mut statement = self.conn.prepare(
            "SELECT event_json FROM events WHERE run_id = ?1 ORDER BY tick, event_id",
        )?;
        let rows = statement.query_map(params![run_id], |row| row.get::<_, String>(0))?;

        let mut events = Vec::new();
        for row in rows {
            events.push(serde_json::from_str(&row?)?);
        }
        Ok(events)
    }
}
