//! SQLite storage for game projects.
//!
//! Schema:
//! - projects: metadata, the six design documents as JSON text, analysis progress
//! - analysis_cache: (project_id, chunk_index) -> raw oracle result, write-once
//! - game_saves: (project_id, user_id, slot) -> player state
//! - creative_sessions: chat history per session (no credentials)
//! - modification_logs: audit trail of creative edits
//! - custom_content: (project_id, content_type, content_id) -> author JSON

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use chrono::{SecondsFormat, Utc};
use novel_analysis::{AnalysisRepository, AnalysisStatus, ProjectState};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    errors::{Result, StoreError},
    models::{
        CreativeSession, CustomContent, GameSave, ModificationLog, NewCustomContent,
        NewModificationLog, NewProject, ProjectRecord, ProjectSummary, SaveRequest, SaveSummary,
    },
};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    novel_path TEXT NOT NULL,
    chapter_mode INTEGER NOT NULL DEFAULT 0,
    world_setting TEXT NOT NULL DEFAULT '{}',
    characters TEXT NOT NULL DEFAULT '{}',
    story_tree TEXT NOT NULL DEFAULT '{}',
    attributes TEXT NOT NULL DEFAULT '{}',
    items TEXT NOT NULL DEFAULT '{}',
    exploration TEXT NOT NULL DEFAULT '{}',
    analysis_progress INTEGER NOT NULL DEFAULT 0,
    total_chunks INTEGER NOT NULL DEFAULT 0,
    analysis_status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS analysis_cache (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL,
    chunk_content TEXT NOT NULL,
    result TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    UNIQUE(project_id, chunk_index)
);

CREATE TABLE IF NOT EXISTS game_saves (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    user_id TEXT NOT NULL DEFAULT 'anonymous',
    slot INTEGER NOT NULL,
    save_name TEXT NOT NULL,
    current_chapter TEXT NOT NULL DEFAULT '',
    current_scene TEXT NOT NULL DEFAULT '',
    current_node TEXT NOT NULL DEFAULT '',
    attributes TEXT NOT NULL DEFAULT '{}',
    inventory TEXT NOT NULL DEFAULT '[]',
    flags TEXT NOT NULL DEFAULT '[]',
    relationships TEXT NOT NULL DEFAULT '{}',
    exploration TEXT NOT NULL DEFAULT '{}',
    play_time INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    UNIQUE(project_id, user_id, slot)
);

CREATE TABLE IF NOT EXISTS creative_sessions (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    provider TEXT NOT NULL,
    history TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS modification_logs (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    session_id INTEGER,
    operation_type TEXT NOT NULL,
    target_path TEXT NOT NULL,
    old_value TEXT NOT NULL DEFAULT 'null',
    new_value TEXT NOT NULL DEFAULT 'null',
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY (session_id) REFERENCES creative_sessions(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS custom_content (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    content_id TEXT NOT NULL,
    content_data TEXT NOT NULL DEFAULT '{}',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    UNIQUE(project_id, content_type, content_id)
);

CREATE INDEX IF NOT EXISTS idx_cache_project ON analysis_cache(project_id, chunk_index);
CREATE INDEX IF NOT EXISTS idx_saves_owner ON game_saves(project_id, user_id);
CREATE INDEX IF NOT EXISTS idx_logs_project ON modification_logs(project_id, id);
";

const PROJECT_COLUMNS: &str = "id, name, description, novel_path, chapter_mode, world_setting, \
     characters, story_tree, attributes, items, exploration, analysis_progress, total_chunks, \
     analysis_status, created_at, updated_at";

const SAVE_COLUMNS: &str = "id, slot, save_name, current_chapter, current_scene, current_node, \
     attributes, inventory, flags, relationships, exploration, play_time, updated_at";

const CUSTOM_COLUMNS: &str =
    "id, content_type, content_id, content_data, is_active, created_at, updated_at";

const LOG_COLUMNS: &str = "id, project_id, session_id, operation_type, target_path, old_value, \
     new_value, description, created_at";

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Connection wrapper shared by the HTTP handlers and the CLI.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens or creates the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "game store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /* ---------------------------- projects ---------------------------- */

    pub fn create_project(&self, project: &NewProject) -> Result<i64> {
        let conn = self.conn()?;
        let ts = now();
        conn.execute(
            "INSERT INTO projects (name, description, novel_path, chapter_mode, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                project.name,
                project.description,
                project.novel_path,
                project.chapter_mode,
                ts
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(project_id = id, name = %project.name, "project created");
        Ok(id)
    }

    /// Newest first.
    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, analysis_status, analysis_progress, total_chunks, created_at
             FROM projects ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(3)?;
            Ok(ProjectSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                analysis_status: AnalysisStatus::parse(&status),
                analysis_progress: row.get::<_, i64>(4)?.max(0) as u64,
                total_chunks: row.get::<_, i64>(5)?.max(0) as u64,
                created_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn find_project(&self, project_id: i64) -> Result<Option<ProjectRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![project_id],
                RawProject::from_row,
            )
            .optional()?;
        raw.map(RawProject::into_record).transpose()
    }

    /// Most recent project with this exact name.
    pub fn find_project_by_name(&self, name: &str) -> Result<Option<ProjectRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ?1 ORDER BY id DESC LIMIT 1"
                ),
                params![name],
                RawProject::from_row,
            )
            .optional()?;
        raw.map(RawProject::into_record).transpose()
    }

    pub fn get_project(&self, project_id: i64) -> Result<ProjectRecord> {
        self.find_project(project_id)?
            .ok_or_else(|| StoreError::not_found("project", project_id))
    }

    /// Writes the design documents, progress and status of a project.
    pub fn save_project_state(&self, project_id: i64, state: &ProjectState) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE projects SET world_setting = ?1, characters = ?2, story_tree = ?3,
                 attributes = ?4, items = ?5, exploration = ?6, analysis_progress = ?7,
                 total_chunks = ?8, analysis_status = ?9, updated_at = ?10
             WHERE id = ?11",
            params![
                serde_json::to_string(&state.world_setting)?,
                serde_json::to_string(&state.characters)?,
                serde_json::to_string(&state.story_tree)?,
                serde_json::to_string(&state.attributes)?,
                serde_json::to_string(&state.items)?,
                serde_json::to_string(&state.exploration)?,
                state.analysis_progress as i64,
                state.total_chunks as i64,
                state.analysis_status.as_str(),
                now(),
                project_id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("project", project_id));
        }
        debug!(
            project_id,
            progress = state.analysis_progress,
            status = state.analysis_status.as_str(),
            "project state saved"
        );
        Ok(())
    }

    pub fn set_analysis_status(&self, project_id: i64, status: AnalysisStatus) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE projects SET analysis_status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now(), project_id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("project", project_id));
        }
        Ok(())
    }

    /* ------------------------- analysis cache ------------------------- */

    pub fn cached_chunk_count(&self, project_id: i64) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM analysis_cache WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }

    /* ------------------------------ saves ------------------------------ */

    /// Upserts the slot owned by `user_id` and returns the row id.
    pub fn save_game(&self, project_id: i64, user_id: &str, save: &SaveRequest) -> Result<i64> {
        let conn = self.conn()?;
        let ts = now();
        conn.execute(
            "INSERT INTO game_saves (project_id, user_id, slot, save_name, current_chapter,
                 current_scene, current_node, attributes, inventory, flags, relationships,
                 exploration, play_time, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
             ON CONFLICT(project_id, user_id, slot) DO UPDATE SET
                 save_name = excluded.save_name,
                 current_chapter = excluded.current_chapter,
                 current_scene = excluded.current_scene,
                 current_node = excluded.current_node,
                 attributes = excluded.attributes,
                 inventory = excluded.inventory,
                 flags = excluded.flags,
                 relationships = excluded.relationships,
                 exploration = excluded.exploration,
                 play_time = excluded.play_time,
                 updated_at = excluded.updated_at",
            params![
                project_id,
                user_id,
                save.slot,
                save.save_name_or_default(),
                save.current_chapter,
                save.current_scene,
                save.current_node,
                save.attributes.to_string(),
                save.inventory.to_string(),
                save.flags.to_string(),
                save.relationships.to_string(),
                save.exploration.to_string(),
                save.play_time,
                ts
            ],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM game_saves WHERE project_id = ?1 AND user_id = ?2 AND slot = ?3",
            params![project_id, user_id, save.slot],
            |row| row.get(0),
        )?;
        debug!(project_id, user_id, slot = save.slot, save_id = id, "game saved");
        Ok(id)
    }

    pub fn load_game(&self, project_id: i64, user_id: &str, slot: i64) -> Result<Option<GameSave>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {SAVE_COLUMNS} FROM game_saves
                     WHERE project_id = ?1 AND user_id = ?2 AND slot = ?3"
                ),
                params![project_id, user_id, slot],
                RawSave::from_row,
            )
            .optional()?;
        raw.map(RawSave::into_save).transpose()
    }

    /// Slots of one user, ordered by slot.
    pub fn list_saves(&self, project_id: i64, user_id: &str) -> Result<Vec<SaveSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT slot, save_name, current_chapter, play_time, updated_at
             FROM game_saves WHERE project_id = ?1 AND user_id = ?2 ORDER BY slot",
        )?;
        let rows = stmt.query_map(params![project_id, user_id], |row| {
            Ok(SaveSummary {
                slot: row.get(0)?,
                save_name: row.get(1)?,
                current_chapter: row.get(2)?,
                play_time: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Returns whether a slot was removed.
    pub fn delete_save(&self, project_id: i64, user_id: &str, slot: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM game_saves WHERE project_id = ?1 AND user_id = ?2 AND slot = ?3",
            params![project_id, user_id, slot],
        )?;
        Ok(removed > 0)
    }

    /* ------------------------ creative sessions ------------------------ */

    pub fn create_session(&self, project_id: i64, provider: &str) -> Result<i64> {
        let conn = self.conn()?;
        let ts = now();
        conn.execute(
            "INSERT INTO creative_sessions (project_id, provider, history, created_at, updated_at)
             VALUES (?1, ?2, '[]', ?3, ?3)",
            params![project_id, provider, ts],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_session(&self, session_id: i64) -> Result<Option<CreativeSession>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT id, project_id, provider, history, created_at, updated_at
                 FROM creative_sessions WHERE id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, project_id, provider, history, created_at, updated_at)) = raw else {
            return Ok(None);
        };
        Ok(Some(CreativeSession {
            id,
            project_id,
            provider,
            history: serde_json::from_str(&history)?,
            created_at,
            updated_at,
        }))
    }

    pub fn update_session_history(
        &self,
        session_id: i64,
        history: &[ai_llm_service::ChatMessage],
    ) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE creative_sessions SET history = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(history)?, now(), session_id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("session", session_id));
        }
        Ok(())
    }

    /* ------------------------- modification log ------------------------- */

    pub fn insert_log(&self, project_id: i64, entry: &NewModificationLog) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO modification_logs (project_id, session_id, operation_type, target_path,
                 old_value, new_value, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project_id,
                entry.session_id,
                entry.operation_type,
                entry.target_path,
                entry.old_value.to_string(),
                entry.new_value.to_string(),
                entry.description,
                now()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Latest `limit` entries, newest first.
    pub fn list_logs(&self, project_id: i64, limit: u32) -> Result<Vec<ModificationLog>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM modification_logs
             WHERE project_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![project_id, limit], RawLog::from_row)?;
        rows.map(|raw| raw?.into_log()).collect()
    }

    pub fn find_log(&self, project_id: i64, log_id: i64) -> Result<Option<ModificationLog>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {LOG_COLUMNS} FROM modification_logs WHERE project_id = ?1 AND id = ?2"
                ),
                params![project_id, log_id],
                RawLog::from_row,
            )
            .optional()?;
        raw.map(RawLog::into_log).transpose()
    }

    /// Writes `state` and its log entry in one transaction.
    pub fn apply_modification(
        &self,
        project_id: i64,
        state: &ProjectState,
        entry: &NewModificationLog,
    ) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE projects SET world_setting = ?1, characters = ?2, story_tree = ?3,
                 attributes = ?4, items = ?5, exploration = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                serde_json::to_string(&state.world_setting)?,
                serde_json::to_string(&state.characters)?,
                serde_json::to_string(&state.story_tree)?,
                serde_json::to_string(&state.attributes)?,
                serde_json::to_string(&state.items)?,
                serde_json::to_string(&state.exploration)?,
                now(),
                project_id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("project", project_id));
        }
        tx.execute(
            "INSERT INTO modification_logs (project_id, session_id, operation_type, target_path,
                 old_value, new_value, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project_id,
                entry.session_id,
                entry.operation_type,
                entry.target_path,
                entry.old_value.to_string(),
                entry.new_value.to_string(),
                entry.description,
                now()
            ],
        )?;
        let log_id = tx.last_insert_rowid();
        tx.commit()?;
        info!(
            project_id,
            log_id,
            op = %entry.operation_type,
            path = %entry.target_path,
            "modification applied"
        );
        Ok(log_id)
    }

    /* -------------------------- custom content -------------------------- */

    /// Creates or replaces the entry keyed by `(content_type, content_id)`.
    /// Returns the row id and whether the row is new.
    pub fn save_custom_content(
        &self,
        project_id: i64,
        content: &NewCustomContent,
    ) -> Result<(i64, bool)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let ts = now();
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM custom_content
                 WHERE project_id = ?1 AND content_type = ?2 AND content_id = ?3",
                params![project_id, content.content_type, content.content_id],
                |row| row.get(0),
            )
            .optional()?;
        let data = content.content_data.to_string();

        let (id, created) = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE custom_content SET content_data = ?1, is_active = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![data, content.is_active, ts, id],
                )?;
                (id, false)
            }
            None => {
                tx.execute(
                    "INSERT INTO custom_content (project_id, content_type, content_id,
                         content_data, is_active, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    params![
                        project_id,
                        content.content_type,
                        content.content_id,
                        data,
                        content.is_active,
                        ts
                    ],
                )?;
                (tx.last_insert_rowid(), true)
            }
        };
        tx.commit()?;
        debug!(
            project_id,
            content_type = %content.content_type,
            content_id = %content.content_id,
            created,
            "custom content saved"
        );
        Ok((id, created))
    }

    /// Entries of one project in insertion order, optionally of one type only.
    pub fn list_custom_content(
        &self,
        project_id: i64,
        content_type: Option<&str>,
    ) -> Result<Vec<CustomContent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CUSTOM_COLUMNS} FROM custom_content
             WHERE project_id = ?1 AND (?2 IS NULL OR content_type = ?2) ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![project_id, content_type], |row| {
            Ok((
                CustomContent {
                    id: row.get(0)?,
                    content_type: row.get(1)?,
                    content_id: row.get(2)?,
                    content_data: Value::Null,
                    is_active: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                },
                row.get::<_, String>(3)?,
            ))
        })?;
        rows.map(|row| {
            let (mut content, data) = row?;
            content.content_data = serde_json::from_str(&data)?;
            Ok(content)
        })
        .collect()
    }
}

impl AnalysisRepository for Store {
    type Error = StoreError;

    fn cached_result(&self, project_id: i64, chunk_index: u64) -> Result<Option<Value>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT result FROM analysis_cache WHERE project_id = ?1 AND chunk_index = ?2",
                params![project_id, chunk_index as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    fn store_result(
        &self,
        project_id: i64,
        chunk_index: u64,
        chunk_content: &str,
        result: &Value,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO analysis_cache (project_id, chunk_index, chunk_content, result, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project_id,
                chunk_index as i64,
                chunk_content,
                result.to_string(),
                now()
            ],
        )?;
        Ok(())
    }

    fn cached_results(&self, project_id: i64, below: u64) -> Result<Vec<(u64, Value)>> {
        let conn = self.conn()?;
        let below = i64::try_from(below).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(
            "SELECT chunk_index, result FROM analysis_cache
             WHERE project_id = ?1 AND chunk_index < ?2 ORDER BY chunk_index",
        )?;
        let rows = stmt.query_map(params![project_id, below], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.map(|row| {
            let (idx, raw) = row?;
            Ok((idx.max(0) as u64, serde_json::from_str(&raw)?))
        })
        .collect()
    }

    fn save_project(&self, project_id: i64, state: &ProjectState) -> Result<()> {
        self.save_project_state(project_id, state)
    }
}

/* ------------------------------ row decoding ------------------------------ */

struct RawProject {
    id: i64,
    name: String,
    description: String,
    novel_path: String,
    chapter_mode: bool,
    documents: [String; 6],
    analysis_progress: i64,
    total_chunks: i64,
    analysis_status: String,
    created_at: String,
    updated_at: String,
}

impl RawProject {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            novel_path: row.get(3)?,
            chapter_mode: row.get(4)?,
            documents: [
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
            ],
            analysis_progress: row.get(11)?,
            total_chunks: row.get(12)?,
            analysis_status: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_record(self) -> Result<ProjectRecord> {
        let [world_setting, characters, story_tree, attributes, items, exploration] =
            self.documents;
        let state = ProjectState {
            world_setting: serde_json::from_str(&world_setting)?,
            characters: serde_json::from_str(&characters)?,
            story_tree: serde_json::from_str(&story_tree)?,
            attributes: serde_json::from_str(&attributes)?,
            items: serde_json::from_str(&items)?,
            exploration: serde_json::from_str(&exploration)?,
            analysis_progress: self.analysis_progress.max(0) as u64,
            total_chunks: self.total_chunks.max(0) as u64,
            analysis_status: AnalysisStatus::parse(&self.analysis_status),
        };
        Ok(ProjectRecord {
            id: self.id,
            name: self.name,
            description: self.description,
            novel_path: self.novel_path,
            chapter_mode: self.chapter_mode,
            created_at: self.created_at,
            updated_at: self.updated_at,
            state,
        })
    }
}

struct RawSave {
    id: i64,
    slot: i64,
    save_name: String,
    current_chapter: String,
    current_scene: String,
    current_node: String,
    json: [String; 5],
    play_time: i64,
    updated_at: String,
}

impl RawSave {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            slot: row.get(1)?,
            save_name: row.get(2)?,
            current_chapter: row.get(3)?,
            current_scene: row.get(4)?,
            current_node: row.get(5)?,
            json: [
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
            ],
            play_time: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_save(self) -> Result<GameSave> {
        let [attributes, inventory, flags, relationships, exploration] = self.json;
        Ok(GameSave {
            id: self.id,
            slot: self.slot,
            save_name: self.save_name,
            current_chapter: self.current_chapter,
            current_scene: self.current_scene,
            current_node: self.current_node,
            attributes: serde_json::from_str(&attributes)?,
            inventory: serde_json::from_str(&inventory)?,
            flags: serde_json::from_str(&flags)?,
            relationships: serde_json::from_str(&relationships)?,
            exploration: serde_json::from_str(&exploration)?,
            play_time: self.play_time,
            updated_at: self.updated_at,
        })
    }
}

struct RawLog {
    id: i64,
    project_id: i64,
    session_id: Option<i64>,
    operation_type: String,
    target_path: String,
    old_value: String,
    new_value: String,
    description: String,
    created_at: String,
}

impl RawLog {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            session_id: row.get(2)?,
            operation_type: row.get(3)?,
            target_path: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            description: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_log(self) -> Result<ModificationLog> {
        Ok(ModificationLog {
            id: self.id,
            project_id: self.project_id,
            session_id: self.session_id,
            operation_type: self.operation_type,
            target_path: self.target_path,
            old_value: serde_json::from_str(&self.old_value)?,
            new_value: serde_json::from_str(&self.new_value)?,
            description: self.description,
            created_at: self.created_at,
        })
    }
}
