use crate::application::block_store::BlockStore;
use crate::application::bootstrap::bootstrap_workspace;
use crate::domain::conflict::{check_conflict, ConflictError};
use crate::domain::models::{BlockDraft, BlockPatch, Priority, StudyBlock};
use crate::domain::statistics::subject_hours;
use crate::infrastructure::config::read_display_timezone;
use crate::infrastructure::diagnostics::FileDiagnosticSink;
use crate::infrastructure::error::StoreError;
use crate::infrastructure::key_value::SqliteKeyValueStore;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    store: BlockStore<SqliteKeyValueStore, FileDiagnosticSink>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, StoreError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        let storage = Arc::new(SqliteKeyValueStore::new(&bootstrap.database_path));
        let diagnostics = Arc::new(FileDiagnosticSink::new(&logs_dir));
        let store = BlockStore::new(storage, diagnostics);

        Ok(Self {
            config_dir,
            database_path: bootstrap.database_path,
            logs_dir,
            store,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn command_error(&self, command: &str, error: &StoreError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveBlockResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<StudyBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateBlockResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectStatsResponse {
    pub window_start: String,
    pub window_end: String,
    pub totals: HashMap<String, f64>,
}

pub fn ping() -> &'static str {
    "pong"
}

pub fn create_block_impl(
    state: &AppState,
    subject: String,
    description: Option<String>,
    start: String,
    end: String,
    priority: Option<String>,
) -> Result<SaveBlockResponse, StoreError> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(StoreError::InvalidInput(
            "subject must not be empty".to_string(),
        ));
    }
    let start = parse_rfc3339_input(&start, "start")?;
    let end = parse_rfc3339_input(&end, "end")?;
    let priority = match priority {
        Some(raw) => parse_priority(&raw)?,
        None => Priority::Normal,
    };
    let description = description
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let mut blocks = state.store.load()?;
    let candidate = state.store.create(BlockDraft {
        subject: subject.to_string(),
        description,
        start,
        end,
        priority,
    })?;

    let display_tz = read_display_timezone(state.config_dir());
    if let Some(conflict) = check_conflict(&candidate, &blocks, None, display_tz) {
        state.log_info(
            "create_block",
            &format!("rejected block for {}: {}", candidate.subject, conflict.message),
        );
        return Ok(SaveBlockResponse {
            status: "conflict".to_string(),
            block: None,
            conflict: Some(conflict),
        });
    }

    blocks.push(candidate.clone());
    state.store.save(&blocks)?;
    state.log_info(
        "create_block",
        &format!("saved block {} for {}", candidate.id, candidate.subject),
    );
    Ok(SaveBlockResponse {
        status: "saved".to_string(),
        block: Some(candidate),
        conflict: None,
    })
}

pub fn update_block_impl(
    state: &AppState,
    block_id: String,
    subject: Option<String>,
    description: Option<String>,
    start: Option<String>,
    end: Option<String>,
    priority: Option<String>,
) -> Result<SaveBlockResponse, StoreError> {
    let block_id = block_id.trim();
    if block_id.is_empty() {
        return Err(StoreError::InvalidInput(
            "block_id must not be empty".to_string(),
        ));
    }

    let subject = match subject {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(StoreError::InvalidInput(
                    "subject must not be empty".to_string(),
                ));
            }
            Some(trimmed.to_string())
        }
        None => None,
    };
    let start = match start {
        Some(raw) => Some(parse_rfc3339_input(&raw, "start")?),
        None => None,
    };
    let end = match end {
        Some(raw) => Some(parse_rfc3339_input(&raw, "end")?),
        None => None,
    };
    let priority = match priority {
        Some(raw) => Some(parse_priority(&raw)?),
        None => None,
    };

    let mut blocks = state.store.load()?;
    // `description` goes through untrimmed so a blank value clears the field.
    let updated = state.store.update(
        &blocks,
        block_id,
        BlockPatch {
            id: None,
            subject,
            description,
            start,
            end,
            priority,
        },
    )?;

    let display_tz = read_display_timezone(state.config_dir());
    if let Some(conflict) = check_conflict(&updated, &blocks, Some(block_id), display_tz) {
        state.log_info(
            "update_block",
            &format!("rejected move of block {block_id}: {}", conflict.message),
        );
        return Ok(SaveBlockResponse {
            status: "conflict".to_string(),
            block: None,
            conflict: Some(conflict),
        });
    }

    if let Some(slot) = blocks.iter_mut().find(|block| block.id == block_id) {
        *slot = updated.clone();
    }
    state.store.save(&blocks)?;
    state.log_info("update_block", &format!("updated block {block_id}"));
    Ok(SaveBlockResponse {
        status: "saved".to_string(),
        block: Some(updated),
        conflict: None,
    })
}

pub fn delete_block_impl(state: &AppState, block_id: String) -> Result<bool, StoreError> {
    let block_id = block_id.trim();
    if block_id.is_empty() {
        return Err(StoreError::InvalidInput(
            "block_id must not be empty".to_string(),
        ));
    }

    let mut blocks = state.store.load()?;
    let before = blocks.len();
    blocks.retain(|block| block.id != block_id);
    if blocks.len() == before {
        return Ok(false);
    }

    state.store.save(&blocks)?;
    state.log_info("delete_block", &format!("deleted block {block_id}"));
    Ok(true)
}

// Returns blocks in stored order; no sorting is applied.
pub fn list_blocks_impl(
    state: &AppState,
    window_start: Option<String>,
    window_end: Option<String>,
) -> Result<Vec<StudyBlock>, StoreError> {
    let window_start = match window_start
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(raw) => Some(parse_datetime_input(raw, "window_start")?),
        None => None,
    };
    let window_end = match window_end
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        Some(raw) => Some(parse_datetime_input(raw, "window_end")?),
        None => None,
    };

    let blocks = state.store.load()?;
    Ok(blocks
        .into_iter()
        .filter(|block| window_start.map_or(true, |window| block.start >= window))
        .filter(|block| window_end.map_or(true, |window| block.start <= window))
        .collect())
}

pub fn validate_block_impl(
    state: &AppState,
    start: String,
    end: String,
    exclude_id: Option<String>,
) -> Result<ValidateBlockResponse, StoreError> {
    let start = parse_rfc3339_input(&start, "start")?;
    let end = parse_rfc3339_input(&end, "end")?;
    let exclude_id = exclude_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let blocks = state.store.load()?;
    // Subject and color play no part in conflict detection.
    let now = Utc::now();
    let candidate = StudyBlock {
        id: exclude_id.clone().unwrap_or_default(),
        subject: String::new(),
        description: None,
        start,
        end,
        priority: Priority::Normal,
        color: String::new(),
        created_at: now,
        updated_at: now,
    };

    let display_tz = read_display_timezone(state.config_dir());
    let conflict = check_conflict(&candidate, &blocks, exclude_id.as_deref(), display_tz);
    Ok(ValidateBlockResponse {
        valid: conflict.is_none(),
        conflict,
    })
}

pub fn subject_stats_impl(
    state: &AppState,
    start: Option<String>,
    end: Option<String>,
) -> Result<SubjectStatsResponse, StoreError> {
    let default_start = Utc::now() - Duration::days(7);
    let start = match start {
        Some(raw) => parse_datetime_input(&raw, "start")?,
        None => default_start,
    };
    let end = match end {
        Some(raw) => parse_datetime_input(&raw, "end")?,
        None => Utc::now(),
    };

    let blocks = state.store.load()?;
    let totals = subject_hours(&blocks, start, end);
    Ok(SubjectStatsResponse {
        window_start: start.to_rfc3339(),
        window_end: end.to_rfc3339(),
        totals,
    })
}

pub fn clear_blocks_impl(state: &AppState) -> Result<(), StoreError> {
    state.store.clear()?;
    state.log_info("clear_blocks", "cleared stored timetable");
    Ok(())
}

fn parse_priority(value: &str) -> Result<Priority, StoreError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "normal" => Ok(Priority::Normal),
        "high" => Ok(Priority::High),
        other => Err(StoreError::InvalidInput(format!(
            "unsupported priority: {}",
            other
        ))),
    }
}

fn parse_rfc3339_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            StoreError::InvalidInput(format!("{field_name} must be RFC3339 date-time: {error}"))
        })
}

fn parse_datetime_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(
            &date.and_hms_opt(0, 0, 0).expect("valid midnight"),
        ));
    }
    Err(StoreError::InvalidInput(format!(
        "{field_name} must be RFC3339 or YYYY-MM-DD"
    )))
}
