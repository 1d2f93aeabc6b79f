mod application;
mod domain;
mod infrastructure;

pub use application::block_store::{BlockStore, STORAGE_KEY};
pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::commands::{
    clear_blocks_impl, create_block_impl, delete_block_impl, list_blocks_impl, ping,
    subject_stats_impl, update_block_impl, validate_block_impl, AppState, SaveBlockResponse,
    SubjectStatsResponse, ValidateBlockResponse,
};
pub use domain::conflict::{check_conflict, format_clock_time, ConflictError, ConflictKind};
pub use domain::models::{BlockDraft, BlockPatch, Priority, StudyBlock};
pub use domain::palette::{normalize_subject, ColorAssignments, PALETTE};
pub use domain::statistics::subject_hours;
pub use infrastructure::config::{
    ensure_default_configs, load_app_config, read_display_timezone, read_timezone,
};
pub use infrastructure::diagnostics::{DiagnosticSink, FileDiagnosticSink, MemoryDiagnosticSink};
pub use infrastructure::error::StoreError;
pub use infrastructure::key_value::{InMemoryKeyValueStore, KeyValueStore, SqliteKeyValueStore};
pub use infrastructure::storage::initialize_database;
