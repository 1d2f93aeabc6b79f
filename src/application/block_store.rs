use crate::domain::models::{BlockDraft, BlockPatch, StudyBlock};
use crate::domain::palette::{normalize_subject, ColorAssignments};
use crate::infrastructure::diagnostics::DiagnosticSink;
use crate::infrastructure::error::StoreError;
use crate::infrastructure::key_value::KeyValueStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

pub const STORAGE_KEY: &str = "studyTimetable";

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
type IdProvider = Arc<dyn Fn() -> String + Send + Sync>;

// The whole timetable lives under one storage key. Every mutation goes
// load, modify, save, so the color table can be rebuilt from persisted
// blocks on each load and survives process restarts.
pub struct BlockStore<S, D>
where
    S: KeyValueStore,
    D: DiagnosticSink,
{
    storage: Arc<S>,
    diagnostics: Arc<D>,
    colors: Mutex<ColorAssignments>,
    now_provider: NowProvider,
    id_provider: IdProvider,
}

impl<S, D> BlockStore<S, D>
where
    S: KeyValueStore,
    D: DiagnosticSink,
{
    pub fn new(storage: Arc<S>, diagnostics: Arc<D>) -> Self {
        Self {
            storage,
            diagnostics,
            colors: Mutex::new(ColorAssignments::default()),
            now_provider: Arc::new(Utc::now),
            id_provider: Arc::new(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn with_id_provider(mut self, id_provider: IdProvider) -> Self {
        self.id_provider = id_provider;
        self
    }

    // Unreadable or unparsable stored data degrades to an empty timetable
    // with a diagnostic instead of failing the operation.
    pub fn load(&self) -> Result<Vec<StudyBlock>, StoreError> {
        let blocks = match self.storage.get(STORAGE_KEY) {
            Ok(None) => Vec::new(),
            Ok(Some(raw)) => match serde_json::from_str::<Vec<StudyBlock>>(&raw) {
                Ok(blocks) => blocks,
                Err(error) => {
                    self.diagnostics.warn(
                        "block_store.load",
                        &format!("discarding unparsable stored timetable: {error}"),
                    );
                    Vec::new()
                }
            },
            Err(error) => {
                self.diagnostics.warn(
                    "block_store.load",
                    &format!("stored timetable unreadable, starting empty: {error}"),
                );
                Vec::new()
            }
        };

        self.lock_colors()?.rebuild(&blocks);
        Ok(blocks)
    }

    pub fn save(&self, blocks: &[StudyBlock]) -> Result<(), StoreError> {
        let payload = serde_json::to_string(blocks)?;
        self.storage.set(STORAGE_KEY, &payload)
    }

    pub fn create(&self, draft: BlockDraft) -> Result<StudyBlock, StoreError> {
        let now = (self.now_provider)();
        let color = self.lock_colors()?.color_for(&draft.subject);

        Ok(StudyBlock {
            id: (self.id_provider)(),
            subject: draft.subject,
            description: draft.description,
            start: draft.start,
            end: draft.end,
            priority: draft.priority,
            color,
            created_at: now,
            updated_at: now,
        })
    }

    // Applies a patch against the block found in `blocks` without touching
    // the collection itself; the caller decides whether the result is kept.
    // Any id carried by the patch is ignored.
    pub fn update(
        &self,
        blocks: &[StudyBlock],
        block_id: &str,
        patch: BlockPatch,
    ) -> Result<StudyBlock, StoreError> {
        let mut updated = blocks
            .iter()
            .find(|block| block.id == block_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("block not found: {block_id}")))?;

        if let Some(subject) = patch.subject {
            if normalize_subject(&subject) != normalize_subject(&updated.subject) {
                updated.color = self.lock_colors()?.color_for(&subject);
            }
            updated.subject = subject;
        }
        if let Some(description) = patch.description {
            let trimmed = description.trim();
            updated.description = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        if let Some(start) = patch.start {
            updated.start = start;
        }
        if let Some(end) = patch.end {
            updated.end = end;
        }
        if let Some(priority) = patch.priority {
            updated.priority = priority;
        }
        updated.updated_at = (self.now_provider)();

        Ok(updated)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.storage.delete(STORAGE_KEY)?;
        self.lock_colors()?.clear();
        Ok(())
    }

    fn lock_colors(&self) -> Result<MutexGuard<'_, ColorAssignments>, StoreError> {
        self.colors
            .lock()
            .map_err(|error| StoreError::State(format!("color table lock poisoned: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Priority;
    use crate::infrastructure::diagnostics::MemoryDiagnosticSink;
    use crate::infrastructure::key_value::InMemoryKeyValueStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FailingKeyValueStore {
        inner: InMemoryKeyValueStore,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl FailingKeyValueStore {
        fn new() -> Self {
            Self {
                inner: InMemoryKeyValueStore::default(),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }
        }
    }

    impl KeyValueStore for FailingKeyValueStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::State("storage offline".to_string()));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::State("storage offline".to_string()));
            }
            self.inner.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key)
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T08:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn test_store<S: KeyValueStore>(
        storage: Arc<S>,
        diagnostics: Arc<MemoryDiagnosticSink>,
    ) -> BlockStore<S, MemoryDiagnosticSink> {
        let sequence = AtomicUsize::new(0);
        BlockStore::new(storage, diagnostics)
            .with_now_provider(Arc::new(fixed_time))
            .with_id_provider(Arc::new(move || {
                format!("blk-{}", sequence.fetch_add(1, Ordering::SeqCst) + 1)
            }))
    }

    fn sample_draft(subject: &str) -> BlockDraft {
        BlockDraft {
            subject: subject.to_string(),
            description: Some("chapter review".to_string()),
            start: fixed_time(),
            end: fixed_time() + chrono::Duration::minutes(90),
            priority: Priority::Normal,
        }
    }

    #[test]
    fn create_assigns_id_color_and_timestamps() {
        let store = test_store(
            Arc::new(InMemoryKeyValueStore::default()),
            Arc::new(MemoryDiagnosticSink::default()),
        );

        let block = store.create(sample_draft("Math")).expect("create");
        assert_eq!(block.id, "blk-1");
        assert_eq!(block.color, "blue");
        assert_eq!(block.created_at, fixed_time());
        assert_eq!(block.updated_at, fixed_time());
        assert_eq!(block.validate(), Ok(()));
    }

    #[test]
    fn save_and_load_round_trip_preserves_blocks() {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        let store = test_store(Arc::clone(&storage), Arc::new(MemoryDiagnosticSink::default()));

        let block = store.create(sample_draft("Math")).expect("create");
        store.save(std::slice::from_ref(&block)).expect("save");

        let loaded = store.load().expect("load");
        assert_eq!(loaded, vec![block]);
    }

    #[test]
    fn load_of_empty_storage_is_silent() {
        let diagnostics = Arc::new(MemoryDiagnosticSink::default());
        let store = test_store(
            Arc::new(InMemoryKeyValueStore::default()),
            Arc::clone(&diagnostics),
        );

        assert_eq!(store.load().expect("load"), Vec::new());
        assert!(diagnostics.entries().is_empty());
    }

    #[test]
    fn corrupt_payload_degrades_to_empty_with_one_diagnostic() {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        storage.set(STORAGE_KEY, "{not json").expect("seed");
        let diagnostics = Arc::new(MemoryDiagnosticSink::default());
        let store = test_store(Arc::clone(&storage), Arc::clone(&diagnostics));

        assert_eq!(store.load().expect("load"), Vec::new());

        let entries = diagnostics.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "block_store.load");
        assert!(entries[0].1.contains("unparsable"));
    }

    #[test]
    fn unreadable_storage_degrades_to_empty_with_diagnostic() {
        let storage = Arc::new(FailingKeyValueStore::new());
        storage.fail_reads.store(true, Ordering::SeqCst);
        let diagnostics = Arc::new(MemoryDiagnosticSink::default());
        let store = test_store(Arc::clone(&storage), Arc::clone(&diagnostics));

        assert_eq!(store.load().expect("load"), Vec::new());

        let entries = diagnostics.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].1.contains("unreadable"));
    }

    #[test]
    fn failed_save_leaves_previous_collection_intact() {
        let storage = Arc::new(FailingKeyValueStore::new());
        let store = test_store(Arc::clone(&storage), Arc::new(MemoryDiagnosticSink::default()));

        let block = store.create(sample_draft("Math")).expect("create");
        store.save(std::slice::from_ref(&block)).expect("save");

        storage.fail_writes.store(true, Ordering::SeqCst);
        let second = store.create(sample_draft("Physics")).expect("create");
        let result = store.save(&[block.clone(), second]);
        assert!(matches!(result, Err(StoreError::State(_))));

        storage.fail_writes.store(false, Ordering::SeqCst);
        assert_eq!(store.load().expect("load"), vec![block]);
    }

    #[test]
    fn load_rebuilds_colors_so_repeat_subjects_match_across_instances() {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        let first = test_store(Arc::clone(&storage), Arc::new(MemoryDiagnosticSink::default()));

        let math = first.create(sample_draft("Math")).expect("create");
        let physics = first.create(sample_draft("Physics")).expect("create");
        assert_eq!(math.color, "blue");
        assert_eq!(physics.color, "green");
        first.save(&[math, physics]).expect("save");

        // A fresh store over the same storage re-learns assignments on load.
        let second = test_store(Arc::clone(&storage), Arc::new(MemoryDiagnosticSink::default()));
        let _ = second.load().expect("load");
        let more_math = second.create(sample_draft("MATH")).expect("create");
        assert_eq!(more_math.color, "blue");
        let chemistry = second.create(sample_draft("Chemistry")).expect("create");
        assert_eq!(chemistry.color, "purple");
    }

    #[test]
    fn update_applies_partial_patch_and_refreshes_updated_at() {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        let store = test_store(Arc::clone(&storage), Arc::new(MemoryDiagnosticSink::default()));

        let block = store.create(sample_draft("Math")).expect("create");
        let blocks = vec![block.clone()];

        let later = fixed_time() + chrono::Duration::hours(2);
        let patched = store
            .update(
                &blocks,
                &block.id,
                BlockPatch {
                    start: Some(later),
                    end: Some(later + chrono::Duration::minutes(30)),
                    priority: Some(Priority::High),
                    ..BlockPatch::default()
                },
            )
            .expect("update");

        assert_eq!(patched.id, block.id);
        assert_eq!(patched.subject, "Math");
        assert_eq!(patched.start, later);
        assert_eq!(patched.priority, Priority::High);
        assert_eq!(patched.created_at, block.created_at);
        assert_eq!(patched.updated_at, fixed_time());
    }

    #[test]
    fn update_recolors_only_on_real_subject_change() {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        let store = test_store(Arc::clone(&storage), Arc::new(MemoryDiagnosticSink::default()));

        let math = store.create(sample_draft("Math")).expect("create");
        let physics = store.create(sample_draft("Physics")).expect("create");
        let blocks = vec![math.clone(), physics];

        let recased = store
            .update(
                &blocks,
                &math.id,
                BlockPatch {
                    subject: Some("MATH".to_string()),
                    ..BlockPatch::default()
                },
            )
            .expect("update");
        assert_eq!(recased.subject, "MATH");
        assert_eq!(recased.color, "blue");

        let switched = store
            .update(
                &blocks,
                &math.id,
                BlockPatch {
                    subject: Some("Physics".to_string()),
                    ..BlockPatch::default()
                },
            )
            .expect("update");
        assert_eq!(switched.color, "green");
    }

    #[test]
    fn update_clears_description_on_blank_patch_value() {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        let store = test_store(Arc::clone(&storage), Arc::new(MemoryDiagnosticSink::default()));

        let block = store.create(sample_draft("Math")).expect("create");
        let blocks = vec![block.clone()];

        let cleared = store
            .update(
                &blocks,
                &block.id,
                BlockPatch {
                    description: Some("   ".to_string()),
                    ..BlockPatch::default()
                },
            )
            .expect("update");
        assert_eq!(cleared.description, None);
    }

    #[test]
    fn update_ignores_id_carried_by_the_patch() {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        let store = test_store(Arc::clone(&storage), Arc::new(MemoryDiagnosticSink::default()));

        let block = store.create(sample_draft("Math")).expect("create");
        let blocks = vec![block.clone()];

        let patched = store
            .update(
                &blocks,
                &block.id,
                BlockPatch {
                    id: Some("blk-spoofed".to_string()),
                    ..BlockPatch::default()
                },
            )
            .expect("update");
        assert_eq!(patched.id, block.id);
    }

    #[test]
    fn update_of_unknown_id_is_not_found() {
        let store = test_store(
            Arc::new(InMemoryKeyValueStore::default()),
            Arc::new(MemoryDiagnosticSink::default()),
        );

        let result = store.update(&[], "blk-missing", BlockPatch::default());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn clear_drops_stored_blocks_and_color_assignments() {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        let store = test_store(Arc::clone(&storage), Arc::new(MemoryDiagnosticSink::default()));

        let math = store.create(sample_draft("Math")).expect("create");
        store.save(std::slice::from_ref(&math)).expect("save");
        store.clear().expect("clear");

        assert_eq!(store.load().expect("load"), Vec::new());
        assert_eq!(storage.get(STORAGE_KEY).expect("get"), None);
        // With assignments gone, the next subject starts from the first token.
        let physics = store.create(sample_draft("Physics")).expect("create");
        assert_eq!(physics.color, "blue");
    }
}
