use crate::domain::models::StudyBlock;
use std::collections::{HashMap, HashSet};

pub const PALETTE: [&str; 12] = [
    "blue", "green", "purple", "orange", "teal", "pink", "red", "indigo", "amber", "cyan", "lime",
    "slate",
];

// Grouping key only; display strings keep the user's casing.
pub fn normalize_subject(subject: &str) -> String {
    subject.trim().to_lowercase()
}

#[derive(Debug, Default)]
pub struct ColorAssignments {
    by_subject: HashMap<String, String>,
}

impl ColorAssignments {
    pub fn color_for(&mut self, subject: &str) -> String {
        let key = normalize_subject(subject);
        if let Some(existing) = self.by_subject.get(&key) {
            return existing.clone();
        }

        let in_use = self
            .by_subject
            .values()
            .map(String::as_str)
            .collect::<HashSet<_>>();
        // Once every token is taken, further subjects share the first one.
        let token = PALETTE
            .iter()
            .find(|candidate| !in_use.contains(**candidate))
            .copied()
            .unwrap_or(PALETTE[0]);

        self.by_subject.insert(key, token.to_string());
        token.to_string()
    }

    // First occurrence wins, so a reload reproduces previously saved colors
    // instead of re-running slot selection.
    pub fn rebuild(&mut self, blocks: &[StudyBlock]) {
        self.by_subject.clear();
        for block in blocks {
            self.by_subject
                .entry(normalize_subject(&block.subject))
                .or_insert_with(|| block.color.clone());
        }
    }

    pub fn clear(&mut self) {
        self.by_subject.clear();
    }

    pub fn assigned(&self, subject: &str) -> Option<&str> {
        self.by_subject
            .get(&normalize_subject(subject))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_subject.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_subject.is_empty()
    }
}
