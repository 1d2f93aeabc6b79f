use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait DiagnosticSink: Send + Sync {
    fn warn(&self, context: &str, message: &str);
}

#[derive(Debug)]
pub struct FileDiagnosticSink {
    log_path: PathBuf,
    guard: Mutex<()>,
}

impl FileDiagnosticSink {
    pub fn new(logs_dir: impl AsRef<Path>) -> Self {
        Self {
            log_path: logs_dir.as_ref().join("studyblocks.log"),
            guard: Mutex::new(()),
        }
    }
}

impl DiagnosticSink for FileDiagnosticSink {
    fn warn(&self, context: &str, message: &str) {
        let Ok(_guard) = self.guard.lock() else {
            return;
        };
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": "warn",
            "context": context,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
        {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDiagnosticSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryDiagnosticSink {
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticSink for MemoryDiagnosticSink {
    fn warn(&self, context: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((context.to_string(), message.to_string()));
        }
    }
}
