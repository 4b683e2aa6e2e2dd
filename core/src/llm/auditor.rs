use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use log::error;
use serde::Serialize;

#[derive(Serialize)]
struct AuditEntry<'a> {
    timestamp: String,
    agent: &'a str,
    task_id: &'a str,
    prompt: &'a str,
    response: &'a str,
}

/// Mirrors every LLM exchange to a dated JSONL file so prompt behavior can
/// be replayed after a scan. Controlled by `LOG_PROMPT_INTERACTION`; write
/// failures are logged and otherwise ignored.
pub struct PromptAuditor {
    dir: PathBuf,
    enabled: bool,
}

impl PromptAuditor {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self { dir: dir.into(), enabled }
    }

    pub fn disabled() -> Self {
        Self { dir: PathBuf::new(), enabled: false }
    }

    pub fn record(&self, agent: &str, task_id: &str, prompt: &str, response: &str) {
        if !self.enabled {
            return;
        }
        let entry = AuditEntry {
            timestamp: Local::now().to_rfc3339(),
            agent,
            task_id,
            prompt,
            response,
        };
        if let Err(e) = self.append(&entry) {
            error!("Failed to write LLM audit entry: {}", e);
        }
    }

    fn append(&self, entry: &AuditEntry<'_>) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let file_name = format!("{}.jsonl", Local::now().format("%Y-%m-%d"));
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file_name))?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        Ok(())
    }
}
