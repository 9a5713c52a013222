use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use super::BookSummary;

/// Opaque handle for a queued recommendation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable state of a recommendation job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Done { result: Vec<BookSummary> },
    Failed { error: String },
    NotFound,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done { .. } | JobStatus::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(JobStatus::Processing).unwrap(),
            json!({ "status": "processing" })
        );
        assert_eq!(
            serde_json::to_value(JobStatus::Failed { error: "boom".into() }).unwrap(),
            json!({ "status": "failed", "error": "boom" })
        );
        assert_eq!(
            serde_json::to_value(JobStatus::Done { result: vec![] }).unwrap(),
            json!({ "status": "done", "result": [] })
        );
        assert_eq!(
            serde_json::to_value(JobStatus::NotFound).unwrap(),
            json!({ "status": "not_found" })
        );
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()), Some(id));
        assert_eq!(JobId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::NotFound.is_terminal());
        assert!(JobStatus::Failed { error: String::new() }.is_terminal());
    }
}
