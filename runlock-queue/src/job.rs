//! Job definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job unique identifier.
pub type JobId = Uuid;

/// A job to be processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,

    /// Queue name
    pub queue: String,

    /// Job type/name, used to pick the handler
    pub job_type: String,

    /// Positional arguments
    pub args: Vec<serde_json::Value>,

    /// How many times the job was put back because its lock was held
    pub requeues: u32,

    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new job without arguments.
    pub fn new(queue: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            queue: queue.into(),
            job_type: job_type.into(),
            args: Vec::new(),
            requeues: 0,
            created_at: Utc::now(),
        }
    }

    /// Append a positional argument.
    pub fn with_arg(mut self, arg: impl Into<serde_json::Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace all arguments.
    pub fn with_args(mut self, args: Vec<serde_json::Value>) -> Self {
        self.args = args;
        self
    }

    /// Argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&serde_json::Value> {
        self.args.get(index)
    }

    /// Argument at `index` rendered for use in a key. Strings are used
    /// without quotes, everything else as compact JSON.
    pub fn arg_string(&self, index: usize) -> Option<String> {
        self.arg(index).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Record one more requeue.
    pub fn requeued(mut self) -> Self {
        self.requeues = self.requeues.saturating_add(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_creation() {
        let job = Job::new("reports", "nightly_report");

        assert_eq!(job.queue, "reports");
        assert_eq!(job.job_type, "nightly_report");
        assert!(job.args.is_empty());
        assert_eq!(job.requeues, 0);
    }

    #[test]
    fn test_job_args() {
        let job = Job::new("billing", "charge")
            .with_arg("account_42")
            .with_arg(1999);

        assert_eq!(job.arg(0), Some(&json!("account_42")));
        assert_eq!(job.arg_string(0), Some("account_42".to_string()));
        assert_eq!(job.arg_string(1), Some("1999".to_string()));
        assert_eq!(job.arg_string(2), None);

        let job = job.with_args(vec![json!({"id": 7})]);
        assert_eq!(job.arg_string(0), Some(r#"{"id":7}"#.to_string()));
    }

    #[test]
    fn test_requeued_counts() {
        let job = Job::new("q", "t").requeued().requeued();
        assert_eq!(job.requeues, 2);
    }

    #[test]
    fn test_job_id_uniqueness() {
        let job1 = Job::new("q", "t");
        let job2 = Job::new("q", "t");

        assert_ne!(job1.id, job2.id);
    }

    #[test]
    fn test_json_shape() {
        let job = Job::new("emails", "send").with_arg("user@example.com");
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["queue"], "emails");
        assert_eq!(json["job_type"], "send");
        assert_eq!(json["args"], json!(["user@example.com"]));

        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }
}
