//! Read-only projections of scheduler-reported jobs.

use serde::{Deserialize, Serialize};

/// Job summary entry as returned by `GET /v1/jobs?prefix=...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobInfo {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(rename = "Type", default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub job_summary: Option<JobSummary>,
}

impl JobInfo {
    /// Returns true if the scheduler reports the job as running.
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }

    /// Namespace reported in the job summary, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.job_summary
            .as_ref()
            .and_then(|summary| summary.namespace.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(rename = "Namespace", default)]
    pub namespace: Option<String>,
}

/// Full job detail as returned by `GET /v1/job/{id}`.
///
/// Only the fields needed for orphan reconciliation are decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobDetail {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Submission time in nanoseconds since the Unix epoch.
    #[serde(default)]
    pub submit_time: i64,
}

/// Scheduler placement of a submitted job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placement {
    pub namespace: Option<String>,
    pub region: Option<String>,
}

impl Placement {
    /// Extract namespace and region from a submitted job document.
    ///
    /// Accepts both the wrapped (`{"Job": {...}}`) and the bare job form.
    /// Documents that are not JSON yield an empty placement.
    pub fn from_document(document: &str) -> Self {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(document) else {
            return Self::default();
        };

        let job = value.get("Job").unwrap_or(&value);
        let field = |name: &str| {
            job.get(name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            namespace: field("Namespace"),
            region: field("Region"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_info_deserialization() {
        let json = r#"[
            {
                "ID": "jenkins-18c2f",
                "Name": "jenkins-18c2f",
                "Type": "batch",
                "Status": "running",
                "Priority": 50,
                "JobSummary": {"JobID": "jenkins-18c2f", "Namespace": "default"}
            },
            {"ID": "jenkins-18c30", "Name": "jenkins-18c30", "Status": "dead"}
        ]"#;

        let jobs: Vec<JobInfo> = serde_json::from_str(json).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].is_running());
        assert_eq!(jobs[0].namespace(), Some("default"));
        assert!(!jobs[1].is_running());
        assert_eq!(jobs[1].namespace(), None);
    }

    #[test]
    fn test_status_is_case_insensitive() {
        let job = JobInfo {
            id: "a".to_string(),
            name: "a".to_string(),
            job_type: None,
            status: "Running".to_string(),
            priority: None,
            job_summary: None,
        };
        assert!(job.is_running());
    }

    #[test]
    fn test_placement_from_wrapped_document() {
        let doc = r#"{"Job": {"ID": "w1", "Namespace": "ci", "Region": "eu"}}"#;
        let placement = Placement::from_document(doc);
        assert_eq!(placement.namespace.as_deref(), Some("ci"));
        assert_eq!(placement.region.as_deref(), Some("eu"));
    }

    #[test]
    fn test_placement_from_bare_document_and_garbage() {
        let placement = Placement::from_document(r#"{"ID": "w1", "Region": "global"}"#);
        assert_eq!(placement.namespace, None);
        assert_eq!(placement.region.as_deref(), Some("global"));

        assert_eq!(Placement::from_document("job \"w1\" {}"), Placement::default());
    }

    #[test]
    fn test_job_detail_submit_time() {
        let json = r#"{"ID": "w1", "Region": "global", "Namespace": "default", "SubmitTime": 1700000000000000000}"#;
        let detail: JobDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.submit_time, 1_700_000_000_000_000_000);
        assert_eq!(detail.region.as_deref(), Some("global"));
    }
}
