use crate::organization::Organization;
use crate::task::Task;
use cadre_core::{CadreError, CadreResult};
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// A task submitted to a unit on a cron schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Job name, used in logs.
    pub name: String,
    /// 7-field cron expression: sec min hour day-of-month month day-of-week year.
    pub cron: String,
    /// Target unit; the root when absent.
    #[serde(default)]
    pub unit: Option<String>,
    /// Task text submitted on every firing.
    pub task: String,
    /// Disabled jobs are kept but never fire.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Cron-based scheduler that submits [`ScheduledJob`]s to an [`Organization`].
///
/// Each job keeps one session for all of its runs, so a daily job sees what
/// its previous runs recorded.
#[derive(Debug)]
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
}

impl Scheduler {
    /// Create a new scheduler with the given jobs.
    pub fn new(jobs: Vec<ScheduledJob>) -> Self {
        Self { jobs }
    }

    /// Parse a cron expression string into a [`cron::Schedule`].
    pub fn parse_cron(cron_expr: &str) -> CadreResult<Schedule> {
        Schedule::from_str(cron_expr).map_err(|e| {
            CadreError::Config(format!("Invalid cron expression '{cron_expr}': {e}"))
        })
    }

    /// The first fire time of `cron_expr` strictly after `after`.
    pub fn next_fire_after(cron_expr: &str, after: DateTime<Utc>) -> CadreResult<DateTime<Utc>> {
        let schedule = Self::parse_cron(cron_expr)?;
        schedule.after(&after).next().ok_or_else(|| {
            CadreError::Config(format!(
                "Cron expression '{cron_expr}' has no upcoming fire times"
            ))
        })
    }

    /// Check every job's cron expression and non-empty task.
    pub fn validate(&self) -> CadreResult<()> {
        for job in &self.jobs {
            Self::parse_cron(&job.cron)?;
            if job.task.trim().is_empty() {
                return Err(CadreError::Config(format!(
                    "Scheduled job '{}' has an empty task",
                    job.name
                )));
            }
        }
        Ok(())
    }

    /// Return references to only the enabled jobs.
    pub fn enabled_jobs(&self) -> Vec<&ScheduledJob> {
        self.jobs.iter().filter(|j| j.enabled).collect()
    }

    /// Return the total number of jobs (enabled and disabled).
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Enabled jobs firing in `(after, until]`.
    pub fn due_jobs(&self, after: DateTime<Utc>, until: DateTime<Utc>) -> Vec<&ScheduledJob> {
        self.enabled_jobs()
            .into_iter()
            .filter(|job| {
                Self::next_fire_after(&job.cron, after).is_ok_and(|next| next <= until)
            })
            .collect()
    }

    /// Start the scheduler background loop.
    ///
    /// Sleeps until the nearest fire time, then submits every due job to
    /// `org` as its own tokio task so a slow run never delays the others.
    /// Returns the [`tokio::task::JoinHandle`] so the caller can abort it.
    pub fn start(self, org: Arc<Organization>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let sessions: HashMap<String, Uuid> = self
                .jobs
                .iter()
                .map(|job| (job.name.clone(), Uuid::new_v4()))
                .collect();
            let mut after = Utc::now();
            loop {
                let nearest = self
                    .enabled_jobs()
                    .into_iter()
                    .filter_map(|job| match Self::next_fire_after(&job.cron, after) {
                        Ok(next) => Some(next),
                        Err(e) => {
                            tracing::warn!(job = %job.name, error = %e, "Skipping job");
                            None
                        }
                    })
                    .min();

                let Some(nearest) = nearest else {
                    tracing::info!("Scheduler: no runnable jobs, stopping");
                    return;
                };

                let now = Utc::now();
                if nearest > now {
                    let wait = (nearest - now).to_std().unwrap_or_default();
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "Scheduler sleeping");
                    tokio::time::sleep(wait).await;
                }

                for job in self.due_jobs(after, nearest) {
                    let session = sessions
                        .get(&job.name)
                        .copied()
                        .unwrap_or_else(Uuid::new_v4);
                    fire(job, session, org.clone());
                }
                after = nearest;
            }
        })
    }
}

/// Submit one run of `job` in the background.
fn fire(job: &ScheduledJob, session_id: Uuid, org: Arc<Organization>) {
    let job = job.clone();
    tracing::info!(
        job = %job.name,
        unit = job.unit.as_deref().unwrap_or("root"),
        "Firing scheduled job"
    );
    tokio::spawn(async move {
        let task = Task::new(job.task.clone(), session_id)
            .with_channel("schedule")
            .with_extra("job", serde_json::json!(job.name));
        match org.run(job.unit.as_deref(), task).await {
            Ok(result) => tracing::info!(
                job = %job.name,
                status = %result.status(),
                duration_ms = result.duration_ms(),
                "Scheduled job finished"
            ),
            Err(e) => {
                tracing::error!(job = %job.name, error = %e, "Scheduled job could not run");
            }
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(name: &str, cron: &str, enabled: bool) -> ScheduledJob {
        ScheduledJob {
            name: name.into(),
            cron: cron.into(),
            unit: None,
            task: "Run the replenishment cycle".into(),
            enabled,
        }
    }

    #[test]
    fn test_parse_valid_cron() {
        assert!(Scheduler::parse_cron("0 0 6 * * * *").is_ok());
    }

    #[test]
    fn test_parse_invalid_cron() {
        assert!(Scheduler::parse_cron("not a cron expression").is_err());
    }

    #[test]
    fn test_next_fire_after_is_strictly_later() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        let next = Scheduler::next_fire_after("0 0 6 * * * *", at).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_enabled_jobs_filter() {
        let scheduler = Scheduler::new(vec![
            job("active", "0 * * * * * *", true),
            job("inactive", "0 * * * * * *", false),
        ]);
        assert_eq!(scheduler.job_count(), 2);
        assert_eq!(scheduler.enabled_jobs().len(), 1);
        assert_eq!(scheduler.enabled_jobs()[0].name, "active");
    }

    #[test]
    fn test_due_jobs_window() {
        let scheduler = Scheduler::new(vec![
            job("daily", "0 0 6 * * * *", true),
            job("hourly", "0 0 * * * * *", true),
        ]);
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 4, 30, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2026, 3, 1, 5, 0, 0).unwrap();
        let due: Vec<&str> = scheduler
            .due_jobs(after, until)
            .iter()
            .map(|j| j.name.as_str())
            .collect();
        assert_eq!(due, vec!["hourly"]);
    }

    #[test]
    fn test_validate_rejects_empty_task() {
        let mut bad = job("empty", "0 * * * * * *", true);
        bad.task = "  ".into();
        assert!(Scheduler::new(vec![bad]).validate().is_err());
        assert!(Scheduler::new(vec![job("ok", "0 * * * * * *", true)])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_job_defaults() {
        let job: ScheduledJob = serde_json::from_value(serde_json::json!({
            "name": "cost-sentinel",
            "cron": "0 0 7 * * * *",
            "task": "Check yesterday's cloud spend"
        }))
        .unwrap();
        assert!(job.enabled);
        assert!(job.unit.is_none());
    }
}
