//! Periodic jobs that pull usages and services from upstream systems into the store.

pub mod api;
pub mod openstack;
pub mod scheduler;
pub mod service;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::AppResult;

pub use openstack::{OpenStackApi, OpenStackHttpClient, OpenStackSync};
pub use service::{CmdbApi, CmdbHttpClient, ServiceSync};

/// Arguments of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncContext {
    pub today: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub message: String,
}

impl SyncOutcome {
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Completed,
            message: message.into(),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Skipped,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Failed,
            message: message.into(),
        }
    }
}

/// Outcome of one job within a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// key: sync-job -> one upstream import
///
/// Jobs that are not configured return [`SyncOutcome::skipped`] instead of an error.
#[async_trait]
pub trait SyncJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Jobs that must have run before this one.
    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    async fn run(&self, ctx: &SyncContext) -> AppResult<SyncOutcome>;
}

/// key: sync-pipeline -> dependency-ordered job runner
#[derive(Clone, Default)]
pub struct SyncPipeline {
    jobs: Vec<Arc<dyn SyncJob>>,
}

impl SyncPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(mut self, job: Arc<dyn SyncJob>) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|job| job.name()).collect()
    }

    /// Registration order, moved so that every job follows its requirements. Requirements
    /// naming no registered job are ignored. Jobs caught in a cycle come back in `stuck`.
    fn schedule(&self) -> (Vec<Arc<dyn SyncJob>>, Vec<Arc<dyn SyncJob>>) {
        let known: Vec<&str> = self.job_names();
        let mut pending: Vec<Arc<dyn SyncJob>> = self.jobs.clone();
        let mut ordered: Vec<Arc<dyn SyncJob>> = Vec::with_capacity(pending.len());

        loop {
            let ready = pending.iter().position(|job| {
                job.requires().iter().all(|requirement| {
                    !known.contains(requirement)
                        || ordered.iter().any(|done| done.name() == *requirement)
                })
            });
            match ready {
                Some(index) => ordered.push(pending.remove(index)),
                None => break,
            }
        }
        (ordered, pending)
    }

    /// Runs every job once. Errors become failed outcomes; jobs requiring a failed job are
    /// skipped.
    pub async fn run(&self, ctx: &SyncContext) -> Vec<JobReport> {
        let (ordered, stuck) = self.schedule();
        let mut statuses: HashMap<&'static str, SyncStatus> = HashMap::new();
        let mut reports = Vec::with_capacity(self.jobs.len());

        for job in ordered {
            let name = job.name();
            for requirement in job.requires() {
                if !self.job_names().contains(requirement) {
                    debug!(job = name, requirement, "requirement is not registered, ignoring");
                }
            }
            let failed_requirement = job
                .requires()
                .iter()
                .find(|requirement| statuses.get(*requirement) == Some(&SyncStatus::Failed));

            let outcome = match failed_requirement {
                Some(requirement) => {
                    SyncOutcome::skipped(format!("requirement `{requirement}` failed."))
                }
                None => match job.run(ctx).await {
                    Ok(outcome) => outcome,
                    Err(err) => SyncOutcome::failed(err.to_string()),
                },
            };

            match outcome.status {
                SyncStatus::Failed => {
                    warn!(job = name, message = %outcome.message, "sync job failed")
                }
                _ => info!(
                    job = name,
                    status = ?outcome.status,
                    message = %outcome.message,
                    "sync job finished"
                ),
            }
            statuses.insert(name, outcome.status);
            reports.push(JobReport {
                job: name.to_string(),
                outcome,
            });
        }

        for job in stuck {
            warn!(job = job.name(), "sync job is part of a requirement cycle");
            reports.push(JobReport {
                job: job.name().to_string(),
                outcome: SyncOutcome::failed("requirement cycle."),
            });
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::AppError;
    use std::sync::Mutex;

    struct FakeJob {
        name: &'static str,
        requires: &'static [&'static str],
        result: fn() -> AppResult<SyncOutcome>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl SyncJob for FakeJob {
        fn name(&self) -> &'static str {
            self.name
        }

        fn requires(&self) -> &'static [&'static str] {
            self.requires
        }

        async fn run(&self, _ctx: &SyncContext) -> AppResult<SyncOutcome> {
            self.log.lock().unwrap().push(self.name);
            (self.result)()
        }
    }

    fn ok() -> AppResult<SyncOutcome> {
        Ok(SyncOutcome::completed("done"))
    }

    fn missing_venture() -> AppResult<SyncOutcome> {
        Err(AppError::not_found("venture", "abc"))
    }

    fn ctx() -> SyncContext {
        SyncContext {
            today: NaiveDate::from_ymd_opt(2013, 4, 25).unwrap(),
        }
    }

    fn job(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        requires: &'static [&'static str],
        result: fn() -> AppResult<SyncOutcome>,
    ) -> Arc<dyn SyncJob> {
        Arc::new(FakeJob {
            name,
            requires,
            result,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn jobs_run_after_their_requirements() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = SyncPipeline::new()
            .with_job(job(&log, "service", &["owner", "business_line"], ok))
            .with_job(job(&log, "owner", &[], ok))
            .with_job(job(&log, "business_line", &["unregistered"], ok));

        let reports = pipeline.run(&ctx()).await;

        assert_eq!(*log.lock().unwrap(), vec!["owner", "business_line", "service"]);
        assert!(reports
            .iter()
            .all(|report| report.outcome.status == SyncStatus::Completed));
    }

    #[tokio::test]
    async fn dependents_of_failed_jobs_are_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = SyncPipeline::new()
            .with_job(job(&log, "ventures", &[], missing_venture))
            .with_job(job(&log, "openstack", &["ventures"], ok));

        let reports = pipeline.run(&ctx()).await;

        assert_eq!(*log.lock().unwrap(), vec!["ventures"]);
        assert_eq!(reports[0].outcome.status, SyncStatus::Failed);
        assert_eq!(reports[0].outcome.message, "venture `abc` does not exist");
        assert_eq!(
            reports[1].outcome,
            SyncOutcome::skipped("requirement `ventures` failed.")
        );
    }

    #[tokio::test]
    async fn sync_jobs_wait_for_their_declared_requirements() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(MemoryStore::new());
        let pipeline = SyncPipeline::new()
            .with_job(Arc::new(OpenStackSync::not_configured(store.clone())))
            .with_job(job(&log, "ventures", &[], missing_venture))
            .with_job(Arc::new(ServiceSync::new(store, None)))
            .with_job(job(&log, "owner", &[], ok));

        let reports = pipeline.run(&ctx()).await;

        let order: Vec<&str> = reports.iter().map(|report| report.job.as_str()).collect();
        assert_eq!(order, vec!["ventures", "openstack", "owner", "service"]);
        assert_eq!(
            reports[1].outcome,
            SyncOutcome::skipped("requirement `ventures` failed.")
        );
        assert_eq!(reports[3].outcome, SyncOutcome::skipped("not configured."));
    }

    #[tokio::test]
    async fn cyclic_requirements_fail_without_running() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = SyncPipeline::new()
            .with_job(job(&log, "a", &["b"], ok))
            .with_job(job(&log, "b", &["a"], ok));

        let reports = pipeline.run(&ctx()).await;

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(reports.len(), 2);
        assert!(reports
            .iter()
            .all(|report| report.outcome == SyncOutcome::failed("requirement cycle.")));
    }
}
