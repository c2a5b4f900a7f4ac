//! Shared per-shot job table and progress accounting

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::model::{JobStatus, SeekStrategy, ShotJob, StrategyAttempt};
use crate::error::{PerShotError, PerShotResult};
use crate::utils::Utils;

/// Progress snapshot across all shots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub encoded: usize,
    pub failed: usize,
}

/// Thread-safe table of shot jobs keyed by shot index.
/// Workers only touch their own entry; the orchestrator reads the whole table.
#[derive(Clone)]
pub struct JobTable {
    jobs: Arc<RwLock<BTreeMap<usize, ShotJob>>>,
    started: Instant,
}

impl JobTable {
    pub fn new(jobs: Vec<ShotJob>) -> Self {
        let jobs = jobs.into_iter().map(|job| (job.index(), job)).collect();
        Self {
            jobs: Arc::new(RwLock::new(jobs)),
            started: Instant::now(),
        }
    }

    pub async fn get(&self, index: usize) -> Option<ShotJob> {
        self.jobs.read().await.get(&index).cloned()
    }

    /// All jobs in index order
    pub async fn snapshot(&self) -> Vec<ShotJob> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Apply a lifecycle transition to one job
    pub async fn transition(&self, index: usize, next: JobStatus) -> PerShotResult<()> {
        self.update(index, |job| job.transition(next)).await?;
        debug!("Shot {} -> {:?}", index, next);
        Ok(())
    }

    /// Record the outcome of seek strategy attempts
    pub async fn record_extraction(
        &self,
        index: usize,
        strategy: Option<SeekStrategy>,
        attempts: Vec<StrategyAttempt>,
    ) -> PerShotResult<()> {
        self.update(index, |job| {
            job.extraction_strategy_used = strategy;
            job.attempts.extend(attempts);
            Ok(())
        })
        .await
    }

    /// Mark a job encoded with its artifact
    pub async fn complete(
        &self,
        index: usize,
        artifact: PathBuf,
        frame_count: u64,
        recovered: bool,
    ) -> PerShotResult<()> {
        self.update(index, |job| {
            job.transition(JobStatus::Encoded)?;
            job.output_artifact = Some(artifact);
            job.frame_count = Some(frame_count);
            job.recovered = recovered;
            Ok(())
        })
        .await?;
        self.log_progress().await;
        Ok(())
    }

    /// Mark a job failed, keeping the first failure cause
    pub async fn fail(&self, index: usize, cause: String) -> PerShotResult<()> {
        self.update(index, |job| {
            if job.status != JobStatus::Failed {
                job.transition(JobStatus::Failed)?;
            }
            job.output_artifact = None;
            job.frame_count = None;
            if job.failure.is_none() {
                job.failure = Some(cause);
            }
            Ok(())
        })
        .await
    }

    /// Put a failed job back to pending for another try
    pub async fn requeue(&self, index: usize) -> PerShotResult<()> {
        self.update(index, |job| {
            job.transition(JobStatus::Pending)?;
            job.extraction_strategy_used = None;
            Ok(())
        })
        .await
    }

    /// Count one whole-pipeline try of a job, returning the new count
    pub async fn begin_try(&self, index: usize) -> PerShotResult<u32> {
        let mut tries = 0;
        self.update(index, |job| {
            job.tries += 1;
            tries = job.tries;
            Ok(())
        })
        .await?;
        Ok(tries)
    }

    pub async fn counts(&self) -> ProgressCounts {
        let jobs = self.jobs.read().await;
        let mut counts = ProgressCounts {
            total: jobs.len(),
            ..ProgressCounts::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Encoded => counts.encoded += 1,
                JobStatus::Failed => counts.failed += 1,
                _ => counts.running += 1,
            }
        }
        counts
    }

    /// Indices of jobs not yet encoded
    pub async fn missing(&self) -> Vec<usize> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| job.status != JobStatus::Encoded)
            .map(ShotJob::index)
            .collect()
    }

    async fn log_progress(&self) {
        let counts = self.counts().await;
        info!(
            "Shots encoded: {}/{} ({:.0}%), elapsed {}",
            counts.encoded,
            counts.total,
            Utils::calculate_progress(counts.encoded, counts.total),
            Utils::format_duration(self.started.elapsed())
        );
    }

    async fn update<F>(&self, index: usize, apply: F) -> PerShotResult<()>
    where
        F: FnOnce(&mut ShotJob) -> PerShotResult<()>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&index).ok_or_else(|| PerShotError::InvalidPlan {
            message: format!("no job for shot {}", index),
        })?;
        apply(job)
    }
}
