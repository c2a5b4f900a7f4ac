// Encode interactor - Orchestrates detection, planning, per-shot encoding, assembly and evaluation

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::AppConfig;
use crate::domain::model::*;
use crate::engine::{
    CancellationToken, EncodedClip, JobTable, SeekExtractor, ShotEncoder, StreamAssembler,
};
use crate::error::{PerShotError, PerShotResult};
use crate::output::{PlanReport, PlannedShot, QualityEvaluator};
use crate::planner::{CrfHeuristic, SeekPlanner, ShotPlanner};
use crate::ports::*;
use crate::utils::workspace::RunWorkspace;

/// Whole-pipeline tries per shot before it counts as failed
const SHOT_TRIES: u32 = 2;

/// How the source is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeMode {
    /// Scene-split, per-shot parameters, seamless reassembly
    PerShot,
    /// One encode of the whole file at the base parameters, optionally rescaled
    SinglePass { resolution: Option<(u32, u32)> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: EncodeMode,
}

/// Records and logs run state transitions
struct RunTracker {
    states: Vec<RunState>,
}

impl RunTracker {
    fn new() -> Self {
        Self { states: Vec::new() }
    }

    fn enter(&mut self, state: RunState) {
        info!("Run state: {:?}", state);
        self.states.push(state);
    }
}

/// Everything a shot worker needs, shared read-only across tasks
struct ShotWorker {
    source: Arc<SourceVideo>,
    table: JobTable,
    extractor: SeekExtractor,
    encoder: ShotEncoder,
    workspace: Arc<RunWorkspace>,
}

impl ShotWorker {
    /// Up to [`SHOT_TRIES`] full extract+encode passes. A shot that fails every try
    /// is left Failed in the table; only cancellation and bookkeeping errors surface here.
    async fn run(&self, shot: ShotDescriptor, cancel: CancellationToken) -> PerShotResult<()> {
        let index = shot.index;
        for attempt in 1..=SHOT_TRIES {
            self.table.begin_try(index).await?;
            match self.pipeline(&shot, &cancel).await {
                Ok(clip) => {
                    self.table
                        .complete(index, clip.path, clip.frame_count, false)
                        .await?;
                    return Ok(());
                }
                Err(PerShotError::Cancelled) => {
                    self.table.fail(index, "cancelled".to_string()).await?;
                    return Err(PerShotError::Cancelled);
                }
                Err(e) => {
                    warn!("Shot {} failed (try {}/{}): {}", index, attempt, SHOT_TRIES, e);
                    self.table.fail(index, e.to_string()).await?;
                    if attempt < SHOT_TRIES && !cancel.is_cancelled() {
                        self.table.requeue(index).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn pipeline(
        &self,
        shot: &ShotDescriptor,
        cancel: &CancellationToken,
    ) -> PerShotResult<EncodedClip> {
        let index = shot.index;
        let params = self
            .table
            .get(index)
            .await
            .map(|job| job.params)
            .ok_or_else(|| PerShotError::InvalidPlan {
                message: format!("no job for shot {}", index),
            })?;
        let work_dir = self.workspace.fresh_shot_dir(index)?;

        self.table.transition(index, JobStatus::Extracting).await?;
        let extracted = self
            .extractor
            .extract(&self.source, shot, &work_dir, cancel)
            .await;
        let clip = match extracted {
            Ok(clip) => clip,
            Err(e) => {
                if let PerShotError::Extraction { attempts, .. } = &e {
                    self.table.record_extraction(index, None, attempts.clone()).await?;
                }
                return Err(e);
            }
        };
        self.table
            .record_extraction(index, Some(clip.strategy), clip.attempts.clone())
            .await?;
        self.table.transition(index, JobStatus::Extracted).await?;

        self.table.transition(index, JobStatus::Encoding).await?;
        self.encoder
            .encode(&self.source, shot, &params, &clip.path, &work_dir, cancel)
            .await
    }
}

/// Interactor for the encode and plan use cases
pub struct EncodeInteractor {
    probe: Arc<dyn MediaProbe>,
    detector: Arc<dyn SceneDetector>,
    transcoder: Arc<dyn Transcoder>,
    meter: Arc<dyn QualityMeter>,
    config: AppConfig,
}

impl EncodeInteractor {
    /// Create new encode interactor with injected ports
    pub fn new(
        probe: Arc<dyn MediaProbe>,
        detector: Arc<dyn SceneDetector>,
        transcoder: Arc<dyn Transcoder>,
        meter: Arc<dyn QualityMeter>,
        config: AppConfig,
    ) -> Self {
        Self {
            probe,
            detector,
            transcoder,
            meter,
            config,
        }
    }

    /// Detect and plan without encoding
    pub async fn plan(&self, input: &Path, cancel: &CancellationToken) -> PerShotResult<PlanReport> {
        let source = self.probe_input(input).await?;
        let shots = self.detect_and_plan(&source, cancel).await?;
        let heuristic = CrfHeuristic::new(self.config.heuristic.clone());
        let strategies = SeekPlanner::new(self.config.seek.clone()).strategies_for(&source.container);

        let shots = shots
            .into_iter()
            .map(|descriptor| PlannedShot {
                params: heuristic.params_for(&descriptor),
                descriptor,
                strategies: strategies.clone(),
            })
            .collect();
        Ok(PlanReport { source, shots })
    }

    /// Run the full pipeline. Any error is the run's Failed terminal state.
    pub async fn execute(
        &self,
        request: &EncodeRequest,
        cancel: &CancellationToken,
    ) -> PerShotResult<RunReport> {
        let started = Instant::now();
        let mut tracker = RunTracker::new();

        match self.run(request, cancel, &mut tracker, started).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracker.enter(RunState::Failed);
                error!("Run failed after {:?}: {}", tracker.states, e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &EncodeRequest,
        cancel: &CancellationToken,
        tracker: &mut RunTracker,
        started: Instant,
    ) -> PerShotResult<RunReport> {
        if same_file(&request.input, &request.output) {
            return Err(PerShotError::Config {
                message: format!(
                    "output {} would overwrite the input",
                    request.output.display()
                ),
            });
        }
        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let workspace = Arc::new(RunWorkspace::create(self.config.workspace.root.as_deref())?);

        tracker.enter(RunState::Detecting);
        let source = Arc::new(self.probe_input(&request.input).await?);
        let heuristic = CrfHeuristic::new(self.config.heuristic.clone());

        let (shots, table, output_info, evaluate) = match request.mode {
            EncodeMode::PerShot => {
                let detection = self.detector.detect(&source, cancel).await?;
                ensure_running(cancel)?;

                tracker.enter(RunState::Planning);
                let shots = ShotPlanner::new(self.config.detection.plan.clone()).build(
                    &detection.cuts,
                    &detection.activity,
                    source.duration,
                )?;
                let table = JobTable::new(
                    shots
                        .iter()
                        .map(|d| ShotJob::new(d.clone(), heuristic.params_for(d)))
                        .collect(),
                );

                tracker.enter(RunState::Processing);
                self.process_shots(&source, &shots, &table, &workspace, cancel)
                    .await?;

                tracker.enter(RunState::Assembling);
                let assembled = self
                    .assemble(&source, &shots, &table, &workspace, &request.output, cancel)
                    .await?;
                (shots, table, assembled, true)
            }
            EncodeMode::SinglePass { resolution } => {
                tracker.enter(RunState::Planning);
                let whole = whole_file_shot(&source);
                let table = JobTable::new(vec![ShotJob::new(whole.clone(), heuristic.base_params())]);

                tracker.enter(RunState::Processing);
                let assembled = self
                    .single_pass(&source, &whole, &table, resolution, &request.output, cancel)
                    .await?;
                (vec![whole], table, assembled, resolution.is_none())
            }
        };
        ensure_running(cancel)?;

        let quality = if evaluate {
            tracker.enter(RunState::Evaluating);
            let evaluator = QualityEvaluator::new(
                Arc::clone(&self.meter),
                Arc::clone(&self.probe),
                self.config.evaluation.clone(),
            );
            let work_dir = workspace.run_dir("metrics")?;
            Some(
                evaluator
                    .evaluate(&source, &output_info, &shots, &work_dir, cancel)
                    .await?,
            )
        } else {
            info!("Skipping quality evaluation: output resolution differs from source");
            None
        };

        tracker.enter(RunState::Done);
        let shots = table.snapshot().await.iter().map(ShotSummary::from).collect();
        Ok(RunReport {
            input: request.input.clone(),
            output: request.output.clone(),
            finished_at: chrono::Utc::now(),
            elapsed_secs: started.elapsed().as_secs_f64(),
            states: tracker.states.clone(),
            shots,
            sizes: SizeReport::new(source.size_bytes, output_info.size_bytes),
            output_info,
            quality,
        })
    }

    async fn probe_input(&self, input: &Path) -> PerShotResult<SourceVideo> {
        if !input.exists() {
            return Err(PerShotError::InputFileNotFound {
                path: input.display().to_string(),
            });
        }
        let source = self.probe.probe(input).await?;
        info!(
            "Source: {}x{} @ {:.3} fps, {:.3}s (~{} frames), container {}",
            source.width,
            source.height,
            source.frame_rate,
            source.duration,
            source.expected_frames(),
            source.container
        );
        Ok(source)
    }

    async fn detect_and_plan(
        &self,
        source: &SourceVideo,
        cancel: &CancellationToken,
    ) -> PerShotResult<Vec<ShotDescriptor>> {
        let detection = self.detector.detect(source, cancel).await?;
        ShotPlanner::new(self.config.detection.plan.clone()).build(
            &detection.cuts,
            &detection.activity,
            source.duration,
        )
    }

    /// Bounded worker pool over all shots, then failure tolerance and recovery
    async fn process_shots(
        &self,
        source: &Arc<SourceVideo>,
        shots: &[ShotDescriptor],
        table: &JobTable,
        workspace: &Arc<RunWorkspace>,
        cancel: &CancellationToken,
    ) -> PerShotResult<()> {
        let worker = Arc::new(ShotWorker {
            source: Arc::clone(source),
            table: table.clone(),
            extractor: SeekExtractor::new(
                Arc::clone(&self.transcoder),
                Arc::clone(&self.probe),
                SeekPlanner::new(self.config.seek.clone()),
            ),
            encoder: ShotEncoder::new(Arc::clone(&self.transcoder), Arc::clone(&self.probe)),
            workspace: Arc::clone(workspace),
        });
        let workers = self.config.pool.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        info!("Processing {} shot(s) with {} worker(s)", shots.len(), workers);

        for shot in shots {
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => break,
            };
            let worker = Arc::clone(&worker);
            let cancel = cancel.clone();
            let shot = shot.clone();
            let span = info_span!("shot", index = shot.index);
            tasks.spawn(
                async move {
                    let _permit = permit;
                    worker.run(shot, cancel).await
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) | Ok(Err(PerShotError::Cancelled)) => {}
                Ok(Err(e)) => error!("Shot bookkeeping failed: {}", e),
                Err(e) => error!("Shot worker aborted: {}", e),
            }
        }

        if cancel.is_cancelled() {
            for index in table.missing().await {
                workspace.discard_shot_dir(index);
            }
            info!("Run cancelled; discarded unfinished shot directories");
            return Err(PerShotError::Cancelled);
        }

        // A worker that died leaves its job mid-flight
        for job in table.snapshot().await {
            if !job.status.is_terminal() {
                table
                    .fail(job.index(), "worker stopped before finishing".to_string())
                    .await?;
            }
        }

        self.apply_failure_tolerance(source, table, workspace, cancel)
            .await
    }

    /// Fail the run past the tolerance; otherwise fill failed shots with recovery encodes
    async fn apply_failure_tolerance(
        &self,
        source: &SourceVideo,
        table: &JobTable,
        workspace: &RunWorkspace,
        cancel: &CancellationToken,
    ) -> PerShotResult<()> {
        let failed: Vec<ShotJob> = table
            .snapshot()
            .await
            .into_iter()
            .filter(|job| job.status == JobStatus::Failed)
            .collect();
        if failed.is_empty() {
            return Ok(());
        }

        let tolerance = self.config.pool.max_failed_shots;
        if failed.len() > tolerance {
            let causes = failed
                .iter()
                .map(|job| {
                    format!(
                        "shot {}: {}",
                        job.index(),
                        job.failure.as_deref().unwrap_or("unknown cause")
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PerShotError::ToleranceExceeded {
                failed: failed.len(),
                tolerance,
                causes,
            });
        }

        warn!(
            "{} shot(s) failed within tolerance {}; running recovery encodes",
            failed.len(),
            tolerance
        );
        let encoder = ShotEncoder::new(Arc::clone(&self.transcoder), Arc::clone(&self.probe));
        for job in failed {
            ensure_running(cancel)?;
            let index = job.index();
            let work_dir = workspace.fresh_shot_dir(index)?;
            table.requeue(index).await?;
            table.transition(index, JobStatus::Encoding).await?;

            let recovered = encoder
                .recover(source, &job.descriptor, &job.params, &work_dir, cancel)
                .instrument(info_span!("shot", index))
                .await;
            match recovered {
                Ok(clip) => {
                    table
                        .complete(index, clip.path, clip.frame_count, true)
                        .await?
                }
                Err(PerShotError::Cancelled) => return Err(PerShotError::Cancelled),
                Err(e) => {
                    error!("Shot {}: recovery encode failed: {}", index, e);
                    table.fail(index, e.to_string()).await?;
                }
            }
        }
        Ok(())
    }

    async fn assemble(
        &self,
        source: &SourceVideo,
        shots: &[ShotDescriptor],
        table: &JobTable,
        workspace: &RunWorkspace,
        output: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<AssembledOutput> {
        let assembler = StreamAssembler::new(Arc::clone(&self.transcoder), Arc::clone(&self.probe));
        let jobs = table.snapshot().await;
        let work_dir = workspace.run_dir("assembly")?;
        let result = assembler
            .assemble(source, shots, &jobs, &work_dir, output, cancel)
            .await;
        if result.is_err() {
            remove_partial_output(output);
        }
        result
    }

    async fn single_pass(
        &self,
        source: &SourceVideo,
        whole: &ShotDescriptor,
        table: &JobTable,
        resolution: Option<(u32, u32)>,
        output: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<AssembledOutput> {
        let encoder = ShotEncoder::new(Arc::clone(&self.transcoder), Arc::clone(&self.probe));
        let params = table
            .get(whole.index)
            .await
            .map(|job| job.params)
            .ok_or_else(|| PerShotError::InvalidPlan {
                message: "single-pass job missing".to_string(),
            })?;

        table.begin_try(whole.index).await?;
        table.transition(whole.index, JobStatus::Encoding).await?;
        let clip = match encoder
            .encode_full(source, &params, resolution, output, cancel)
            .await
        {
            Ok(clip) => clip,
            Err(e) => {
                table.fail(whole.index, e.to_string()).await?;
                remove_partial_output(output);
                return Err(e);
            }
        };
        table
            .complete(whole.index, clip.path.clone(), clip.frame_count, false)
            .await?;

        let probed = self.probe.probe(output).await?;
        Ok(AssembledOutput {
            path: clip.path,
            frame_count: clip.frame_count,
            duration: probed.duration,
            size_bytes: clip.size_bytes,
        })
    }
}

/// True when `output` names the same file as `input` after resolving `..` and symlinks.
/// An output whose directory does not exist yet cannot alias an existing input.
fn same_file(input: &Path, output: &Path) -> bool {
    if input == output {
        return true;
    }
    let Ok(input) = std::fs::canonicalize(input) else {
        return false;
    };
    if let Ok(output) = std::fs::canonicalize(output) {
        return input == output;
    }
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (std::fs::canonicalize(parent), output.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name) == input,
        _ => false,
    }
}

fn ensure_running(cancel: &CancellationToken) -> PerShotResult<()> {
    if cancel.is_cancelled() {
        Err(PerShotError::Cancelled)
    } else {
        Ok(())
    }
}

fn whole_file_shot(source: &SourceVideo) -> ShotDescriptor {
    ShotDescriptor {
        index: 0,
        start: 0.0,
        end: source.duration,
        duration: source.duration,
        complexity: 0.5,
        complexity_source: ComplexitySource::DurationFallback,
    }
}

fn remove_partial_output(output: &Path) {
    if output.exists() {
        if let Err(e) = std::fs::remove_file(output) {
            warn!("Failed to remove partial output {}: {}", output.display(), e);
        }
    }
}
