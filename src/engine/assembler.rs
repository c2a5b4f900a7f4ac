//! Seamless concatenation of encoded shots

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::domain::model::*;
use crate::engine::cancel::CancellationToken;
use crate::error::{PerShotError, PerShotResult};
use crate::ports::{MediaProbe, TransformFailure, TransformRequest, Transcoder};

/// One concat list entry
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatEntry {
    pub path: PathBuf,
    pub duration: f64,
    pub frame_count: u64,
}

/// Render an ffconcat list with explicit durations
pub fn concat_list(entries: &[ConcatEntry]) -> String {
    let mut list = String::from("ffconcat version 1.0\n");
    for entry in entries {
        let quoted = entry.path.to_string_lossy().replace('\'', "'\\''");
        list.push_str(&format!("file '{}'\n", quoted));
        list.push_str(&format!("duration {:.6}\n", entry.duration));
    }
    list
}

/// Ordered concat entries, or the indices of shots that are not encoded
pub fn collect_entries(
    shots: &[ShotDescriptor],
    jobs: &[ShotJob],
    frame_rate: f64,
) -> PerShotResult<Vec<ConcatEntry>> {
    let mut entries = Vec::with_capacity(shots.len());
    let mut missing = Vec::new();

    for shot in shots {
        let job = jobs.iter().find(|j| j.index() == shot.index);
        match job {
            Some(ShotJob {
                status: JobStatus::Encoded,
                output_artifact: Some(path),
                frame_count: Some(frames),
                ..
            }) => {
                let duration = if frame_rate > 0.0 {
                    *frames as f64 / frame_rate
                } else {
                    shot.duration
                };
                entries.push(ConcatEntry {
                    path: path.clone(),
                    duration,
                    frame_count: *frames,
                });
            }
            _ => missing.push(shot.index),
        }
    }

    if !missing.is_empty() {
        return Err(PerShotError::IncompleteSequence { missing });
    }
    Ok(entries)
}

/// Stream assembler
pub struct StreamAssembler {
    transcoder: Arc<dyn Transcoder>,
    probe: Arc<dyn MediaProbe>,
}

impl StreamAssembler {
    pub fn new(transcoder: Arc<dyn Transcoder>, probe: Arc<dyn MediaProbe>) -> Self {
        Self { transcoder, probe }
    }

    /// Concatenate every shot in index order and check the seams
    pub async fn assemble(
        &self,
        source: &SourceVideo,
        shots: &[ShotDescriptor],
        jobs: &[ShotJob],
        work_dir: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<AssembledOutput> {
        let entries = collect_entries(shots, jobs, source.frame_rate)?;
        let list = work_dir.join("shots.ffconcat");
        std::fs::write(&list, concat_list(&entries))?;
        info!("Assembling {} shot(s) into {}", entries.len(), output.display());

        let request = TransformRequest::Concat {
            list,
            output: output.to_path_buf(),
        };
        self.transcoder
            .run(&request, cancel)
            .await
            .map_err(|failure| match failure {
                TransformFailure::Cancelled => PerShotError::Cancelled,
                other => PerShotError::Assembly {
                    message: format!("concat failed: {}", other),
                },
            })?;

        let expected: u64 = entries.iter().map(|e| e.frame_count).sum();
        let actual = self.probe.count_frames(output).await?;
        if actual != expected {
            return Err(PerShotError::Assembly {
                message: format!(
                    "output has {} frames but the shots add up to {}; a seam dropped or duplicated frames",
                    actual, expected
                ),
            });
        }

        let probed = self.probe.probe(output).await?;
        let size_bytes = std::fs::metadata(output).map(|m| m.len())?;
        info!(
            "Assembled {} frames ({:.3}s) without seam defects",
            actual, probed.duration
        );
        Ok(AssembledOutput {
            path: output.to_path_buf(),
            frame_count: actual,
            duration: probed.duration,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn shot(index: usize, start: f64, end: f64) -> ShotDescriptor {
        ShotDescriptor {
            index,
            start,
            end,
            duration: end - start,
            complexity: 0.5,
            complexity_source: ComplexitySource::DurationFallback,
        }
    }

    fn encoded(descriptor: ShotDescriptor, frames: u64) -> ShotJob {
        let mut job = ShotJob::new(
            descriptor,
            EncodeParameters {
                quality_param: 23.0,
                preset: Preset::Medium,
                extra_flags: BTreeMap::new(),
            },
        );
        job.status = JobStatus::Encoded;
        job.output_artifact = Some(PathBuf::from(format!("/w/shot_{:04}/encoded.mp4", job.index())));
        job.frame_count = Some(frames);
        job
    }

    #[test]
    fn test_entries_follow_shot_order() {
        let shots = vec![shot(0, 0.0, 2.0), shot(1, 2.0, 7.0), shot(2, 7.0, 10.0)];
        // table order must not matter
        let jobs = vec![
            encoded(shots[2].clone(), 75),
            encoded(shots[0].clone(), 50),
            encoded(shots[1].clone(), 125),
        ];
        let entries = collect_entries(&shots, &jobs, 25.0).unwrap();
        let frames: Vec<u64> = entries.iter().map(|e| e.frame_count).collect();
        assert_eq!(frames, vec![50, 125, 75]);
        assert_eq!(entries[1].duration, 5.0);
    }

    #[test]
    fn test_missing_shots_are_reported() {
        let shots = vec![shot(0, 0.0, 2.0), shot(1, 2.0, 7.0), shot(2, 7.0, 10.0)];
        let mut failed = encoded(shots[1].clone(), 125);
        failed.status = JobStatus::Failed;
        let jobs = vec![encoded(shots[0].clone(), 50), failed];

        match collect_entries(&shots, &jobs, 25.0) {
            Err(PerShotError::IncompleteSequence { missing }) => assert_eq!(missing, vec![1, 2]),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_concat_list_quotes_paths() {
        let list = concat_list(&[ConcatEntry {
            path: PathBuf::from("/tmp/it's/encoded.mp4"),
            duration: 2.0,
            frame_count: 50,
        }]);
        assert_eq!(
            list,
            "ffconcat version 1.0\nfile '/tmp/it'\\''s/encoded.mp4'\nduration 2.000000\n"
        );
    }
}
