// Evaluate interactor - Whole-file quality comparison of two videos

use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::model::QualityReport;
use crate::engine::CancellationToken;
use crate::error::{PerShotError, PerShotResult};
use crate::output::QualityEvaluator;
use crate::ports::*;
use crate::utils::workspace::RunWorkspace;

/// Interactor for the evaluate use case
pub struct EvaluateInteractor {
    probe: Arc<dyn MediaProbe>,
    meter: Arc<dyn QualityMeter>,
    config: AppConfig,
}

impl EvaluateInteractor {
    pub fn new(probe: Arc<dyn MediaProbe>, meter: Arc<dyn QualityMeter>, config: AppConfig) -> Self {
        Self {
            probe,
            meter,
            config,
        }
    }

    /// PSNR/SSIM of `distorted` against `reference`
    pub async fn execute(
        &self,
        reference: &Path,
        distorted: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<QualityReport> {
        for path in [reference, distorted] {
            if !path.exists() {
                return Err(PerShotError::InputFileNotFound {
                    path: path.display().to_string(),
                });
            }
        }
        let workspace = RunWorkspace::create(self.config.workspace.root.as_deref())?;
        let evaluator = QualityEvaluator::new(
            Arc::clone(&self.meter),
            Arc::clone(&self.probe),
            self.config.evaluation.clone(),
        );
        evaluator
            .compare(reference, distorted, workspace.path(), cancel)
            .await
    }
}
