use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{
    FfmpegQualityMeter, FfmpegSceneDetector, FfmpegTranscoder, FfprobeProbe, SceneDetectorSettings,
};
use crate::app::{encode_interactor::EncodeInteractor, evaluate_interactor::EvaluateInteractor};
use crate::config::AppConfig;
use crate::ports::{MediaProbe, QualityMeter, SceneDetector, Transcoder};

pub trait AppContainer: Send + Sync {
    fn encode_interactor(&self) -> Arc<EncodeInteractor>;
    fn evaluate_interactor(&self) -> Arc<EvaluateInteractor>;
}

/// The four ports a run needs
#[derive(Clone)]
pub struct Ports {
    pub probe: Arc<dyn MediaProbe>,
    pub detector: Arc<dyn SceneDetector>,
    pub transcoder: Arc<dyn Transcoder>,
    pub meter: Arc<dyn QualityMeter>,
}

pub struct DefaultAppContainer {
    encode_interactor: Arc<EncodeInteractor>,
    evaluate_interactor: Arc<EvaluateInteractor>,
}

impl DefaultAppContainer {
    /// Wire the ffmpeg/ffprobe adapters from configuration
    pub fn new(config: AppConfig) -> Self {
        let timeout = Duration::from_secs(config.encoder.timeout_secs);
        let probe_port = Arc::new(FfprobeProbe::new(
            config.encoder.ffprobe_path.clone(),
            timeout,
        ));
        let detector_port = Arc::new(FfmpegSceneDetector::new(SceneDetectorSettings {
            ffmpeg_path: config.encoder.ffmpeg_path.clone(),
            threshold: config.detection.threshold,
            analysis_width: config.detection.analysis_width,
            min_gap_secs: config.detection.plan.min_shot_length,
            timeout,
        }));
        let transcoder_port = Arc::new(FfmpegTranscoder::new(config.encoder.clone()));
        let meter_port = Arc::new(FfmpegQualityMeter::new(
            config.encoder.ffmpeg_path.clone(),
            config.evaluation.psnr_cap,
            timeout,
        ));

        let ports = Ports {
            probe: Arc::clone(&probe_port) as Arc<dyn MediaProbe>,
            detector: Arc::clone(&detector_port) as Arc<dyn SceneDetector>,
            transcoder: Arc::clone(&transcoder_port) as Arc<dyn Transcoder>,
            meter: Arc::clone(&meter_port) as Arc<dyn QualityMeter>,
        };
        Self::with_ports(ports, config)
    }

    /// Build interactors over caller-supplied ports
    pub fn with_ports(ports: Ports, config: AppConfig) -> Self {
        let encode_interactor = Arc::new(EncodeInteractor::new(
            Arc::clone(&ports.probe),
            Arc::clone(&ports.detector),
            Arc::clone(&ports.transcoder),
            Arc::clone(&ports.meter),
            config.clone(),
        ));

        let evaluate_interactor = Arc::new(EvaluateInteractor::new(
            Arc::clone(&ports.probe),
            Arc::clone(&ports.meter),
            config,
        ));

        Self {
            encode_interactor,
            evaluate_interactor,
        }
    }
}

impl AppContainer for DefaultAppContainer {
    fn encode_interactor(&self) -> Arc<EncodeInteractor> {
        Arc::clone(&self.encode_interactor)
    }

    fn evaluate_interactor(&self) -> Arc<EvaluateInteractor> {
        Arc::clone(&self.evaluate_interactor)
    }
}
