// Unit tests for shot planning

use super::*;
use crate::domain::model::*;
use crate::error::PerShotError;

fn planner() -> ShotPlanner {
    ShotPlanner::new(ShotPlanConfig::default())
}

fn cuts(times: &[f64]) -> Vec<CutPoint> {
    times.iter().map(|t| CutPoint::at(*t)).collect()
}

/// Small deterministic generator so the coverage test explores many cut sets
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn assert_covers(shots: &[ShotDescriptor], duration: f64) {
    assert!(!shots.is_empty());
    assert_eq!(shots[0].start, 0.0);
    assert_eq!(shots.last().unwrap().end, duration);
    for (i, shot) in shots.iter().enumerate() {
        assert_eq!(shot.index, i);
        assert!(shot.end > shot.start);
        assert_eq!(shot.duration, shot.end - shot.start);
    }
    for pair in shots.windows(2) {
        assert_eq!(pair[0].end, pair[1].start, "gap or overlap between shots");
    }
}

#[test]
fn test_no_cuts_yields_single_shot() {
    let shots = planner().build(&[], &[], 12.5).unwrap();
    assert_eq!(shots.len(), 1);
    assert_covers(&shots, 12.5);
    assert_eq!(shots[0].complexity_source, ComplexitySource::DurationFallback);
}

#[test]
fn test_cuts_are_sorted_and_deduplicated() {
    let shots = planner()
        .build(&cuts(&[7.0, 2.0, 7.0, 2.0 + 1e-9, 0.0, 10.0, 12.0]), &[], 10.0)
        .unwrap();
    let durations: Vec<f64> = shots.iter().map(|s| s.duration).collect();
    assert_eq!(durations, vec![2.0, 5.0, 3.0]);
    assert_covers(&shots, 10.0);
}

#[test]
fn test_coverage_invariant_over_random_cut_sets() {
    let mut rng = Lcg(42);
    let config = ShotPlanConfig {
        min_shot_length: 0.0,
        ..ShotPlanConfig::default()
    };
    let planner = ShotPlanner::new(config);

    for _ in 0..500 {
        let duration = 1.0 + rng.next_f64() * 120.0;
        let count = (rng.next_f64() * 20.0) as usize;
        let points: Vec<CutPoint> = (0..count)
            .map(|_| CutPoint::at(rng.next_f64() * duration * 1.2 - duration * 0.1))
            .collect();
        let shots = planner.build(&points, &[], duration).unwrap();
        assert_covers(&shots, duration);
        let total: f64 = shots.iter().map(|s| s.duration).sum();
        assert!((total - duration).abs() < 1e-9);
    }
}

#[test]
fn test_micro_shot_is_rejected() {
    let err = planner()
        .build(&cuts(&[2.0, 2.2]), &[], 10.0)
        .unwrap_err();
    match err {
        PerShotError::InvalidBoundary { index, start, end, .. } => {
            assert_eq!(index, 1);
            assert_eq!(start, 2.0);
            assert_eq!(end, 2.2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_micro_shot_at_stream_end_is_rejected() {
    assert!(matches!(
        planner().build(&cuts(&[9.8]), &[], 10.0),
        Err(PerShotError::InvalidBoundary { index: 1, .. })
    ));
}

#[test]
fn test_invalid_duration_and_nan_cut() {
    assert!(matches!(
        planner().build(&[], &[], 0.0),
        Err(PerShotError::InvalidPlan { .. })
    ));
    assert!(matches!(
        planner().build(&cuts(&[f64::NAN]), &[], 10.0),
        Err(PerShotError::InvalidPlan { .. })
    ));
}

#[test]
fn test_activity_drives_complexity() {
    let activity: Vec<ActivitySample> = (0..100)
        .map(|i| {
            let time = i as f64 * 0.1;
            // busy first shot, calm second shot, cut spike at 5.0
            let score = if (time - 5.0).abs() < 1e-9 {
                0.9
            } else if time < 5.0 {
                0.12
            } else {
                0.015
            };
            ActivitySample { time, score }
        })
        .collect();

    let shots = planner().build(&cuts(&[5.0]), &activity, 10.0).unwrap();
    assert_eq!(shots[0].complexity_source, ComplexitySource::Activity);
    assert_eq!(shots[1].complexity_source, ComplexitySource::Activity);
    assert!((shots[0].complexity - 0.8).abs() < 1e-6);
    // cut spike is excluded from the second shot
    assert!((shots[1].complexity - 0.1).abs() < 1e-6);
}

#[test]
fn test_duration_fallback_decreases_with_length() {
    let shots = planner().build(&cuts(&[1.0, 6.0]), &[], 30.0).unwrap();
    assert!(shots[0].complexity > shots[1].complexity);
    assert!(shots[1].complexity > shots[2].complexity);
    assert!(shots.iter().all(|s| (0.0..=1.0).contains(&s.complexity)));
}

#[test]
fn test_heuristic_monotonic_in_duration() {
    let config = HeuristicConfig::default();
    for c in 0..=10 {
        let complexity = c as f64 / 10.0;
        let mut previous = f64::MIN;
        for d in 1..=400 {
            let duration = d as f64 * 0.05;
            let q = compute_params(duration, complexity, &config).quality_param;
            assert!(q >= previous, "CRF dropped at duration {duration}");
            previous = q;
        }
    }
}

#[test]
fn test_heuristic_monotonic_in_complexity() {
    let config = HeuristicConfig::default();
    for d in [0.5, 3.0, 5.0, 7.5, 10.0, 30.0] {
        let mut previous = f64::MAX;
        for c in 0..=100 {
            let q = compute_params(d, c as f64 / 100.0, &config).quality_param;
            assert!(q <= previous, "CRF rose at complexity {c}");
            previous = q;
        }
    }
}

#[test]
fn test_heuristic_is_deterministic() {
    let mut config = HeuristicConfig::default();
    config.extra_flags.insert("tune".to_string(), "film".to_string());
    config.extra_flags.insert("g".to_string(), "48".to_string());
    let a = compute_params(3.3, 0.42, &config);
    let b = compute_params(3.3, 0.42, &config);
    assert_eq!(a, b);
    assert_eq!(a.quality_param.to_bits(), b.quality_param.to_bits());
}

#[test]
fn test_heuristic_clamps_at_extremes() {
    let config = HeuristicConfig {
        complexity_weight: 100.0,
        ..HeuristicConfig::default()
    };
    assert_eq!(compute_params(0.1, 1.0, &config).quality_param, config.min_crf);
    assert_eq!(compute_params(1e6, 0.0, &config).quality_param, config.max_crf);
    assert_eq!(compute_params(f64::NAN, f64::NAN, &config).quality_param, 21.0);
    assert_eq!(compute_params(f64::INFINITY, -5.0, &config).quality_param, config.max_crf);
}

#[test]
fn test_heuristic_follows_duration_tiers() {
    let config = HeuristicConfig::default();
    // complexity 0.5 cancels the complexity term
    assert_eq!(compute_params(3.0, 0.5, &config).quality_param, 21.0);
    assert_eq!(compute_params(8.0, 0.5, &config).quality_param, 25.0);
    assert_eq!(compute_params(12.0, 0.5, &config).quality_param, 27.0);
}

#[test]
fn test_heuristic_config_validation() {
    assert!(HeuristicConfig::default().validate("libx264").is_ok());

    let inverted = HeuristicConfig {
        min_crf: 30.0,
        max_crf: 20.0,
        ..HeuristicConfig::default()
    };
    assert!(inverted.validate("libx264").is_err());

    let out_of_range = HeuristicConfig {
        max_crf: 60.0,
        ..HeuristicConfig::default()
    };
    assert!(out_of_range.validate("libx264").is_err());
    assert!(out_of_range.validate("libsvtav1").is_ok());

    let bad_tiers = HeuristicConfig {
        medium_shot_secs: 10.0,
        long_shot_secs: 5.0,
        ..HeuristicConfig::default()
    };
    assert!(bad_tiers.validate("libx264").is_err());
}

#[test]
fn test_seek_strategies_default_and_override() {
    let mut config = SeekConfig::default();
    config.by_container.insert(
        "avi".to_string(),
        vec![SeekStrategy::AccurateOnly, SeekStrategy::AccurateOnly],
    );
    let planner = SeekPlanner::new(config);

    assert_eq!(
        planner.strategies_for("mov"),
        vec![SeekStrategy::DualStage, SeekStrategy::AccurateOnly]
    );
    assert_eq!(planner.strategies_for("AVI"), vec![SeekStrategy::AccurateOnly]);
}

#[test]
fn test_seek_coarse_window() {
    let planner = SeekPlanner::new(SeekConfig::default());
    let shot = ShotDescriptor {
        index: 1,
        start: 7.0,
        end: 10.0,
        duration: 3.0,
        complexity: 0.5,
        complexity_source: ComplexitySource::Activity,
    };
    assert_eq!(planner.coarse_start(&shot), 2.0);
    assert_eq!(planner.coarse_span(&shot), 8.0);

    let early = ShotDescriptor {
        start: 1.0,
        ..shot
    };
    assert_eq!(planner.coarse_start(&early), 0.0);
    assert!((planner.duration_tolerance(25.0) - 0.08).abs() < 1e-12);
}

#[test]
fn test_seek_config_validation() {
    assert!(SeekConfig::default().validate().is_ok());
    let empty = SeekConfig {
        strategies: vec![],
        ..SeekConfig::default()
    };
    assert!(empty.validate().is_err());
}
