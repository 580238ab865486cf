//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Anomaly Detection
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-12
//! Version: 1.1.0
//! Description: Union of statistical outliers (z-score gate) and pattern
//! anomalies (derivative excursions), deduplicated by sample index.
//! Layer: Core
//! Dependencies: dsp/statistics
//! Affected Components: engine, system
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! Statistical gate: |z| > θ, θ ∈ {2, 3, 4} for high/normal/low
//! sensitivity. Pattern gate: |Δᵢ| > k·mean|Δ|, k ∈ {2, 3, 5}. A sharp
//! excursion that recovers on the next step classifies as spike/dip and
//! consumes its recovery sample; a sustained excursion is a level shift.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-12 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-26 - Carlos Eduardo Favini - Recovery-sample consumption (v1.1.0)
//! --------------------------

use std::collections::BTreeMap;

use crate::core::types::Sensitivity;
use crate::detect::types::{AnalysisResult, AnomalyAnalysis, AnomalyKind, AnomalyPoint, Severity};
use crate::dsp::statistics::{mean, std_dev};

/// Minimum samples for meaningful moments.
pub const MIN_SAMPLES: usize = 10;

/// Detects anomalies in a snapshot. `timestamps` runs parallel to
/// `values`; a missing timestamp reports as 0.
pub fn analyze(values: &[f64], timestamps: &[u64], sensitivity: Sensitivity) -> (AnalysisResult, bool) {
    if values.len() < MIN_SAMPLES {
        return (
            AnalysisResult::InsufficientData {
                required: MIN_SAMPLES,
                actual: values.len(),
            },
            false,
        );
    }

    let mut degraded = false;
    let mu = mean(values);
    let sigma = std_dev(values);
    let ts = |i: usize| timestamps.get(i).copied().unwrap_or(0);

    // Indexed union, deduplicated by sample index. Pattern classifications
    // override the plain outlier tag; severity always reflects |z|.
    let mut found: BTreeMap<usize, AnomalyPoint> = BTreeMap::new();

    // (i) Statistical outliers.
    let theta = sensitivity.z_threshold();
    if sigma < f64::EPSILON {
        degraded = true;
    } else {
        for (i, &v) in values.iter().enumerate() {
            let z = (v - mu) / sigma;
            if z.abs() > theta {
                found.insert(
                    i,
                    AnomalyPoint {
                        index: i,
                        timestamp_us: ts(i),
                        value: v,
                        z_score: z,
                        kind: AnomalyKind::Outlier,
                        severity: Severity::from_z(z),
                    },
                );
            }
        }
    }

    // (ii) Pattern anomalies via the derivative gate.
    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let mean_abs_delta = mean(&deltas.iter().map(|d| d.abs()).collect::<Vec<_>>());
    let k = sensitivity.derivative_factor();

    if mean_abs_delta >= f64::EPSILON {
        let gate = k * mean_abs_delta;
        let mut consumed_recovery = vec![false; values.len()];

        for i in 0..deltas.len() {
            let sample_idx = i + 1; // delta i lands on sample i+1
            if consumed_recovery[sample_idx] || deltas[i].abs() <= gate {
                continue;
            }

            let next_delta = deltas.get(i + 1).copied();
            let kind = match next_delta {
                // Excursion that mostly recovers on the next step.
                Some(next) if deltas[i] > 0.0 && next < -0.5 * deltas[i] => {
                    if sample_idx + 1 < consumed_recovery.len() {
                        consumed_recovery[sample_idx + 1] = true;
                    }
                    AnomalyKind::Spike
                }
                Some(next) if deltas[i] < 0.0 && next > -0.5 * deltas[i] => {
                    if sample_idx + 1 < consumed_recovery.len() {
                        consumed_recovery[sample_idx + 1] = true;
                    }
                    AnomalyKind::Dip
                }
                // Sustained excursion: the new level holds.
                Some(next) if next.abs() < 0.5 * deltas[i].abs() => AnomalyKind::LevelShift,
                None => AnomalyKind::LevelShift,
                _ => AnomalyKind::MinorFluctuation,
            };

            let v = values[sample_idx];
            let z = if sigma < f64::EPSILON {
                0.0
            } else {
                (v - mu) / sigma
            };
            found
                .entry(sample_idx)
                .and_modify(|p| p.kind = kind)
                .or_insert(AnomalyPoint {
                    index: sample_idx,
                    timestamp_us: ts(sample_idx),
                    value: v,
                    z_score: z,
                    kind,
                    severity: Severity::from_z(z),
                });
        }
    }

    let anomalies: Vec<AnomalyPoint> = found.into_values().collect();
    (
        AnalysisResult::Anomaly(AnomalyAnalysis {
            anomalies,
            sensitivity,
            mean: mu,
            std_dev: sigma,
        }),
        degraded,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic uniform jitter in [−1, 1].
    fn jitter(i: usize) -> f64 {
        (((i * 193 + 71) % 401) as f64 / 200.0) - 1.0
    }

    fn timestamps(n: usize) -> Vec<u64> {
        (0..n as u64).map(|i| i * 100_000).collect()
    }

    #[test]
    fn test_insufficient_data() {
        let (result, _) = analyze(&[1.0; 5], &timestamps(5), Sensitivity::Normal);
        assert!(result.is_insufficient());
    }

    #[test]
    fn test_clean_signal_no_anomalies() {
        let values: Vec<f64> = (0..100).map(jitter).collect();
        let (result, _) = analyze(&values, &timestamps(100), Sensitivity::Normal);
        match result {
            AnalysisResult::Anomaly(a) => assert!(a.anomalies.is_empty()),
            other => panic!("expected anomaly result, got {:?}", other),
        }
    }

    #[test]
    fn test_single_outlier_found_exactly_once() {
        let mut values: Vec<f64> = (0..200).map(jitter).collect();
        values.push(10.0);
        values.extend((201..210).map(jitter));
        let n = values.len();
        let (result, _) = analyze(&values, &timestamps(n), Sensitivity::Normal);
        match result {
            AnalysisResult::Anomaly(a) => {
                assert_eq!(a.anomalies.len(), 1, "anomalies: {:?}", a.anomalies);
                let point = &a.anomalies[0];
                assert_eq!(point.index, 200);
                assert_eq!(point.value, 10.0);
                assert!(point.severity >= Severity::High);
                assert_eq!(point.kind, AnomalyKind::Spike);
            }
            other => panic!("expected anomaly result, got {:?}", other),
        }
    }

    #[test]
    fn test_level_shift_classified() {
        let mut values: Vec<f64> = (0..60).map(|i| 0.2 * jitter(i)).collect();
        values.extend((60..120).map(|i| 8.0 + 0.2 * jitter(i)));
        let n = values.len();
        let (result, _) = analyze(&values, &timestamps(n), Sensitivity::Normal);
        match result {
            AnalysisResult::Anomaly(a) => {
                let shift = a
                    .anomalies
                    .iter()
                    .find(|p| p.kind == AnomalyKind::LevelShift);
                assert!(shift.is_some(), "anomalies: {:?}", a.anomalies);
                assert_eq!(shift.unwrap().index, 60);
            }
            other => panic!("expected anomaly result, got {:?}", other),
        }
    }

    #[test]
    fn test_dip_classified() {
        let mut values: Vec<f64> = (0..100).map(|i| 0.3 * jitter(i)).collect();
        values[50] = -9.0;
        let (result, _) = analyze(&values, &timestamps(100), Sensitivity::Normal);
        match result {
            AnalysisResult::Anomaly(a) => {
                assert_eq!(a.anomalies.len(), 1);
                assert_eq!(a.anomalies[0].kind, AnomalyKind::Dip);
                assert_eq!(a.anomalies[0].index, 50);
            }
            other => panic!("expected anomaly result, got {:?}", other),
        }
    }

    #[test]
    fn test_constant_signal_is_degraded_not_fatal() {
        let (result, degraded) = analyze(&[5.0; 50], &timestamps(50), Sensitivity::Normal);
        assert!(degraded);
        match result {
            AnalysisResult::Anomaly(a) => assert!(a.anomalies.is_empty()),
            other => panic!("expected anomaly result, got {:?}", other),
        }
    }

    #[test]
    fn test_sensitivity_changes_gate() {
        // An excursion of ~2.6σ passes the high gate (2) but not normal (3).
        let mut values: Vec<f64> = (0..100).map(jitter).collect();
        let sigma = crate::dsp::statistics::std_dev(&values);
        values[70] = 2.6 * sigma;
        let (high, _) = analyze(&values, &timestamps(100), Sensitivity::High);
        let (normal, _) = analyze(&values, &timestamps(100), Sensitivity::Normal);
        let count = |r: &AnalysisResult| match r {
            AnalysisResult::Anomaly(a) => a
                .anomalies
                .iter()
                .filter(|p| p.kind == AnomalyKind::Outlier)
                .count(),
            _ => 0,
        };
        assert!(count(&high) >= count(&normal));
    }
}
