//! Diagnostic meta documents and noise statistics
//!
//! Small key/value documents exchanged for noise summaries and information
//! queries, serialized as JSON. Noise statistics are never transmitted as a
//! wire message themselves; they only scale compression tolerance.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Summary sigma values from a prior noise calibration measurement
///
/// Obtained via a dependency-query side exchange. When `valid` is false the
/// statistics must be ignored and compression tolerance applied unscaled
/// (sigma assumed 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseStatistics {
    pub valid: bool,
    pub channels: u32,
    pub sigma_min: f32,
    pub sigma_max: f32,
    pub sigma_mean: f32,
    pub noise_dwell_time_us: f32,
}

impl NoiseStatistics {
    /// Statistics marked invalid; tolerance scaling falls back to sigma 1
    pub fn invalid() -> Self {
        NoiseStatistics {
            valid: false,
            channels: 0,
            sigma_min: 0.0,
            sigma_max: 0.0,
            sigma_mean: 0.0,
            noise_dwell_time_us: 0.0,
        }
    }

    /// Parse a noise-summary document as delivered by a dependency query
    pub fn from_document(text: &str) -> Result<Self> {
        let doc: NoiseSummaryDocument = serde_json::from_str(text)?;
        Ok(NoiseStatistics {
            valid: doc.status == "success",
            channels: doc.channels,
            sigma_min: doc.min_sigma,
            sigma_max: doc.max_sigma,
            sigma_mean: doc.mean_sigma,
            noise_dwell_time_us: doc.noise_dwell_time_us,
        })
    }

    /// Scale a caller-supplied compression tolerance by these statistics
    ///
    /// `local = tolerance * sigma_min * sample_time * sqrt(dwell / sample_time)`,
    /// applied only when the statistics are valid and every referenced
    /// quantity is positive; otherwise the tolerance is returned unscaled.
    pub fn scale_tolerance(&self, tolerance: f32, sample_time_us: f32) -> f32 {
        if self.valid
            && self.sigma_min > 0.0
            && self.noise_dwell_time_us > 0.0
            && sample_time_us > 0.0
        {
            tolerance
                * self.sigma_min
                * sample_time_us
                * (self.noise_dwell_time_us / sample_time_us).sqrt()
        } else {
            tolerance
        }
    }
}

/// On-the-wire shape of the noise-summary document
#[derive(Debug, Serialize, Deserialize)]
pub struct NoiseSummaryDocument {
    pub status: String,
    pub channels: u32,
    pub min_sigma: f32,
    pub max_sigma: f32,
    pub mean_sigma: f32,
    pub noise_dwell_time_us: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_stats() -> NoiseStatistics {
        NoiseStatistics {
            valid: true,
            channels: 8,
            sigma_min: 2.0,
            sigma_max: 4.0,
            sigma_mean: 3.0,
            noise_dwell_time_us: 10.0,
        }
    }

    #[test]
    fn parse_document() {
        let text = r#"{
            "status": "success",
            "channels": 16,
            "min_sigma": 1.5,
            "max_sigma": 2.5,
            "mean_sigma": 2.0,
            "noise_dwell_time_us": 5.0
        }"#;
        let stats = NoiseStatistics::from_document(text).unwrap();
        assert!(stats.valid);
        assert_eq!(stats.channels, 16);
        assert_eq!(stats.sigma_min, 1.5);
    }

    #[test]
    fn failed_status_is_invalid() {
        let text = r#"{
            "status": "failed",
            "channels": 0,
            "min_sigma": 0.0,
            "max_sigma": 0.0,
            "mean_sigma": 0.0,
            "noise_dwell_time_us": 0.0
        }"#;
        assert!(!NoiseStatistics::from_document(text).unwrap().valid);
    }

    #[test]
    fn garbage_document_is_an_error() {
        assert!(NoiseStatistics::from_document("not json").is_err());
    }

    #[test]
    fn tolerance_scaling() {
        let stats = valid_stats();
        // 0.1 * 2.0 * 2.5 * sqrt(10.0 / 2.5) = 0.5 * 2 = 1.0
        let scaled = stats.scale_tolerance(0.1, 2.5);
        assert!((scaled - 1.0).abs() < 1e-6);
    }

    #[test]
    fn invalid_stats_leave_tolerance_unscaled() {
        let stats = NoiseStatistics::invalid();
        assert_eq!(stats.scale_tolerance(0.25, 2.5), 0.25);
    }

    #[test]
    fn zero_sample_time_leaves_tolerance_unscaled() {
        let stats = valid_stats();
        assert_eq!(stats.scale_tolerance(0.25, 0.0), 0.25);
    }
}
