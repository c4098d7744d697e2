use serde::{Deserialize, Serialize};

use crate::errors::ReceiverError;

/// Sample encoding used by a recorded IQ file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    Int8Iq,
    Uint8Iq,
    Float32Iq,
}

impl std::str::FromStr for SampleFormat {
    type Err = ReceiverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int8_iq" => Ok(SampleFormat::Int8Iq),
            "uint8_iq" => Ok(SampleFormat::Uint8Iq),
            "float32_iq" => Ok(SampleFormat::Float32Iq),
            _ => Err(ReceiverError::ConfigInvalid(format!(
                "unknown sample_format: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SampleFormat::Int8Iq => "int8_iq",
            SampleFormat::Uint8Iq => "uint8_iq",
            SampleFormat::Float32Iq => "float32_iq",
        };
        write!(f, "{s}")
    }
}

/// Acquisition search parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Half-width of the Doppler search, Hz (warm start).
    pub doppler_range_hz: f64,
    /// Half-width of the Doppler search when no fix exists yet, Hz.
    pub doppler_range_cold_hz: f64,
    /// Doppler bin step, Hz.
    pub doppler_step_hz: f64,
    /// Peak / second-peak ratio required to declare acquisition.
    pub threshold_ratio: f64,
    /// Non-coherent integration length, in 1 ms C/A code periods.
    pub non_coherent_blocks_msec: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            doppler_range_hz: 5_000.0,
            doppler_range_cold_hz: 10_000.0,
            doppler_step_hz: 200.0,
            threshold_ratio: 2.5,
            non_coherent_blocks_msec: 10,
        }
    }
}

/// Tracking-loop bandwidths.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub pll_bandwidth_hz: f64,
    pub pll_damping: f64,
    pub dll_bandwidth_hz: f64,
    pub pull_in_msec: u64,
    pub lock_window_msec: u64,
    pub lock_threshold: f64,
    pub unlock_grace_msec: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            pll_bandwidth_hz: 10.0,
            pll_damping: 0.707,
            dll_bandwidth_hz: 1.0,
            pull_in_msec: 500,
            lock_window_msec: 200,
            lock_threshold: 4.0,
            unlock_grace_msec: 2_000,
        }
    }
}

/// Top-level receiver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub sample_rate_hz: f64,
    pub sample_format: SampleFormat,
    pub center_frequency_hz: f64,
    pub max_concurrent_tracked_svs: usize,
    pub acquisition: AcquisitionConfig,
    pub tracker: TrackerConfig,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 2.046e6,
            sample_format: SampleFormat::Float32Iq,
            center_frequency_hz: 1.57542e9,
            max_concurrent_tracked_svs: 10,
            acquisition: AcquisitionConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), ReceiverError> {
        if self.sample_rate_hz < 2.046e6 {
            return Err(ReceiverError::ConfigInvalid(format!(
                "sample_rate_hz must be >= 2.046e6, got {}",
                self.sample_rate_hz
            )));
        }
        if self.max_concurrent_tracked_svs == 0 || self.max_concurrent_tracked_svs > 32 {
            return Err(ReceiverError::ConfigInvalid(format!(
                "max_concurrent_tracked_svs out of range: {}",
                self.max_concurrent_tracked_svs
            )));
        }
        if self.acquisition.doppler_step_hz <= 0.0 {
            return Err(ReceiverError::ConfigInvalid(
                "acquisition_doppler_step_hz must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
