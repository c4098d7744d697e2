use rustfft::num_complex::Complex64;

/// A complex baseband sample. Type alias rather than a new wrapper: the
/// receiver's hot loops (FFT, mix-and-correlate) want this to be exactly
/// `rustfft`'s own complex type, with no newtype friction at the boundary.
pub type Sample = Complex64;

/// A contiguous window of baseband samples with a known sample rate and an
/// absolute starting sample index.
#[derive(Clone)]
pub struct SampleWindow {
    pub samples: Vec<Sample>,
    pub sample_rate_hz: f64,
    pub start_sample_index: u64,
}

/// Intermediate result of one Doppler-bin correlation search, reused across
/// the narrowing acquisition search and the one-shot tracking acquisition.
#[derive(Default, Clone, Copy)]
pub struct GnssCorrelationParam {
    pub doppler_hz: f64,
    pub code_phase_samples: usize,
    pub peak_snr_db: f64,
    pub corr_power: f64,
}

/// One SV's successful acquisition: a Doppler/code-phase hit good enough to
/// hand off to a tracker.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionResult {
    pub sv_id: u8,
    pub doppler_hz: f64,
    pub code_phase_samples: f64,
    pub peak_snr_db: f64,
    pub acquired_at_sample_index: u64,
}

/// Prompt correlator output, emitted once per completed 1 ms code period.
#[derive(Debug, Clone, Copy)]
pub struct PromptSample {
    pub sv_id: u8,
    pub t_rx_sample_index: u64,
    pub i_prompt: f64,
    pub q_prompt: f64,
}

impl PromptSample {
    pub fn magnitude_sq(&self) -> f64 {
        self.i_prompt * self.i_prompt + self.q_prompt * self.q_prompt
    }
}

/// One navigation data bit, produced at 50 Hz per SV after bit sync.
#[derive(Debug, Clone, Copy)]
pub struct NavBit {
    pub sv_id: u8,
    pub bit_value: u8,
    pub t_rx_start_sample_index: u64,
}
