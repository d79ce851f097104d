//! Biquad filter and the two K-weighting stages of ITU-R BS.1770.

use std::f64::consts::PI;

/// A biquad IIR filter (2nd order).
///
/// Implements the standard Direct Form II Transposed structure with
/// coefficients already normalized so that `a0 == 1`.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    z1: f64,
    z2: f64,
}

impl BiquadFilter {
    /// Build from normalized coefficients `b = [b0, b1, b2]`, `a = [1, a1, a2]`.
    pub fn from_coefficients(b: [f64; 3], a: [f64; 3]) -> Self {
        BiquadFilter {
            b0: b[0] / a[0],
            b1: b[1] / a[0],
            b2: b[2] / a[0],
            a1: a[1] / a[0],
            a2: a[2] / a[0],
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Stage 1 of K-weighting: a +4 dB high shelf modelling the acoustic
    /// effect of the head.
    ///
    /// The analog prototype is re-discretized for `sample_rate`, which
    /// reproduces the coefficients published for 48 kHz.
    pub fn k_shelf(sample_rate: f64) -> Self {
        let f0 = 1681.974450955533;
        let g = 3.999843853973347;
        let q = 0.7071752369554196;

        let k = (PI * f0 / sample_rate).tan();
        let vh = 10.0_f64.powf(g / 20.0);
        let vb = vh.powf(0.4996667741545416);
        let a0 = 1.0 + k / q + k * k;

        BiquadFilter::from_coefficients(
            [
                (vh + vb * k / q + k * k) / a0,
                2.0 * (k * k - vh) / a0,
                (vh - vb * k / q + k * k) / a0,
            ],
            [1.0, 2.0 * (k * k - 1.0) / a0, (1.0 - k / q + k * k) / a0],
        )
    }

    /// Stage 2 of K-weighting: the RLB high-pass at roughly 38 Hz.
    pub fn k_highpass(sample_rate: f64) -> Self {
        let f0 = 38.13547087602444;
        let q = 0.5003270373238773;

        let k = (PI * f0 / sample_rate).tan();
        let a0 = 1.0 + k / q + k * k;

        BiquadFilter::from_coefficients(
            [1.0, -2.0, 1.0],
            [1.0, 2.0 * (k * k - 1.0) / a0, (1.0 - k / q + k * k) / a0],
        )
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// `[b0, b1, b2, a1, a2]`
    pub fn coefficients(&self) -> [f64; 5] {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
    }
}

/// The K-weighting cascade for one channel: shelf, then high-pass.
#[derive(Debug, Clone)]
pub struct KWeighting {
    shelf: BiquadFilter,
    highpass: BiquadFilter,
}

impl KWeighting {
    pub fn new(sample_rate: f64) -> Self {
        KWeighting {
            shelf: BiquadFilter::k_shelf(sample_rate),
            highpass: BiquadFilter::k_highpass(sample_rate),
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        self.highpass.process(self.shelf.process(input))
    }

    pub fn reset(&mut self) {
        self.shelf.reset();
        self.highpass.reset();
    }
}
