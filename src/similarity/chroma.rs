// ============================================================
// Layer 7 — Chroma Profile
// ============================================================
// Mono signal → one 12-bin pitch-class profile per frame.
//
// Each frame is Hann-windowed and probed with a Goertzel filter
// at every equal-tempered pitch in [MIDI_LOW, MIDI_HIGH). The
// magnitudes fold into pitch classes (C = 0) and each frame is
// scaled so its strongest class is 1. Silent frames stay zero.

use std::f32::consts::PI;

use ndarray::{s, Array1, Array2, ArrayView1};

pub const N_CHROMA: usize = 12;

#[derive(Debug, Clone, Copy)]
pub struct ChromaConfig {
    pub sample_rate: u32,
    pub frame_len:   usize,
    pub hop:         usize,
    pub midi_low:    u8,
    pub midi_high:   u8,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            sample_rate: 11_025,
            frame_len:   2048,
            hop:         1024,
            midi_low:    48,
            midi_high:   96,
        }
    }
}

fn midi_to_hz(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}

fn goertzel_magnitude(frame: ArrayView1<f32>, coeff: f32) -> f32 {
    let (mut s1, mut s2) = (0.0f32, 0.0f32);
    for &x in frame {
        let s0 = x + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    (s1 * s1 + s2 * s2 - coeff * s1 * s2).max(0.0).sqrt()
}

pub struct ChromaExtractor {
    config: ChromaConfig,
    window: Array1<f32>,
    /// (pitch class, Goertzel coefficient) per probed pitch
    probes: Vec<(usize, f32)>,
}

impl ChromaExtractor {
    pub fn new(config: ChromaConfig) -> Self {
        let n = config.frame_len;
        let window = Array1::from_shape_fn(n, |i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos());
        let nyquist = config.sample_rate as f32 / 2.0;
        let probes = (config.midi_low..config.midi_high)
            .map(|m| (m, midi_to_hz(m)))
            .filter(|&(_, hz)| hz < nyquist)
            .map(|(m, hz)| {
                let w = 2.0 * PI * hz / config.sample_rate as f32;
                (m as usize % N_CHROMA, 2.0 * w.cos())
            })
            .collect();
        Self { config, window, probes }
    }

    pub fn config(&self) -> &ChromaConfig {
        &self.config
    }

    /// Number of whole frames that fit in `n_samples`.
    pub fn n_frames(&self, n_samples: usize) -> usize {
        if n_samples < self.config.frame_len {
            0
        } else {
            1 + (n_samples - self.config.frame_len) / self.config.hop
        }
    }

    /// Shape (frames, 12).
    pub fn extract(&self, signal: &Array1<f32>) -> Array2<f32> {
        let n_frames = self.n_frames(signal.len());
        let mut chroma = Array2::<f32>::zeros((n_frames, N_CHROMA));

        for (f, mut row) in chroma.outer_iter_mut().enumerate() {
            let start  = f * self.config.hop;
            let frame  = &signal.slice(s![start..start + self.config.frame_len]) * &self.window;
            for &(pc, coeff) in &self.probes {
                row[pc] += goertzel_magnitude(frame.view(), coeff);
            }
            let peak = row.fold(0.0f32, |m, &v| m.max(v));
            if peak > f32::EPSILON {
                row.mapv_inplace(|v| v / peak);
            }
        }
        chroma
    }
}
