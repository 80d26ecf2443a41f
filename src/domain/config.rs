// ============================================================
// Layer 3 — Application Configuration
// ============================================================
// Typed mirror of models/config.json.
//
// The JSON document is hierarchical:
//   default   — weight file paths per sub-model
//   model     — network hyperparameters
//   data      — input/label shapes
//   training  — run settings (optional, every key defaulted)
//
// The config is built once in main, validated, wrapped in an
// Arc and handed to every component. Nothing re-reads the file.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub default: DefaultPaths,
    pub model:   ModelSection,
    pub data:    DataSection,
    #[serde(default)]
    pub training: TrainingSection,
}

/// Weight file locations used when the caller gives no explicit path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultPaths {
    pub encoder:     PathBuf,
    pub decoder_pc:  PathBuf,
    pub decoder_amt: PathBuf,
    /// Canonical "current" weights, overwritten by periodic saves
    pub pc:          PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    pub sv_dim:      usize,
    pub cnn:         CnnSection,
    pub transformer: TransformerSection,
    pub training:    ModelTrainingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CnnSection {
    pub channel: usize,
    pub kernel:  usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformerSection {
    pub hid_dim: usize,
    pub pf_dim:  usize,
    pub encoder: StackSection,
    pub decoder: StackSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSection {
    pub n_layer: usize,
    pub n_head:  usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainingSection {
    pub dropout: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSection {
    pub input:   InputSection,
    pub feature: FeatureSection,
    pub midi:    MidiSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSection {
    /// Context frames on each side of the predicted window
    pub margin_b:  usize,
    pub num_frame: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSection {
    pub n_bins: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiSection {
    pub num_note:     usize,
    pub num_velocity: usize,
}

/// Run settings. Every field has a default so older config files
/// without a `training` section still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    pub learning_rate:    f64,
    /// Periodic save cadence in steps; 0 disables mid-epoch saves
    pub save_every:       usize,
    pub checkpoint_dir:   PathBuf,
    pub log_file:         String,
    pub seed:             u64,
    pub utc_offset_hours: i32,
    /// Start from the default weight files instead of a fresh init
    pub pretrained:       bool,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            learning_rate:    1e-4,
            save_every:       100,
            checkpoint_dir:   PathBuf::from("models/params/checkpoints"),
            log_file:         "log.txt".to_string(),
            seed:             0,
            utc_offset_hours: 9,
            pretrained:       true,
        }
    }
}

impl TrainingSection {
    /// Zone used for run-directory names and log timestamps.
    pub fn timezone(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "training.utc_offset_hours out of range: {}",
                    self.utc_offset_hours
                ))
            })
    }
}

/// Per-sample array shapes implied by the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleShape {
    /// Spectrogram frames including both margins
    pub input_frames: usize,
    pub n_bins:       usize,
    pub sv_dim:       usize,
    pub num_frame:    usize,
    pub num_note:     usize,
    pub num_velocity: usize,
}

impl SampleShape {
    pub fn spec_len(&self) -> usize {
        self.input_frames * self.n_bins
    }

    pub fn label_len(&self) -> usize {
        self.num_frame * self.num_note
    }
}

impl AppConfig {
    /// Check the cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.model.transformer;

        let positive = [
            ("data.input.num_frame",            self.data.input.num_frame),
            ("data.feature.n_bins",             self.data.feature.n_bins),
            ("data.midi.num_note",              self.data.midi.num_note),
            ("data.midi.num_velocity",          self.data.midi.num_velocity),
            ("model.cnn.channel",               self.model.cnn.channel),
            ("model.cnn.kernel",                self.model.cnn.kernel),
            ("model.transformer.hid_dim",       t.hid_dim),
            ("model.transformer.pf_dim",        t.pf_dim),
            ("model.transformer.encoder.n_head", t.encoder.n_head),
            ("model.transformer.decoder.n_head", t.decoder.n_head),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
            }
        }

        // Same-padding convolution needs a centre tap.
        if self.model.cnn.kernel % 2 == 0 {
            return Err(ConfigError::Invalid(format!(
                "model.cnn.kernel must be odd, got {}",
                self.model.cnn.kernel
            )));
        }

        for (name, stack) in [("encoder", &t.encoder), ("decoder", &t.decoder)] {
            if t.hid_dim % stack.n_head != 0 {
                return Err(ConfigError::Invalid(format!(
                    "model.transformer.hid_dim ({}) is not divisible by {name}.n_head ({})",
                    t.hid_dim, stack.n_head
                )));
            }
        }

        let dropout = self.model.training.dropout;
        if !(0.0..1.0).contains(&dropout) {
            return Err(ConfigError::Invalid(format!(
                "model.training.dropout must be in [0, 1), got {dropout}"
            )));
        }

        if self.training.learning_rate <= 0.0 {
            return Err(ConfigError::Invalid("training.learning_rate must be positive".into()));
        }

        self.training.timezone()?;

        Ok(())
    }

    pub fn sample_shape(&self) -> SampleShape {
        SampleShape {
            input_frames: self.data.input.num_frame + 2 * self.data.input.margin_b,
            n_bins:       self.data.feature.n_bins,
            sv_dim:       self.model.sv_dim,
            num_frame:    self.data.input.num_frame,
            num_note:     self.data.midi.num_note,
            num_velocity: self.data.midi.num_velocity,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::tiny_config;
    use super::*;

    #[test]
    fn tiny_config_is_valid() {
        let cfg = tiny_config(std::path::Path::new("/tmp"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_indivisible_head_count() {
        let mut cfg = tiny_config(std::path::Path::new("/tmp"));
        cfg.model.transformer.decoder.n_head = 3;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("decoder.n_head"));
    }

    #[test]
    fn rejects_even_kernel() {
        let mut cfg = tiny_config(std::path::Path::new("/tmp"));
        cfg.model.cnn.kernel = 4;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_out_of_range_utc_offset() {
        let mut cfg = tiny_config(std::path::Path::new("/tmp"));
        cfg.training.utc_offset_hours = 30;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("utc_offset_hours"));

        cfg.training.utc_offset_hours = -12;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn sample_shape_includes_margins() {
        let cfg   = tiny_config(std::path::Path::new("/tmp"));
        let shape = cfg.sample_shape();
        assert_eq!(shape.input_frames, 6);
        assert_eq!(shape.spec_len(), 36);
        assert_eq!(shape.label_len(), 20);
    }

    #[test]
    fn training_section_is_optional() {
        let json = serde_json::json!({
            "default": {
                "encoder": "e", "decoder_pc": "d", "decoder_amt": "a", "pc": "p"
            },
            "model": {
                "sv_dim": 2,
                "cnn": { "channel": 4, "kernel": 5 },
                "transformer": {
                    "hid_dim": 16, "pf_dim": 32,
                    "encoder": { "n_layer": 1, "n_head": 2 },
                    "decoder": { "n_layer": 1, "n_head": 2 }
                },
                "training": { "dropout": 0.1 }
            },
            "data": {
                "input": { "margin_b": 2, "num_frame": 8 },
                "feature": { "n_bins": 16 },
                "midi": { "num_note": 88, "num_velocity": 128 }
            }
        });
        let cfg: AppConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.training.save_every, 100);
        assert_eq!(cfg.training.log_file, "log.txt");
        assert!(cfg.validate().is_ok());
    }
}
