// ============================================================
// Layer 5 — Model Factory
// ============================================================
// Builds the encoder + decoder pair from the config, directly on
// the requested device, and optionally loads serialized weights.
//
// Weight selection:
//   encoder → explicit path, else default.encoder
//   decoder → explicit path, else default.decoder_amt (transcription)
//                                 or default.decoder_pc  (cover)
//
// A missing file, an undecodable record or a record whose tensors
// do not match the configured shapes one by one is a WeightLoadError. There is
// no fallback to random weights once loading was requested.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use burn::{
    module::{ModuleVisitor, ParamId},
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::data::batcher::panic_message;
use crate::domain::config::AppConfig;
use crate::domain::error::WeightLoadError;
use crate::infra::checkpoint::record_path;
use crate::ml::model::{DecoderConfig, EncoderConfig, Spec2Midi};

/// Which decoder the model is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelMode {
    /// Automatic music transcription, conditioned on an sv vector
    Transcription { sv_dim: usize },
    /// Pitch-class model used by the cover-similarity pipeline
    Cover,
}

/// Where weights come from.
#[derive(Debug, Clone, Default)]
pub enum WeightSource {
    /// Load files; `None` entries fall back to the config defaults
    Files {
        encoder: Option<PathBuf>,
        decoder: Option<PathBuf>,
    },
    /// Keep the random initialisation
    #[default]
    Fresh,
}

impl WeightSource {
    pub fn defaults() -> Self {
        WeightSource::Files { encoder: None, decoder: None }
    }
}

pub struct ModelFactory<'a> {
    config: &'a AppConfig,
}

impl<'a> ModelFactory<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        let c = self.config;
        EncoderConfig::new(
            c.data.input.margin_b,
            c.data.input.num_frame,
            c.data.feature.n_bins,
            c.model.cnn.channel,
            c.model.cnn.kernel,
            c.model.transformer.hid_dim,
            c.model.transformer.encoder.n_layer,
            c.model.transformer.encoder.n_head,
            c.model.transformer.pf_dim,
            c.model.training.dropout,
        )
    }

    pub fn decoder_config(&self, mode: ModelMode) -> DecoderConfig {
        let c = self.config;
        let sv_dim = match mode {
            ModelMode::Transcription { sv_dim } => sv_dim,
            ModelMode::Cover => 0,
        };
        DecoderConfig::new(
            c.data.input.num_frame,
            c.data.midi.num_note,
            c.data.midi.num_velocity,
            c.model.transformer.hid_dim,
            c.model.transformer.decoder.n_layer,
            c.model.transformer.decoder.n_head,
            c.model.transformer.pf_dim,
            c.model.training.dropout,
        )
        .with_sv_dim(sv_dim)
    }

    fn default_decoder_path(&self, mode: ModelMode) -> &Path {
        match mode {
            ModelMode::Transcription { .. } => &self.config.default.decoder_amt,
            ModelMode::Cover => &self.config.default.decoder_pc,
        }
    }

    pub fn load<B: Backend>(
        &self,
        device:  &B::Device,
        mode:    ModelMode,
        weights: &WeightSource,
    ) -> Result<Spec2Midi<B>, WeightLoadError> {
        let encoder = self.encoder_config().init::<B>(device);
        let decoder = self.decoder_config(mode).init::<B>(device);

        let (encoder, decoder) = match weights {
            WeightSource::Fresh => (encoder, decoder),
            WeightSource::Files { encoder: enc_path, decoder: dec_path } => {
                let enc_path = enc_path.as_deref().unwrap_or(&self.config.default.encoder);
                let dec_path = dec_path.as_deref().unwrap_or(self.default_decoder_path(mode));
                (
                    load_weights(encoder, enc_path, "encoder", device)?,
                    load_weights(decoder, dec_path, "decoder", device)?,
                )
            }
        };

        let model = Spec2Midi::new(encoder, decoder);
        tracing::info!(
            "Model ready: {:?}, {} parameters",
            mode,
            model.num_params()
        );
        Ok(model)
    }
}

/// Replace `module`'s parameters with the record stored at `path`.
pub fn load_weights<B: Backend, M: Module<B>>(
    module: M,
    path:   &Path,
    part:   &'static str,
    device: &B::Device,
) -> Result<M, WeightLoadError> {
    let file = record_path(path);
    if !file.exists() {
        return Err(WeightLoadError::Missing(file));
    }

    let record: M::Record = CompactRecorder::new()
        .load(path.to_path_buf(), device)
        .map_err(|e| WeightLoadError::Record { path: file.clone(), reason: e.to_string() })?;

    let expected = param_shapes::<B, M>(&module);
    let loaded = catch_unwind(AssertUnwindSafe(|| module.load_record(record)))
        .map_err(|payload| WeightLoadError::Incompatible {
            path:   file.clone(),
            part,
            reason: panic_message(payload.as_ref()),
        })?;

    let found = param_shapes::<B, M>(&loaded);
    if let Some(reason) = shape_mismatch(&expected, &found) {
        return Err(WeightLoadError::Incompatible { path: file, part, reason });
    }

    tracing::debug!("Loaded {part} weights from '{}'", file.display());
    Ok(loaded)
}

struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for ShapeCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.shapes.push(tensor.dims().to_vec());
    }
}

/// Shape of every float parameter, in visit order.
fn param_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut collector = ShapeCollector { shapes: Vec::new() };
    module.visit(&mut collector);
    collector.shapes
}

fn shape_mismatch(expected: &[Vec<usize>], found: &[Vec<usize>]) -> Option<String> {
    if expected.len() != found.len() {
        return Some(format!(
            "expected {} parameter tensors, found {}",
            expected.len(),
            found.len()
        ));
    }
    expected
        .iter()
        .zip(found)
        .position(|(e, f)| e != f)
        .map(|i| format!("parameter {i}: expected shape {:?}, found {:?}", expected[i], found[i]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::fixtures::tiny_config;
    use crate::infra::checkpoint::save_module;
    use burn::backend::NdArray;
    use burn::nn::LinearConfig;

    type B = NdArray;

    #[test]
    fn dims_follow_config() {
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = tiny_config(dir.path());
        let device = Default::default();
        let model  = ModelFactory::new(&cfg)
            .load::<B>(&device, ModelMode::Transcription { sv_dim: cfg.model.sv_dim }, &WeightSource::Fresh)
            .unwrap();

        let dims = model.dims();
        assert_eq!(dims.n_bins, cfg.data.feature.n_bins);
        assert_eq!(dims.cnn_channel, cfg.model.cnn.channel);
        assert_eq!(dims.cnn_kernel, cfg.model.cnn.kernel);
        assert_eq!(dims.hid_dim, cfg.model.transformer.hid_dim);
        assert_eq!(dims.num_frame, cfg.data.input.num_frame);
        assert_eq!(dims.num_note, cfg.data.midi.num_note);
        assert_eq!(dims.num_velocity, cfg.data.midi.num_velocity);
        assert_eq!(dims.sv_dim, cfg.model.sv_dim);
    }

    #[test]
    fn forward_shapes_follow_config() {
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = tiny_config(dir.path());
        let shape  = cfg.sample_shape();
        let device = Default::default();
        let model  = ModelFactory::new(&cfg)
            .load::<B>(&device, ModelMode::Transcription { sv_dim: shape.sv_dim }, &WeightSource::Fresh)
            .unwrap();

        let spec = Tensor::<B, 3>::zeros([2, shape.input_frames, shape.n_bins], &device);
        let sv   = Tensor::<B, 2>::zeros([2, shape.sv_dim], &device);
        let out  = model.forward(spec, sv);
        assert_eq!(out.onset.dims(), [2, shape.num_frame, shape.num_note]);
        assert_eq!(out.mpe.dims(), [2, shape.num_frame, shape.num_note]);
        assert_eq!(out.velocity.dims(), [2, shape.num_frame, shape.num_note, shape.num_velocity]);
    }

    #[test]
    fn cover_mode_has_no_conditioning() {
        let dir    = tempfile::tempdir().unwrap();
        let cfg    = tiny_config(dir.path());
        let device = Default::default();
        let model  = ModelFactory::new(&cfg)
            .load::<B>(&device, ModelMode::Cover, &WeightSource::Fresh)
            .unwrap();
        assert_eq!(model.dims().sv_dim, 0);
    }

    #[test]
    fn default_paths_are_chosen_by_mode() {
        let dir     = tempfile::tempdir().unwrap();
        let cfg     = tiny_config(dir.path());
        let device  = Default::default();
        let factory = ModelFactory::new(&cfg);

        let built = factory
            .load::<B>(&device, ModelMode::Cover, &WeightSource::Fresh)
            .unwrap();
        save_module::<B, _>(&built.encoder, &cfg.default.encoder).unwrap();
        save_module::<B, _>(&built.decoder, &cfg.default.decoder_pc).unwrap();

        // Cover weights exist, so cover mode loads...
        assert!(factory.load::<B>(&device, ModelMode::Cover, &WeightSource::defaults()).is_ok());

        // ...while transcription mode looks for decoder_amt, which does not.
        let err = factory
            .load::<B>(&device, ModelMode::Transcription { sv_dim: 3 }, &WeightSource::defaults())
            .unwrap_err();
        assert!(matches!(err, WeightLoadError::Missing(p) if p.ends_with("decoder_amt.mpk")));
    }

    #[test]
    fn explicit_paths_override_defaults() {
        let dir     = tempfile::tempdir().unwrap();
        let cfg     = tiny_config(dir.path());
        let device  = Default::default();
        let factory = ModelFactory::new(&cfg);
        let mode    = ModelMode::Transcription { sv_dim: 3 };

        let built = factory.load::<B>(&device, mode, &WeightSource::Fresh).unwrap();
        let enc   = dir.path().join("custom/enc");
        let dec   = dir.path().join("custom/dec");
        save_module::<B, _>(&built.encoder, &enc).unwrap();
        save_module::<B, _>(&built.decoder, &dec).unwrap();

        let source = WeightSource::Files { encoder: Some(enc), decoder: Some(dec) };
        let loaded = factory.load::<B>(&device, mode, &source).unwrap();
        assert_eq!(loaded.dims(), built.dims());
    }

    #[test]
    fn shape_incompatible_weights_are_rejected() {
        let dir     = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(dir.path());
        let device  = Default::default();

        // Save a decoder built for a wider keyboard...
        cfg.data.midi.num_note = 7;
        let wide = ModelFactory::new(&cfg)
            .load::<B>(&device, ModelMode::Cover, &WeightSource::Fresh)
            .unwrap();
        save_module::<B, _>(&wide.decoder, &cfg.default.decoder_pc).unwrap();
        save_module::<B, _>(&wide.encoder, &cfg.default.encoder).unwrap();

        // ...then try to load it into the configured one.
        cfg.data.midi.num_note = 5;
        let err = ModelFactory::new(&cfg)
            .load::<B>(&device, ModelMode::Cover, &WeightSource::defaults())
            .unwrap_err();
        assert!(matches!(err, WeightLoadError::Incompatible { part: "decoder", .. }));
    }

    #[test]
    fn transposed_weights_with_equal_count_are_rejected() {
        let dir    = tempfile::tempdir().unwrap();
        let path   = dir.path().join("linear");
        let device = Default::default();

        let saved = LinearConfig::new(3, 4).with_bias(false).init::<B>(&device);
        save_module::<B, _>(&saved, &path).unwrap();

        let target = LinearConfig::new(4, 3).with_bias(false).init::<B>(&device);
        assert_eq!(saved.num_params(), target.num_params());

        let err = load_weights::<B, _>(target, &path, "decoder", &device).unwrap_err();
        assert!(matches!(err, WeightLoadError::Incompatible { part: "decoder", .. }), "got {err:?}");
    }

    #[test]
    fn shape_mismatch_names_the_first_differing_parameter() {
        let a = vec![vec![2, 3], vec![3]];
        assert_eq!(shape_mismatch(&a, &a), None);
        assert_eq!(
            shape_mismatch(&a, &[vec![2, 3], vec![4]]).unwrap(),
            "parameter 1: expected shape [3], found [4]"
        );
        assert!(shape_mismatch(&a, &[vec![2, 3]]).unwrap().contains("parameter tensors"));
    }
}
