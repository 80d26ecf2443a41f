// ============================================================
// Layer 5 — Transcription Model
// ============================================================
// Spec2Midi = Encoder (CNN front-end + transformer) followed by a
// Decoder with onset / offset / frame / velocity heads. Modules are
// built directly on the target device from their Config structs.

use burn::{
    nn::{
        conv::{Conv1d, Conv1dConfig},
        transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
        PaddingConfig1d,
    },
    prelude::*,
};

// ─── Encoder ──────────────────────────────────────────────────────────────────
// spec [batch, num_frame + 2*margin, n_bins]
//   → conv over time (same padding), drop the margins
//   → project to hid_dim, add frame positions
//   → transformer stack
//   → [batch, num_frame, hid_dim]

#[derive(Config, Debug)]
pub struct EncoderConfig {
    pub n_margin:    usize,
    pub n_frame:     usize,
    pub n_bin:       usize,
    pub cnn_channel: usize,
    pub cnn_kernel:  usize,
    pub hid_dim:     usize,
    pub n_layers:    usize,
    pub n_heads:     usize,
    pub pf_dim:      usize,
    pub dropout:     f64,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        let conv = Conv1dConfig::new(self.n_bin, self.cnn_channel, self.cnn_kernel)
            .with_padding(PaddingConfig1d::Same)
            .init(device);
        let proj     = LinearConfig::new(self.cnn_channel, self.hid_dim).init(device);
        let position = EmbeddingConfig::new(self.n_frame, self.hid_dim).init(device);
        let layers   = TransformerEncoderConfig::new(self.hid_dim, self.pf_dim, self.n_heads, self.n_layers)
            .with_dropout(self.dropout)
            .init(device);
        let dropout  = DropoutConfig::new(self.dropout).init();
        Encoder {
            conv, proj, position, layers, dropout,
            n_margin: self.n_margin,
            n_frame:  self.n_frame,
        }
    }
}

#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub conv:     Conv1d<B>,
    pub proj:     Linear<B>,
    pub position: Embedding<B>,
    pub layers:   TransformerEncoder<B>,
    pub dropout:  Dropout,
    pub n_margin: usize,
    pub n_frame:  usize,
}

impl<B: Backend> Encoder<B> {
    pub fn forward(&self, spec: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch_size, _, _] = spec.dims();

        // Conv1d wants channels before time: [batch, n_bins, frames]
        let x = self.conv.forward(spec.swap_dims(1, 2));
        let [_, channels, _] = x.dims();
        let x = x
            .slice([0..batch_size, 0..channels, self.n_margin..self.n_margin + self.n_frame])
            .swap_dims(1, 2);
        let x = self.proj.forward(x);

        let positions = Tensor::<B, 1, Int>::arange(0..self.n_frame as i64, &x.device())
            .unsqueeze::<2>()
            .expand([batch_size, self.n_frame]);
        let x = self.dropout.forward(x + self.position.forward(positions));

        self.layers.forward(TransformerEncoderInput::new(x))
    }
}

// ─── Decoder ──────────────────────────────────────────────────────────────────
// encoded [batch, num_frame, hid_dim] (+ projected conditioning vector)
//   → transformer stack
//   → four heads: onset / offset / mpe logits [batch, num_frame, num_note]
//                 velocity logits [batch, num_frame, num_note, num_velocity]

#[derive(Config, Debug)]
pub struct DecoderConfig {
    pub n_frame:    usize,
    pub n_note:     usize,
    pub n_velocity: usize,
    pub hid_dim:    usize,
    pub n_layers:   usize,
    pub n_heads:    usize,
    pub pf_dim:     usize,
    pub dropout:    f64,
    /// Conditioning vector width; 0 builds a decoder that ignores sv
    #[config(default = 0)]
    pub sv_dim:     usize,
}

impl DecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Decoder<B> {
        let sv_proj = (self.sv_dim > 0)
            .then(|| LinearConfig::new(self.sv_dim, self.hid_dim).init(device));
        let layers = TransformerEncoderConfig::new(self.hid_dim, self.pf_dim, self.n_heads, self.n_layers)
            .with_dropout(self.dropout)
            .init(device);
        let head = |out: usize| LinearConfig::new(self.hid_dim, out).init(device);
        Decoder {
            sv_proj,
            layers,
            onset:      head(self.n_note),
            offset:     head(self.n_note),
            mpe:        head(self.n_note),
            velocity:   head(self.n_note * self.n_velocity),
            n_note:     self.n_note,
            n_velocity: self.n_velocity,
        }
    }
}

#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub sv_proj:    Option<Linear<B>>,
    pub layers:     TransformerEncoder<B>,
    pub onset:      Linear<B>,
    pub offset:     Linear<B>,
    pub mpe:        Linear<B>,
    pub velocity:   Linear<B>,
    pub n_note:     usize,
    pub n_velocity: usize,
}

/// Raw logits of the four transcription heads.
pub struct Spec2MidiOutput<B: Backend> {
    pub onset:    Tensor<B, 3>,
    pub offset:   Tensor<B, 3>,
    pub mpe:      Tensor<B, 3>,
    pub velocity: Tensor<B, 4>,
}

impl<B: Backend> Decoder<B> {
    pub fn forward(&self, encoded: Tensor<B, 3>, sv: Tensor<B, 2>) -> Spec2MidiOutput<B> {
        let [batch_size, n_frame, hid_dim] = encoded.dims();

        let x = match &self.sv_proj {
            Some(proj) => {
                let cond = proj
                    .forward(sv)
                    .unsqueeze_dim::<3>(1)
                    .expand([batch_size, n_frame, hid_dim]);
                encoded + cond
            }
            None => encoded,
        };
        let x = self.layers.forward(TransformerEncoderInput::new(x));

        Spec2MidiOutput {
            onset:    self.onset.forward(x.clone()),
            offset:   self.offset.forward(x.clone()),
            mpe:      self.mpe.forward(x.clone()),
            velocity: self
                .velocity
                .forward(x)
                .reshape([batch_size, n_frame, self.n_note, self.n_velocity]),
        }
    }
}

// ─── Spec2Midi ────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct Spec2Midi<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
}

/// Dimensions read back from the built weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDims {
    pub n_bins:       usize,
    pub cnn_channel:  usize,
    pub cnn_kernel:   usize,
    pub hid_dim:      usize,
    pub num_frame:    usize,
    pub num_note:     usize,
    pub num_velocity: usize,
    pub sv_dim:       usize,
}

impl<B: Backend> Spec2Midi<B> {
    pub fn new(encoder: Encoder<B>, decoder: Decoder<B>) -> Self {
        Self { encoder, decoder }
    }

    pub fn forward(&self, spec: Tensor<B, 3>, sv: Tensor<B, 2>) -> Spec2MidiOutput<B> {
        self.decoder.forward(self.encoder.forward(spec), sv)
    }

    pub fn dims(&self) -> ModelDims {
        // Conv1d weight: [channels_out, channels_in, kernel]
        let [cnn_channel, n_bins, cnn_kernel] = self.encoder.conv.weight.val().dims();
        // Linear weight: [d_input, d_output]
        let [_, hid_dim] = self.encoder.proj.weight.val().dims();
        let [num_frame, _] = self.encoder.position.weight.val().dims();
        let [_, num_note] = self.decoder.mpe.weight.val().dims();
        let sv_dim = self
            .decoder
            .sv_proj
            .as_ref()
            .map(|p| p.weight.val().dims()[0])
            .unwrap_or(0);

        ModelDims {
            n_bins,
            cnn_channel,
            cnn_kernel,
            hid_dim,
            num_frame,
            num_note,
            num_velocity: self.decoder.n_velocity,
            sv_dim,
        }
    }
}
