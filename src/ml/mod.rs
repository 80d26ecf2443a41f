// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that touches Burn tensors lives here.
//
//   model.rs        — CNN front-end + transformer encoder/decoder
//   factory.rs      — builds the model, loads pre-trained weights
//   loss.rs         — multi-task loss and frame-level F1
//   collective.rs   — in-process gradient all-reduce between workers
//   role.rs         — parent / worker behaviour at step and epoch ends
//   step.rs         — one epoch of optimizer steps
//   orchestrator.rs — spawns workers and drives the epoch loop
//   backend.rs      — production backend and device selection

pub mod model;

pub mod factory;

pub mod loss;

pub mod collective;

pub mod role;

pub mod step;

pub mod orchestrator;

pub mod backend;
