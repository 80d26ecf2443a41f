// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types shared by every other layer:
//
//   config.rs  — the typed configuration document
//   error.rs   — error taxonomy for training and evaluation
//   traits.rs  — collaborator seams used by the evaluator
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only structs, enums and traits

pub mod config;

pub mod error;

pub mod traits;
