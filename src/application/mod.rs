// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Wires the lower layers together for one command each.
// No printing here; the CLI layer reports results.

// The distributed training workflow
pub mod train_use_case;

// The cover-similarity evaluation workflow
pub mod eval_use_case;
