// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From sample files on disk to host batches for one worker:
//
//   *.json sample files
//       │
//       ▼
//   SampleLoader          → reads and shape-checks every window
//       │
//       ▼
//   TranscriptionDataset  → implements burn's Dataset trait
//       │
//       ▼
//   DistributedSampler    → this worker's shard, reshuffled per epoch
//       │
//       ▼
//   BatchIter             → chunks the shard, collates via
//                           TranscriptionBatcher into HostBatch
//
// The upload to the device happens in the training step.

pub mod loader;

pub mod dataset;

pub mod batcher;

pub mod sampler;
