// ============================================================
// Layer 5 — Training Backend
// ============================================================
// Production training runs on wgpu with autodiff. Tests use the
// ndarray backend instead, so nothing here is exercised by them.

use burn::backend::{wgpu::WgpuDevice, Autodiff, Wgpu};

pub type TrainBackend = Autodiff<Wgpu>;

/// Device for `rank`. A single worker takes the default adapter;
/// in a group each rank is pinned to its own discrete GPU.
pub fn device_for_rank(rank: usize, world_size: usize) -> WgpuDevice {
    if world_size > 1 {
        WgpuDevice::DiscreteGpu(rank)
    } else {
        WgpuDevice::default()
    }
}
