// ============================================================
// Layer 5 — Backend Selection
// ============================================================
// Training runs on Autodiff<InferBackend>; evaluation and inference
// run on InferBackend directly, so they skip the autodiff overhead.
//
//   default build      → NdArray (CPU)
//   --features wgpu    → Wgpu (GPU)

use burn::prelude::Backend;

#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;

pub type TrainBackend = burn::backend::Autodiff<InferBackend>;

pub type Device = <InferBackend as Backend>::Device;

pub fn default_device() -> Device {
    let device = Device::default();
    tracing::info!("Using device: {:?}", device);
    device
}
