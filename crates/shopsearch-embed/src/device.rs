use candle_core::Device;
use tracing::info;

/// Picks the accelerator compiled in via cargo features, falling back to CPU.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!("device: Metal (MPS)");
            return dev;
        }
    }
    #[cfg(feature = "cuda")]
    {
        if let Ok(dev) = Device::new_cuda(0) {
            info!("device: CUDA");
            return dev;
        }
    }
    info!("device: CPU");
    Device::Cpu
}
