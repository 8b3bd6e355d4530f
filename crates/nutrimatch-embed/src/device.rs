use candle_core::Device;

/// Metal when compiled with the `metal` feature and requested; CPU otherwise.
pub fn select_device(prefer_gpu: bool) -> Device {
    #[cfg(feature = "metal")]
    {
        if prefer_gpu {
            match Device::new_metal(0) {
                Ok(dev) => {
                    tracing::info!("device: Metal (MPS)");
                    return dev;
                }
                Err(e) => tracing::warn!(error = %e, "Metal unavailable, falling back to CPU"),
            }
        }
    }
    #[cfg(not(feature = "metal"))]
    if prefer_gpu {
        tracing::warn!("GPU requested but built without the `metal` feature");
    }
    tracing::info!("device: CPU");
    Device::Cpu
}
