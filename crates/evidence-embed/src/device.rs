use candle_core::Device;
use tracing::{info, warn};

/// Metal when compiled in and available, CPU otherwise. `APP_DEVICE=cpu`
/// forces the CPU.
pub fn select_device() -> Device {
    let forced_cpu = std::env::var("APP_DEVICE").is_ok_and(|d| d.eq_ignore_ascii_case("cpu"));
    #[cfg(feature = "metal")]
    if !forced_cpu {
        match Device::new_metal(0) {
            Ok(dev) => {
                info!("embedding device: metal");
                return dev;
            }
            Err(e) => warn!(error = %e, "metal unavailable, falling back to cpu"),
        }
    }
    if forced_cpu {
        warn!("APP_DEVICE=cpu set; skipping accelerators");
    }
    info!("embedding device: cpu");
    Device::Cpu
}
