use candle_core::Device;
use std::error::Error;

/// Picks the first accelerator compiled in, unless `force_cpu` is set.
pub fn select_device(force_cpu: bool) -> Result<Device, Box<dyn Error>> {
    let device = if force_cpu {
        Device::Cpu
    } else {
        accelerator().unwrap_or(Device::Cpu)
    };

    log::info!("Training on {:?}", device);
    Ok(device)
}

#[allow(unreachable_code)]
fn accelerator() -> Option<Device> {
    #[cfg(feature = "cuda")]
    if let Ok(device) = Device::new_cuda(0) {
        return Some(device);
    }

    #[cfg(feature = "metal")]
    if let Ok(device) = Device::new_metal(0) {
        return Some(device);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_cpu() -> Result<(), Box<dyn Error>> {
        assert!(select_device(true)?.is_cpu());
        Ok(())
    }
}
