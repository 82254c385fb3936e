use std::fs;
use std::io;
use std::path::Path;

/// Inbound interrupt endpoint of the device's USB interface.
#[derive(Debug, Clone, Copy)]
pub struct InterruptEndpoint {
    pub address: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

/// Locate the interrupt IN endpoint for the given hidraw device by
/// walking its USB interface in sysfs. Returns `None` when the interface
/// carries no such endpoint.
pub fn find_interrupt_in(sysname: &str) -> io::Result<Option<InterruptEndpoint>> {
    let device = udev::Device::from_subsystem_sysname("hidraw".to_string(), sysname.to_string())?;
    let Some(interface) = device.parent_with_subsystem_devtype("usb", "usb_interface")? else {
        return Ok(None);
    };

    for entry in fs::read_dir(interface.syspath())? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with("ep_") {
            continue;
        }
        let ep = entry.path();
        if read_attr(&ep, "type").as_deref() != Some("Interrupt") {
            continue;
        }
        if read_attr(&ep, "direction").as_deref() != Some("in") {
            continue;
        }
        let Some(address) = read_hex_attr(&ep, "bEndpointAddress") else {
            continue;
        };
        let Some(max_packet_size) = read_hex_attr(&ep, "wMaxPacketSize") else {
            continue;
        };
        if max_packet_size == 0 {
            continue;
        }
        let interval = read_hex_attr(&ep, "bInterval").unwrap_or(0) as u8;

        let endpoint = InterruptEndpoint {
            address: address as u8,
            max_packet_size,
            interval,
        };
        log::debug!(
            "found interrupt IN endpoint 0x{:02x} on {}",
            endpoint.address,
            interface.syspath().display()
        );
        return Ok(Some(endpoint));
    }

    Ok(None)
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|value| value.trim().to_string())
}

fn read_hex_attr(dir: &Path, name: &str) -> Option<u16> {
    let value = read_attr(dir, name)?;
    u16::from_str_radix(&value, 16).ok()
}
