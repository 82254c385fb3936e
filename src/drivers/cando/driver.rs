use std::ffi::CString;
use std::io;

use hidapi::HidDevice;
use thiserror::Error;

use crate::usb::transfer::TransferError;

use super::decoder::TouchDecoder;
use super::event::TouchEvent;
use super::hid_report::{self, FIELD_COUNT, REPORT_SIZE};

/// Vendor ID
pub const VID: u16 = 0x2087;
/// Product ID
pub const PID: u16 = 0x0a01;

/// Errors that abort device bring-up. Partially constructed resources are
/// dropped before the error is returned, so no allocation outlives a
/// failed attach.
#[derive(Error, Debug)]
pub enum AttachError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),
    #[error("device is not a Cando touchscreen")]
    Identity,
    #[error("failed to read device serial number")]
    Serial,
    #[error("unexpected report layout: {0}")]
    ReportLayout(String),
    #[error("device has no interrupt IN endpoint")]
    MissingEndpoint,
    #[error("failed to create virtual touchscreen: {0}")]
    VirtualDevice(String),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Driver for the HID-report variant: the HID layer parses reports and
/// hands them over whole, no transfer pipeline involved.
#[derive(Debug)]
pub struct Driver {
    device: HidDevice,
    decoder: TouchDecoder,
    serial: String,
}

impl Driver {
    pub fn new(path: String) -> Result<Self, AttachError> {
        let path = CString::new(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let api = hidapi::HidApi::new()?;
        let device = api.open_path(&path)?;
        let info = device.get_device_info()?;
        if info.vendor_id() != VID || info.product_id() != PID {
            return Err(AttachError::Identity);
        }
        let serial = device
            .get_serial_number_string()?
            .ok_or(AttachError::Serial)?;
        hid_report::validate_layout(FIELD_COUNT).map_err(AttachError::ReportLayout)?;

        // Reads return immediately so the poll loop can observe commands
        device.set_blocking_mode(false)?;

        Ok(Self {
            device,
            decoder: TouchDecoder::new(),
            serial,
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Poll the device and decode one input report, if any arrived.
    pub fn poll(&mut self) -> Result<Vec<TouchEvent>, Box<dyn std::error::Error + Send + Sync>> {
        let mut buf = [0u8; REPORT_SIZE];
        let bytes_read = self.device.read(&mut buf[..])?;
        if bytes_read == 0 {
            return Ok(Vec::new());
        }

        let values = hid_report::parse_report(&buf[..bytes_read]);
        Ok(self.decoder.decode_report(&values))
    }
}
