use std::error::Error;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::drivers::cando::driver::{AttachError, Driver};
use crate::drivers::cando::{decoder::TouchDecoder, hid_report};
use crate::input::touchscreen::TouchscreenDevice;
use crate::udev::DeviceInfo;
use crate::usb::endpoint;
use crate::usb::transfer::{HidrawTransport, TransferPipeline};

/// How long to sleep before polling for events.
const POLL_RATE: Duration = Duration::from_millis(1);

/// A [SourceCommand] is a message that can be sent to a running source
/// device over a channel.
#[derive(Debug, Clone)]
pub enum SourceCommand {
    Stop,
}

/// How reports are delivered from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Interrupt transfer pipeline on the hidraw node (default).
    Transfer,
    /// HID-report polling through hidapi.
    Poll,
}

/// A Cando touchscreen bound to a virtual input device.
#[derive(Debug)]
pub struct CandoTouchscreen {
    device: DeviceInfo,
    backend: Backend,
    rx: Option<mpsc::Receiver<SourceCommand>>,
}

impl CandoTouchscreen {
    pub fn new(device: DeviceInfo, backend: Backend, rx: mpsc::Receiver<SourceCommand>) -> Self {
        Self {
            device,
            backend,
            rx: Some(rx),
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        match self.backend {
            Backend::Transfer => self.run_transfer().await,
            Backend::Poll => self.run_poll().await,
        }
    }

    /// Run the interrupt transfer pipeline until stopped.
    async fn run_transfer(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::debug!("Starting Cando touchscreen (interrupt transfer)");
        let mut rx = self.rx.take().unwrap();

        let serial = self.device.serial.clone().ok_or(AttachError::Serial)?;
        log::info!("Attaching Cando touchscreen {serial}");

        hid_report::validate_layout(hid_report::FIELD_COUNT).map_err(AttachError::ReportLayout)?;

        let ep = endpoint::find_interrupt_in(&self.device.sysname)
            .map_err(AttachError::Io)?
            .ok_or(AttachError::MissingEndpoint)?;
        let transport = HidrawTransport::open(&self.device.devnode, ep).map_err(AttachError::Io)?;

        let screen =
            TouchscreenDevice::new().map_err(|e| AttachError::VirtualDevice(e.to_string()))?;

        let mut pipeline = TransferPipeline::start(transport, {
            let mut decoder = TouchDecoder::new();
            let mut screen = screen;
            move |buf| {
                let values = hid_report::parse_report(buf);
                let frame = decoder.decode_report(&values);
                if let Err(e) = screen.emit_frame(&frame) {
                    log::warn!("failed to emit input frame: {e}");
                }
            }
        })
        .map_err(AttachError::Transfer)?;

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(SourceCommand::Stop) => {
                        log::debug!("Received stop command");
                        break;
                    }
                    None => {
                        log::debug!("Receive channel disconnected");
                        break;
                    }
                },
                _ = pipeline.stopped() => {
                    log::warn!("transfer pipeline stopped on its own");
                    break;
                }
            }
        }

        pipeline.stop().await;
        log::debug!("Cando touchscreen stopped");
        Ok(())
    }

    /// Poll the HID layer for parsed reports until stopped.
    async fn run_poll(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::debug!("Starting Cando touchscreen (HID polling)");
        let mut rx = self.rx.take().unwrap();
        let devnode = self.device.devnode.clone();

        // Spawn a blocking task to read the reports
        let task =
            tokio::task::spawn_blocking(move || -> Result<(), Box<dyn Error + Send + Sync>> {
                let mut driver = Driver::new(devnode)?;
                log::info!("Attached Cando touchscreen {}", driver.serial());
                let mut screen = TouchscreenDevice::new()
                    .map_err(|e| AttachError::VirtualDevice(e.to_string()))?;

                loop {
                    let frame = driver.poll()?;
                    if let Err(e) = screen.emit_frame(&frame) {
                        log::warn!("failed to emit input frame: {e}");
                    }

                    match rx.try_recv() {
                        Ok(SourceCommand::Stop) => {
                            log::debug!("Received stop command");
                            break;
                        }
                        Err(TryRecvError::Empty) => (),
                        Err(TryRecvError::Disconnected) => {
                            log::debug!("Receive channel disconnected");
                            break;
                        }
                    }

                    thread::sleep(POLL_RATE);
                }

                Ok(())
            });

        if let Err(e) = task.await? {
            log::error!("Error running driver: {e:?}");
            return Err(e.to_string().into());
        }

        log::debug!("Cando touchscreen stopped");
        Ok(())
    }
}
