use std::env;
use std::error::Error;
use std::process;

use clap::Parser;
use tokio::sync::mpsc;

use crate::cli::Args;
use crate::input::source::{Backend, CandoTouchscreen, SourceCommand};

mod cli;
mod drivers;
mod input;
mod udev;
mod usb;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let log_level = match env::var("LOG_LEVEL") {
        Ok(value) => value,
        Err(_) => "info".to_string(),
    };
    env::set_var("RUST_LOG", log_level);
    env_logger::init();
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    log::info!("Starting candod v{}", VERSION);

    let args = Args::parse();

    // Find a touchscreen to attach to
    let device = match args.device.as_deref() {
        Some(devnode) => udev::from_devnode(devnode)?,
        None => {
            let mut devices = udev::discover()?;
            if devices.is_empty() {
                log::error!("No Cando touchscreen found");
                process::exit(1);
            }
            devices.remove(0)
        }
    };
    log::info!(
        "Using touchscreen {} ({}, serial {})",
        device.devnode,
        device.syspath,
        device.serial.as_deref().unwrap_or("unknown")
    );

    let backend = if args.poll {
        Backend::Poll
    } else {
        Backend::Transfer
    };

    // Setup CTRL+C handler
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.unwrap();
        log::info!("Shutting down");
        let _ = tx.send(SourceCommand::Stop).await;
    });

    let mut source = CandoTouchscreen::new(device, backend, rx);
    source.run().await?;

    log::info!("candod stopped");

    Ok(())
}
