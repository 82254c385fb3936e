use clap::Parser;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the touchscreen hidraw node, e.g. /dev/hidraw0. Devices
    /// are discovered by vendor/product match when omitted.
    #[arg(long)]
    pub device: Option<String>,

    /// Poll the HID layer for parsed reports instead of running the
    /// interrupt transfer pipeline.
    #[arg(long)]
    pub poll: bool,
}
