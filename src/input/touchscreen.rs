use std::{error::Error, os::fd::AsRawFd};

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, EventType, InputEvent, InputId, KeyCode,
    PropType, UinputAbsSetup,
};
use nix::fcntl::{FcntlArg, OFlag};

use crate::drivers::cando::{
    driver::{PID, VID},
    event::{TouchEvent, TouchPoint},
    hid_report::{MAX_CONTACTS, TOUCHSCREEN_X_MAX, TOUCHSCREEN_Y_MAX},
};

/// Highest multitouch tracking id the device declares.
const TRACKING_ID_MAX: i32 = 65535;

/// Configuration of the virtual touchscreen device.
#[derive(Debug, Clone)]
pub struct TouchscreenConfig {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: u16,
}

impl Default for TouchscreenConfig {
    fn default() -> Self {
        Self {
            name: "Cando Multitouch Driver".to_string(),
            vendor_id: VID,
            product_id: PID,
            version: 0x100,
        }
    }
}

/// Virtual multitouch input device that receives the decoded events.
///
/// One [Self::emit_frame] call makes a batch of per-contact events
/// visible atomically: the batch is terminated with a single SYN_REPORT.
#[derive(Debug)]
pub struct TouchscreenDevice {
    device: VirtualDevice,
    touching: [bool; MAX_CONTACTS],
}

impl TouchscreenDevice {
    /// Create a new virtual touchscreen with the default configuration.
    pub fn new() -> Result<Self, Box<dyn Error>> {
        TouchscreenDevice::new_with_config(TouchscreenConfig::default())
    }

    /// Create a new virtual touchscreen with the given configuration.
    pub fn new_with_config(config: TouchscreenConfig) -> Result<Self, Box<dyn Error>> {
        let device = TouchscreenDevice::create_virtual_device(&config)?;
        Ok(Self {
            device,
            touching: [false; MAX_CONTACTS],
        })
    }

    /// Create the virtual device to emulate
    fn create_virtual_device(config: &TouchscreenConfig) -> Result<VirtualDevice, Box<dyn Error>> {
        let mut keys = AttributeSet::<KeyCode>::new();
        keys.insert(KeyCode::BTN_TOUCH);

        let axis_x_setup = AbsInfo::new(0, 0, TOUCHSCREEN_X_MAX as i32, 0, 0, 0);
        let axis_y_setup = AbsInfo::new(0, 0, TOUCHSCREEN_Y_MAX as i32, 0, 0, 0);
        let abs_x = UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, axis_x_setup);
        let abs_y = UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, axis_y_setup);
        let abs_mt_pos_x = UinputAbsSetup::new(AbsoluteAxisCode::ABS_MT_POSITION_X, axis_x_setup);
        let abs_mt_pos_y = UinputAbsSetup::new(AbsoluteAxisCode::ABS_MT_POSITION_Y, axis_y_setup);

        let slot_setup = AbsInfo::new(0, 0, (MAX_CONTACTS - 1) as i32, 0, 0, 0);
        let abs_mt_slot = UinputAbsSetup::new(AbsoluteAxisCode::ABS_MT_SLOT, slot_setup);

        let tracking_id_setup = AbsInfo::new(0, 0, TRACKING_ID_MAX, 0, 0, 0);
        let abs_mt_tracking_id =
            UinputAbsSetup::new(AbsoluteAxisCode::ABS_MT_TRACKING_ID, tracking_id_setup);

        let mut properties = AttributeSet::<PropType>::new();
        properties.insert(PropType::DIRECT);

        let id = InputId::new(
            BusType(3),
            config.vendor_id,
            config.product_id,
            config.version,
        );

        let device = VirtualDeviceBuilder::new()?
            .name(config.name.as_str())
            .input_id(id)
            .with_properties(&properties)?
            .with_keys(&keys)?
            .with_absolute_axis(&abs_x)?
            .with_absolute_axis(&abs_y)?
            .with_absolute_axis(&abs_mt_slot)?
            .with_absolute_axis(&abs_mt_pos_x)?
            .with_absolute_axis(&abs_mt_pos_y)?
            .with_absolute_axis(&abs_mt_tracking_id)?
            .build()?;

        // Frame emission happens under the report lock and must not block
        let raw_fd = device.as_raw_fd();
        nix::fcntl::fcntl(raw_fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;

        Ok(device)
    }

    /// Emit one report's worth of touch events as a single input frame.
    pub fn emit_frame(&mut self, frame: &[TouchEvent]) -> Result<(), Box<dyn Error>> {
        if frame.is_empty() {
            return Ok(());
        }

        let was_touching = self.touching.iter().any(|touching| *touching);
        let mut events: Vec<InputEvent> = Vec::with_capacity(frame.len() * 6 + 1);
        for event in frame {
            match event {
                TouchEvent::Down(point) | TouchEvent::Move(point) => {
                    push_contact(&mut events, point);
                    if let Some(touching) = self.touching.get_mut(point.slot as usize) {
                        *touching = true;
                    }
                }
                TouchEvent::Lift { slot } => {
                    events.push(InputEvent::new(
                        EventType::ABSOLUTE.0,
                        AbsoluteAxisCode::ABS_MT_SLOT.0,
                        *slot as i32,
                    ));
                    events.push(InputEvent::new(
                        EventType::ABSOLUTE.0,
                        AbsoluteAxisCode::ABS_MT_TRACKING_ID.0,
                        -1,
                    ));
                    if let Some(touching) = self.touching.get_mut(*slot as usize) {
                        *touching = false;
                    }
                }
            }
        }

        // Pointer emulation for single-touch consumers
        let touching = self.touching.iter().any(|touching| *touching);
        if touching != was_touching {
            events.push(InputEvent::new(
                EventType::KEY.0,
                KeyCode::BTN_TOUCH.0,
                touching as i32,
            ));
        }

        self.device.emit(&events)?;
        Ok(())
    }
}

/// Translate one active contact into its slot/tracking-id/position batch.
fn push_contact(events: &mut Vec<InputEvent>, point: &TouchPoint) {
    events.push(InputEvent::new(
        EventType::ABSOLUTE.0,
        AbsoluteAxisCode::ABS_MT_SLOT.0,
        point.slot as i32,
    ));
    events.push(InputEvent::new(
        EventType::ABSOLUTE.0,
        AbsoluteAxisCode::ABS_MT_TRACKING_ID.0,
        point.tracking_id as i32,
    ));
    events.push(InputEvent::new(
        EventType::ABSOLUTE.0,
        AbsoluteAxisCode::ABS_MT_POSITION_X.0,
        point.x as i32,
    ));
    events.push(InputEvent::new(
        EventType::ABSOLUTE.0,
        AbsoluteAxisCode::ABS_MT_POSITION_Y.0,
        point.y as i32,
    ));
    if point.slot == 0 {
        events.push(InputEvent::new(
            EventType::ABSOLUTE.0,
            AbsoluteAxisCode::ABS_X.0,
            point.x as i32,
        ));
        events.push(InputEvent::new(
            EventType::ABSOLUTE.0,
            AbsoluteAxisCode::ABS_Y.0,
            point.y as i32,
        ));
    }
}
