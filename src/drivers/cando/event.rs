/// One contact sample carried by touch-down and move events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    pub slot: u8,
    pub tracking_id: u8,
    pub x: u16,
    pub y: u16,
}

/// Normalized touch events produced by the contact decoder.
///
/// The hardware tracks a fixed set of two contacts and identifies them
/// positionally, so tracking ids are statically mapped 1:1 to contact
/// slots rather than monotonically increasing. A lifted slot is reported
/// downstream with the released sentinel (-1) tracking id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchEvent {
    Down(TouchPoint),
    Move(TouchPoint),
    Lift { slot: u8 },
}
