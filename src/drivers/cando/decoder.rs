use super::event::{TouchEvent, TouchPoint};
use super::hid_report::{ReportValueSet, MAX_CONTACTS};

/// Last reported state for one hardware contact slot.
#[derive(Debug, Default, Clone, Copy)]
struct ContactState {
    x: u16,
    y: u16,
    active: bool,
}

/// Stateful decoder turning extracted report values into discrete
/// touch-down/move/lift events.
///
/// Slot state is owned here and mutated only through the decode methods.
/// Exactly one report is decoded at a time per device, so no locking
/// happens at this level.
#[derive(Debug, Default)]
pub struct TouchDecoder {
    contacts: [ContactState; MAX_CONTACTS],
}

impl TouchDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one report worth of contact samples into events.
    ///
    /// Contact 1 is decoded every report. Contact 2 is decoded only while
    /// its flag is active, or while the stored state is still active so
    /// the lift edge is observed; skipping it otherwise emits nothing
    /// either way.
    pub fn decode_report(&mut self, values: &ReportValueSet) -> Vec<TouchEvent> {
        let mut events = Vec::with_capacity(MAX_CONTACTS);

        let first = values.contact(0);
        if let Some(event) = self.decode(0, first.x, first.y, first.active) {
            events.push(event);
        }

        let second = values.contact(1);
        if second.active || self.contacts[1].active {
            if let Some(event) = self.decode(1, second.x, second.y, second.active) {
                events.push(event);
            }
        }

        if let Some(count) = values.active_count() {
            if count != values.tip_count() {
                log::trace!(
                    "firmware reports {count} active contacts, tip switches say {}",
                    values.tip_count()
                );
            }
        }

        events
    }

    /// Decode one contact sample against the stored slot state.
    ///
    /// Contacts beyond the two hardware slots are ignored. A repeated
    /// identical active sample is suppressed; a lift is emitted only on
    /// the first inactive sample after an active one.
    pub fn decode(&mut self, contact: u8, x: u16, y: u16, active: bool) -> Option<TouchEvent> {
        let state = self.contacts.get_mut(contact as usize)?;

        if active {
            let was_active = state.active;
            if was_active && state.x == x && state.y == y {
                // Hardware repeats identical samples
                return None;
            }
            state.x = x;
            state.y = y;
            state.active = true;
            let point = TouchPoint {
                slot: contact,
                tracking_id: contact,
                x,
                y,
            };
            if was_active {
                Some(TouchEvent::Move(point))
            } else {
                Some(TouchEvent::Down(point))
            }
        } else if state.active {
            // Coordinates in a lift report are stale; keep the last known
            // position and only drop the active flag.
            state.active = false;
            Some(TouchEvent::Lift { slot: contact })
        } else {
            None
        }
    }
}
