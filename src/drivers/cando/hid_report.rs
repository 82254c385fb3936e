use packed_struct::prelude::*;

/// Both axes report 12-bit absolute coordinates.
pub const TOUCHSCREEN_X_MAX: u16 = 4095;
pub const TOUCHSCREEN_Y_MAX: u16 = 4095;

/// Number of contacts the firmware tracks.
pub const MAX_CONTACTS: usize = 2;

/// Size in bytes of one input report on the wire.
pub const REPORT_SIZE: usize = 15;

/// Number of fields a parsed report carries.
pub const FIELD_COUNT: usize = 11;

// 01 01 00 ba 01 7d 01
#[derive(PackedStruct, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "7")]
pub struct TouchData {
    #[packed_field(bytes = "0")]
    pub tip_switch: u8,
    #[packed_field(bytes = "1")]
    pub in_range: u8,
    #[packed_field(bytes = "2")]
    pub contact_id: u8,
    #[packed_field(bytes = "3..=4", endian = "lsb")]
    pub x: u16,
    #[packed_field(bytes = "5..=6", endian = "lsb")]
    pub y: u16,
}

#[derive(PackedStruct, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "15")]
pub struct PackedInputDataReport {
    #[packed_field(bytes = "0..=6")]
    pub touch1: TouchData,
    #[packed_field(bytes = "7..=13")]
    pub touch2: TouchData,
    #[packed_field(bytes = "14")]
    pub contact_count: u8,
}

/// One parsed report field tagged with its stable firmware index.
#[derive(Debug, Clone, Copy)]
pub struct ReportField {
    pub index: usize,
    pub variable: bool,
    pub value: i32,
}

impl PackedInputDataReport {
    /// Field values in firmware order. Indices are positionally fixed by
    /// the device firmware; see [FIELD_ROLES] for their meaning.
    pub fn fields(&self) -> [ReportField; FIELD_COUNT] {
        let field = |index: usize, value: i32| ReportField {
            index,
            variable: true,
            value,
        };
        [
            field(0, self.touch1.tip_switch as i32),
            field(1, self.touch1.in_range as i32),
            field(2, self.touch1.contact_id as i32),
            field(3, self.touch1.x as i32),
            field(4, self.touch1.y as i32),
            field(5, self.touch2.tip_switch as i32),
            field(6, self.touch2.in_range as i32),
            field(7, self.touch2.contact_id as i32),
            field(8, self.touch2.x as i32),
            field(9, self.touch2.y as i32),
            field(10, self.contact_count as i32),
        ]
    }
}

/// Semantic meaning of a report field index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Contact1Active,
    Contact1X,
    Contact1Y,
    Contact2Active,
    Contact2X,
    Contact2Y,
    ActiveContactCount,
}

/// Field-index to meaning mapping fixed by the device firmware. Indices
/// not listed here (the in-range and contact-id fields, and anything a
/// newer firmware appends) carry no touch state and are ignored.
pub const FIELD_ROLES: &[(usize, FieldRole)] = &[
    (0, FieldRole::Contact1Active),
    (3, FieldRole::Contact1X),
    (4, FieldRole::Contact1Y),
    (5, FieldRole::Contact2Active),
    (8, FieldRole::Contact2X),
    (9, FieldRole::Contact2Y),
    (10, FieldRole::ActiveContactCount),
];

fn role_of(index: usize) -> Option<FieldRole> {
    FIELD_ROLES
        .iter()
        .find(|(i, _)| *i == index)
        .map(|(_, role)| *role)
}

/// Checks the firmware index table against the number of fields an actual
/// report carries. Run once at attach; a report too short to hold every
/// mapped index would otherwise be misread silently.
pub fn validate_layout(field_count: usize) -> Result<(), String> {
    for (index, role) in FIELD_ROLES {
        if *role == FieldRole::ActiveContactCount {
            // Optional on some firmware revisions
            continue;
        }
        if *index >= field_count {
            return Err(format!(
                "field {index} ({role:?}) is outside the {field_count}-field report"
            ));
        }
    }
    Ok(())
}

/// Active flag and coordinates extracted for one contact.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ContactSample {
    pub active: bool,
    pub x: u16,
    pub y: u16,
}

/// Flat value set extracted from one report. Built by the extractor,
/// consumed immediately by the decoder and then discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportValueSet {
    contacts: [ContactSample; MAX_CONTACTS],
    active_count: Option<u8>,
}

impl ReportValueSet {
    /// Extract the touch-relevant subset of report fields. Only
    /// variable-type fields are inspected; absent indices leave their
    /// entries at the default (inactive, zero).
    pub fn extract<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = ReportField>,
    {
        let mut values = ReportValueSet::default();
        for field in fields {
            if !field.variable {
                continue;
            }
            let Some(role) = role_of(field.index) else {
                continue;
            };
            match role {
                FieldRole::Contact1Active => values.contacts[0].active = field.value != 0,
                FieldRole::Contact1X => values.contacts[0].x = clamp_axis(field.value),
                FieldRole::Contact1Y => values.contacts[0].y = clamp_axis(field.value),
                FieldRole::Contact2Active => values.contacts[1].active = field.value != 0,
                FieldRole::Contact2X => values.contacts[1].x = clamp_axis(field.value),
                FieldRole::Contact2Y => values.contacts[1].y = clamp_axis(field.value),
                FieldRole::ActiveContactCount => {
                    values.active_count = Some(field.value.clamp(0, u8::MAX as i32) as u8)
                }
            }
        }
        values
    }

    pub fn contact(&self, slot: usize) -> ContactSample {
        self.contacts.get(slot).copied().unwrap_or_default()
    }

    /// Total active contacts as reported by the firmware, when present.
    pub fn active_count(&self) -> Option<u8> {
        self.active_count
    }

    /// Active contacts according to the tip switch flags.
    pub fn tip_count(&self) -> u8 {
        self.contacts.iter().filter(|contact| contact.active).count() as u8
    }
}

fn clamp_axis(value: i32) -> u16 {
    value.clamp(0, TOUCHSCREEN_X_MAX as i32) as u16
}

/// Parse one raw report into the extracted value set. Short buffers are
/// zero padded, so a truncated report reads as inactive/zero fields
/// rather than an error.
pub fn parse_report(buf: &[u8]) -> ReportValueSet {
    let mut raw = [0u8; REPORT_SIZE];
    let len = buf.len().min(REPORT_SIZE);
    if len < REPORT_SIZE {
        log::trace!("short report ({} of {REPORT_SIZE} bytes)", buf.len());
    }
    raw[..len].copy_from_slice(&buf[..len]);
    let report = PackedInputDataReport::unpack(&raw).unwrap_or_default();
    ReportValueSet::extract(report.fields())
}
