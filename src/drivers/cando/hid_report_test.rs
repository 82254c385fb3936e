use packed_struct::PackedStruct;

use crate::drivers::cando::hid_report::{
    parse_report, validate_layout, ContactSample, PackedInputDataReport, ReportField,
    ReportValueSet, FIELD_COUNT,
};

#[test]
fn test_report_wire_layout() {
    let mut report = PackedInputDataReport::default();
    report.touch1.tip_switch = 1;
    report.touch1.in_range = 1;
    report.touch1.contact_id = 0;
    report.touch1.x = 442;
    report.touch1.y = 381;
    report.contact_count = 1;

    let expected: [u8; 15] = [
        0x01, 0x01, 0x00, 0xba, 0x01, 0x7d, 0x01, // contact 1
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // contact 2
        0x01, // contact count
    ];
    let packed = report.pack().unwrap();
    assert_eq!(expected, packed);

    let unpacked = PackedInputDataReport::unpack(&expected).unwrap();
    assert_eq!(unpacked, report);
}

#[test]
fn test_fields_follow_firmware_order() {
    let mut report = PackedInputDataReport::default();
    report.touch1.tip_switch = 1;
    report.touch1.x = 100;
    report.touch1.y = 200;
    report.touch2.tip_switch = 1;
    report.touch2.x = 1000;
    report.touch2.y = 2000;
    report.contact_count = 2;

    let fields = report.fields();
    assert_eq!(fields.len(), FIELD_COUNT);
    assert!(fields.iter().all(|field| field.variable));
    assert_eq!(fields[0].value, 1);
    assert_eq!(fields[3].value, 100);
    assert_eq!(fields[4].value, 200);
    assert_eq!(fields[5].value, 1);
    assert_eq!(fields[8].value, 1000);
    assert_eq!(fields[9].value, 2000);
    assert_eq!(fields[10].value, 2);
}

#[test]
fn test_extract_ignores_constant_fields() {
    let values = ReportValueSet::extract([ReportField {
        index: 0,
        variable: false,
        value: 1,
    }]);
    assert!(!values.contact(0).active);
}

#[test]
fn test_extract_ignores_unmapped_indices() {
    let values = ReportValueSet::extract([
        ReportField {
            index: 1,
            variable: true,
            value: 1,
        },
        ReportField {
            index: 2,
            variable: true,
            value: 1,
        },
        ReportField {
            index: 11,
            variable: true,
            value: 999,
        },
    ]);
    assert_eq!(values.contact(0), ContactSample::default());
    assert_eq!(values.contact(1), ContactSample::default());
    assert_eq!(values.active_count(), None);
}

#[test]
fn test_extract_defaults_missing_fields() {
    let values = ReportValueSet::extract([]);
    assert_eq!(values.contact(0), ContactSample::default());
    assert_eq!(values.contact(1), ContactSample::default());
    assert_eq!(values.active_count(), None);
}

#[test]
fn test_extract_clamps_coordinates() {
    let values = ReportValueSet::extract([
        ReportField {
            index: 3,
            variable: true,
            value: 5000,
        },
        ReportField {
            index: 4,
            variable: true,
            value: -3,
        },
    ]);
    assert_eq!(values.contact(0).x, 4095);
    assert_eq!(values.contact(0).y, 0);
}

#[test]
fn test_extract_active_contact_count() {
    let values = ReportValueSet::extract([ReportField {
        index: 10,
        variable: true,
        value: 2,
    }]);
    assert_eq!(values.active_count(), Some(2));
}

#[test]
fn test_parse_short_report_zero_pads() {
    // Only the tip switch, in-range flag and the low X byte arrive
    let values = parse_report(&[0x01, 0x01, 0x00, 0xba]);
    assert!(values.contact(0).active);
    assert_eq!(values.contact(0).x, 0xba);
    assert_eq!(values.contact(0).y, 0);
    assert_eq!(values.contact(1), ContactSample::default());

    let empty = parse_report(&[]);
    assert!(!empty.contact(0).active);
    assert!(!empty.contact(1).active);
}

#[test]
fn test_validate_layout() {
    assert!(validate_layout(FIELD_COUNT).is_ok());
    // The active-contact-count field is optional
    assert!(validate_layout(10).is_ok());
    assert!(validate_layout(9).is_err());
    assert!(validate_layout(5).is_err());
}
