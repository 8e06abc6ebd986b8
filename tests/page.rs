#![cfg(feature = "std")]

use antwire::page::common::{HrFeature, ModeSettings, RequestData};
use antwire::page::hrm::{
    BatteryStatus, Capabilities, CumulativeOperatingTime, DefaultData, DeviceInformation,
    Feature, HeartRateData, ManufacturerInformation, PreviousHeartBeat, ProductInformation,
    SwimIntervalSummary,
};
use antwire::page::{FieldValue, Page, PageError, PageFields, PageKind, PageRecord, Record};
use proptest::prelude::*;

const BEAT: HeartRateData = HeartRateData {
    toggle_bit: false,
    event_time: 0x1234,
    beat_count: 0x56,
    computed_heart_rate: 60,
};

#[test]
fn encode_default_data() {
    let page = DefaultData { heart_rate: BEAT };
    assert_eq!(
        page.encode(),
        [0x00, 0xFF, 0xFF, 0xFF, 0x34, 0x12, 0x56, 60]
    );
}

#[test]
fn encode_toggle_bit() {
    let page = PreviousHeartBeat {
        manufacturer_specific: 0xAB,
        previous_event_time: 0x0F00,
        heart_rate: HeartRateData {
            toggle_bit: true,
            ..BEAT
        },
    };
    assert_eq!(
        page.encode(),
        [0x84, 0xAB, 0x00, 0x0F, 0x34, 0x12, 0x56, 60]
    );
}

#[test]
fn decode_toggle_bit() {
    let page = Page::decode(&[0x84, 0xAB, 0x00, 0x0F, 0x34, 0x12, 0x56, 60]).unwrap();
    assert_eq!(page.kind(), PageKind::PreviousHeartBeat);
    assert!(page.toggle_bit());

    let Record::PreviousHeartBeat(record) = page.record() else {
        panic!("unexpected record {:?}", page.record());
    };
    assert_eq!(record.previous_event_time, 0x0F00);
    assert!(record.heart_rate.toggle_bit);
    assert_eq!(record.heart_rate.event_time, 0x1234);
}

#[test]
fn decode_operating_time() {
    let raw = [0x81, 0x10, 0x20, 0x30, 0x00, 0x04, 0x01, 70];
    let page = CumulativeOperatingTime::decode(&raw).unwrap();

    assert_eq!(page.operating_time, 0x30_2010);
    assert_eq!(page.operating_time_secs(), 0x30_2010 * 2);
    assert_eq!(page.heart_rate.event_time, 0x0400);
    assert_eq!(page.heart_rate.beat_count, 1);
    assert_eq!(page.heart_rate.computed_heart_rate, 70);
}

#[test]
fn decode_manufacturer_information() {
    let raw = [0x02, 0x0F, 0x39, 0x30, 0x00, 0x00, 0x00, 0x00];
    let page = ManufacturerInformation::decode(&raw).unwrap();

    assert_eq!(page.manufacturer_id, 0x0F);
    assert_eq!(page.serial_number, 12345);
}

#[test]
fn decode_product_information() {
    let raw = [0x03, 0x05, 0x11, 0x22, 0x00, 0x00, 0x00, 0x00];
    let page = ProductInformation::decode(&raw).unwrap();

    assert_eq!(page.hardware_version, 0x05);
    assert_eq!(page.software_version, 0x11);
    assert_eq!(page.model_number, 0x22);
}

#[test]
fn decode_swim_interval_summary() {
    let raw = [0x05, 120, 150, 110, 0x00, 0x00, 0x00, 0x00];
    let page = SwimIntervalSummary::decode(&raw).unwrap();

    assert_eq!(page.interval_average_heart_rate, 120);
    assert_eq!(page.interval_maximum_heart_rate, 150);
    assert_eq!(page.session_average_heart_rate, 110);
}

#[test]
fn decode_capabilities() {
    let raw = [0x06, 0xFF, 0b1100_0011, 0b0100_0001, 0x00, 0x00, 0x00, 0x00];
    let page = Capabilities::decode(&raw).unwrap();

    assert_eq!(page.feature(Feature::ExtendedRunning), Some(true));
    assert_eq!(page.feature(Feature::ExtendedCycling), Some(false));
    assert_eq!(page.feature(Feature::ExtendedSwimming), None);
    assert_eq!(page.feature(Feature::ManufacturerBit6), Some(true));
    assert_eq!(page.feature(Feature::ManufacturerBit7), Some(false));
    assert_eq!(page.encode(), raw);
}

#[test]
fn decode_battery_status() {
    let raw = [0x07, 80, 0x80, 0x23, 0x00, 0x00, 0x00, 0x00];
    let page = BatteryStatus::decode(&raw).unwrap();

    assert_eq!(page.battery_level, 80);
    assert_eq!(page.coarse_battery_voltage, 3);
    assert_eq!(page.battery_status, 2);
    assert_eq!(page.fractional_battery_voltage, 0x80);

    let voltage = page.total_battery_voltage().unwrap();
    assert!((voltage - (3.0 + 128.0 / 255.0)).abs() < 1e-6);
}

#[test]
fn decode_battery_status_invalid_voltage() {
    let raw = [0x07, 100, 0xFF, 0x7F, 0x00, 0x00, 0x00, 0x00];
    let page = BatteryStatus::decode(&raw).unwrap();

    assert_eq!(page.coarse_battery_voltage, BatteryStatus::INVALID_COARSE);
    assert_eq!(page.battery_status, BatteryStatus::INVALID_STATUS);
    assert_eq!(page.total_battery_voltage(), None);
}

#[test]
fn encode_device_information() {
    let page = DeviceInformation {
        event_type: DeviceInformation::COMPUTED,
        heart_rate: BEAT,
    };
    assert_eq!(
        page.encode(),
        [0x09, 0xFD, 0xFF, 0xFF, 0x34, 0x12, 0x56, 60]
    );
}

#[test]
fn encode_request_data() {
    let page = RequestData::new(PageKind::BatteryStatus, 5, true);
    assert_eq!(
        page.encode(),
        [0x46, 0xFF, 0xFF, 0xFF, 0xFF, 0x85, 0x07, 0x01]
    );

    let page = RequestData::new(PageKind::ManufacturerInformation, 0xFF, false);
    assert_eq!(page.repeat_count, RequestData::MAX_REPEAT_COUNT);
    assert_eq!(page.encode()[5], 0x7F);
}

#[test]
fn encode_mode_settings() {
    let page = ModeSettings {
        sub_sport_mode: 0x02,
        sport_mode: 0x05,
    };
    assert_eq!(
        page.encode(),
        [0x4C, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02, 0x05]
    );
}

#[test]
fn hr_feature_is_opaque() {
    let raw = [0x20, 1, 2, 3, 4, 5, 6, 7];
    let page = Page::decode(&raw).unwrap();

    assert_eq!(page.kind(), PageKind::HrFeature);
    assert_eq!(page.heart_rate(), None);
    assert_eq!(
        page.record(),
        Record::HrFeature(HrFeature {
            payload: [1, 2, 3, 4, 5, 6, 7]
        })
    );
}

#[test]
fn decode_wrong_length() {
    let raw = [0u8; 16];

    for len in (0..16).filter(|&len| len != 8) {
        assert_eq!(Page::decode(&raw[..len]), Err(PageError::Length(len)));
        assert_eq!(
            DefaultData::decode(&raw[..len]),
            Err(PageError::Length(len))
        );
    }
}

#[test]
fn decode_type_mismatch() {
    let raw = [0x82, 0x0F, 0x39, 0x30, 0x00, 0x00, 0x00, 0x00];

    assert_eq!(
        PreviousHeartBeat::decode(&raw),
        Err(PageError::TypeMismatch {
            expected: 4,
            found: 2
        })
    );
    assert_eq!(
        Page::decode_as(PageKind::BatteryStatus, &raw),
        Err(PageError::TypeMismatch {
            expected: 7,
            found: 2
        })
    );
}

#[test]
fn decode_unknown_page() {
    assert_eq!(
        Page::decode(&[0x08, 0, 0, 0, 0, 0, 0, 0]),
        Err(PageError::UnknownPage(0x08))
    );

    // Only heart-rate data pages carry a toggle bit.
    assert_eq!(
        Page::decode(&[0xC6, 0, 0, 0, 0, 0, 0, 0]),
        Err(PageError::UnknownPage(0xC6))
    );
}

#[test]
fn registry() {
    for kind in PageKind::ALL {
        assert_eq!(PageKind::from_id(kind.id()), Some(kind));
        assert_eq!(PageKind::resolve(kind.id()), Some(kind));
    }

    for kind in PageKind::HEART_RATE_PROFILE {
        assert!(kind.is_toggle_aware());
        assert_eq!(PageKind::resolve(kind.id() | 0x80), Some(kind));
    }

    assert!(PageKind::ALL.is_sorted());
    assert_eq!(
        PageKind::Capabilities.to_string(),
        "page 6 (capabilities)"
    );
}

#[test]
fn fields_by_name() {
    let page = Page::from(ManufacturerInformation {
        manufacturer_id: 0x0F,
        serial_number: 0x3039,
        heart_rate: BEAT,
    });

    assert_eq!(page.field("manufacturer_id"), Some(FieldValue::U8(0x0F)));
    assert_eq!(page.field("serial_number"), Some(FieldValue::U16(0x3039)));
    assert_eq!(page.field("event_time"), Some(FieldValue::U16(0x1234)));
    assert_eq!(page.field("toggle_bit"), Some(FieldValue::Bool(false)));
    assert_eq!(page.field("battery_level"), None);
}

fn heart_rate() -> impl Strategy<Value = HeartRateData> {
    (any::<bool>(), any::<u16>(), any::<u8>(), any::<u8>()).prop_map(
        |(toggle_bit, event_time, beat_count, computed_heart_rate)| HeartRateData {
            toggle_bit,
            event_time,
            beat_count,
            computed_heart_rate,
        },
    )
}

fn record() -> impl Strategy<Value = Record> {
    prop_oneof![
        heart_rate().prop_map(|heart_rate| Record::from(DefaultData { heart_rate })),
        (0..CumulativeOperatingTime::ROLLOVER, heart_rate()).prop_map(
            |(operating_time, heart_rate)| {
                Record::from(CumulativeOperatingTime {
                    operating_time,
                    heart_rate,
                })
            }
        ),
        (any::<u8>(), any::<u16>(), heart_rate()).prop_map(
            |(manufacturer_id, serial_number, heart_rate)| {
                Record::from(ManufacturerInformation {
                    manufacturer_id,
                    serial_number,
                    heart_rate,
                })
            }
        ),
        (any::<[u8; 3]>(), heart_rate()).prop_map(|([a, b, c], heart_rate)| {
            Record::from(ProductInformation {
                hardware_version: a,
                software_version: b,
                model_number: c,
                heart_rate,
            })
        }),
        (any::<u8>(), any::<u16>(), heart_rate()).prop_map(
            |(manufacturer_specific, previous_event_time, heart_rate)| {
                Record::from(PreviousHeartBeat {
                    manufacturer_specific,
                    previous_event_time,
                    heart_rate,
                })
            }
        ),
        (any::<[u8; 3]>(), heart_rate()).prop_map(|([a, b, c], heart_rate)| {
            Record::from(SwimIntervalSummary {
                interval_average_heart_rate: a,
                interval_maximum_heart_rate: b,
                session_average_heart_rate: c,
                heart_rate,
            })
        }),
        (any::<u8>(), any::<u8>(), heart_rate()).prop_map(
            |(features_supported, features_enabled, heart_rate)| {
                Record::from(Capabilities {
                    features_supported,
                    features_enabled,
                    heart_rate,
                })
            }
        ),
        (any::<u8>(), any::<u8>(), 0..=0xFu8, 0..=7u8, heart_rate()).prop_map(
            |(level, fractional, coarse, status, heart_rate)| {
                Record::from(BatteryStatus {
                    battery_level: level,
                    fractional_battery_voltage: fractional,
                    coarse_battery_voltage: coarse,
                    battery_status: status,
                    heart_rate,
                })
            }
        ),
        (0..=3u8, heart_rate()).prop_map(|(event_type, heart_rate)| {
            Record::from(DeviceInformation {
                event_type,
                heart_rate,
            })
        }),
        any::<[u8; 7]>().prop_map(|payload| Record::from(HrFeature { payload })),
        (0..=0x7Fu8, any::<bool>(), any::<u8>(), any::<u8>()).prop_map(
            |(repeat_count, acknowledged, requested_page, command_type)| {
                Record::from(RequestData {
                    repeat_count,
                    acknowledged,
                    requested_page,
                    command_type,
                })
            }
        ),
        (any::<u8>(), any::<u8>()).prop_map(|(sub_sport_mode, sport_mode)| {
            Record::from(ModeSettings {
                sub_sport_mode,
                sport_mode,
            })
        }),
    ]
}

proptest! {
    #[test]
    fn encode_then_decode(record in record()) {
        let raw = record.encode();
        prop_assert_eq!(Record::decode(&raw), Ok(record));
        prop_assert_eq!(Page::decode(&raw).map(|page| page.kind()), Ok(record.kind()));
    }

    #[test]
    fn decode_any_length(raw in proptest::collection::vec(any::<u8>(), 0..32)) {
        prop_assume!(raw.len() != 8);
        prop_assert_eq!(Page::decode(&raw), Err(PageError::Length(raw.len())));
    }
}
