//! Pages of the heart-rate monitor profile.
//!
//! Pages 0 through 9 share one layout: the page number and toggle bit in
//! byte 0, three page-specific bytes, then the last heart beat event time,
//! the beat count and the computed heart rate.

use tartan_bitfield::bitfield;
use zerocopy::{FromBytes, Immutable, IntoBytes};

use super::{FieldValue, PAGE_LEN, PageFields, PageKind, PageRecord, RESERVED};
use crate::PageFields;

#[repr(C, packed)]
#[derive(FromBytes, IntoBytes, Immutable)]
struct DataPage {
    page: u8,
    specific: [u8; 3],
    event_time: [u8; 2],
    beat_count: u8,
    computed_heart_rate: u8,
}

bitfield! {
    struct PageNumber(u8) {
        [7] toggle_bit,
    }
}

/// Heart beat data trailing every heart-rate data page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct HeartRateData {
    /// Flipped by the sender every fourth message.
    #[field]
    pub toggle_bit: bool,
    /// Time of the last heart beat event, in 1/1024 s. Rolls over at 64 s.
    #[field]
    pub event_time: u16,
    /// Count of heart beat events. Rolls over at 256.
    #[field]
    pub beat_count: u8,
    /// Instantaneous heart rate in beats per minute.
    #[field]
    pub computed_heart_rate: u8,
}

/// Split a heart-rate data page into its page-specific bytes and trailer.
fn split(r: [u8; PAGE_LEN]) -> ([u8; 3], HeartRateData) {
    let DataPage {
        page,
        specific,
        event_time,
        beat_count,
        computed_heart_rate,
    } = zerocopy::transmute!(r);

    let heart_rate = HeartRateData {
        toggle_bit: PageNumber(page).toggle_bit(),
        event_time: u16::from_le_bytes(event_time),
        beat_count,
        computed_heart_rate,
    };

    (specific, heart_rate)
}

/// Join a page number, page-specific bytes and trailer into a page.
fn join(kind: PageKind, specific: [u8; 3], heart_rate: &HeartRateData) -> [u8; PAGE_LEN] {
    let mut page = PageNumber(kind.id());
    page.set_toggle_bit(heart_rate.toggle_bit);

    let page = DataPage {
        page: page.0,
        specific,
        event_time: heart_rate.event_time.to_le_bytes(),
        beat_count: heart_rate.beat_count,
        computed_heart_rate: heart_rate.computed_heart_rate,
    };

    zerocopy::transmute!(page)
}

/// Page 0: heart beat data only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct DefaultData {
    #[field(flatten)]
    pub heart_rate: HeartRateData,
}

impl PageRecord for DefaultData {
    const KIND: PageKind = PageKind::DefaultData;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let (_, heart_rate) = split(r);
        Self { heart_rate }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        join(Self::KIND, [RESERVED; 3], &self.heart_rate)
    }
}

/// Page 1: time the sensor has been operating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct CumulativeOperatingTime {
    /// Operating time in units of 2 s. Only the low 24 bits are transmitted.
    #[field]
    pub operating_time: u32,
    #[field(flatten)]
    pub heart_rate: HeartRateData,
}

impl CumulativeOperatingTime {
    /// The operating time counter rolls over at this value.
    pub const ROLLOVER: u32 = 0x100_0000;

    /// Seconds represented by one operating time unit.
    pub const UNIT_SECS: u32 = 2;

    /// The operating time in seconds.
    pub fn operating_time_secs(&self) -> u32 {
        (self.operating_time % Self::ROLLOVER) * Self::UNIT_SECS
    }
}

impl PageRecord for CumulativeOperatingTime {
    const KIND: PageKind = PageKind::CumulativeOperatingTime;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let ([a, b, c], heart_rate) = split(r);

        Self {
            operating_time: u32::from_le_bytes([a, b, c, 0]),
            heart_rate,
        }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let [a, b, c, _] = self.operating_time.to_le_bytes();
        join(Self::KIND, [a, b, c], &self.heart_rate)
    }
}

/// Page 2: manufacturer and serial number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct ManufacturerInformation {
    #[field]
    pub manufacturer_id: u8,
    /// Upper 16 bits of the 32-bit serial number.
    #[field]
    pub serial_number: u16,
    #[field(flatten)]
    pub heart_rate: HeartRateData,
}

impl PageRecord for ManufacturerInformation {
    const KIND: PageKind = PageKind::ManufacturerInformation;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let ([manufacturer_id, a, b], heart_rate) = split(r);

        Self {
            manufacturer_id,
            serial_number: u16::from_le_bytes([a, b]),
            heart_rate,
        }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let [a, b] = self.serial_number.to_le_bytes();
        join(Self::KIND, [self.manufacturer_id, a, b], &self.heart_rate)
    }
}

/// Page 3: hardware, software and model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct ProductInformation {
    #[field]
    pub hardware_version: u8,
    #[field]
    pub software_version: u8,
    #[field]
    pub model_number: u8,
    #[field(flatten)]
    pub heart_rate: HeartRateData,
}

impl PageRecord for ProductInformation {
    const KIND: PageKind = PageKind::ProductInformation;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let ([hardware_version, software_version, model_number], heart_rate) = split(r);

        Self {
            hardware_version,
            software_version,
            model_number,
            heart_rate,
        }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let specific = [
            self.hardware_version,
            self.software_version,
            self.model_number,
        ];
        join(Self::KIND, specific, &self.heart_rate)
    }
}

/// Page 4: event time of the beat before the last one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct PreviousHeartBeat {
    #[field]
    pub manufacturer_specific: u8,
    /// In 1/1024 s, like [`HeartRateData::event_time`].
    #[field]
    pub previous_event_time: u16,
    #[field(flatten)]
    pub heart_rate: HeartRateData,
}

impl PageRecord for PreviousHeartBeat {
    const KIND: PageKind = PageKind::PreviousHeartBeat;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let ([manufacturer_specific, a, b], heart_rate) = split(r);

        Self {
            manufacturer_specific,
            previous_event_time: u16::from_le_bytes([a, b]),
            heart_rate,
        }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let [a, b] = self.previous_event_time.to_le_bytes();
        join(Self::KIND, [self.manufacturer_specific, a, b], &self.heart_rate)
    }
}

/// Page 5: heart rate summary of a swimming interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct SwimIntervalSummary {
    #[field]
    pub interval_average_heart_rate: u8,
    #[field]
    pub interval_maximum_heart_rate: u8,
    #[field]
    pub session_average_heart_rate: u8,
    #[field(flatten)]
    pub heart_rate: HeartRateData,
}

impl PageRecord for SwimIntervalSummary {
    const KIND: PageKind = PageKind::SwimIntervalSummary;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let ([interval_average, interval_maximum, session_average], heart_rate) = split(r);

        Self {
            interval_average_heart_rate: interval_average,
            interval_maximum_heart_rate: interval_maximum,
            session_average_heart_rate: session_average,
            heart_rate,
        }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let specific = [
            self.interval_average_heart_rate,
            self.interval_maximum_heart_rate,
            self.session_average_heart_rate,
        ];
        join(Self::KIND, specific, &self.heart_rate)
    }
}

/// An optional feature announced on page 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    ExtendedRunning = 0,
    ExtendedCycling = 1,
    ExtendedSwimming = 2,
    ManufacturerBit6 = 6,
    ManufacturerBit7 = 7,
}

/// Page 6: supported and enabled features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct Capabilities {
    #[field]
    pub features_supported: u8,
    #[field]
    pub features_enabled: u8,
    #[field(flatten)]
    pub heart_rate: HeartRateData,
}

impl Capabilities {
    /// Bits of the feature bytes that must be zero.
    pub const RESERVED_BITS: u8 = 0x30;

    /// Whether a feature is enabled, or `None` if it is not supported.
    pub fn feature(&self, feature: Feature) -> Option<bool> {
        let bit = 1 << feature as u8;

        if self.features_supported & bit == 0 {
            return None;
        }

        Some(self.features_enabled & bit != 0)
    }
}

impl PageRecord for Capabilities {
    const KIND: PageKind = PageKind::Capabilities;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let ([_, features_supported, features_enabled], heart_rate) = split(r);

        Self {
            features_supported,
            features_enabled,
            heart_rate,
        }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let specific = [RESERVED, self.features_supported, self.features_enabled];
        join(Self::KIND, specific, &self.heart_rate)
    }
}

bitfield! {
    struct Descriptive(u8) {
        [0..4] coarse_voltage: u8,
        [4..7] status: u8,
    }
}

/// Page 7: battery level, voltage and status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct BatteryStatus {
    /// Percentage from 0 to 100.
    #[field]
    pub battery_level: u8,
    /// Fraction of a volt, in 1/256 V.
    #[field]
    pub fractional_battery_voltage: u8,
    /// Whole volts, or [`BatteryStatus::INVALID_COARSE`].
    #[field]
    pub coarse_battery_voltage: u8,
    /// Status code from 1 (new) to 5 (critical), or
    /// [`BatteryStatus::INVALID_STATUS`].
    #[field]
    pub battery_status: u8,
    #[field(flatten)]
    pub heart_rate: HeartRateData,
}

impl BatteryStatus {
    /// Coarse voltage marking the voltage as not transmitted.
    pub const INVALID_COARSE: u8 = 0xF;
    /// Fractional voltage sent alongside an invalid coarse voltage.
    pub const INVALID_FRACTIONAL: u8 = 0xFF;
    /// Status code marking the status as not transmitted.
    pub const INVALID_STATUS: u8 = 0x7;

    /// The battery voltage in volts, or `None` if not transmitted.
    pub fn total_battery_voltage(&self) -> Option<f32> {
        if self.coarse_battery_voltage == Self::INVALID_COARSE {
            return None;
        }

        Some(f32::from(self.coarse_battery_voltage) + f32::from(self.fractional_battery_voltage) / 255.0)
    }
}

impl PageRecord for BatteryStatus {
    const KIND: PageKind = PageKind::BatteryStatus;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let ([battery_level, fractional, descriptive], heart_rate) = split(r);
        let descriptive = Descriptive(descriptive);

        Self {
            battery_level,
            fractional_battery_voltage: fractional,
            coarse_battery_voltage: descriptive.coarse_voltage(),
            battery_status: descriptive.status(),
            heart_rate,
        }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let mut descriptive = Descriptive(0);
        descriptive.set_coarse_voltage(self.coarse_battery_voltage & 0x0F);
        descriptive.set_status(self.battery_status & 0x07);

        let specific = [
            self.battery_level,
            self.fractional_battery_voltage,
            descriptive.0,
        ];
        join(Self::KIND, specific, &self.heart_rate)
    }
}

bitfield! {
    struct EventType(u8) {
        [0..2] event_type: u8,
    }
}

/// Page 9: how heart beat events are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct DeviceInformation {
    /// [`DeviceInformation::MEASURED`] or [`DeviceInformation::COMPUTED`].
    #[field]
    pub event_type: u8,
    #[field(flatten)]
    pub heart_rate: HeartRateData,
}

impl DeviceInformation {
    pub const MEASURED: u8 = 0;
    pub const COMPUTED: u8 = 1;

    /// Bits of byte 1 that must be set.
    pub const RESERVED_BITS: u8 = 0xFC;
}

impl PageRecord for DeviceInformation {
    const KIND: PageKind = PageKind::DeviceInformation;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let ([flags, _, _], heart_rate) = split(r);

        Self {
            event_type: EventType(flags).event_type(),
            heart_rate,
        }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let mut flags = EventType(Self::RESERVED_BITS);
        flags.set_event_type(self.event_type & 0x03);

        join(Self::KIND, [flags.0, RESERVED, RESERVED], &self.heart_rate)
    }
}
