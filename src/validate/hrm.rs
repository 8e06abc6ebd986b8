//! Checks for the heart-rate monitor profile.
//!
//! Every check takes the full stream of broadcast messages and picks the
//! pages it is interested in. Checks of a single page pass when the page was
//! never received; whether a page had to be sent is up to the schedule
//! checks.

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::vec::Vec;

use super::{CheckError, ReportError, ValidatorSet, check, describe, invalid};
use crate::config::{ChannelParameters, DeviceConfig, SpecVersion, TestCriteria};
use crate::page::hrm::{BatteryStatus, Capabilities, CumulativeOperatingTime, DeviceInformation};
use crate::page::{FieldValue, PageKind, RESERVED, Record};
use crate::schedule::{Classifier, Schedule, toggle_filtered};
use crate::stream::{MessageStream, ReceivedPage, StreamError};

/// Heart beat event times wrap at this value.
pub const EVENT_TIME_ROLLOVER: u32 = 0x1_0000;

/// Event time units per second.
pub const EVENT_TIME_UNITS_PER_SEC: f32 = 1024.0;

/// Set in the device type of a channel id while the sensor is pairing.
pub const PAIRING_BIT: u8 = 0x80;

/// Allowed deviation of the operating time from elapsed time, in seconds.
pub const OPERATING_TIME_TOLERANCE_SECS: f64 = 2.0;

/// The battery state a sensor is expected to report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryExpectation {
    /// Battery level in percent.
    pub level: u8,
    /// Status code, or `None` if the status should be reported as invalid.
    pub status: Option<u8>,
    /// Battery voltage, or `None` if the voltage should be reported as
    /// invalid.
    pub voltage: Option<f32>,
    /// Allowed relative deviation of the voltage.
    pub voltage_tolerance: f32,
}

impl BatteryExpectation {
    /// The battery state of a device powered at `level` percent and
    /// `voltage` volts.
    pub fn for_device(device: &DeviceConfig, level: u8, voltage: f32) -> Self {
        Self {
            level,
            status: Some(DeviceConfig::expected_battery_status(level)),
            voltage: device.battery_voltage_supported.then_some(voltage),
            voltage_tolerance: 0.05,
        }
    }
}

/// The allowed interval between two heart beats, in 1/1024 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTimeBand {
    pub min: u32,
    pub max: u32,
}

impl EventTimeBand {
    /// The band for a steady heart rate in beats per minute.
    pub fn for_bpm(bpm: f32, criteria: &TestCriteria) -> Self {
        let (min, max) = criteria.rr_band(60.0 / bpm);

        Self {
            min: (min * EVENT_TIME_UNITS_PER_SEC) as u32,
            max: (max * EVENT_TIME_UNITS_PER_SEC) as u32,
        }
    }

    pub fn contains(&self, delta: u32) -> bool {
        (self.min..=self.max).contains(&delta)
    }
}

/// What the session under test is expected to show beyond the device
/// configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Expectations {
    /// The steady heart rate the sensor was measuring.
    pub heart_rate: Option<f32>,
    pub battery: Option<BatteryExpectation>,
}

/// The ordered checks for a heart-rate sensor.
///
/// Operating time is only checked when page 1 is an expected background
/// page. Battery status and beat intervals are only checked when the
/// expectations hold a value for them.
pub fn profile_validators<'a>(
    device: &'a DeviceConfig,
    criteria: &'a TestCriteria,
    expectations: &'a Expectations,
) -> Result<ValidatorSet<'a>, ReportError> {
    let mut checks = Vec::from([
        check("Page schedule: main page matches configuration", move |s| {
            main_page(s, device)
        }),
        check("Page schedule: background pages match configuration", move |s| {
            background_pages(s, device)
        }),
        check("Profile version: required background pages are configured", move |_| {
            spec_version(device)
        }),
        check("Channel id: device number matches configuration", move |s| {
            channel_id(s, device)
        }),
        check("Default data page: reserved bytes are set", default_data_reserved),
    ]);

    if device
        .background_pages
        .contains(&PageKind::CumulativeOperatingTime)
    {
        checks.push(check(
            "Operating time page: time advances with elapsed time",
            operating_time,
        ));
    }

    checks.extend([
        check("Manufacturer page: information is valid and has not changed", move |s| {
            manufacturer_information(s, device)
        }),
        check("Product page: information is valid and has not changed", move |s| {
            product_information(s, device)
        }),
    ]);

    if device.main_page == PageKind::PreviousHeartBeat {
        checks.push(check(
            "Previous heart beat page: previous event time matches the last beat",
            previous_event_time,
        ));
    }

    checks.push(check(
        "Capabilities page: reserved bits are clear",
        capabilities_reserved,
    ));

    if let Some(battery) = &expectations.battery {
        checks.push(check("Battery page: battery state is valid", move |s| {
            battery_status(s, battery)
        }));
    }

    checks.extend([
        check(
            "Device information page: reserved bits are set",
            device_information_reserved,
        ),
        check("Heart beat: beat count advances by one", beat_count),
    ]);

    if let Some(bpm) = expectations.heart_rate {
        let band = EventTimeBand::for_bpm(bpm, criteria);
        let skip = criteria.skip_first_beats;

        checks.push(check(
            "Heart beat: event time intervals match the heart rate",
            move |s| event_times(s, band, skip),
        ));

        let band = criteria.bpm_band((bpm + 0.5) as u8);
        checks.push(check(
            "Heart beat: computed heart rate matches the heart rate",
            move |s| computed_heart_rate(s, band, skip),
        ));
    }

    ValidatorSet::new(checks)
}

/// Read the single value of a field, treating several values as a
/// conformance failure.
fn constant_field(stream: &MessageStream, name: &str) -> Result<Option<FieldValue>, CheckError> {
    match stream.get_unique_value_for_field(name) {
        Ok(value) => Ok(Some(value)),
        Err(StreamError::NoValues { .. }) => Ok(None),
        Err(StreamError::MultipleValues { values, .. }) => invalid(format!(
            "received different values during session for `{name}`: {}",
            describe(values)
        )),
        Err(e) => Err(e.into()),
    }
}

/// Check that a field holds one expected value throughout the stream.
fn expect_constant(
    stream: &MessageStream,
    name: &str,
    expected: FieldValue,
) -> Result<(), CheckError> {
    match constant_field(stream, name)? {
        Some(value) if value != expected => invalid(format!(
            "unexpected value for `{name}`: {value} (expected {expected})"
        )),
        _ => Ok(()),
    }
}

fn require_background(device: &DeviceConfig, kind: PageKind) -> Result<(), CheckError> {
    if !device.background_pages.contains(&kind) {
        return invalid(format!(
            "the configuration violates the profile: {kind} must be a background page"
        ));
    }

    Ok(())
}

/// Manufacturer id and serial number are constant and as configured.
pub fn manufacturer_information(
    stream: &MessageStream,
    device: &DeviceConfig,
) -> Result<(), CheckError> {
    require_background(device, PageKind::ManufacturerInformation)?;

    let pages = stream.filter_by_type(PageKind::ManufacturerInformation);
    expect_constant(&pages, "manufacturer_id", device.manufacturer_id.into())?;
    expect_constant(&pages, "serial_number", device.serial_number.into())
}

/// Hardware version, software version and model number are constant and as
/// configured.
pub fn product_information(stream: &MessageStream, device: &DeviceConfig) -> Result<(), CheckError> {
    require_background(device, PageKind::ProductInformation)?;

    let pages = stream.filter_by_type(PageKind::ProductInformation);
    expect_constant(&pages, "hardware_version", device.hardware_version.into())?;
    expect_constant(&pages, "software_version", device.software_version.into())?;
    expect_constant(&pages, "model_number", device.model_number.into())
}

/// Battery level, voltage and status are in range and as expected.
pub fn battery_status(
    stream: &MessageStream,
    expected: &BatteryExpectation,
) -> Result<(), CheckError> {
    let pages = stream.filter_by_type(PageKind::BatteryStatus);

    if pages.is_empty() {
        return Ok(());
    }

    let levels = pages.get_unique_values_for_field("battery_level", false)?;
    if let Some(level) = levels.iter().find(|level| level.as_u32() > Some(100)) {
        return invalid(format!(
            "battery level is not in the range of 0 to 100, is {}",
            level.as_u32().unwrap_or_default()
        ));
    }

    expect_constant(&pages, "battery_level", expected.level.into())?;

    let coarse = constant_field(&pages, "coarse_battery_voltage")?;
    let fractional = constant_field(&pages, "fractional_battery_voltage")?;

    match expected.voltage {
        Some(voltage) => {
            let Some(FieldValue::U8(coarse)) = coarse else {
                return invalid("coarse battery voltage is missing");
            };

            if coarse == 0 || coarse >= BatteryStatus::INVALID_COARSE {
                return invalid(format!("coarse battery voltage has invalid value {coarse:#x}"));
            }

            let fractional = match fractional {
                Some(FieldValue::U8(fractional)) => fractional,
                _ => return invalid("fractional battery voltage is missing"),
            };

            let total = f32::from(coarse) + f32::from(fractional) / 255.0;
            let min = voltage * (1.0 - expected.voltage_tolerance);
            let max = voltage * (1.0 + expected.voltage_tolerance);

            if !(min..=max).contains(&total) {
                return invalid(format!(
                    "battery voltage of {total:.3} V is not in the expected range of \
                     {min:.3} V to {max:.3} V"
                ));
            }
        }
        None => {
            if fractional != Some(BatteryStatus::INVALID_FRACTIONAL.into()) {
                return invalid(
                    "fractional battery voltage should be 0xFF, as the voltage is expected \
                     to be sent as invalid",
                );
            }

            if coarse != Some(BatteryStatus::INVALID_COARSE.into()) {
                return invalid(
                    "coarse battery voltage should be 0xF, as the voltage is expected to be \
                     sent as invalid",
                );
            }
        }
    }

    let status = constant_field(&pages, "battery_status")?
        .and_then(FieldValue::as_u32)
        .unwrap_or_default();

    match expected.status {
        Some(expected) => {
            if status == 0 || status >= u32::from(BatteryStatus::INVALID_STATUS) {
                return invalid(format!("battery status has invalid value {status:#x}"));
            }

            if status != u32::from(expected) {
                return invalid(format!(
                    "unexpected battery status {status:#x} (expected {expected:#x})"
                ));
            }
        }
        None => {
            if status != u32::from(BatteryStatus::INVALID_STATUS) {
                return invalid(format!(
                    "battery status should be the invalid value 0x7, is {status:#x}"
                ));
            }
        }
    }

    Ok(())
}

/// Bytes 1 to 3 of page 0 are reserved.
pub fn default_data_reserved(stream: &MessageStream) -> Result<(), CheckError> {
    for message in stream.filter_by_type(PageKind::DefaultData).iter() {
        let raw = message.page().raw();

        if let Some(i) = (1..4).find(|&i| raw[i] != RESERVED) {
            return invalid(format!(
                "reserved byte {i} of {} is not 0xFF, is {:#04x} (received at {:?})",
                PageKind::DefaultData,
                raw[i],
                message.timestamp()
            ));
        }
    }

    Ok(())
}

/// Byte 1 of page 6 is reserved, bits 4 and 5 of the feature bytes are
/// clear and only supported features are enabled.
pub fn capabilities_reserved(stream: &MessageStream) -> Result<(), CheckError> {
    for message in stream.filter_by_type(PageKind::Capabilities).iter() {
        let raw = message.page().raw();

        if raw[1] != RESERVED {
            return invalid(format!(
                "reserved byte 1 of {} is not 0xFF, is {:#04x}",
                PageKind::Capabilities,
                raw[1]
            ));
        }

        let Record::Capabilities(capabilities) = message.page().record() else {
            continue;
        };

        let Capabilities {
            features_supported: supported,
            features_enabled: enabled,
            ..
        } = capabilities;

        if (supported | enabled) & Capabilities::RESERVED_BITS != 0 {
            return invalid(format!(
                "reserved feature bits are set (supported {supported:#04x}, enabled {enabled:#04x})"
            ));
        }

        if enabled & !supported != 0 {
            return invalid(format!(
                "unsupported features are enabled (supported {supported:#04x}, enabled {enabled:#04x})"
            ));
        }
    }

    Ok(())
}

/// Bits 2 to 7 of byte 1 and bytes 2 and 3 of page 9 are reserved.
pub fn device_information_reserved(stream: &MessageStream) -> Result<(), CheckError> {
    for message in stream.filter_by_type(PageKind::DeviceInformation).iter() {
        let raw = message.page().raw();

        if raw[1] & DeviceInformation::RESERVED_BITS != DeviceInformation::RESERVED_BITS {
            return invalid(format!(
                "reserved bits of byte 1 of {} are not set, byte is {:#04x}",
                PageKind::DeviceInformation,
                raw[1]
            ));
        }

        if let Some(i) = (2..4).find(|&i| raw[i] != RESERVED) {
            return invalid(format!(
                "reserved byte {i} of {} is not 0xFF, is {:#04x}",
                PageKind::DeviceInformation,
                raw[i]
            ));
        }
    }

    Ok(())
}

/// The operating time advances with the time between messages.
pub fn operating_time(stream: &MessageStream) -> Result<(), CheckError> {
    let pages: Vec<(f64, u64)> = stream
        .iter()
        .filter_map(|message| match message.page().record() {
            Record::CumulativeOperatingTime(r) => {
                Some((message.timestamp().as_secs_f64(), u64::from(r.operating_time)))
            }
            _ => None,
        })
        .collect();

    let Some(&(start, first)) = pages.first() else {
        return invalid(format!("did not receive any {}", PageKind::CumulativeOperatingTime));
    };

    let mut offset = 0;
    let mut last = first;

    for &(timestamp, operating_time) in &pages[1..] {
        if operating_time < last {
            offset += u64::from(CumulativeOperatingTime::ROLLOVER);
        }
        last = operating_time;

        let elapsed = timestamp - start;
        let counted =
            ((operating_time + offset - first) * u64::from(CumulativeOperatingTime::UNIT_SECS)) as f64;

        if (counted - elapsed).abs() >= OPERATING_TIME_TOLERANCE_SECS {
            return invalid(format!(
                "operating time advanced by {counted} s within {elapsed:.2} s (received at {timestamp:.2} s)"
            ));
        }
    }

    Ok(())
}

/// Heart beat data of every heart-rate page, with its index in the stream.
fn beats(stream: &MessageStream) -> impl Iterator<Item = (usize, &ReceivedPage, u8, u16)> {
    stream.iter().enumerate().filter_map(|(i, message)| {
        let beat = message.page().heart_rate()?;
        Some((i, message, beat.beat_count, beat.event_time))
    })
}

/// The beat count advances by one between distinct beats.
pub fn beat_count(stream: &MessageStream) -> Result<(), CheckError> {
    let mut beats = beats(stream);

    let Some((_, _, mut last, _)) = beats.next() else {
        return Ok(());
    };

    for (i, _, count, _) in beats {
        if count == last {
            continue;
        }

        if count != last.wrapping_add(1) {
            return invalid(format!(
                "unexpected jump in beat count from {last} to {count} at index {i}"
            ));
        }

        last = count;
    }

    Ok(())
}

/// Event times stay put within a beat and advance by one beat interval
/// between beats.
///
/// The first `skip` beats are not checked.
pub fn event_times(stream: &MessageStream, band: EventTimeBand, skip: usize) -> Result<(), CheckError> {
    let mut beats = beats(stream);

    let Some((mut last_index, _, mut last_count, mut last_time)) = beats.next() else {
        return invalid("did not receive any heart beat");
    };
    let mut skipped = 0;

    for (i, _, count, time) in beats {
        if count == last_count {
            if time != last_time {
                return invalid(format!(
                    "event time changed from {last_time} to {time} within beat {count} at index {i}"
                ));
            }
            continue;
        }

        if skipped < skip {
            skipped += 1;
        } else {
            if count != last_count.wrapping_add(1) {
                return invalid(format!(
                    "unexpected beat count {count} at index {i} (beat count before was {last_count})"
                ));
            }

            let delta = (u32::from(time) + EVENT_TIME_ROLLOVER - u32::from(last_time))
                % EVENT_TIME_ROLLOVER;

            if !band.contains(delta) {
                return invalid(format!(
                    "event time difference between beat {last_count} (index {last_index}) and \
                     beat {count} (index {i}) is {delta}, expected {} to {}",
                    band.min, band.max
                ));
            }
        }

        last_index = i;
        last_count = count;
        last_time = time;
    }

    Ok(())
}

/// The computed heart rate stays within `band`, in beats per minute.
///
/// Messages before the first `skip` beats are not checked.
pub fn computed_heart_rate(
    stream: &MessageStream,
    band: (u8, u8),
    skip: usize,
) -> Result<(), CheckError> {
    let (min, max) = band;
    let mut last = None;
    let mut seen = 0;

    for (i, message, count, _) in beats(stream) {
        if last.is_some_and(|last| last != count) {
            seen += 1;
        }
        last = Some(count);

        if seen < skip {
            continue;
        }

        let Some(rate) = message.page().heart_rate().map(|beat| beat.computed_heart_rate) else {
            continue;
        };

        if !(min..=max).contains(&rate) {
            return invalid(format!(
                "computed heart rate is {rate} bpm at index {i}, expected {min} to {max} bpm"
            ));
        }
    }

    Ok(())
}

/// Page 4 reports the event time of the beat before the current one.
///
/// Only the first message after each toggle bit flip is checked, starting
/// with the first beat after the recording began.
pub fn previous_event_time(stream: &MessageStream) -> Result<(), CheckError> {
    let all: MessageStream = stream
        .iter()
        .filter(|message| message.page().heart_rate().is_some())
        .cloned()
        .collect();

    let checked = toggle_filtered(&all).filter_by_type(PageKind::PreviousHeartBeat);
    let beats: Vec<_> = beats(&all).collect();

    let Some(&(_, _, first_count, _)) = beats.first() else {
        return invalid("did not receive any heart beat");
    };

    let Some(first_beat) = beats.iter().position(|&(_, _, count, _)| count != first_count) else {
        return invalid("did not receive a second heart beat");
    };

    for (i, &(_, message, _, time)) in beats.iter().enumerate().skip(first_beat) {
        if checked.index_of(message).is_err() {
            continue;
        }

        let Record::PreviousHeartBeat(page) = message.page().record() else {
            continue;
        };

        let Some(&(_, _, _, previous)) = beats[..i].iter().rev().find(|beat| beat.3 != time) else {
            continue;
        };

        if page.previous_event_time != previous {
            return invalid(format!(
                "previous event time is {} at {:?}, but the last event time sent was {previous}",
                page.previous_event_time,
                message.timestamp()
            ));
        }
    }

    Ok(())
}

fn classify(stream: &MessageStream) -> Result<Schedule, CheckError> {
    Classifier::default()
        .classify(stream, ())
        .or_else(|e| invalid(format!("{e}")))
}

/// The configured main page is the only main page.
pub fn main_page(stream: &MessageStream, device: &DeviceConfig) -> Result<(), CheckError> {
    let schedule = classify(stream)?;

    if schedule.main != BTreeSet::from([device.main_page]) {
        return invalid(format!(
            "expected {} as the only main page, found {}",
            device.main_page,
            describe(&schedule.main)
        ));
    }

    Ok(())
}

/// The background pages are exactly the configured ones.
pub fn background_pages(stream: &MessageStream, device: &DeviceConfig) -> Result<(), CheckError> {
    let schedule = classify(stream)?;

    let unexpected: Vec<_> = schedule
        .background
        .difference(&device.background_pages)
        .collect();
    if !unexpected.is_empty() {
        return invalid(format!(
            "found unexpected background pages {}",
            describe(unexpected)
        ));
    }

    let missing: Vec<_> = device
        .background_pages
        .difference(&schedule.background)
        .collect();
    if !missing.is_empty() {
        return invalid(format!("did not find background pages {}", describe(missing)));
    }

    Ok(())
}

/// Channel ids received with the messages name the configured device.
///
/// Messages received without a channel id are not checked.
pub fn channel_id(stream: &MessageStream, device: &DeviceConfig) -> Result<(), CheckError> {
    let device_type = ChannelParameters::HEART_RATE.device_type;

    for message in stream.iter() {
        let Some(id) = message.channel_id() else {
            continue;
        };

        if id.device_number != device.device_number {
            return invalid(format!(
                "received device number {} at {:?}, expected {}",
                id.device_number,
                message.timestamp(),
                device.device_number
            ));
        }

        if id.device_type & !PAIRING_BIT != device_type {
            return invalid(format!(
                "received device type {:#04x} at {:?}, expected {device_type:#04x}",
                id.device_type,
                message.timestamp()
            ));
        }
    }

    Ok(())
}

/// Profile 2.5 requires the capabilities page as a background page.
pub fn spec_version(device: &DeviceConfig) -> Result<(), CheckError> {
    if device.spec_version >= SpecVersion::V2_5 {
        require_background(device, PageKind::Capabilities)?;
    }

    Ok(())
}
