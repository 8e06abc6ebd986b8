//! Expectations about the device under test, and channel settings.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::time::Duration;

use crate::meta::ExtendedFormat;
use crate::page::PageKind;

/// A revision of the heart-rate monitor profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpecVersion {
    V2_0,
    V2_1,
    #[default]
    V2_5,
}

/// What a heart-rate sensor is expected to send.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    pub device_number: u16,
    pub manufacturer_id: u8,
    /// Upper 16 bits of the serial number, as sent on page 2.
    pub serial_number: u16,
    pub hardware_version: u8,
    pub software_version: u8,
    pub model_number: u8,
    #[cfg_attr(feature = "serde", serde(default = "DeviceConfig::default_main_page"))]
    pub main_page: PageKind,
    #[cfg_attr(
        feature = "serde",
        serde(default = "DeviceConfig::default_background_pages")
    )]
    pub background_pages: BTreeSet<PageKind>,
    /// Whether page 7 carries the battery voltage.
    #[cfg_attr(feature = "serde", serde(default = "DeviceConfig::default_true"))]
    pub battery_voltage_supported: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub spec_version: SpecVersion,
    /// Pages sent in reply to a request data page.
    #[cfg_attr(
        feature = "serde",
        serde(default = "DeviceConfig::default_requestable_pages")
    )]
    pub requestable_pages: BTreeSet<PageKind>,
    /// Whether pages requested as acknowledged are sent as broadcast instead.
    #[cfg_attr(feature = "serde", serde(default))]
    pub ack_redirected_to_broadcast: bool,
}

impl DeviceConfig {
    /// A device with the given identity and the default page schedule: page
    /// 4 as main page and pages 2, 3, 6 and 7 as background pages.
    pub fn new(
        device_number: u16,
        manufacturer_id: u8,
        serial_number: u16,
        hardware_version: u8,
        software_version: u8,
        model_number: u8,
    ) -> Self {
        Self {
            device_number,
            manufacturer_id,
            serial_number,
            hardware_version,
            software_version,
            model_number,
            main_page: Self::default_main_page(),
            background_pages: Self::default_background_pages(),
            battery_voltage_supported: true,
            spec_version: SpecVersion::default(),
            requestable_pages: Self::default_requestable_pages(),
            ack_redirected_to_broadcast: false,
        }
    }

    /// The battery status code expected for a battery level in percent.
    pub fn expected_battery_status(level: u8) -> u8 {
        match level {
            0 => 0x05,
            1..20 => 0x04,
            20..80 => 0x03,
            80..90 => 0x02,
            _ => 0x01,
        }
    }

    fn default_main_page() -> PageKind {
        PageKind::PreviousHeartBeat
    }

    fn default_background_pages() -> BTreeSet<PageKind> {
        BTreeSet::from([
            PageKind::ManufacturerInformation,
            PageKind::ProductInformation,
            PageKind::Capabilities,
            PageKind::BatteryStatus,
        ])
    }

    fn default_requestable_pages() -> BTreeSet<PageKind> {
        BTreeSet::from([
            PageKind::ManufacturerInformation,
            PageKind::ProductInformation,
            PageKind::BatteryStatus,
        ])
    }

    #[cfg(feature = "serde")]
    fn default_true() -> bool {
        true
    }
}

/// Tolerances applied when checking a recorded session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TestCriteria {
    /// Allowed relative deviation of the beat-to-beat interval.
    pub rr_tolerance: f32,
    /// Allowed deviation of the computed heart rate, in beats per minute.
    pub bpm_tolerance: u8,
    /// Beats ignored before beat intervals and counters are checked.
    pub skip_first_beats: usize,
    /// Repeat counts to try when requesting pages as broadcast.
    pub broadcast_request_counts: Vec<u8>,
    /// Repeat counts to try when requesting pages as acknowledged.
    pub acknowledged_request_counts: Vec<u8>,
    /// Fraction of messages allowed to be lost, from 0 to 1.
    pub allowed_packet_loss: f32,
    /// Time a sensor may take to begin answering a request.
    pub response_time: Duration,
}

impl Default for TestCriteria {
    fn default() -> Self {
        Self {
            rr_tolerance: 0.1,
            bpm_tolerance: 1,
            skip_first_beats: 0,
            broadcast_request_counts: Vec::from([1, 5]),
            acknowledged_request_counts: Vec::from([1, 5]),
            allowed_packet_loss: 0.0,
            response_time: Duration::from_secs(1),
        }
    }
}

impl TestCriteria {
    /// The allowed range of a beat-to-beat interval in seconds.
    pub fn rr_band(&self, expected_secs: f32) -> (f32, f32) {
        (
            expected_secs * (1.0 - self.rr_tolerance),
            expected_secs * (1.0 + self.rr_tolerance),
        )
    }

    /// How many of `requested` messages may be lost.
    pub fn allowed_losses(&self, requested: u8) -> u8 {
        (f32::from(requested) * self.allowed_packet_loss.clamp(0.0, 1.0)) as u8
    }

    /// The allowed range of a computed heart rate.
    pub fn bpm_band(&self, expected_bpm: u8) -> (u8, u8) {
        (
            expected_bpm.saturating_sub(self.bpm_tolerance),
            expected_bpm.saturating_add(self.bpm_tolerance),
        )
    }
}

/// Settings of the ANT channel used to receive from a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelParameters {
    /// `0x00` for a bidirectional slave channel.
    pub channel_type: u8,
    /// Offset from 2400 MHz.
    pub rf_frequency: u8,
    pub device_type: u8,
    /// `0` pairs with any transmission type.
    pub transmission_type: u8,
    /// Message period in 1/32768 s.
    pub period: u16,
    pub network_key: [u8; 8],
}

impl ChannelParameters {
    /// A slave channel receiving from any heart-rate monitor at about 4 Hz.
    pub const HEART_RATE: Self = Self {
        channel_type: 0x00,
        rf_frequency: 57,
        device_type: 0x78,
        transmission_type: 0,
        period: 8070,
        network_key: [0xB9, 0xA5, 0x21, 0xFB, 0xBD, 0x72, 0xC3, 0x45],
    };

    /// Time between two messages.
    pub fn message_interval(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.period) / 32768.0)
    }
}

/// Settings of a [`ChannelSession`](crate::session::ChannelSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Channel the delivery source is started on.
    pub channel: ChannelParameters,
    /// Format of delivered messages.
    pub format: ExtendedFormat,
    /// Interval at which the delivery source is polled while waiting.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelParameters::HEART_RATE,
            format: ExtendedFormat::default(),
            poll_interval: Duration::from_millis(100),
        }
    }
}
