//! Fixed 8-byte ANT+ data pages.
//!
//! Every page starts with its page number in byte 0 and fills the remaining
//! seven bytes with a little-endian layout fixed per page number. Heart-rate
//! data pages reserve bit 7 of byte 0 as a toggle bit, which the sender flips
//! every fourth message; it is excluded when matching the page number.
//!
//! A [`Page`] holds the raw bytes of a page whose number has been checked.
//! Its typed view is a [`Record`], an enumeration of the records in the
//! [`hrm`] and [`common`] modules. Records of a known kind can also be
//! decoded and encoded directly through [`PageRecord`].
//!
//! Reserved bytes are filled with `0xFF` when encoding.

pub mod common;
pub mod fields;
pub mod hrm;

use thiserror::Error;
use zerocopy::TryFromBytes;

pub use fields::{FieldValue, PageFields};

use common::{HrFeature, ModeSettings, RequestData};
use hrm::{
    BatteryStatus, Capabilities, CumulativeOperatingTime, DefaultData, DeviceInformation,
    HeartRateData, ManufacturerInformation, PreviousHeartBeat, ProductInformation,
    SwimIntervalSummary,
};

/// Length of every page in bytes.
pub const PAGE_LEN: usize = 8;

/// Bit of byte 0 holding the toggle bit of heart-rate data pages.
pub const TOGGLE_MASK: u8 = 0x80;

/// Filler for reserved bytes.
pub const RESERVED: u8 = 0xFF;

/// An error decoding a page.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageError {
    /// Buffer is not exactly eight bytes long.
    #[error("Page must be 8 bytes long, found {0}.")]
    Length(usize),
    /// Page number does not match the page being decoded.
    #[error("Expected page {expected}, found page {found}.")]
    TypeMismatch { expected: u8, found: u8 },
    /// Page number is not known.
    #[error("Unknown page number {0}.")]
    UnknownPage(u8),
}

/// The page numbers known to the codec.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromBytes)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PageKind {
    DefaultData = 0,
    CumulativeOperatingTime = 1,
    ManufacturerInformation = 2,
    ProductInformation = 3,
    PreviousHeartBeat = 4,
    SwimIntervalSummary = 5,
    Capabilities = 6,
    BatteryStatus = 7,
    DeviceInformation = 9,
    HrFeature = 32,
    RequestData = 70,
    ModeSettings = 76,
}

impl PageKind {
    /// Every known page, in page number order.
    pub const ALL: [Self; 12] = [
        Self::DefaultData,
        Self::CumulativeOperatingTime,
        Self::ManufacturerInformation,
        Self::ProductInformation,
        Self::PreviousHeartBeat,
        Self::SwimIntervalSummary,
        Self::Capabilities,
        Self::BatteryStatus,
        Self::DeviceInformation,
        Self::HrFeature,
        Self::RequestData,
        Self::ModeSettings,
    ];

    /// Pages defined by the heart-rate monitor profile.
    pub const HEART_RATE_PROFILE: [Self; 9] = [
        Self::DefaultData,
        Self::CumulativeOperatingTime,
        Self::ManufacturerInformation,
        Self::ProductInformation,
        Self::PreviousHeartBeat,
        Self::SwimIntervalSummary,
        Self::Capabilities,
        Self::BatteryStatus,
        Self::DeviceInformation,
    ];

    /// The page number.
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Look up a page by its exact page number.
    pub fn from_id(id: u8) -> Option<Self> {
        let kind: Result<Self, _> = zerocopy::try_transmute!(id);
        kind.ok()
    }

    /// Look up the page for a raw byte 0, masking the toggle bit for pages
    /// that carry one.
    pub fn resolve(byte: u8) -> Option<Self> {
        if let Some(kind) = Self::from_id(byte) {
            return Some(kind);
        }

        Self::from_id(byte & !TOGGLE_MASK).filter(|kind| kind.is_toggle_aware())
    }

    /// Whether bit 7 of byte 0 is a toggle bit rather than part of the page
    /// number.
    pub const fn is_toggle_aware(self) -> bool {
        (self as u8) < 0x10
    }

    /// A descriptive name of the page.
    pub const fn name(self) -> &'static str {
        match self {
            Self::DefaultData => "default data",
            Self::CumulativeOperatingTime => "cumulative operating time",
            Self::ManufacturerInformation => "manufacturer information",
            Self::ProductInformation => "product information",
            Self::PreviousHeartBeat => "previous heart beat event time",
            Self::SwimIntervalSummary => "swim interval summary",
            Self::Capabilities => "capabilities",
            Self::BatteryStatus => "battery status",
            Self::DeviceInformation => "device information",
            Self::HrFeature => "heart rate feature control",
            Self::RequestData => "request data",
            Self::ModeSettings => "mode settings",
        }
    }
}

impl core::fmt::Display for PageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "page {} ({})", self.id(), self.name())
    }
}

/// Check the length and page number of a raw page.
fn check(kind: PageKind, raw: &[u8]) -> Result<[u8; PAGE_LEN], PageError> {
    let r: [u8; PAGE_LEN] = raw.try_into().map_err(|_| PageError::Length(raw.len()))?;

    let found = if kind.is_toggle_aware() {
        r[0] & !TOGGLE_MASK
    } else {
        r[0]
    };

    if found != kind.id() {
        Err(PageError::TypeMismatch {
            expected: kind.id(),
            found,
        })?;
    }

    Ok(r)
}

/// A typed page record with a fixed layout.
pub trait PageRecord: Sized {
    /// The page this record is decoded from.
    const KIND: PageKind;

    /// Read the record from a page whose number has been checked.
    fn read(r: [u8; PAGE_LEN]) -> Self;

    /// Write the record, including its page number, to a page.
    fn write(&self) -> [u8; PAGE_LEN];

    /// Decode the record from a raw page.
    fn decode(raw: &[u8]) -> Result<Self, PageError> {
        Ok(Self::read(check(Self::KIND, raw)?))
    }

    /// Encode the record to a raw page.
    fn encode(&self) -> [u8; PAGE_LEN] {
        self.write()
    }
}

/// A received or constructed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Page {
    raw: [u8; PAGE_LEN],
    kind: PageKind,
}

impl Page {
    /// Decode a page, looking up its kind from byte 0.
    pub fn decode(raw: &[u8]) -> Result<Self, PageError> {
        if raw.len() != PAGE_LEN {
            Err(PageError::Length(raw.len()))?;
        }

        let kind = PageKind::resolve(raw[0]).ok_or(PageError::UnknownPage(raw[0]))?;
        Self::decode_as(kind, raw)
    }

    /// Decode a page of a declared kind.
    pub fn decode_as(kind: PageKind, raw: &[u8]) -> Result<Self, PageError> {
        let raw = check(kind, raw)?;
        Ok(Self { raw, kind })
    }

    /// The kind of page.
    pub fn kind(&self) -> PageKind {
        self.kind
    }

    /// The raw bytes of the page.
    pub fn raw(&self) -> &[u8; PAGE_LEN] {
        &self.raw
    }

    /// The state of bit 7 of byte 0.
    ///
    /// For heart-rate data pages this is the toggle bit. Other pages always
    /// report the bit of their page number.
    pub fn toggle_bit(&self) -> bool {
        self.raw[0] & TOGGLE_MASK != 0
    }

    /// The typed record held by this page.
    pub fn record(&self) -> Record {
        let r = self.raw;

        match self.kind {
            PageKind::DefaultData => Record::DefaultData(DefaultData::read(r)),
            PageKind::CumulativeOperatingTime => {
                Record::CumulativeOperatingTime(CumulativeOperatingTime::read(r))
            }
            PageKind::ManufacturerInformation => {
                Record::ManufacturerInformation(ManufacturerInformation::read(r))
            }
            PageKind::ProductInformation => Record::ProductInformation(ProductInformation::read(r)),
            PageKind::PreviousHeartBeat => Record::PreviousHeartBeat(PreviousHeartBeat::read(r)),
            PageKind::SwimIntervalSummary => {
                Record::SwimIntervalSummary(SwimIntervalSummary::read(r))
            }
            PageKind::Capabilities => Record::Capabilities(Capabilities::read(r)),
            PageKind::BatteryStatus => Record::BatteryStatus(BatteryStatus::read(r)),
            PageKind::DeviceInformation => Record::DeviceInformation(DeviceInformation::read(r)),
            PageKind::HrFeature => Record::HrFeature(HrFeature::read(r)),
            PageKind::RequestData => Record::RequestData(RequestData::read(r)),
            PageKind::ModeSettings => Record::ModeSettings(ModeSettings::read(r)),
        }
    }

    /// The heart beat data trailing every heart-rate data page.
    pub fn heart_rate(&self) -> Option<HeartRateData> {
        self.record().heart_rate()
    }
}

impl PageFields for Page {
    fn field(&self, name: &str) -> Option<FieldValue> {
        self.record().field(name)
    }
}

impl From<Record> for Page {
    fn from(record: Record) -> Self {
        Self {
            raw: record.encode(),
            kind: record.kind(),
        }
    }
}

/// The typed content of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Record {
    DefaultData(DefaultData),
    CumulativeOperatingTime(CumulativeOperatingTime),
    ManufacturerInformation(ManufacturerInformation),
    ProductInformation(ProductInformation),
    PreviousHeartBeat(PreviousHeartBeat),
    SwimIntervalSummary(SwimIntervalSummary),
    Capabilities(Capabilities),
    BatteryStatus(BatteryStatus),
    DeviceInformation(DeviceInformation),
    HrFeature(HrFeature),
    RequestData(RequestData),
    ModeSettings(ModeSettings),
}

/// Apply an expression to the record held by any variant.
macro_rules! each_record {
    ($value:expr, $r:ident => $body:expr) => {
        match $value {
            Record::DefaultData($r) => $body,
            Record::CumulativeOperatingTime($r) => $body,
            Record::ManufacturerInformation($r) => $body,
            Record::ProductInformation($r) => $body,
            Record::PreviousHeartBeat($r) => $body,
            Record::SwimIntervalSummary($r) => $body,
            Record::Capabilities($r) => $body,
            Record::BatteryStatus($r) => $body,
            Record::DeviceInformation($r) => $body,
            Record::HrFeature($r) => $body,
            Record::RequestData($r) => $body,
            Record::ModeSettings($r) => $body,
        }
    };
}

impl Record {
    /// Decode a record, looking up its kind from byte 0.
    pub fn decode(raw: &[u8]) -> Result<Self, PageError> {
        Page::decode(raw).map(|page| page.record())
    }

    /// Encode the record to a raw page.
    pub fn encode(&self) -> [u8; PAGE_LEN] {
        each_record!(self, r => r.write())
    }

    /// The kind of page holding this record.
    pub fn kind(&self) -> PageKind {
        fn kind_of<R: PageRecord>(_: &R) -> PageKind {
            R::KIND
        }

        each_record!(self, r => kind_of(r))
    }

    /// The heart beat data trailing every heart-rate data page.
    pub fn heart_rate(&self) -> Option<HeartRateData> {
        match self {
            Self::DefaultData(r) => Some(r.heart_rate),
            Self::CumulativeOperatingTime(r) => Some(r.heart_rate),
            Self::ManufacturerInformation(r) => Some(r.heart_rate),
            Self::ProductInformation(r) => Some(r.heart_rate),
            Self::PreviousHeartBeat(r) => Some(r.heart_rate),
            Self::SwimIntervalSummary(r) => Some(r.heart_rate),
            Self::Capabilities(r) => Some(r.heart_rate),
            Self::BatteryStatus(r) => Some(r.heart_rate),
            Self::DeviceInformation(r) => Some(r.heart_rate),
            Self::HrFeature(_) | Self::RequestData(_) | Self::ModeSettings(_) => None,
        }
    }
}

impl PageFields for Record {
    fn field(&self, name: &str) -> Option<FieldValue> {
        each_record!(self, r => r.field(name))
    }
}

macro_rules! record_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Record {
                fn from(record: $variant) -> Self {
                    Self::$variant(record)
                }
            }

            impl From<$variant> for Page {
                fn from(record: $variant) -> Self {
                    Record::$variant(record).into()
                }
            }
        )*
    };
}

record_from!(
    DefaultData,
    CumulativeOperatingTime,
    ManufacturerInformation,
    ProductInformation,
    PreviousHeartBeat,
    SwimIntervalSummary,
    Capabilities,
    BatteryStatus,
    DeviceInformation,
    HrFeature,
    RequestData,
    ModeSettings,
);
