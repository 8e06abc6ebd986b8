//! Pages shared by all device profiles, and the heart-rate feature control
//! page.
//!
//! These pages are sent to a sensor rather than received from it, and carry
//! no toggle bit.

use tartan_bitfield::bitfield;
use zerocopy::{FromBytes, Immutable, IntoBytes};

use super::{FieldValue, PAGE_LEN, PageFields, PageKind, PageRecord, RESERVED};
use crate::PageFields;

/// Page 32: heart-rate feature control. The payload is opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PageFields)]
pub struct HrFeature {
    pub payload: [u8; 7],
}

impl Default for HrFeature {
    fn default() -> Self {
        Self {
            payload: [RESERVED; 7],
        }
    }
}

impl PageRecord for HrFeature {
    const KIND: PageKind = PageKind::HrFeature;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let [_, payload @ ..] = r;
        Self { payload }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let [a, b, c, d, e, f, g] = self.payload;
        [Self::KIND.id(), a, b, c, d, e, f, g]
    }
}

#[repr(C, packed)]
#[derive(FromBytes, IntoBytes, Immutable)]
struct RequestPage {
    page: u8,
    _reserved: [u8; 4],
    transmission_response: u8,
    requested_page: u8,
    command_type: u8,
}

bitfield! {
    struct TransmissionResponse(u8) {
        [0..7] repeat_count: u8,
        [7] acknowledged,
    }
}

/// Page 70: ask a sensor to send one of its pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct RequestData {
    /// How many times the requested page should be sent, up to `0x7F`.
    #[field]
    pub repeat_count: u8,
    /// Whether the requested page should be sent as acknowledged data.
    #[field]
    pub acknowledged: bool,
    #[field]
    pub requested_page: u8,
    #[field]
    pub command_type: u8,
}

impl RequestData {
    /// Command type requesting a data page.
    pub const REQUEST_DATA_PAGE: u8 = 0x01;

    /// Highest repeat count that can be requested.
    pub const MAX_REPEAT_COUNT: u8 = 0x7F;

    /// Request a page be sent a number of times.
    pub fn new(page: PageKind, repeat_count: u8, acknowledged: bool) -> Self {
        Self {
            repeat_count: repeat_count.min(Self::MAX_REPEAT_COUNT),
            acknowledged,
            requested_page: page.id(),
            command_type: Self::REQUEST_DATA_PAGE,
        }
    }
}

impl PageRecord for RequestData {
    const KIND: PageKind = PageKind::RequestData;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        let RequestPage {
            transmission_response,
            requested_page,
            command_type,
            ..
        } = zerocopy::transmute!(r);

        let response = TransmissionResponse(transmission_response);

        Self {
            repeat_count: response.repeat_count(),
            acknowledged: response.acknowledged(),
            requested_page,
            command_type,
        }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let mut response = TransmissionResponse(0);
        response.set_repeat_count(self.repeat_count & Self::MAX_REPEAT_COUNT);
        response.set_acknowledged(self.acknowledged);

        let page = RequestPage {
            page: Self::KIND.id(),
            _reserved: [RESERVED; 4],
            transmission_response: response.0,
            requested_page: self.requested_page,
            command_type: self.command_type,
        };

        zerocopy::transmute!(page)
    }
}

/// Page 76: set the sport mode of a sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PageFields)]
pub struct ModeSettings {
    #[field]
    pub sub_sport_mode: u8,
    #[field]
    pub sport_mode: u8,
}

impl PageRecord for ModeSettings {
    const KIND: PageKind = PageKind::ModeSettings;

    fn read(r: [u8; PAGE_LEN]) -> Self {
        Self {
            sub_sport_mode: r[6],
            sport_mode: r[7],
        }
    }

    fn write(&self) -> [u8; PAGE_LEN] {
        let mut r = [RESERVED; PAGE_LEN];
        r[0] = Self::KIND.id();
        r[6] = self.sub_sport_mode;
        r[7] = self.sport_mode;
        r
    }
}
