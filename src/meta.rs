//! Extended metadata appended to received pages.
//!
//! An ANT interface can append channel, signal strength and timing details to
//! every received page, in one of two formats:
//!
//! - Legacy: a 12-byte message with a 4-byte channel id followed by the
//!   8-byte page.
//! - Flagged: the 8-byte page, a flag byte, then each block announced by the
//!   flag byte, in the fixed order channel id, RSSI, timestamp.
//!
//! The blocks of a single message are always of one format, which
//! [`ExtendedMetas`] encodes as the two sides of an [`Either`].

use alloc::vec::Vec;

use either::Either::{self, Left, Right};
use tartan_bitfield::bitfield;
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::page::PAGE_LEN;

/// Length of a legacy extended message.
pub const LEGACY_LEN: usize = 12;

/// Offset of the page within a legacy extended message.
pub const LEGACY_PAGE_OFFSET: usize = 4;

/// The kind of a metadata block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetaKind {
    ChannelId,
    Rssi,
    Timestamp,
}

impl MetaKind {
    /// Length of the block in bytes.
    pub const fn len(self) -> usize {
        match self {
            Self::ChannelId => 4,
            Self::Rssi => 3,
            Self::Timestamp => 2,
        }
    }
}

/// An error parsing extended metadata.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetaError {
    /// Legacy message of the wrong length.
    #[error("Expected {expected} bytes of legacy extended data, found {found}.")]
    Length { expected: usize, found: usize },
    /// Flagged message without a flag byte.
    #[error("Expected more than 8 bytes of flagged extended data, found {0}.")]
    TooShort(usize),
    /// Flagged block cut short.
    #[error("Flagged {kind:?} block is cut short ({found} bytes left).")]
    Truncated { kind: MetaKind, found: usize },
    /// Bytes left over after all flagged blocks.
    #[error("Found {0} unknown bytes after the flagged extended data.")]
    TrailingData(usize),
    /// Two blocks of the same kind in one message.
    #[error("Found more than one {0:?} block.")]
    Duplicate(MetaKind),
}

#[repr(C, packed)]
#[derive(FromBytes, IntoBytes, Immutable)]
struct ChannelIdBlock {
    device_number: [u8; 2],
    device_type: u8,
    transmission_type: u8,
}

/// Identity of the transmitting channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    pub device_number: u16,
    pub device_type: u8,
    pub transmission_type: u8,
}

impl ChannelId {
    fn read(r: [u8; 4]) -> Self {
        let ChannelIdBlock {
            device_number,
            device_type,
            transmission_type,
        } = zerocopy::transmute!(r);

        Self {
            device_number: u16::from_le_bytes(device_number),
            device_type,
            transmission_type,
        }
    }
}

/// Received signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rssi {
    pub measurement_type: u8,
    /// In dBm.
    pub rssi: i8,
    /// In dBm.
    pub threshold: i8,
}

impl Rssi {
    fn read([measurement_type, rssi, threshold]: [u8; 3]) -> Self {
        Self {
            measurement_type,
            rssi: rssi as i8,
            threshold: threshold as i8,
        }
    }
}

/// Receive time of a message, in 1/32768 s. Rolls over every 2 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp(pub u16);

impl Timestamp {
    /// Ticks per second.
    pub const TICKS_PER_SEC: u32 = 32768;

    /// The receive time in seconds, within the current 2 s window.
    pub fn secs(&self) -> f32 {
        f32::from(self.0) / Self::TICKS_PER_SEC as f32
    }
}

/// A block of legacy extended metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyMeta {
    ChannelId(ChannelId),
}

impl LegacyMeta {
    pub fn kind(&self) -> MetaKind {
        match self {
            Self::ChannelId(_) => MetaKind::ChannelId,
        }
    }
}

/// A block of flagged extended metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlaggedMeta {
    ChannelId(ChannelId),
    Rssi(Rssi),
    Timestamp(Timestamp),
}

impl FlaggedMeta {
    pub fn kind(&self) -> MetaKind {
        match self {
            Self::ChannelId(_) => MetaKind::ChannelId,
            Self::Rssi(_) => MetaKind::Rssi,
            Self::Timestamp(_) => MetaKind::Timestamp,
        }
    }
}

/// The metadata blocks of one message, all of one format.
pub type ExtendedMetas = Either<Vec<LegacyMeta>, Vec<FlaggedMeta>>;

/// Check that no kind of block appears twice.
pub fn check_unique(metas: &ExtendedMetas) -> Result<(), MetaError> {
    let kinds: Vec<MetaKind> = match metas {
        Left(metas) => metas.iter().map(LegacyMeta::kind).collect(),
        Right(metas) => metas.iter().map(FlaggedMeta::kind).collect(),
    };

    for (i, kind) in kinds.iter().enumerate() {
        if kinds[..i].contains(kind) {
            Err(MetaError::Duplicate(*kind))?;
        }
    }

    Ok(())
}

/// Parse a legacy extended message.
///
/// The channel id occupies the first four bytes of the twelve.
pub fn parse_legacy(raw: &[u8]) -> Result<Vec<LegacyMeta>, MetaError> {
    let r: [u8; LEGACY_LEN] = raw.try_into().map_err(|_| MetaError::Length {
        expected: LEGACY_LEN,
        found: raw.len(),
    })?;

    let [a, b, c, d, ..] = r;

    Ok(Vec::from([LegacyMeta::ChannelId(ChannelId::read([a, b, c, d]))]))
}

bitfield! {
    struct Flags(u8) {
        [5] timestamp,
        [6] rssi,
        [7] channel_id,
    }
}

/// Parse a flagged extended message.
///
/// Blocks are returned in the order they appear. Any bytes not claimed by the
/// flag byte are an error.
pub fn parse_flagged(raw: &[u8]) -> Result<Vec<FlaggedMeta>, MetaError> {
    let Some((&flags, mut rest)) = raw.get(PAGE_LEN..).and_then(<[u8]>::split_first) else {
        Err(MetaError::TooShort(raw.len()))?
    };

    let flags = Flags(flags);
    let mut metas = Vec::new();

    if flags.channel_id() {
        metas.push(FlaggedMeta::ChannelId(ChannelId::read(take(
            &mut rest,
            MetaKind::ChannelId,
        )?)));
    }

    if flags.rssi() {
        metas.push(FlaggedMeta::Rssi(Rssi::read(take(&mut rest, MetaKind::Rssi)?)));
    }

    if flags.timestamp() {
        let ticks = take(&mut rest, MetaKind::Timestamp)?;
        metas.push(FlaggedMeta::Timestamp(Timestamp(u16::from_le_bytes(ticks))));
    }

    if !rest.is_empty() {
        Err(MetaError::TrailingData(rest.len()))?;
    }

    Ok(metas)
}

/// Take the bytes of one block from the front of a slice.
fn take<'a, const N: usize>(r: &mut &'a [u8], kind: MetaKind) -> Result<[u8; N], MetaError> {
    let slice: &'a [u8] = r;
    let Some((block, rest)) = slice.split_first_chunk::<N>() else {
        Err(MetaError::Truncated {
            kind,
            found: slice.len(),
        })?
    };

    *r = rest;
    Ok(*block)
}

/// The format of messages delivered by an ANT interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExtendedFormat {
    /// Plain 8-byte pages.
    None,
    /// Channel id followed by the page.
    Legacy,
    /// Page followed by flagged blocks.
    #[default]
    Flagged,
}

impl ExtendedFormat {
    /// Separate the page bytes of a message from its metadata.
    pub fn split(self, raw: &[u8]) -> Result<(&[u8], Option<ExtendedMetas>), MetaError> {
        match self {
            Self::None => Ok((raw, None)),
            Self::Legacy => {
                let metas = parse_legacy(raw)?;
                Ok((&raw[LEGACY_PAGE_OFFSET..], Some(Left(metas))))
            }
            Self::Flagged => {
                let metas = parse_flagged(raw)?;
                Ok((&raw[..PAGE_LEN], Some(Right(metas))))
            }
        }
    }
}
