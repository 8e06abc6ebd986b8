//! Received pages and the ordered streams collecting them.

use alloc::collections::BTreeSet;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::slice;
use core::time::Duration;

use either::Either::{Left, Right};
use thiserror::Error;

use crate::meta::{
    self, ChannelId, ExtendedFormat, ExtendedMetas, FlaggedMeta, LegacyMeta, MetaError, Rssi,
    Timestamp,
};
use crate::page::{FieldValue, Page, PageError, PageFields, PageKind};

/// An error decoding a received message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Meta(#[from] MetaError),
}

/// An error querying a stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A message has no field of the requested name.
    #[error("Message at index {index} has no field `{name}`.")]
    MissingField { name: String, index: usize },
    /// No message holds the requested field.
    #[error("No message holds a value for field `{name}`.")]
    NoValues { name: String },
    /// A field expected to be constant has several values.
    #[error("Field `{name}` has more than one value: {values:?}.")]
    MultipleValues {
        name: String,
        values: BTreeSet<FieldValue>,
    },
    /// The message is not part of the stream.
    #[error("Message not found in stream.")]
    NotFound,
}

/// A page as received from a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceivedPage {
    page: Page,
    timestamp: Duration,
    metas: Option<ExtendedMetas>,
}

impl ReceivedPage {
    /// A page without extended metadata, received at `timestamp` after the
    /// start of the session.
    pub fn new(page: Page, timestamp: Duration) -> Self {
        Self {
            page,
            timestamp,
            metas: None,
        }
    }

    /// A page with extended metadata. Each kind of block may appear once.
    pub fn with_metas(
        page: Page,
        timestamp: Duration,
        metas: ExtendedMetas,
    ) -> Result<Self, MetaError> {
        meta::check_unique(&metas)?;

        Ok(Self {
            page,
            timestamp,
            metas: Some(metas),
        })
    }

    /// Decode a message as delivered by an ANT interface.
    ///
    /// Legacy messages carry the page in bytes 4 through 11, flagged
    /// messages in bytes 0 through 7.
    pub fn decode(
        format: ExtendedFormat,
        timestamp: Duration,
        raw: &[u8],
    ) -> Result<Self, DecodeError> {
        let (page, metas) = format.split(raw)?;
        let page = Page::decode(page)?;

        Ok(match metas {
            Some(metas) => Self::with_metas(page, timestamp, metas)?,
            None => Self::new(page, timestamp),
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn kind(&self) -> PageKind {
        self.page.kind()
    }

    /// Time of reception since the start of the session.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn metas(&self) -> Option<&ExtendedMetas> {
        self.metas.as_ref()
    }

    /// The channel id block, in either format.
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self.metas.as_ref()? {
            Left(metas) => metas.iter().find_map(|meta| match meta {
                LegacyMeta::ChannelId(id) => Some(*id),
            }),
            Right(metas) => metas.iter().find_map(|meta| match meta {
                FlaggedMeta::ChannelId(id) => Some(*id),
                _ => None,
            }),
        }
    }

    /// The RSSI block of a flagged message.
    pub fn rssi(&self) -> Option<Rssi> {
        self.flagged()?.iter().find_map(|meta| match meta {
            FlaggedMeta::Rssi(rssi) => Some(*rssi),
            _ => None,
        })
    }

    /// The timestamp block of a flagged message.
    pub fn meta_timestamp(&self) -> Option<Timestamp> {
        self.flagged()?.iter().find_map(|meta| match meta {
            FlaggedMeta::Timestamp(timestamp) => Some(*timestamp),
            _ => None,
        })
    }

    fn flagged(&self) -> Option<&[FlaggedMeta]> {
        self.metas.as_ref()?.as_ref().right().map(Vec::as_slice)
    }
}

impl PageFields for ReceivedPage {
    fn field(&self, name: &str) -> Option<FieldValue> {
        self.page.field(name)
    }
}

/// Received pages ordered by timestamp.
///
/// Pages with equal timestamps keep the order they were appended in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageStream {
    messages: Vec<ReceivedPage>,
}

impl MessageStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message after every message with an equal or earlier
    /// timestamp.
    pub fn append(&mut self, message: ReceivedPage) {
        let at = self
            .messages
            .partition_point(|other| other.timestamp <= message.timestamp);
        self.messages.insert(at, message);
    }

    /// Remove all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ReceivedPage> {
        self.messages.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, ReceivedPage> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[ReceivedPage] {
        &self.messages
    }

    /// A new stream of the messages matching a predicate, in order.
    pub fn filter(&self, mut predicate: impl FnMut(&ReceivedPage) -> bool) -> Self {
        self.iter().filter(|message| predicate(message)).cloned().collect()
    }

    /// A new stream of the messages of one page kind.
    pub fn filter_by_type(&self, kind: PageKind) -> Self {
        self.filter(|message| message.kind() == kind)
    }

    /// A new stream of the messages received between `start` and `end`,
    /// both inclusive. A missing bound leaves that side open.
    pub fn filter_by_time_range(&self, start: Option<Duration>, end: Option<Duration>) -> Self {
        self.filter(|message| {
            start.is_none_or(|start| start <= message.timestamp)
                && end.is_none_or(|end| message.timestamp <= end)
        })
    }

    /// Collect the distinct values of a field across the stream.
    ///
    /// Unless `ignore_missing` is set, a message without the field is an
    /// error.
    pub fn get_unique_values_for_field(
        &self,
        name: &str,
        ignore_missing: bool,
    ) -> Result<BTreeSet<FieldValue>, StreamError> {
        let mut values = BTreeSet::new();

        for (index, message) in self.iter().enumerate() {
            match message.field(name) {
                Some(value) => {
                    values.insert(value);
                }
                None if ignore_missing => {}
                None => Err(StreamError::MissingField {
                    name: name.to_string(),
                    index,
                })?,
            }
        }

        Ok(values)
    }

    /// The single value a field holds across the stream.
    pub fn get_unique_value_for_field(&self, name: &str) -> Result<FieldValue, StreamError> {
        let values = self.get_unique_values_for_field(name, false)?;

        let mut iter = values.iter();
        match (iter.next(), iter.next()) {
            (Some(value), None) => Ok(*value),
            (None, _) => Err(StreamError::NoValues {
                name: name.to_string(),
            }),
            (Some(_), Some(_)) => Err(StreamError::MultipleValues {
                name: name.to_string(),
                values,
            }),
        }
    }

    /// The page kinds present in the stream.
    pub fn get_message_types(&self) -> BTreeSet<PageKind> {
        self.iter().map(ReceivedPage::kind).collect()
    }

    /// The position of the first message equal to `message`.
    pub fn index_of(&self, message: &ReceivedPage) -> Result<usize, StreamError> {
        self.iter()
            .position(|other| other == message)
            .ok_or(StreamError::NotFound)
    }

    /// The earliest message of a kind.
    pub fn first(&self, kind: PageKind) -> Option<&ReceivedPage> {
        self.iter().find(|message| message.kind() == kind)
    }

    /// The latest message of a kind.
    pub fn last(&self, kind: PageKind) -> Option<&ReceivedPage> {
        self.iter().rev().find(|message| message.kind() == kind)
    }
}

impl FromIterator<ReceivedPage> for MessageStream {
    fn from_iter<I: IntoIterator<Item = ReceivedPage>>(iter: I) -> Self {
        let mut stream = Self::new();
        stream.extend(iter);
        stream
    }
}

impl Extend<ReceivedPage> for MessageStream {
    fn extend<I: IntoIterator<Item = ReceivedPage>>(&mut self, iter: I) {
        for message in iter {
            self.append(message);
        }
    }
}

impl<'a> IntoIterator for &'a MessageStream {
    type Item = &'a ReceivedPage;
    type IntoIter = slice::Iter<'a, ReceivedPage>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
