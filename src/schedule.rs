//! Classification of the pages in a recorded stream into main and background
//! pages.
//!
//! A heart-rate sensor fills most message slots with its main page and
//! interleaves one background page as a burst of four messages after every
//! 64 main page messages, cycling through its background pages. The sender
//! flips the toggle bit every fourth message, so a page repeated
//! until the next flip is one logical transmission.
//!
//! Classification needs a stream spanning at least two full cycles. The
//! tolerances below absorb messages lost at the edges of the recording. They
//! are empirical and can be tuned on a [`Classifier`].

use alloc::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::observe::Observer;
use crate::page::PageKind;
use crate::stream::MessageStream;

/// A page is a main page if its toggle-filtered count is within this many
/// messages of the most frequent page.
pub const MAIN_PAGE_COUNT_TOLERANCE: usize = 4;

/// A background page may appear in this many fewer runs than the most
/// frequent background page.
pub const BACKGROUND_RUN_TOLERANCE: usize = 1;

/// The most main pages a sensor may alternate between.
pub const MAX_MAIN_PAGES: usize = 2;

/// An error classifying a stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The stream holds no messages.
    #[error("Found no main page in an empty stream.")]
    NoMainPage,
    /// More pages than a sensor can alternate between occur equally often.
    #[error("Found more than two main pages, distribution is {counts:?}.")]
    TooManyMainPages { counts: BTreeMap<PageKind, usize> },
    /// A background page was sent too rarely.
    #[error("Found {kind} in {runs} runs, expected at least {expected}.")]
    Inconsistent {
        kind: PageKind,
        runs: usize,
        expected: usize,
    },
}

/// The roles of the pages in a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub main: BTreeSet<PageKind>,
    pub background: BTreeSet<PageKind>,
}

/// Keep only the first message after each flip of the toggle bit.
///
/// The first message of the stream always counts as a flip.
pub fn toggle_filtered(stream: &MessageStream) -> MessageStream {
    let Some(first) = stream.get(0) else {
        return MessageStream::new();
    };

    let mut toggle = !first.page().toggle_bit();

    stream.filter(|message| {
        let current = message.page().toggle_bit();
        let flipped = current != toggle;
        toggle = current;
        flipped
    })
}

/// Count the messages of each page kind.
pub fn page_counts(stream: &MessageStream) -> BTreeMap<PageKind, usize> {
    let mut counts = BTreeMap::new();

    for message in stream {
        *counts.entry(message.kind()).or_default() += 1;
    }

    counts
}

/// Count the maximal runs of consecutive messages of each page kind.
pub fn run_counts(stream: &MessageStream) -> BTreeMap<PageKind, usize> {
    let mut counts = BTreeMap::new();
    let mut last = None;

    for message in stream {
        let kind = message.kind();

        if last != Some(kind) {
            *counts.entry(kind).or_default() += 1;
            last = Some(kind);
        }
    }

    counts
}

/// Infers page roles from a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    pub main_page_count_tolerance: usize,
    pub background_run_tolerance: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            main_page_count_tolerance: MAIN_PAGE_COUNT_TOLERANCE,
            background_run_tolerance: BACKGROUND_RUN_TOLERANCE,
        }
    }
}

impl Classifier {
    /// Classify every page of a stream as main or background page.
    pub fn classify(
        &self,
        stream: &MessageStream,
        mut observer: impl Observer,
    ) -> Result<Schedule, ScheduleError> {
        let schedule = self
            .main_pages(stream)
            .and_then(|main| self.background_pages(stream, main));

        match &schedule {
            Ok(schedule) => observer.classified(schedule),
            Err(e) => observer.classification_failed(e),
        }

        schedule
    }

    /// The pages sent in most transmissions.
    pub fn main_pages(&self, stream: &MessageStream) -> Result<BTreeSet<PageKind>, ScheduleError> {
        let counts = page_counts(&toggle_filtered(stream));
        let max = counts.values().copied().max().ok_or(ScheduleError::NoMainPage)?;

        let main: BTreeSet<_> = counts
            .iter()
            .filter(|&(_, &count)| count + self.main_page_count_tolerance > max)
            .map(|(&kind, _)| kind)
            .collect();

        if main.len() > MAX_MAIN_PAGES {
            Err(ScheduleError::TooManyMainPages { counts })?;
        }

        Ok(main)
    }

    fn background_pages(
        &self,
        stream: &MessageStream,
        main: BTreeSet<PageKind>,
    ) -> Result<Schedule, ScheduleError> {
        let mut runs = run_counts(stream);
        runs.retain(|kind, _| !main.contains(kind));

        let max = runs.values().copied().max().unwrap_or_default();
        let expected = max.saturating_sub(self.background_run_tolerance);

        if let Some((&kind, &count)) = runs.iter().find(|&(_, &count)| count < expected) {
            Err(ScheduleError::Inconsistent {
                kind,
                runs: count,
                expected,
            })?;
        }

        Ok(Schedule {
            main,
            background: runs.into_keys().collect(),
        })
    }
}
