//! Hooks into decoding, classification, validation and channel state.
//!
//! Components that do work worth reporting take an [`Observer`]. Every method
//! has an empty default, so an implementation only overrides the events it
//! is interested in. The unit type `()` ignores all events.

use crate::schedule::{Schedule, ScheduleError};
use crate::stream::{DecodeError, ReceivedPage};
use crate::validate::ValidationError;

/// Receive events as they happen.
pub trait Observer {
    /// A message was decoded and appended to a stream.
    fn decoded(&mut self, message: &ReceivedPage) {
        let _ = message;
    }

    /// A message could not be decoded and was dropped.
    fn decode_failed(&mut self, raw: &[u8], error: &DecodeError) {
        let _ = (raw, error);
    }

    /// The page schedule of a stream was classified.
    fn classified(&mut self, schedule: &Schedule) {
        let _ = schedule;
    }

    /// The page schedule of a stream could not be classified.
    fn classification_failed(&mut self, error: &ScheduleError) {
        let _ = error;
    }

    /// A named check has run.
    fn validated(&mut self, check: &str, outcome: Result<(), &ValidationError>) {
        let _ = (check, outcome);
    }

    fn channel_opened(&mut self) {}

    fn channel_closed(&mut self) {}
}

impl Observer for () {}

impl<O: Observer + ?Sized> Observer for &mut O {
    fn decoded(&mut self, message: &ReceivedPage) {
        (**self).decoded(message);
    }

    fn decode_failed(&mut self, raw: &[u8], error: &DecodeError) {
        (**self).decode_failed(raw, error);
    }

    fn classified(&mut self, schedule: &Schedule) {
        (**self).classified(schedule);
    }

    fn classification_failed(&mut self, error: &ScheduleError) {
        (**self).classification_failed(error);
    }

    fn validated(&mut self, check: &str, outcome: Result<(), &ValidationError>) {
        (**self).validated(check, outcome);
    }

    fn channel_opened(&mut self) {
        (**self).channel_opened();
    }

    fn channel_closed(&mut self) {
        (**self).channel_closed();
    }
}

/// Forward events to `tracing`.
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

#[cfg(feature = "tracing")]
impl Observer for TracingObserver {
    fn decoded(&mut self, message: &ReceivedPage) {
        tracing::trace!(
            "Received {} at {:?}: {:02x?}",
            message.kind(),
            message.timestamp(),
            message.page().raw()
        );
    }

    fn decode_failed(&mut self, raw: &[u8], error: &DecodeError) {
        tracing::warn!("Dropped message {:02x?}: {}", raw, error);
    }

    fn classified(&mut self, schedule: &Schedule) {
        tracing::info!(
            "Main pages {:?}, background pages {:?}",
            schedule.main,
            schedule.background
        );
    }

    fn classification_failed(&mut self, error: &ScheduleError) {
        tracing::error!("Page schedule is inconsistent: {}", error);
    }

    fn validated(&mut self, check: &str, outcome: Result<(), &ValidationError>) {
        match outcome {
            Ok(()) => tracing::info!("Validation passed: {}", check),
            Err(e) => tracing::error!("Validation failed: {}: {}", check, e),
        }
    }

    fn channel_opened(&mut self) {
        tracing::debug!("Channel opened");
    }

    fn channel_closed(&mut self) {
        tracing::debug!("Channel closed");
    }
}
