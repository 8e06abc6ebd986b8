//! Conformance checks over recorded streams.
//!
//! A check inspects a [`MessageStream`] and either passes, fails with a
//! [`ValidationError`] describing how the device deviates from its profile,
//! or fails with a defect: an error that points at a bug in the check
//! itself, such as reading a field the page does not have.
//!
//! A [`ValidatorSet`] runs a fixed, ordered list of named checks and records
//! each outcome in a [`ValidationReport`]. Conformance failures are recorded
//! and the remaining checks still run. A defect aborts the whole report.

pub mod hrm;

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::Write;

use thiserror::Error;

use crate::observe::Observer;
use crate::stream::{MessageStream, StreamError};

/// A device does not conform to its profile.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// The ways a single check can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckError {
    /// The device does not conform.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// The check itself is broken.
    #[error(transparent)]
    Defect(#[from] StreamError),
}

/// Fail a check with a conformance error.
pub(crate) fn invalid<T>(message: impl Into<String>) -> Result<T, CheckError> {
    Err(CheckError::Invalid(ValidationError::new(message)))
}

/// An error running a set of checks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// Two checks share one name.
    #[error("Check `{0}` is listed more than once.")]
    DuplicateCheck(String),
    /// A check failed for a reason other than a conformance failure.
    #[error("Check `{check}` is defective: {source}")]
    UnexpectedDefect {
        check: String,
        #[source]
        source: StreamError,
    },
}

/// The outcome of each check, in the order they ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    entries: Vec<(String, Result<(), ValidationError>)>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a check. Each name may be recorded once.
    pub fn insert(
        &mut self,
        check: impl Into<String>,
        outcome: Result<(), ValidationError>,
    ) -> Result<(), ReportError> {
        let check = check.into();

        if self.get(&check).is_some() {
            return Err(ReportError::DuplicateCheck(check));
        }

        self.entries.push((check, outcome));
        Ok(())
    }

    /// The outcome of a check, if it ran.
    pub fn get(&self, check: &str) -> Option<&Result<(), ValidationError>> {
        self.entries
            .iter()
            .find(|(name, _)| name == check)
            .map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<(), ValidationError>)> {
        self.entries
            .iter()
            .map(|(name, outcome)| (name.as_str(), outcome))
    }

    /// The checks that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ValidationError)> {
        self.iter()
            .filter_map(|(name, outcome)| outcome.as_ref().err().map(|e| (name, e)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every check passed.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Collapse the report into one error listing every failed check.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_success() {
            return Ok(());
        }

        let mut message = String::from("detected errors within the profile:");
        for (name, e) in self.failures() {
            // Writing to a string cannot fail.
            let _ = write!(message, "\n- {name}: {e}");
        }

        Err(ValidationError(message))
    }
}

/// A check over a stream.
pub type Check<'a> = Box<dyn Fn(&MessageStream) -> Result<(), CheckError> + 'a>;

/// An ordered list of named checks.
pub struct ValidatorSet<'a> {
    checks: Vec<(String, Check<'a>)>,
}

impl<'a> ValidatorSet<'a> {
    /// A set running the given checks in order. Names must be unique.
    pub fn new(checks: impl IntoIterator<Item = (String, Check<'a>)>) -> Result<Self, ReportError> {
        let checks: Vec<_> = checks.into_iter().collect();

        for (i, (name, _)) in checks.iter().enumerate() {
            if checks[..i].iter().any(|(other, _)| other == name) {
                Err(ReportError::DuplicateCheck(name.clone()))?;
            }
        }

        Ok(Self { checks })
    }

    /// The names of the checks, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every check over a stream.
    ///
    /// Stops at the first defective check.
    pub fn report(
        &self,
        stream: &MessageStream,
        mut observer: impl Observer,
    ) -> Result<ValidationReport, ReportError> {
        let mut report = ValidationReport::new();

        for (name, check) in &self.checks {
            let outcome = match check(stream) {
                Ok(()) => Ok(()),
                Err(CheckError::Invalid(e)) => Err(e),
                Err(CheckError::Defect(source)) => Err(ReportError::UnexpectedDefect {
                    check: name.clone(),
                    source,
                })?,
            };

            observer.validated(name, outcome.as_ref().map(|_| ()));
            report.insert(name.as_str(), outcome)?;
        }

        Ok(report)
    }
}

impl core::fmt::Debug for ValidatorSet<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Build a named check from a name and a closure.
pub fn check<'a>(
    name: impl ToString,
    check: impl Fn(&MessageStream) -> Result<(), CheckError> + 'a,
) -> (String, Check<'a>) {
    (name.to_string(), Box::new(check))
}

/// Describe a list of values for an error message.
pub(crate) fn describe<T: core::fmt::Display>(values: impl IntoIterator<Item = T>) -> String {
    let values: Vec<String> = values.into_iter().map(|v| format!("{v}")).collect();
    values.join(", ")
}
