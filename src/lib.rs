#![no_std]

//! A decoder and conformance checker for the ANT+ heart-rate monitor wire
//! protocol.
//!
//! Antwire maps the fixed 8-byte pages broadcast by a heart-rate strap to
//! typed records and back, collects received pages into an ordered
//! [`MessageStream`](stream::MessageStream), and checks recorded sessions
//! against the device profile: which pages are sent as main or background
//! pages ([`schedule`]), and whether every page type holds up its invariants
//! over time ([`validate`]).
//!
//! Most users should begin with [`page::Page::decode`] for single pages, or
//! with a [`session::ChannelSession`] fed by a radio driver for live capture.
//! Manual page requests over a live session live in [`request`].
//!
//! ## Cargo Features
//!
//! The following crate feature flags are available:
//!
//! - `std`: enable the channel session and `std` error impls (default).
//! - `tracing`: enable an observer forwarding events to `tracing`.
//! - `serde`: derive `serde` traits for configuration types.

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod meta;
pub mod observe;
pub mod page;
#[cfg(feature = "std")]
pub mod request;
pub mod schedule;
#[cfg(feature = "std")]
pub mod session;
pub mod stream;
pub mod validate;

/// Derive [`page::PageFields`] for a page record.
///
/// Add `#[field]` to each struct field that should be readable by name, or
/// `#[field("name")]` to expose it under another name. A member holding a
/// nested record is searched with `#[field(flatten)]`.
///
/// ```
/// #[derive(PageFields)]
/// struct ProductInformation {
///     #[field]
///     hardware_version: u8,
///     #[field("model")]
///     model_number: u8,
///     #[field(flatten)]
///     heart_rate: HeartRateData,
/// }
/// ```
pub use antwire_derive::PageFields;
