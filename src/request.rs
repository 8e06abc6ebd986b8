//! Manual page requests.
//!
//! A collector asks a sensor for one of its pages by sending a request data
//! page (page 70). The sensor replies with the requested page, repeated as
//! often as asked, as broadcast data or, if the request asked for it, as
//! acknowledged data. Some sensors reply to acknowledged requests with
//! broadcast data instead.

use alloc::format;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::{DeviceConfig, TestCriteria};
use crate::observe::Observer;
use crate::page::common::RequestData;
use crate::page::{Page, PageKind};
use crate::session::{ChannelSession, DeliverySource, SessionError, Transport};
use crate::stream::MessageStream;
use crate::validate::{ReportError, ValidationError, ValidationReport};

/// An error running a series of requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// A request and the messages of the requested kind that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: PageKind,
    /// How the request was sent.
    pub transport: Transport,
    pub repeat_count: u8,
    pub broadcast: MessageStream,
    pub acknowledged: MessageStream,
}

impl Reply {
    /// Every reply, in either transport.
    pub fn len(&self) -> usize {
        self.broadcast.len() + self.acknowledged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The newest timestamp in either stream of a session.
fn latest<S: DeliverySource, O: Observer>(session: &ChannelSession<S, O>) -> Option<Duration> {
    let last = |stream: &MessageStream| stream.as_slice().last().map(|m| m.timestamp());

    last(session.broadcast_messages()).max(last(session.acknowledged_messages()))
}

fn replies(stream: &MessageStream, kind: PageKind, since: Option<Duration>) -> MessageStream {
    stream.filter(|message| {
        message.kind() == kind && since.is_none_or(|since| message.timestamp() > since)
    })
}

/// Request a page and collect the reply.
///
/// Returns as soon as the requested number of messages arrived, or once the
/// requested number of message periods plus the response time of `criteria`
/// have passed.
pub fn request<S: DeliverySource, O: Observer>(
    session: &mut ChannelSession<S, O>,
    kind: PageKind,
    repeat_count: u8,
    transport: Transport,
    criteria: &TestCriteria,
) -> Result<Reply, SessionError> {
    session.poll()?;
    let since = latest(session);

    let requested = repeat_count.clamp(1, RequestData::MAX_REPEAT_COUNT);
    let acknowledged = transport == Transport::Acknowledged;
    let page = Page::from(RequestData::new(kind, requested, acknowledged));

    match transport {
        Transport::Broadcast => session.send_broadcast(&page)?,
        Transport::Acknowledged => session.send_acknowledged(&page)?,
    }

    let window =
        session.config().channel.message_interval() * u32::from(requested) + criteria.response_time;
    let start = Instant::now();

    loop {
        session.poll()?;

        let received = replies(session.broadcast_messages(), kind, since).len()
            + replies(session.acknowledged_messages(), kind, since).len();
        let elapsed = start.elapsed();

        if received >= usize::from(requested) || elapsed >= window {
            break;
        }

        thread::sleep(session.config().poll_interval.min(window - elapsed));
    }

    Ok(Reply {
        kind,
        transport,
        repeat_count: requested,
        broadcast: replies(session.broadcast_messages(), kind, since),
        acknowledged: replies(session.acknowledged_messages(), kind, since),
    })
}

/// Check a reply against what the device is configured to send.
pub fn check_reply(
    reply: &Reply,
    device: &DeviceConfig,
    criteria: &TestCriteria,
) -> Result<(), ValidationError> {
    let kind = reply.kind;

    let expected = match reply.transport {
        Transport::Acknowledged if !device.ack_redirected_to_broadcast => Transport::Acknowledged,
        _ => Transport::Broadcast,
    };

    let (answers, stray, other) = match expected {
        Transport::Broadcast => (&reply.broadcast, &reply.acknowledged, Transport::Acknowledged),
        Transport::Acknowledged => (&reply.acknowledged, &reply.broadcast, Transport::Broadcast),
    };

    if !stray.is_empty() {
        return Err(ValidationError::new(format!(
            "received {} replies for {kind} as {other} data, expected them as {expected} data",
            stray.len()
        )));
    }

    if !device.requestable_pages.contains(&kind) {
        if !answers.is_empty() {
            return Err(ValidationError::new(format!(
                "{kind} is not requestable, but received {} replies",
                answers.len()
            )));
        }

        return Ok(());
    }

    let requested = reply.repeat_count;
    let min = requested - criteria.allowed_losses(requested);

    if !(usize::from(min)..=usize::from(requested)).contains(&answers.len()) {
        return Err(ValidationError::new(format!(
            "received {} replies to a request for {requested} messages of {kind}, expected {min} \
             to {requested}",
            answers.len()
        )));
    }

    Ok(())
}

/// Request each page with each repeat count of `criteria`, first as
/// broadcast and then as acknowledged data, and check every reply.
pub fn request_report<S: DeliverySource, O: Observer>(
    session: &mut ChannelSession<S, O>,
    pages: &[PageKind],
    device: &DeviceConfig,
    criteria: &TestCriteria,
) -> Result<ValidationReport, RequestError> {
    let mut report = ValidationReport::new();

    let series = [
        (Transport::Broadcast, &criteria.broadcast_request_counts),
        (Transport::Acknowledged, &criteria.acknowledged_request_counts),
    ];

    for (transport, counts) in series {
        for &kind in pages {
            for &count in counts {
                let reply = request(session, kind, count, transport, criteria)?;

                report.insert(
                    format!("Request data page: {kind} sent {count} times as {transport} data"),
                    check_reply(&reply, device, criteria),
                )?;
            }
        }
    }

    Ok(report)
}
