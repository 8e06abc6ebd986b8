#![cfg(feature = "std")]

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use antwire::config::{DeviceConfig, SessionConfig, TestCriteria};
use antwire::meta::ExtendedFormat;
use antwire::page::{Page, PageKind, Record};
use antwire::request::{self, Reply};
use antwire::session::{ChannelSession, Delivery, QueueLink, SessionError, Transmission, Transport};
use antwire::stream::{MessageStream, ReceivedPage};

/// A sensor answering requests for the given pages.
struct Sensor {
    requestable: Vec<PageKind>,
    ack_redirected_to_broadcast: bool,
}

impl Sensor {
    fn answering(requestable: &[PageKind]) -> Self {
        Self {
            requestable: requestable.to_vec(),
            ack_redirected_to_broadcast: false,
        }
    }

    fn run(self, requests: Receiver<Transmission>, replies: Sender<Delivery>) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut millis = 0;

            for transmission in requests {
                let Ok(Record::RequestData(request)) = Record::decode(&transmission.page) else {
                    continue;
                };

                let Some(kind) = PageKind::from_id(request.requested_page) else {
                    continue;
                };

                if !self.requestable.contains(&kind) {
                    continue;
                }

                let transport = if request.acknowledged && !self.ack_redirected_to_broadcast {
                    Transport::Acknowledged
                } else {
                    Transport::Broadcast
                };

                for _ in 0..request.repeat_count.max(1) {
                    millis += 250;

                    let _ = replies.send(Delivery {
                        transport,
                        timestamp: Duration::from_millis(millis),
                        bytes: vec![kind.id(), 0x0F, 0x39, 0x30, 0x00, 0x04, 0x01, 60],
                    });
                }
            }
        })
    }
}

fn criteria() -> TestCriteria {
    TestCriteria {
        response_time: Duration::from_millis(200),
        ..TestCriteria::default()
    }
}

fn session(sensor: Sensor) -> (ChannelSession<QueueLink>, JoinHandle<()>) {
    let (replies, incoming) = mpsc::channel();
    let (outgoing, requests) = mpsc::channel();

    let config = SessionConfig {
        format: ExtendedFormat::None,
        poll_interval: Duration::from_millis(5),
        ..SessionConfig::default()
    };

    let handle = sensor.run(requests, replies);
    let mut session = ChannelSession::new(QueueLink { incoming, outgoing }, config);
    session.open().unwrap();

    (session, handle)
}

fn device() -> DeviceConfig {
    DeviceConfig::new(12345, 0x0F, 0x3039, 5, 17, 34)
}

#[test]
fn broadcast_request() {
    let (mut session, sensor) = session(Sensor::answering(&[PageKind::ManufacturerInformation]));

    let reply = request::request(
        &mut session,
        PageKind::ManufacturerInformation,
        5,
        Transport::Broadcast,
        &criteria(),
    )
    .unwrap();

    assert_eq!(reply.broadcast.len(), 5);
    assert!(reply.acknowledged.is_empty());
    assert_eq!(request::check_reply(&reply, &device(), &criteria()), Ok(()));

    drop(session);
    sensor.join().unwrap();
}

#[test]
fn acknowledged_request() {
    let (mut session, sensor) = session(Sensor::answering(&[PageKind::ProductInformation]));

    let reply = request::request(
        &mut session,
        PageKind::ProductInformation,
        1,
        Transport::Acknowledged,
        &criteria(),
    )
    .unwrap();

    assert_eq!(reply.acknowledged.len(), 1);
    assert_eq!(reply.acknowledged.as_slice()[0].kind(), PageKind::ProductInformation);
    assert!(reply.broadcast.is_empty());
    assert_eq!(request::check_reply(&reply, &device(), &criteria()), Ok(()));

    drop(session);
    sensor.join().unwrap();
}

#[test]
fn earlier_messages_are_not_replies() {
    let (mut session, sensor) = session(Sensor::answering(&[PageKind::ManufacturerInformation]));

    let first = request::request(
        &mut session,
        PageKind::ManufacturerInformation,
        2,
        Transport::Broadcast,
        &criteria(),
    )
    .unwrap();
    let second = request::request(
        &mut session,
        PageKind::ManufacturerInformation,
        1,
        Transport::Broadcast,
        &criteria(),
    )
    .unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert_eq!(session.broadcast_messages().len(), 3);

    drop(session);
    sensor.join().unwrap();
}

#[test]
fn redirected_acknowledged_request() {
    let sensor = Sensor {
        requestable: vec![PageKind::BatteryStatus],
        ack_redirected_to_broadcast: true,
    };
    let (mut session, sensor) = session(sensor);

    let reply = request::request(
        &mut session,
        PageKind::BatteryStatus,
        1,
        Transport::Acknowledged,
        &criteria(),
    )
    .unwrap();

    assert_eq!(reply.broadcast.len(), 1);
    assert!(reply.acknowledged.is_empty());

    let mut device = device();
    device.requestable_pages.insert(PageKind::BatteryStatus);

    let result = request::check_reply(&reply, &device, &criteria());
    assert!(result.unwrap_err().0.contains("as broadcast data"));

    device.ack_redirected_to_broadcast = true;
    assert_eq!(request::check_reply(&reply, &device, &criteria()), Ok(()));

    drop(session);
    sensor.join().unwrap();
}

#[test]
fn unanswered_request_times_out() {
    let (mut session, sensor) = session(Sensor::answering(&[]));

    let reply = request::request(
        &mut session,
        PageKind::Capabilities,
        1,
        Transport::Broadcast,
        &criteria(),
    )
    .unwrap();

    assert!(reply.is_empty());

    // Capabilities are not requestable by default.
    assert_eq!(request::check_reply(&reply, &device(), &criteria()), Ok(()));

    let mut device = device();
    device.requestable_pages.insert(PageKind::Capabilities);
    let result = request::check_reply(&reply, &device, &criteria());
    assert!(result.unwrap_err().0.contains("received 0 replies"));

    drop(session);
    sensor.join().unwrap();
}

#[test]
fn requests_need_an_open_channel() {
    let (mut session, sensor) = session(Sensor::answering(&[]));
    session.close();

    let result = request::request(
        &mut session,
        PageKind::ManufacturerInformation,
        1,
        Transport::Broadcast,
        &criteria(),
    );
    assert_eq!(result, Err(SessionError::NotOpen));

    drop(session);
    sensor.join().unwrap();
}

fn reply(kind: PageKind, transport: Transport, repeat_count: u8, received: usize) -> Reply {
    let page = Page::decode(&[kind.id(), 0x0F, 0x39, 0x30, 0x00, 0x04, 0x01, 60]).unwrap();
    let stream: MessageStream = (0..received)
        .map(|i| ReceivedPage::new(page, Duration::from_millis(250 * i as u64)))
        .collect();

    let (broadcast, acknowledged) = match transport {
        Transport::Broadcast => (stream, MessageStream::new()),
        Transport::Acknowledged => (MessageStream::new(), stream),
    };

    Reply {
        kind,
        transport,
        repeat_count,
        broadcast,
        acknowledged,
    }
}

#[test]
fn lost_replies_within_allowance() {
    let device = device();
    let kind = PageKind::ManufacturerInformation;

    let strict = TestCriteria::default();
    assert_eq!(strict.allowed_losses(5), 0);

    let result = request::check_reply(&reply(kind, Transport::Broadcast, 5, 4), &device, &strict);
    assert!(result.unwrap_err().0.contains("expected 5 to 5"));

    let lenient = TestCriteria {
        allowed_packet_loss: 0.2,
        ..TestCriteria::default()
    };
    assert_eq!(lenient.allowed_losses(5), 1);
    assert_eq!(
        request::check_reply(&reply(kind, Transport::Broadcast, 5, 4), &device, &lenient),
        Ok(())
    );

    let result = request::check_reply(&reply(kind, Transport::Broadcast, 5, 3), &device, &lenient);
    assert!(result.unwrap_err().0.contains("received 3 replies"));
}

#[test]
fn too_many_replies() {
    let kind = PageKind::ProductInformation;
    let result = request::check_reply(
        &reply(kind, Transport::Acknowledged, 1, 2),
        &device(),
        &TestCriteria::default(),
    );

    assert!(result.unwrap_err().0.contains("received 2 replies"));
}

#[test]
fn unrequestable_page_answered() {
    let kind = PageKind::Capabilities;
    let result = request::check_reply(
        &reply(kind, Transport::Broadcast, 1, 1),
        &device(),
        &TestCriteria::default(),
    );

    assert!(result.unwrap_err().0.contains("is not requestable"));
}

#[test]
fn request_report() {
    let sensor = Sensor::answering(&[
        PageKind::ManufacturerInformation,
        PageKind::ProductInformation,
        PageKind::BatteryStatus,
    ]);
    let (mut session, sensor) = session(sensor);

    let criteria = TestCriteria {
        broadcast_request_counts: vec![1, 3],
        acknowledged_request_counts: vec![2],
        ..criteria()
    };
    let pages = [PageKind::ManufacturerInformation, PageKind::Capabilities];

    let report = request::request_report(&mut session, &pages, &device(), &criteria).unwrap();

    let names: Vec<_> = report.iter().map(|(name, _)| name).collect();
    assert_eq!(
        names,
        [
            "Request data page: page 2 (manufacturer information) sent 1 times as broadcast data",
            "Request data page: page 2 (manufacturer information) sent 3 times as broadcast data",
            "Request data page: page 6 (capabilities) sent 1 times as broadcast data",
            "Request data page: page 6 (capabilities) sent 3 times as broadcast data",
            "Request data page: page 2 (manufacturer information) sent 2 times as acknowledged data",
            "Request data page: page 6 (capabilities) sent 2 times as acknowledged data",
        ]
    );
    assert!(report.is_success());

    drop(session);
    sensor.join().unwrap();
}
