#![cfg(feature = "std")]

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use antwire::config::{ChannelParameters, SessionConfig};
use antwire::meta::ExtendedFormat;
use antwire::observe::Observer;
use antwire::page::hrm::{DefaultData, HeartRateData};
use antwire::page::{Page, PageKind};
use antwire::session::{
    ChannelSession, Delivery, DeliverySource, QueueLink, SessionError, Transmission, Transport,
};
use antwire::stream::DecodeError;

const DEFAULT_DATA: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0x00, 0x04, 0x01, 60];
const BATTERY: [u8; 8] = [0x07, 0x50, 0x80, 0x23, 0x00, 0x04, 0x01, 60];
const REQUEST: [u8; 8] = [0x46, 0xFF, 0xFF, 0xFF, 0xFF, 0x81, 0x07, 0x01];

fn config() -> SessionConfig {
    SessionConfig {
        format: ExtendedFormat::None,
        poll_interval: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

fn delivery(transport: Transport, millis: u64, bytes: &[u8]) -> Delivery {
    Delivery {
        transport,
        timestamp: Duration::from_millis(millis),
        bytes: bytes.to_vec(),
    }
}

fn session() -> (Sender<Delivery>, ChannelSession<Receiver<Delivery>>) {
    let (tx, rx) = mpsc::channel();
    (tx, ChannelSession::new(rx, config()))
}

#[test]
fn open_and_close() {
    let (_tx, mut session) = session();

    assert!(!session.is_open());
    assert_eq!(session.open(), Ok(()));
    assert_eq!(session.open(), Err(SessionError::AlreadyOpen));
    assert!(session.close());
    assert!(!session.close());
}

#[test]
fn wait_requires_open_channel() {
    let (_tx, mut session) = session();

    assert_eq!(
        session.wait_for_new_message(&[], Duration::from_millis(10)),
        Err(SessionError::NotOpen)
    );
}

#[test]
fn wait_times_out_on_earlier_messages() {
    let (tx, mut session) = session();
    session.open().unwrap();

    tx.send(delivery(Transport::Broadcast, 0, &DEFAULT_DATA)).unwrap();

    let start = Instant::now();
    let result = session.wait_for_new_message(&[], Duration::from_secs(1));

    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(matches!(
        result,
        Err(SessionError::Timeout { elapsed }) if elapsed >= Duration::from_secs(1)
    ));

    // The earlier message is still collected.
    assert_eq!(session.broadcast_messages().len(), 1);
}

#[test]
fn wait_returns_later_message() {
    let (tx, mut session) = session();
    session.open().unwrap();

    tx.send(delivery(Transport::Broadcast, 0, &BATTERY)).unwrap();

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        tx.send(delivery(Transport::Broadcast, 250, &DEFAULT_DATA)).unwrap();
        thread::sleep(Duration::from_millis(50));
        tx.send(delivery(Transport::Broadcast, 500, &BATTERY)).unwrap();
    });

    let message = session
        .wait_for_new_message(&[PageKind::BatteryStatus], Duration::from_secs(5))
        .unwrap();
    producer.join().unwrap();

    assert_eq!(message.kind(), PageKind::BatteryStatus);
    assert_eq!(message.timestamp(), Duration::from_millis(500));

    let kinds: Vec<_> = session
        .broadcast_messages()
        .iter()
        .map(|message| message.kind())
        .collect();
    assert_eq!(
        kinds,
        [
            PageKind::BatteryStatus,
            PageKind::DefaultData,
            PageKind::BatteryStatus
        ]
    );
}

#[test]
fn acknowledged_messages_are_kept_apart() {
    let (tx, mut session) = session();
    session.open().unwrap();

    tx.send(delivery(Transport::Broadcast, 0, &DEFAULT_DATA)).unwrap();

    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        tx.send(delivery(Transport::Acknowledged, 250, &REQUEST)).unwrap();
    });

    let message = session
        .wait_for_new_acknowledged_message(&[PageKind::RequestData], Duration::from_secs(5))
        .unwrap();
    producer.join().unwrap();

    assert_eq!(message.kind(), PageKind::RequestData);
    assert_eq!(session.acknowledged_messages().len(), 1);
    assert_eq!(session.broadcast_messages().len(), 1);
}

#[test]
fn close_collects_waiting_messages() {
    let (tx, mut session) = session();
    session.open().unwrap();

    tx.send(delivery(Transport::Broadcast, 0, &DEFAULT_DATA)).unwrap();
    tx.send(delivery(Transport::Broadcast, 250, &BATTERY)).unwrap();
    assert!(session.close());
    assert_eq!(session.broadcast_messages().len(), 2);

    // Reopening starts over.
    session.open().unwrap();
    assert!(session.broadcast_messages().is_empty());
}

#[test]
fn messages_sent_while_closed_are_discarded() {
    let (tx, mut session) = session();
    session.open().unwrap();
    session.close();

    tx.send(delivery(Transport::Broadcast, 0, &DEFAULT_DATA)).unwrap();
    tx.send(delivery(Transport::Acknowledged, 250, &REQUEST)).unwrap();

    session.open().unwrap();
    session.close();

    assert_eq!(session.broadcast_messages().len(), 0);
    assert_eq!(session.acknowledged_messages().len(), 0);
}

#[test]
fn poll_collects_without_blocking() {
    let (tx, mut session) = session();
    assert_eq!(session.poll(), Err(SessionError::NotOpen));

    session.open().unwrap();
    assert_eq!(session.poll(), Ok(0));

    tx.send(delivery(Transport::Broadcast, 0, &DEFAULT_DATA)).unwrap();
    tx.send(delivery(Transport::Acknowledged, 250, &REQUEST)).unwrap();

    assert_eq!(session.poll(), Ok(2));
    assert_eq!(session.broadcast_messages().len(), 1);
    assert_eq!(session.acknowledged_messages().len(), 1);
}

fn linked_session() -> (
    Sender<Delivery>,
    Receiver<Transmission>,
    ChannelSession<QueueLink>,
) {
    let (incoming_tx, incoming) = mpsc::channel();
    let (outgoing, outgoing_rx) = mpsc::channel();
    let link = QueueLink { incoming, outgoing };

    (incoming_tx, outgoing_rx, ChannelSession::new(link, config()))
}

#[test]
fn pages_are_sent_on_their_transport() {
    let (_tx, sent, mut session) = linked_session();
    let page = Page::from(DefaultData {
        heart_rate: HeartRateData {
            beat_count: 4,
            computed_heart_rate: 60,
            ..HeartRateData::default()
        },
    });

    assert_eq!(session.send_broadcast(&page), Err(SessionError::NotOpen));
    assert!(sent.try_recv().is_err());

    session.open().unwrap();
    session.send_broadcast(&page).unwrap();
    session.send_acknowledged(&Page::decode(&REQUEST).unwrap()).unwrap();

    assert_eq!(
        sent.try_iter().collect::<Vec<_>>(),
        [
            Transmission {
                transport: Transport::Broadcast,
                page: *page.raw(),
            },
            Transmission {
                transport: Transport::Acknowledged,
                page: REQUEST,
            },
        ]
    );
}

#[test]
fn send_fails_once_the_driver_is_gone() {
    let (_tx, sent, mut session) = linked_session();
    session.open().unwrap();
    drop(sent);

    let page = Page::decode(&REQUEST).unwrap();
    assert_eq!(session.send_acknowledged(&page), Err(SessionError::Disconnected));
}

#[test]
fn receive_only_sources_cannot_send() {
    let (_tx, mut session) = session();
    session.open().unwrap();

    let page = Page::decode(&REQUEST).unwrap();
    assert_eq!(session.send_broadcast(&page), Err(SessionError::SendUnsupported));
}

/// A source recording how the session drives it.
#[derive(Default)]
struct Radio {
    started: Vec<ChannelParameters>,
    stopped: usize,
}

impl DeliverySource for Radio {
    fn next(&mut self, _: Duration) -> Option<Delivery> {
        None
    }

    fn start(&mut self, channel: &ChannelParameters) {
        self.started.push(*channel);
    }

    fn stop(&mut self) {
        self.stopped += 1;
    }
}

#[test]
fn source_follows_channel_state() {
    let mut channel = ChannelParameters::HEART_RATE;
    channel.transmission_type = 1;

    let config = SessionConfig {
        channel,
        ..config()
    };
    let mut session = ChannelSession::new(Radio::default(), config);

    session.open().unwrap();
    assert_eq!(session.source_mut().started, [channel]);
    assert_eq!(session.source_mut().stopped, 0);

    session.close();
    session.close();
    assert_eq!(session.source_mut().stopped, 1);
}

#[derive(Default)]
struct Failures(Vec<Vec<u8>>);

impl Observer for Failures {
    fn decode_failed(&mut self, raw: &[u8], _: &DecodeError) {
        self.0.push(raw.to_vec());
    }
}

#[test]
fn undecodable_messages_are_dropped() {
    let (tx, rx) = mpsc::channel();
    let mut session = ChannelSession::with_observer(rx, config(), Failures::default());
    session.open().unwrap();

    tx.send(delivery(Transport::Broadcast, 0, &[0x00, 0xFF])).unwrap();
    tx.send(delivery(Transport::Broadcast, 250, &DEFAULT_DATA)).unwrap();
    session.close();

    assert_eq!(session.broadcast_messages().len(), 1);
    assert_eq!(session.observer().0, [vec![0x00, 0xFF]]);
}

#[test]
fn guards_restore_state() {
    let (_tx, mut session) = session();

    {
        let guard = session.ensure_open(true).unwrap();
        assert!(guard.is_open());
    }
    assert!(!session.is_open());

    {
        let guard = session.ensure_open(false).unwrap();
        assert!(guard.is_open());
    }
    assert!(session.is_open());

    {
        let guard = session.ensure_closed(true);
        assert!(!guard.is_open());
    }
    assert!(session.is_open());

    {
        let mut guard = session.ensure_open(true).unwrap();
        guard.close();
    }
    assert!(session.is_open());
}
