//! Live capture from a receiving channel.
//!
//! A [`ChannelSession`] pulls raw messages from a [`DeliverySource`], usually
//! a radio driver feeding a queue from its own thread, decodes them and
//! collects them into one stream per transport. The only blocking calls are
//! the `wait_for_new_*` methods, which poll the source until a matching
//! message arrives or a timeout elapses.
//!
//! Pages sent to the sensor, such as requests, go out through the same
//! source.

use alloc::vec::Vec;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::{ChannelParameters, SessionConfig};
use crate::observe::Observer;
use crate::page::{PAGE_LEN, Page, PageKind};
use crate::stream::{MessageStream, ReceivedPage};

/// How a message was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Broadcast,
    Acknowledged,
}

impl core::fmt::Display for Transport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Broadcast => "broadcast",
            Self::Acknowledged => "acknowledged",
        })
    }
}

/// A raw message handed over by a delivery source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub transport: Transport,
    /// Time of reception since the source started.
    pub timestamp: Duration,
    pub bytes: Vec<u8>,
}

/// A page to send to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transmission {
    pub transport: Transport,
    pub page: [u8; PAGE_LEN],
}

/// A source of raw messages.
pub trait DeliverySource {
    /// Wait up to `timeout` for the next message. A zero timeout only
    /// returns a message that is already waiting.
    fn next(&mut self, timeout: Duration) -> Option<Delivery>;

    /// Send a page to the sensor. Receive-only sources refuse.
    fn send(&mut self, transmission: Transmission) -> Result<(), SessionError> {
        let _ = transmission;
        Err(SessionError::SendUnsupported)
    }

    /// Begin delivering messages on a channel.
    fn start(&mut self, channel: &ChannelParameters) {
        let _ = channel;
    }

    /// Stop delivering messages.
    fn stop(&mut self) {}
}

impl DeliverySource for Receiver<Delivery> {
    fn next(&mut self, timeout: Duration) -> Option<Delivery> {
        if timeout.is_zero() {
            self.try_recv().ok()
        } else {
            self.recv_timeout(timeout).ok()
        }
    }
}

/// Both directions of a queue shared with a radio driver thread.
#[derive(Debug)]
pub struct QueueLink {
    pub incoming: Receiver<Delivery>,
    pub outgoing: Sender<Transmission>,
}

impl DeliverySource for QueueLink {
    fn next(&mut self, timeout: Duration) -> Option<Delivery> {
        self.incoming.next(timeout)
    }

    fn send(&mut self, transmission: Transmission) -> Result<(), SessionError> {
        self.outgoing
            .send(transmission)
            .map_err(|_| SessionError::Disconnected)
    }
}

/// An error operating a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Channel is already open.")]
    AlreadyOpen,
    #[error("Channel is not open.")]
    NotOpen,
    /// No matching message arrived in time.
    #[error("Did not receive a matching message within {elapsed:?}.")]
    Timeout { elapsed: Duration },
    /// The source cannot send pages.
    #[error("Delivery source cannot send pages.")]
    SendUnsupported,
    /// The driver end of the source is gone.
    #[error("Delivery source is disconnected.")]
    Disconnected,
}

/// A receiving channel and the messages collected since it was opened.
pub struct ChannelSession<S, O = ()> {
    source: S,
    observer: O,
    config: SessionConfig,
    open: bool,
    broadcast: MessageStream,
    acknowledged: MessageStream,
}

impl<S: DeliverySource> ChannelSession<S> {
    pub fn new(source: S, config: SessionConfig) -> Self {
        Self::with_observer(source, config, ())
    }
}

impl<S: DeliverySource, O: Observer> ChannelSession<S, O> {
    pub fn with_observer(source: S, config: SessionConfig, observer: O) -> Self {
        Self {
            source,
            observer,
            config,
            open: false,
            broadcast: MessageStream::new(),
            acknowledged: MessageStream::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Broadcast messages received since the channel was last opened.
    pub fn broadcast_messages(&self) -> &MessageStream {
        &self.broadcast
    }

    /// Acknowledged messages received since the channel was last opened.
    pub fn acknowledged_messages(&self) -> &MessageStream {
        &self.acknowledged
    }

    /// Open the channel with empty streams.
    ///
    /// Messages the source delivered while the channel was closed are
    /// discarded.
    pub fn open(&mut self) -> Result<(), SessionError> {
        if self.open {
            Err(SessionError::AlreadyOpen)?;
        }

        while self.source.next(Duration::ZERO).is_some() {}

        self.broadcast.clear();
        self.acknowledged.clear();
        self.source.start(&self.config.channel);
        self.open = true;
        self.observer.channel_opened();

        Ok(())
    }

    /// Collect any waiting messages, then close the channel.
    ///
    /// Returns whether the channel was open.
    pub fn close(&mut self) -> bool {
        if !self.open {
            return false;
        }

        self.drain();
        self.source.stop();
        self.open = false;
        self.observer.channel_closed();

        true
    }

    /// Send a page to the sensor as broadcast data.
    pub fn send_broadcast(&mut self, page: &Page) -> Result<(), SessionError> {
        self.send(Transport::Broadcast, page)
    }

    /// Send a page to the sensor as acknowledged data.
    pub fn send_acknowledged(&mut self, page: &Page) -> Result<(), SessionError> {
        self.send(Transport::Acknowledged, page)
    }

    fn send(&mut self, transport: Transport, page: &Page) -> Result<(), SessionError> {
        if !self.open {
            Err(SessionError::NotOpen)?;
        }

        self.source.send(Transmission {
            transport,
            page: *page.raw(),
        })
    }

    /// Collect every waiting message into its stream without blocking.
    ///
    /// Returns how many messages were collected.
    pub fn poll(&mut self) -> Result<usize, SessionError> {
        if !self.open {
            Err(SessionError::NotOpen)?;
        }

        Ok(self.drain().len())
    }

    /// Wait for a broadcast message of one of the given kinds, or of any kind
    /// if `kinds` is empty.
    ///
    /// Messages that arrived before the call are collected but never
    /// returned.
    pub fn wait_for_new_message(
        &mut self,
        kinds: &[PageKind],
        timeout: Duration,
    ) -> Result<ReceivedPage, SessionError> {
        self.wait(Transport::Broadcast, kinds, timeout)
    }

    /// Wait for an acknowledged message, like
    /// [`wait_for_new_message`](Self::wait_for_new_message).
    pub fn wait_for_new_acknowledged_message(
        &mut self,
        kinds: &[PageKind],
        timeout: Duration,
    ) -> Result<ReceivedPage, SessionError> {
        self.wait(Transport::Acknowledged, kinds, timeout)
    }

    fn wait(
        &mut self,
        transport: Transport,
        kinds: &[PageKind],
        timeout: Duration,
    ) -> Result<ReceivedPage, SessionError> {
        if !self.open {
            Err(SessionError::NotOpen)?;
        }

        let start = Instant::now();
        self.drain();

        loop {
            let found = self.drain().into_iter().find(|(from, message)| {
                *from == transport && (kinds.is_empty() || kinds.contains(&message.kind()))
            });

            if let Some((_, message)) = found {
                return Ok(message);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                Err(SessionError::Timeout { elapsed })?;
            }

            thread::sleep(self.config.poll_interval.min(timeout - elapsed));
        }
    }

    /// Decode every waiting message into its stream, returning the ones
    /// collected. Messages that fail to decode are dropped.
    fn drain(&mut self) -> Vec<(Transport, ReceivedPage)> {
        let mut collected = Vec::new();

        while let Some(delivery) = self.source.next(Duration::ZERO) {
            let message =
                match ReceivedPage::decode(self.config.format, delivery.timestamp, &delivery.bytes) {
                    Ok(message) => message,
                    Err(e) => {
                        self.observer.decode_failed(&delivery.bytes, &e);
                        continue;
                    }
                };

            self.observer.decoded(&message);

            let stream = match delivery.transport {
                Transport::Broadcast => &mut self.broadcast,
                Transport::Acknowledged => &mut self.acknowledged,
            };
            stream.append(message.clone());
            collected.push((delivery.transport, message));
        }

        collected
    }

    /// Open the channel for the lifetime of the returned guard.
    ///
    /// If `restore` is set, the guard closes the channel again when dropped
    /// if it was closed before.
    pub fn ensure_open(&mut self, restore: bool) -> Result<ChannelGuard<'_, S, O>, SessionError> {
        let was_open = self.open;

        if !was_open {
            self.open()?;
        }

        Ok(ChannelGuard {
            session: self,
            restore: restore.then_some(was_open),
        })
    }

    /// Close the channel for the lifetime of the returned guard.
    ///
    /// If `restore` is set, the guard reopens the channel when dropped if it
    /// was open before. Reopening starts with empty streams.
    pub fn ensure_closed(&mut self, restore: bool) -> ChannelGuard<'_, S, O> {
        let was_open = self.close();

        ChannelGuard {
            session: self,
            restore: restore.then_some(was_open),
        }
    }
}

/// Restores the open or closed state of a channel when dropped.
pub struct ChannelGuard<'a, S: DeliverySource, O: Observer> {
    session: &'a mut ChannelSession<S, O>,
    restore: Option<bool>,
}

impl<S: DeliverySource, O: Observer> core::ops::Deref for ChannelGuard<'_, S, O> {
    type Target = ChannelSession<S, O>;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl<S: DeliverySource, O: Observer> core::ops::DerefMut for ChannelGuard<'_, S, O> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl<S: DeliverySource, O: Observer> Drop for ChannelGuard<'_, S, O> {
    fn drop(&mut self) {
        match self.restore {
            Some(true) if !self.session.is_open() => {
                // Cannot fail, as the channel is closed.
                let _ = self.session.open();
            }
            Some(false) => {
                self.session.close();
            }
            _ => {}
        }
    }
}
