// ── Line-delimited live feeds ──
//
// Every long-lived subscription channel (bus live, snapshot live,
// supervisor log, agent logs) renders as a line-delimited stream:
// `data: <json>` records interleaved with `: keep-alive` comments so an
// idle channel still proves it is alive. Transport-agnostic — an HTTP
// adapter forwards lines as SSE, a debug tool prints them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant, Interval};

use crate::bus::IncidentBus;
use crate::logring::{LogEntry, LogRing};

/// Keep-alives land at most this far apart; consumers time out at 30 s.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// One frame of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    Comment(String),
    Data(String),
}

impl FeedFrame {
    /// Render as the wire line (without the trailing newline).
    pub fn render(&self) -> String {
        match self {
            Self::Comment(comment) => format!(": {comment}"),
            Self::Data(json) => format!("data: {json}"),
        }
    }

    fn from_item<T: Serialize>(item: &T) -> Option<Self> {
        serde_json::to_string(item).ok().map(Self::Data)
    }
}

fn keep_alive_ticker() -> Interval {
    // First tick after one full interval, not immediately.
    interval_at(Instant::now() + KEEP_ALIVE_INTERVAL, KEEP_ALIVE_INTERVAL)
}

// ── Broadcast-backed feed ────────────────────────────────────────────

/// A feed over a broadcast subscription, with optional hydration
/// backlog. A lagging consumer resumes from the live edge after a
/// `lagged` comment — it never stalls the publisher.
pub struct Feed<T> {
    backlog: VecDeque<FeedFrame>,
    rx: broadcast::Receiver<T>,
    keep_alive: Interval,
}

impl<T: Clone + Serialize> Feed<T> {
    pub fn new(rx: broadcast::Receiver<T>) -> Self {
        Self {
            backlog: VecDeque::new(),
            rx,
            keep_alive: keep_alive_ticker(),
        }
    }

    pub fn with_backlog<'a, I>(rx: broadcast::Receiver<T>, backlog: I) -> Self
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut feed = Self::new(rx);
        feed.backlog = backlog
            .into_iter()
            .filter_map(FeedFrame::from_item)
            .collect();
        feed
    }

    /// Next frame: backlog first, then whichever of the live feed or the
    /// keep-alive ticker fires first. `None` once the publisher is gone.
    pub async fn next_frame(&mut self) -> Option<FeedFrame> {
        if let Some(frame) = self.backlog.pop_front() {
            return Some(frame);
        }
        loop {
            tokio::select! {
                _ = self.keep_alive.tick() => return Some(FeedFrame::Comment("keep-alive".into())),
                item = self.rx.recv() => match item {
                    Ok(item) => {
                        if let Some(frame) = FeedFrame::from_item(&item) {
                            return Some(frame);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        return Some(FeedFrame::Comment(format!("lagged {n}")));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
            }
        }
    }
}

// ── Watch-backed feed ────────────────────────────────────────────────

/// A feed over a `watch` channel: each change yields the latest value.
pub struct WatchFeed<T> {
    rx: watch::Receiver<T>,
    keep_alive: Interval,
}

impl<T: Clone + Serialize> WatchFeed<T> {
    pub fn new(rx: watch::Receiver<T>) -> Self {
        Self {
            rx,
            keep_alive: keep_alive_ticker(),
        }
    }

    pub async fn next_frame(&mut self) -> Option<FeedFrame> {
        loop {
            tokio::select! {
                _ = self.keep_alive.tick() => return Some(FeedFrame::Comment("keep-alive".into())),
                changed = self.rx.changed() => match changed {
                    Ok(()) => {
                        let value = self.rx.borrow_and_update().clone();
                        if let Some(frame) = FeedFrame::from_item(&value) {
                            return Some(frame);
                        }
                    }
                    Err(_) => return None,
                },
            }
        }
    }
}

// ── Channel constructors ─────────────────────────────────────────────

/// Incident-bus live channel, hydrated with the last few buffered events.
pub fn bus_feed(bus: &IncidentBus) -> Feed<Arc<crate::model::BusEvent>> {
    let subscription = bus.subscribe();
    Feed::with_backlog(subscription.receiver, subscription.backlog.iter())
}

/// A log channel (supervisor or agent).
pub fn log_feed(ring: &LogRing) -> Feed<Arc<LogEntry>> {
    Feed::new(ring.subscribe())
}

/// Tower snapshot live channel.
pub fn snapshot_feed(
    store: &crate::store::SnapshotStore,
) -> WatchFeed<Arc<cellgrid_api::FleetSnapshot>> {
    WatchFeed::new(store.subscribe())
}
