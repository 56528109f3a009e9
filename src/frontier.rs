//! Frontier queue: growable, ring-buffer-backed FIFO of pending URLs.
//!
//! Decouples link-discovery producers from browser-navigation consumers:
//! producers are never blocked by a full buffer and no per-item channel
//! allocation happens on the hot path.
//!
//! # Structure
//!
//! The buffer is a cycle of fixed-size cells (power-of-two slot count)
//! linked by arena index. Independent read/write cursors track position
//! within the current cell. When the writer fills a cell and the next cell
//! in the cycle still holds unread items, a fresh cell is spliced in after
//! the writer. Once fully drained the ring shrinks back to the minimal
//! two-cell configuration.
//!
//! # Concurrency contract
//!
//! Exactly one owner task mutates the ring. Producers and consumers
//! interact with it only through channels: [`Frontier::feed`] hands an
//! item to the owner, which attempts a direct handoff to a waiting
//! consumer and otherwise buffers it. [`Frontier::close`] drains the
//! buffer to the output side before closing it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Slots per ring cell (power of two).
const CELL_SLOTS: usize = 64;

/// Capacity of the producer-side channel into the owner task.
///
/// The owner drains this eagerly into the ring, so producers only ever
/// wait for the owner to wake, never for consumers.
const FEED_CAPACITY: usize = CELL_SLOTS;

// ============================================================================
// CellRing
// ============================================================================

/// One fixed-size cell in the arena.
struct Cell<T> {
    slots: Box<[Option<T>]>,
    /// Arena index of the next cell in the cycle.
    next: usize,
}

impl<T> Cell<T> {
    fn new(next: usize) -> Self {
        let mut slots = Vec::with_capacity(CELL_SLOTS);
        slots.resize_with(CELL_SLOTS, || None);
        Self {
            slots: slots.into_boxed_slice(),
            next,
        }
    }
}

/// Cursor into the arena: (cell index, slot index).
#[derive(Clone, Copy)]
struct Cursor {
    cell: usize,
    slot: usize,
}

/// Growable FIFO over an arena of index-linked cells.
///
/// Single-owner: no internal synchronization.
struct CellRing<T> {
    cells: Vec<Cell<T>>,
    read: Cursor,
    write: Cursor,
    len: usize,
}

impl<T> CellRing<T> {
    /// Creates the minimal two-cell cycle.
    fn new() -> Self {
        Self {
            cells: vec![Cell::new(1), Cell::new(0)],
            read: Cursor { cell: 0, slot: 0 },
            write: Cursor { cell: 0, slot: 0 },
            len: 0,
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Appends an item, growing the cycle if the next cell is occupied.
    fn push(&mut self, item: T) {
        if self.write.slot == CELL_SLOTS {
            let next = self.cells[self.write.cell].next;
            if next == self.read.cell && self.len > 0 {
                // Next cell still holds unread items: splice a fresh cell
                // in after the writer.
                let fresh = self.cells.len();
                self.cells.push(Cell::new(next));
                self.cells[self.write.cell].next = fresh;
                self.write.cell = fresh;
            } else {
                self.write.cell = next;
            }
            self.write.slot = 0;
        }
        self.cells[self.write.cell].slots[self.write.slot] = Some(item);
        self.write.slot += 1;
        self.len += 1;
    }

    /// Removes the oldest item, if any.
    fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        if self.read.slot == CELL_SLOTS {
            self.read.cell = self.cells[self.read.cell].next;
            self.read.slot = 0;
        }
        let item = self.cells[self.read.cell].slots[self.read.slot].take();
        debug_assert!(item.is_some(), "occupied slot expected at read cursor");
        self.read.slot += 1;
        self.len -= 1;
        item
    }

    /// Shrinks back to two cells. Only valid (and only called) when fully
    /// drained.
    fn shrink(&mut self) {
        debug_assert_eq!(self.len, 0);
        if self.cells.len() > 2 {
            self.cells.truncate(2);
            self.cells[0].next = 1;
            self.cells[1].next = 0;
        }
        self.read = Cursor { cell: 0, slot: 0 };
        self.write = Cursor { cell: 0, slot: 0 };
    }
}

// ============================================================================
// Frontier
// ============================================================================

/// Message from producers to the owner task.
enum FeedMsg {
    Item(String),
    Close,
}

/// Counters published by the owner task.
struct FrontierStats {
    /// Items accepted and not yet delivered to a consumer.
    queued: AtomicUsize,
    /// Items currently sitting in the ring.
    buffered: AtomicUsize,
}

/// Producer handle to the frontier queue.
///
/// Cheap to clone; all clones feed the same owner task.
#[derive(Clone)]
pub struct Frontier {
    tx: mpsc::Sender<FeedMsg>,
    stats: Arc<FrontierStats>,
}

impl Frontier {
    /// Creates the frontier and returns the consumer side.
    ///
    /// The owner task runs until [`close`](Self::close) is called or every
    /// producer handle is dropped; it then drains the ring into the output
    /// receiver and closes it.
    #[must_use]
    pub fn new() -> (Self, FrontierReceiver) {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        // Capacity 1: a consumer parked in recv() takes the direct
        // handoff, everything else lands in the ring.
        let (out_tx, out_rx) = mpsc::channel(1);
        let stats = Arc::new(FrontierStats {
            queued: AtomicUsize::new(0),
            buffered: AtomicUsize::new(0),
        });

        let owner_stats = Arc::clone(&stats);
        tokio::spawn(async move {
            owner_loop(rx, out_tx, owner_stats).await;
        });

        let receiver = FrontierReceiver {
            rx: out_rx,
            stats: Arc::clone(&stats),
        };
        (Self { tx, stats }, receiver)
    }

    /// Feeds a URL to the queue.
    ///
    /// Attempts a direct handoff to a ready consumer, otherwise buffers in
    /// the ring. Never blocks on a full buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frontier`] if the queue has been closed.
    pub async fn feed(&self, url: String) -> Result<()> {
        self.tx
            .send(FeedMsg::Item(url))
            .await
            .map_err(|_| Error::frontier("feed after close"))
    }

    /// Closes the queue.
    ///
    /// Buffered items are drained to the output side first; consumers then
    /// observe end-of-stream. Idempotent, never panics.
    pub async fn close(&self) {
        let _ = self.tx.send(FeedMsg::Close).await;
    }

    /// Items accepted and not yet received by a consumer, including an
    /// item parked in the handoff slot.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stats.queued.load(Ordering::Relaxed)
    }

    /// Returns `true` if no items are pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items currently buffered in the ring (excludes the in-flight
    /// handoff slot).
    #[inline]
    #[must_use]
    pub fn buf_len(&self) -> usize {
        self.stats.buffered.load(Ordering::Relaxed)
    }
}

// ============================================================================
// FrontierReceiver
// ============================================================================

/// Consumer handle to the frontier queue.
///
/// Settles the queued count on delivery, so [`Frontier::len`] counts an
/// item parked in the handoff slot until a consumer actually takes it.
pub struct FrontierReceiver {
    rx: mpsc::Receiver<String>,
    stats: Arc<FrontierStats>,
}

impl FrontierReceiver {
    /// Receives the next URL; `None` once the queue is closed and fully
    /// drained.
    pub async fn recv(&mut self) -> Option<String> {
        let url = self.rx.recv().await;
        if url.is_some() {
            self.stats.queued.fetch_sub(1, Ordering::Relaxed);
        }
        url
    }
}

// ============================================================================
// Owner Task
// ============================================================================

/// Single task owning all ring mutation.
async fn owner_loop(
    mut rx: mpsc::Receiver<FeedMsg>,
    out_tx: mpsc::Sender<String>,
    stats: Arc<FrontierStats>,
) {
    let mut ring: CellRing<String> = CellRing::new();
    let mut drain = false;

    loop {
        if ring.is_empty() {
            match rx.recv().await {
                Some(FeedMsg::Item(url)) => {
                    stats.queued.fetch_add(1, Ordering::Relaxed);
                    match out_tx.try_send(url) {
                        // Parked in the handoff slot; the receiver settles
                        // the queued count on delivery.
                        Ok(()) => {}
                        Err(TrySendError::Full(url)) => {
                            ring.push(url);
                            stats.buffered.store(ring.len(), Ordering::Relaxed);
                        }
                        Err(TrySendError::Closed(_)) => {
                            stats.queued.fetch_sub(1, Ordering::Relaxed);
                            break;
                        }
                    }
                }
                Some(FeedMsg::Close) | None => {
                    drain = true;
                    break;
                }
            }
        } else {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(FeedMsg::Item(url)) => {
                        stats.queued.fetch_add(1, Ordering::Relaxed);
                        ring.push(url);
                        stats.buffered.store(ring.len(), Ordering::Relaxed);
                    }
                    Some(FeedMsg::Close) | None => {
                        drain = true;
                        break;
                    }
                },
                permit = out_tx.reserve() => match permit {
                    Ok(permit) => {
                        if let Some(url) = ring.pop() {
                            permit.send(url);
                            stats.buffered.store(ring.len(), Ordering::Relaxed);
                        }
                        if ring.is_empty() {
                            ring.shrink();
                        }
                    }
                    Err(_) => break,
                },
            }
        }
    }

    if drain {
        trace!(buffered = ring.len(), "Frontier closing, draining ring");
        while let Some(url) = ring.pop() {
            stats.buffered.store(ring.len(), Ordering::Relaxed);
            if out_tx.send(url).await.is_err() {
                break;
            }
        }
    }

    debug!("Frontier owner task finished");
    // Dropping out_tx closes the consumer side.
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_fifo() {
        let mut ring = CellRing::new();
        for i in 0..10 {
            ring.push(i);
        }
        for i in 0..10 {
            assert_eq!(ring.pop(), Some(i));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn test_ring_grows_past_two_cells() {
        let mut ring = CellRing::new();
        let n = CELL_SLOTS * 5 + 7;
        for i in 0..n {
            ring.push(i);
        }
        assert!(ring.cell_count() > 2, "ring should have spliced cells");
        for i in 0..n {
            assert_eq!(ring.pop(), Some(i), "item {i} lost or reordered");
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_ring_shrinks_when_drained() {
        let mut ring = CellRing::new();
        for i in 0..CELL_SLOTS * 4 {
            ring.push(i);
        }
        while ring.pop().is_some() {}
        ring.shrink();
        assert_eq!(ring.cell_count(), 2);
        // Still usable after shrinking.
        ring.push(42);
        assert_eq!(ring.pop(), Some(42));
    }

    #[test]
    fn test_ring_interleaved_push_pop() {
        let mut ring = CellRing::new();
        let mut next_in = 0;
        let mut next_out = 0;
        // Writer stays ahead of the reader across several cell boundaries.
        for _ in 0..200 {
            for _ in 0..3 {
                ring.push(next_in);
                next_in += 1;
            }
            assert_eq!(ring.pop(), Some(next_out));
            next_out += 1;
        }
        while let Some(v) = ring.pop() {
            assert_eq!(v, next_out);
            next_out += 1;
        }
        assert_eq!(next_out, next_in);
    }

    #[tokio::test]
    async fn test_feed_then_close_yields_all_fifo() {
        let (frontier, mut rx) = Frontier::new();
        let n = 1000;
        for i in 0..n {
            frontier.feed(format!("http://a.com/{i}")).await.expect("feed");
        }
        frontier.close().await;

        let mut received = Vec::new();
        while let Some(url) = rx.recv().await {
            received.push(url);
        }
        assert_eq!(received.len(), n);
        for (i, url) in received.iter().enumerate() {
            assert_eq!(url, &format!("http://a.com/{i}"));
        }
    }

    #[tokio::test]
    async fn test_producer_never_blocks_without_consumer() {
        let (frontier, mut rx) = Frontier::new();
        // Feed far more than any channel capacity with nobody receiving.
        for i in 0..10_000 {
            frontier.feed(format!("u{i}")).await.expect("feed");
        }
        assert!(frontier.len() >= 10_000 - FEED_CAPACITY - 1);
        frontier.close().await;

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 10_000);
    }

    #[tokio::test]
    async fn test_len_counts_item_parked_in_handoff() {
        let (frontier, mut rx) = Frontier::new();
        frontier.feed("u0".to_string()).await.expect("feed");
        // Give the owner time to park the item in the handoff slot.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(frontier.len(), 1, "undelivered item must still count");
        assert_eq!(frontier.buf_len(), 0);
        assert_eq!(rx.recv().await.as_deref(), Some("u0"));
        assert_eq!(frontier.len(), 0);
    }

    #[tokio::test]
    async fn test_len_and_buf_len_drain_to_zero() {
        let (frontier, mut rx) = Frontier::new();
        for i in 0..500 {
            frontier.feed(format!("u{i}")).await.expect("feed");
        }
        frontier.close().await;
        while rx.recv().await.is_some() {}
        assert_eq!(frontier.len(), 0);
        assert_eq!(frontier.buf_len(), 0);
    }

    #[tokio::test]
    async fn test_feed_after_close_errors() {
        let (frontier, mut rx) = Frontier::new();
        frontier.close().await;
        while rx.recv().await.is_some() {}
        let err = frontier.feed("u".to_string()).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_concurrent_producers_fifo_per_producer() {
        let (frontier, mut rx) = Frontier::new();
        let mut handles = Vec::new();
        for p in 0..4 {
            let frontier = frontier.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250 {
                    frontier.feed(format!("p{p}-{i}")).await.expect("feed");
                }
            }));
        }
        for handle in handles {
            handle.await.expect("producer");
        }
        frontier.close().await;

        let mut last_seen = [0usize; 4];
        let mut total = 0;
        while let Some(url) = rx.recv().await {
            let (p, i) = url[1..].split_once('-').expect("format");
            let p: usize = p.parse().expect("producer id");
            let i: usize = i.parse().expect("sequence");
            assert_eq!(i, last_seen[p], "producer {p} not FIFO");
            last_seen[p] += 1;
            total += 1;
        }
        assert_eq!(total, 1000);
    }
}
