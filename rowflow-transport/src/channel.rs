//! The bounded, two-phase-completing handoff channel

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use rowflow_core::{Page, PooledBuffer};

use crate::error::{ChannelError, Result};

/// Size accounting for channel elements
///
/// The channel bounds itself on cumulative buffer *capacity*, not on bytes
/// actually written, so the bound is conservative against worst-case reuse
/// of the storage downstream.
pub trait ByteSized {
    /// Number of bytes this element counts against the channel budget
    fn byte_size(&self) -> usize;
}

impl ByteSized for PooledBuffer {
    fn byte_size(&self) -> usize {
        self.capacity()
    }
}

impl ByteSized for Page {
    fn byte_size(&self) -> usize {
        self.byte_size()
    }
}

type Listener<T> = Box<dyn FnMut(T) + Send>;

struct ChannelState<T> {
    queue: VecDeque<T>,
    queued_bytes: usize,
    producer_done: bool,
    closed: bool,
    /// Set when the channel closed before the producer completed
    aborted: bool,
    listener: Option<Listener<T>>,
}

/// A FIFO handoff between one producer thread and one consumer thread,
/// bounded by cumulative element bytes
///
/// Completion is two-phase: the producer signals "no more input" with
/// [`complete_producer`](BoundedChannel::complete_producer), distinct from
/// the consumer signaling "drained and done" with
/// [`close`](BoundedChannel::close). [`join`](BoundedChannel::join) waits
/// for both. A single-phase closed flag cannot express the
/// producer-done-but-not-yet-drained state that `join` depends on, which is
/// why this is a hand-built state machine rather than a ready-made channel.
///
/// One mutex guards the queue, the byte count, and all state flags; the
/// `space_or_data` condvar wakes producers waiting for budget and consumers
/// waiting for elements, and the `completion` condvar wakes `join`. Every
/// wait re-checks its predicate after waking.
pub struct BoundedChannel<T> {
    max_queued_bytes: usize,
    state: Mutex<ChannelState<T>>,
    space_or_data: Condvar,
    completion: Condvar,
}

impl<T: ByteSized> BoundedChannel<T> {
    /// Create a channel that blocks producers once `max_queued_bytes` of
    /// elements are queued
    pub fn new(max_queued_bytes: usize) -> Self {
        Self {
            max_queued_bytes,
            state: Mutex::new(ChannelState {
                queue: VecDeque::new(),
                queued_bytes: 0,
                producer_done: false,
                closed: false,
                aborted: false,
                listener: None,
            }),
            space_or_data: Condvar::new(),
            completion: Condvar::new(),
        }
    }

    /// Get the channel's byte budget
    pub fn max_queued_bytes(&self) -> usize {
        self.max_queued_bytes
    }

    /// Hand an element to the channel, blocking while the queue is over
    /// budget
    ///
    /// An empty queue always admits one element, so a single element larger
    /// than the whole budget still makes progress; the queue overshoots by
    /// at most that one in-flight element. With a listener installed the
    /// element is delivered synchronously and never queued.
    pub fn add(&self, element: T) -> Result<()> {
        let mut state = self.lock()?;
        loop {
            if state.closed {
                return Err(ChannelError::Closed);
            }
            if state.producer_done {
                return Err(ChannelError::ProducerCompleted);
            }
            if let Some(listener) = state.listener.as_mut() {
                listener(element);
                return Ok(());
            }
            if state.queue.is_empty()
                || state.queued_bytes + element.byte_size() <= self.max_queued_bytes
            {
                break;
            }
            state = self.wait(&self.space_or_data, state)?;
        }
        state.queued_bytes += element.byte_size();
        state.queue.push_back(element);
        self.space_or_data.notify_all();
        Ok(())
    }

    /// Take the next element, blocking while the queue is empty and the
    /// producer has not completed
    ///
    /// Returns `Ok(None)` once the queue is empty and the producer has
    /// completed. A close observed after that point is an ordinary end of
    /// stream, not an error.
    pub fn poll(&self) -> Result<Option<T>> {
        let mut state = self.lock()?;
        loop {
            if let Some(element) = state.queue.pop_front() {
                state.queued_bytes -= element.byte_size();
                self.space_or_data.notify_all();
                return Ok(Some(element));
            }
            if state.producer_done {
                return Ok(None);
            }
            if state.closed {
                return Err(ChannelError::Closed);
            }
            state = self.wait(&self.space_or_data, state)?;
        }
    }

    /// Signal that no more `add` calls will occur; idempotent
    ///
    /// Consumers blocked on an empty queue now observe end-of-stream
    /// instead of waiting, and `join` can proceed once the channel closes.
    pub fn complete_producer(&self) {
        let mut state = self.recover_lock();
        if state.producer_done || state.closed {
            return;
        }
        state.producer_done = true;
        self.space_or_data.notify_all();
        self.completion.notify_all();
    }

    /// Mark the channel closed, release any still-queued elements, and
    /// unblock every waiter; idempotent
    pub fn close(&self) {
        let mut state = self.recover_lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if !state.producer_done {
            state.aborted = true;
        }
        let dumped = state.queue.len();
        state.queue.clear();
        state.queued_bytes = 0;
        if dumped > 0 {
            tracing::debug!(dumped, "channel closed with queued elements");
        }
        self.space_or_data.notify_all();
        self.completion.notify_all();
    }

    /// Signal that the consumer is done; equivalent to
    /// [`close`](BoundedChannel::close)
    pub fn complete_consumer(&self) {
        self.close();
    }

    /// Block until the producer completed, the queue drained, and the
    /// consumer closed the channel
    ///
    /// Fails with [`ChannelError::Closed`] if the channel was closed before
    /// the producer ever completed.
    pub fn join(&self) -> Result<()> {
        let mut state = self.lock()?;
        loop {
            if state.closed {
                return if state.aborted {
                    Err(ChannelError::Closed)
                } else {
                    Ok(())
                };
            }
            state = self.wait(&self.completion, state)?;
        }
    }

    /// Switch the channel to push mode
    ///
    /// Any already-queued elements are drained synchronously into the
    /// callback in FIFO order before the switch, so no element is dropped
    /// or reordered; future `add` calls then invoke the callback directly.
    pub fn set_listener(&self, listener: impl FnMut(T) + Send + 'static) -> Result<()> {
        let mut state = self.lock()?;
        if state.closed {
            return Err(ChannelError::Closed);
        }
        let mut listener = Box::new(listener);
        while let Some(element) = state.queue.pop_front() {
            state.queued_bytes -= element.byte_size();
            listener(element);
        }
        state.listener = Some(listener);
        // Producers blocked on the byte budget can proceed now.
        self.space_or_data.notify_all();
        Ok(())
    }

    /// Check whether the channel is closed
    pub fn is_closed(&self) -> bool {
        self.recover_lock().closed
    }

    /// Check whether the producer completed the stream
    pub fn is_producer_done(&self) -> bool {
        self.recover_lock().producer_done
    }

    /// Get the bytes currently queued
    pub fn queued_bytes(&self) -> usize {
        self.recover_lock().queued_bytes
    }

    /// Iterate elements, blocking like [`poll`](BoundedChannel::poll) and
    /// ending at end-of-stream
    pub fn iter(&self) -> ChannelIter<'_, T> {
        ChannelIter { channel: self }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ChannelState<T>>> {
        self.state.lock().map_err(|_| ChannelError::Poisoned)
    }

    /// Lifecycle signals must make progress even while another stage is
    /// panicking, so they recover a poisoned lock instead of failing.
    fn recover_lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(
        &self,
        condvar: &Condvar,
        guard: MutexGuard<'a, ChannelState<T>>,
    ) -> Result<MutexGuard<'a, ChannelState<T>>> {
        condvar.wait(guard).map_err(|_| ChannelError::Poisoned)
    }
}

/// Blocking iterator over a channel's elements
pub struct ChannelIter<'a, T> {
    channel: &'a BoundedChannel<T>,
}

impl<T: ByteSized> Iterator for ChannelIter<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.channel.poll() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
