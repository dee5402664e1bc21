//! Message registry
//!
//! Owns every message from creation until deletion. Messages sit in a
//! fixed-capacity arena of slots; each slot carries an atomic generation word
//! that is the message's liveness flag:
//!
//! - `0` means the slot is vacant (or its message is being deleted)
//! - any other value is the generation of the live message in the slot
//!
//! The word only changes while the registry lock is held, but it can be read
//! without that lock. Mailboxes rely on this to check a handle while holding
//! only their own lock, which keeps the lock order acyclic.
//!
//! A slot whose generation reaches `u64::MAX` is retired rather than reused,
//! so generations never wrap back onto a handle that may still be held.

use super::{lock, read, write, MailError, MessageHandle, Payload, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, trace, warn};

/// Answers whether a handle still refers to a registered message
pub trait Liveness {
    fn is_live(&self, handle: MessageHandle) -> bool;
}

/// One arena slot
#[derive(Debug, Default)]
struct Slot {
    /// Generation of the registered message, 0 when vacant
    state: AtomicU64,
    payload: RwLock<Option<Payload>>,
}

impl Slot {
    fn holds(&self, handle: MessageHandle) -> bool {
        self.state.load(Ordering::Acquire) == handle.generation()
    }
}

/// Bookkeeping guarded by the registry-wide lock
#[derive(Debug)]
struct Book {
    /// Vacated slots ready for reuse
    free: Vec<u32>,
    /// Last generation issued per slot; its length is the number of slots
    /// ever touched
    generations: Vec<u64>,
    live: usize,
}

/// Arena of registered messages
#[derive(Debug)]
pub struct Registry {
    slots: Box<[Slot]>,
    book: Mutex<Book>,
}

impl Registry {
    /// Create a registry able to hold `capacity` live messages at once
    ///
    /// The arena never grows; once `capacity` messages are live, `create`
    /// reports [`MailError::AllocationFailure`] until one is destroyed.
    /// Callers validate `capacity` against `u32::MAX` first.
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| Slot::default()).collect();
        Self {
            slots,
            book: Mutex::new(Book {
                free: Vec::with_capacity(capacity),
                generations: Vec::with_capacity(capacity),
                live: 0,
            }),
        }
    }

    /// Maximum number of simultaneously live messages
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live messages
    pub fn live_count(&self) -> usize {
        lock(&self.book).live
    }

    /// Register a new zero-initialised message
    ///
    /// # Errors
    /// Returns [`MailError::AllocationFailure`] when the arena is full or the
    /// payload buffer cannot be allocated.
    pub fn create(&self) -> Result<MessageHandle> {
        let payload = Payload::zeroed()?;

        let mut book = lock(&self.book);
        let index = loop {
            match book.free.pop() {
                Some(index) if book.generations[index as usize] == u64::MAX => {
                    warn!(slot = index, "retiring slot with exhausted generations");
                }
                Some(index) => break index,
                None if book.generations.len() < self.slots.len() => {
                    let index = u32::try_from(book.generations.len()).map_err(|_| {
                        MailError::AllocationFailure("slot index out of range".to_string())
                    })?;
                    book.generations.push(0);
                    break index;
                }
                None => {
                    return Err(MailError::AllocationFailure(format!(
                        "registry full: {} messages live",
                        book.live
                    )));
                }
            }
        };

        let generation = book.generations[index as usize] + 1;
        book.generations[index as usize] = generation;

        let slot = &self.slots[index as usize];
        *write(&slot.payload) = Some(payload);
        slot.state.store(generation, Ordering::Release);
        book.live += 1;

        let handle = MessageHandle::new(index, generation);
        trace!(%handle, live = book.live, "registered message");
        Ok(handle)
    }

    /// Delete a message
    ///
    /// Under the registry lock the slot is first marked dead, so any send that
    /// checks liveness afterwards is rejected. `purge` then strips every queue
    /// entry that was enqueued before the mark, and finally the payload is
    /// freed and the slot recycled. Returns whatever `purge` returned.
    ///
    /// # Errors
    /// Returns [`MailError::InvalidHandle`] for a null, stale or unknown
    /// handle; nothing is touched in that case.
    pub fn destroy<F>(&self, handle: MessageHandle, purge: F) -> Result<usize>
    where
        F: FnOnce(MessageHandle) -> usize,
    {
        if handle.is_null() {
            return Err(MailError::InvalidHandle(handle));
        }

        let mut book = lock(&self.book);
        let slot = self
            .slots
            .get(handle.slot())
            .filter(|slot| slot.holds(handle))
            .ok_or(MailError::InvalidHandle(handle))?;

        slot.state.store(0, Ordering::Release);
        let purged = purge(handle);
        *write(&slot.payload) = None;

        // capacity was reserved up front, so this never reallocates
        if handle.generation() < u64::MAX {
            book.free.push(handle.slot() as u32);
        } else {
            warn!(%handle, "retiring slot with exhausted generations");
        }
        book.live -= 1;

        debug!(%handle, purged, live = book.live, "destroyed message");
        Ok(purged)
    }

    /// Delete every live message
    ///
    /// All slots are marked dead before `clear_queues` runs, then every payload
    /// is freed. Returns the number of messages deleted.
    pub fn destroy_all<F>(&self, clear_queues: F) -> usize
    where
        F: FnOnce(),
    {
        let mut book = lock(&self.book);

        let touched = book.generations.len();
        for slot in &self.slots[..touched] {
            slot.state.store(0, Ordering::Release);
        }

        clear_queues();

        for slot in &self.slots[..touched] {
            *write(&slot.payload) = None;
        }

        let book = &mut *book;
        let deleted = book.live;
        book.free.clear();
        book.free.extend(
            (0..touched as u32)
                .rev()
                .filter(|&index| book.generations[index as usize] < u64::MAX),
        );
        book.live = 0;

        debug!(deleted, "destroyed all messages");
        deleted
    }

    /// Handles of every live message, in slot order
    pub fn live_handles(&self) -> Vec<MessageHandle> {
        let _book = lock(&self.book);
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot.state.load(Ordering::Acquire) {
                0 => None,
                generation => Some(MessageHandle::new(index as u32, generation)),
            })
            .collect()
    }

    /// Run `f` against a live message's payload
    ///
    /// `f` runs under the slot's payload read lock; writing or destroying the
    /// same handle from inside it deadlocks.
    pub fn with_payload<R, F>(&self, handle: MessageHandle, f: F) -> Result<R>
    where
        F: FnOnce(&Payload) -> R,
    {
        let slot = self.slot(handle)?;
        let guard = read(&slot.payload);
        if !slot.holds(handle) {
            return Err(MailError::InvalidHandle(handle));
        }
        guard.as_ref().map(f).ok_or(MailError::InvalidHandle(handle))
    }

    /// Copy out a live message's payload
    pub fn read(&self, handle: MessageHandle) -> Result<Payload> {
        self.with_payload(handle, Payload::clone)
    }

    /// Overwrite a live message's payload
    ///
    /// # Errors
    /// [`MailError::InvalidHandle`] if the message is not live,
    /// [`MailError::PayloadTooLarge`] if `bytes` does not fit.
    pub fn write(&self, handle: MessageHandle, bytes: &[u8]) -> Result<()> {
        let slot = self.slot(handle)?;
        let mut guard = write(&slot.payload);
        if !slot.holds(handle) {
            return Err(MailError::InvalidHandle(handle));
        }
        match guard.as_mut() {
            Some(payload) => payload.set(bytes),
            None => Err(MailError::InvalidHandle(handle)),
        }
    }

    fn slot(&self, handle: MessageHandle) -> Result<&Slot> {
        if handle.is_null() {
            return Err(MailError::InvalidHandle(handle));
        }
        self.slots
            .get(handle.slot())
            .ok_or(MailError::InvalidHandle(handle))
    }
}

impl Liveness for Registry {
    fn is_live(&self, handle: MessageHandle) -> bool {
        !handle.is_null()
            && self
                .slots
                .get(handle.slot())
                .is_some_and(|slot| slot.holds(handle))
    }
}
