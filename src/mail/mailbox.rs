//! Mailbox set
//!
//! One FIFO of pending entries per address. Each FIFO has its own lock; no
//! operation here ever holds more than one of them at a time, and multi-queue
//! walks (`purge`, `clear`) visit them in ascending address order.

use super::{lock, Address, AddressSpace, Liveness, MailError, MessageHandle, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::trace;

/// A pending delivery: which message, filed under which address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub handle: MessageHandle,
    pub destination: Address,
}

/// The array of per-address FIFOs
#[derive(Debug)]
pub struct Mailboxes {
    space: AddressSpace,
    queues: Box<[Mutex<VecDeque<Entry>>]>,
}

impl Mailboxes {
    /// Create one empty FIFO per address in `space`
    pub fn new(space: AddressSpace) -> Self {
        let queues = space.iter().map(|_| Mutex::new(VecDeque::new())).collect();
        Self { space, queues }
    }

    pub fn space(&self) -> AddressSpace {
        self.space
    }

    /// Append `handle` to the tail of `destination`'s FIFO
    ///
    /// Liveness is checked while the destination lock is held. A delete marks
    /// its message dead before it starts purging, so either this entry lands
    /// before the purge reaches `destination` and gets removed by it, or the
    /// check fails here.
    ///
    /// # Errors
    /// - [`MailError::InvalidAddress`] if `destination` is out of range
    /// - [`MailError::InvalidHandle`] if `handle` is null or not live
    /// - [`MailError::AllocationFailure`] if the FIFO cannot grow
    pub fn enqueue<L>(&self, destination: Address, handle: MessageHandle, liveness: &L) -> Result<()>
    where
        L: Liveness + ?Sized,
    {
        let index = self.space.check(destination)?;
        if handle.is_null() {
            return Err(MailError::InvalidHandle(handle));
        }

        let mut queue = lock(&self.queues[index]);
        if !liveness.is_live(handle) {
            return Err(MailError::InvalidHandle(handle));
        }
        queue.try_reserve(1).map_err(|e| {
            MailError::AllocationFailure(format!("mailbox {} entry: {}", destination, e))
        })?;
        queue.push_back(Entry {
            handle,
            destination,
        });

        trace!(%destination, %handle, depth = queue.len(), "enqueued");
        Ok(())
    }

    /// Remove and return the oldest live entry of `destination`'s FIFO
    ///
    /// Never waits: an empty FIFO yields [`MailError::QueueEmpty`] at once.
    /// Entries whose message is mid-deletion are dropped on the way, since
    /// the purge in flight would remove them anyway.
    pub fn dequeue<L>(&self, destination: Address, liveness: &L) -> Result<MessageHandle>
    where
        L: Liveness + ?Sized,
    {
        let index = self.space.check(destination)?;

        let mut queue = lock(&self.queues[index]);
        while let Some(entry) = queue.pop_front() {
            if liveness.is_live(entry.handle) {
                trace!(%destination, handle = %entry.handle, depth = queue.len(), "dequeued");
                return Ok(entry.handle);
            }
            trace!(%destination, handle = %entry.handle, "dropped entry of deleted message");
        }

        Err(MailError::QueueEmpty(destination))
    }

    /// Remove every entry referencing `handle` from every FIFO
    ///
    /// Visits all addresses in ascending order, even if `handle` was never
    /// sent anywhere. Remaining entries keep their relative order. Returns the
    /// number of entries removed.
    pub fn purge(&self, handle: MessageHandle) -> usize {
        let mut removed = 0;
        for queue in self.queues.iter() {
            let mut queue = lock(queue);
            let before = queue.len();
            queue.retain(|entry| entry.handle != handle);
            removed += before - queue.len();
        }
        removed
    }

    /// Drop every entry in every FIFO, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for queue in self.queues.iter() {
            let mut queue = lock(queue);
            removed += queue.len();
            queue.clear();
        }
        removed
    }

    /// Number of entries pending for `destination`
    pub fn pending(&self, destination: Address) -> Result<usize> {
        let index = self.space.check(destination)?;
        Ok(lock(&self.queues[index]).len())
    }

    /// Pending entry count of every address, in ascending address order
    pub fn depths(&self) -> Vec<usize> {
        self.queues.iter().map(|queue| lock(queue).len()).collect()
    }

    /// Total entries pending across all addresses
    pub fn total_pending(&self) -> usize {
        self.depths().into_iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::RwLock;

    /// Liveness backed by a plain set, so queue behaviour can be tested alone
    #[derive(Default)]
    struct LiveSet(RwLock<HashSet<MessageHandle>>);

    impl LiveSet {
        fn with(handles: &[MessageHandle]) -> Self {
            Self(RwLock::new(handles.iter().copied().collect()))
        }

        fn kill(&self, handle: MessageHandle) {
            self.0.write().unwrap().remove(&handle);
        }
    }

    impl Liveness for LiveSet {
        fn is_live(&self, handle: MessageHandle) -> bool {
            self.0.read().unwrap().contains(&handle)
        }
    }

    fn mailboxes(count: u16) -> Mailboxes {
        Mailboxes::new(AddressSpace::new(count).unwrap())
    }

    fn h(slot: u32) -> MessageHandle {
        MessageHandle::new(slot, 1)
    }

    #[test]
    fn test_fifo_order() {
        let boxes = mailboxes(2);
        let live = LiveSet::with(&[h(1), h(2), h(3)]);
        let dest = Address::new(1);

        for handle in [h(1), h(2), h(3)] {
            boxes.enqueue(dest, handle, &live).unwrap();
        }

        assert_eq!(boxes.dequeue(dest, &live), Ok(h(1)));
        assert_eq!(boxes.dequeue(dest, &live), Ok(h(2)));
        assert_eq!(boxes.dequeue(dest, &live), Ok(h(3)));
        assert_eq!(boxes.dequeue(dest, &live), Err(MailError::QueueEmpty(dest)));
    }

    #[test]
    fn test_repeat_send_creates_independent_entries() {
        let boxes = mailboxes(1);
        let live = LiveSet::with(&[h(1)]);
        let dest = Address::new(0);

        boxes.enqueue(dest, h(1), &live).unwrap();
        boxes.enqueue(dest, h(1), &live).unwrap();
        assert_eq!(boxes.pending(dest), Ok(2));
    }

    #[test]
    fn test_enqueue_validation_leaves_state_untouched() {
        let boxes = mailboxes(2);
        let live = LiveSet::with(&[h(1)]);

        assert!(matches!(
            boxes.enqueue(Address::new(2), h(1), &live),
            Err(MailError::InvalidAddress { .. })
        ));
        assert_eq!(
            boxes.enqueue(Address::new(0), MessageHandle::NULL, &live),
            Err(MailError::InvalidHandle(MessageHandle::NULL))
        );
        assert_eq!(
            boxes.enqueue(Address::new(0), h(9), &live),
            Err(MailError::InvalidHandle(h(9)))
        );
        assert_eq!(boxes.total_pending(), 0);
    }

    #[test]
    fn test_dequeue_invalid_address() {
        let boxes = mailboxes(2);
        let live = LiveSet::default();
        assert!(matches!(
            boxes.dequeue(Address::new(7), &live),
            Err(MailError::InvalidAddress { limit: 2, .. })
        ));
    }

    #[test]
    fn test_purge_removes_interior_entries_and_keeps_order() {
        let boxes = mailboxes(3);
        let live = LiveSet::with(&[h(1), h(2), h(3)]);
        let (a, b) = (Address::new(0), Address::new(2));

        for handle in [h(1), h(2), h(1), h(3)] {
            boxes.enqueue(a, handle, &live).unwrap();
        }
        boxes.enqueue(b, h(2), &live).unwrap();
        boxes.enqueue(b, h(1), &live).unwrap();

        assert_eq!(boxes.purge(h(1)), 3);
        assert_eq!(boxes.depths(), vec![2, 0, 1]);

        assert_eq!(boxes.dequeue(a, &live), Ok(h(2)));
        assert_eq!(boxes.dequeue(a, &live), Ok(h(3)));
        assert_eq!(boxes.dequeue(b, &live), Ok(h(2)));
    }

    #[test]
    fn test_purge_of_unsent_handle_is_noop() {
        let boxes = mailboxes(2);
        let live = LiveSet::with(&[h(1)]);
        boxes.enqueue(Address::new(1), h(1), &live).unwrap();

        assert_eq!(boxes.purge(h(5)), 0);
        assert_eq!(boxes.depths(), vec![0, 1]);
    }

    #[test]
    fn test_dequeue_skips_dead_entries() {
        let boxes = mailboxes(1);
        let live = LiveSet::with(&[h(1), h(2)]);
        let dest = Address::new(0);

        boxes.enqueue(dest, h(1), &live).unwrap();
        boxes.enqueue(dest, h(2), &live).unwrap();
        live.kill(h(1));

        assert_eq!(boxes.dequeue(dest, &live), Ok(h(2)));
        assert_eq!(boxes.pending(dest), Ok(0));
    }

    #[test]
    fn test_clear() {
        let boxes = mailboxes(2);
        let live = LiveSet::with(&[h(1)]);
        boxes.enqueue(Address::new(0), h(1), &live).unwrap();
        boxes.enqueue(Address::new(1), h(1), &live).unwrap();

        assert_eq!(boxes.clear(), 2);
        assert_eq!(boxes.total_pending(), 0);
    }
}
