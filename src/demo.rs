//! Demo workloads
//!
//! Drivers behind the `msgpass` binary's subcommands. Each one is an ordinary
//! caller of the four core [`Postmaster`] operations.

use crate::config::StressConfig;
use crate::mail::{
    read, write, Address, MailError, MessageHandle, Postmaster, Status, MAX_PAYLOAD,
};
use crate::{MsgPassError, Result};
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use tracing::{debug, info};

/// Byte used to fill demo payloads
const FILL_BYTE: u8 = 0x13;

/// One call made by a demo and its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub call: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<MessageHandle>,
}

/// Outcome of a mailbox call, as recorded by a demo
type Outcome = std::result::Result<Option<MessageHandle>, MailError>;

impl Step {
    fn record(call: impl Into<String>, result: &Outcome) -> Self {
        Self {
            call: call.into(),
            status: Status::of(result),
            handle: result.as_ref().ok().copied().flatten(),
        }
    }
}

fn expect(step: &Step, status: Status) -> Result<()> {
    if step.status == status {
        Ok(())
    } else {
        Err(MsgPassError::Other(format!(
            "{} returned {:?}, expected {:?}",
            step.call, step.status, status
        )))
    }
}

fn expect_handle(step: &Step, handle: MessageHandle) -> Result<()> {
    expect(step, Status::Success)?;
    if step.handle == Some(handle) {
        Ok(())
    } else {
        Err(MsgPassError::Other(format!(
            "{} returned {:?}, expected {}",
            step.call, step.handle, handle
        )))
    }
}

/// Three messages of lengths 0, 255 and 17; the first fanned out to #0 and
/// #1, the second sent to #0, the third never sent
///
/// Checks every outcome as it goes and returns the call log.
pub fn run_scenario(postmaster: &Postmaster) -> Result<Vec<Step>> {
    let (a0, a1) = (Address::new(0), Address::new(1));
    let mut steps = Vec::new();

    let m1 = postmaster.new_message()?;
    let m2 = postmaster.new_message()?;
    let m3 = postmaster.new_message()?;
    postmaster.write_payload(m1, &[])?;
    postmaster.write_payload(m2, &[FILL_BYTE; MAX_PAYLOAD])?;
    postmaster.write_payload(m3, &[FILL_BYTE; 17])?;

    let sends = [
        ("send(#0, m1)", a0, m1),
        ("send(#1, m1)", a1, m1),
        ("send(#0, m2)", a0, m2),
    ];
    for (call, dest, handle) in sends {
        let step = Step::record(call, &postmaster.send(dest, handle).map(|()| None));
        expect(&step, Status::Success)?;
        steps.push(step);
    }

    let step = Step::record("recv(#0)", &postmaster.recv(a0).map(Some));
    expect_handle(&step, m1)?;
    steps.push(step);

    let step = Step::record("recv(#0)", &postmaster.recv(a0).map(Some));
    expect_handle(&step, m2)?;
    steps.push(step);

    let step = Step::record("recv(#1)", &postmaster.recv(a1).map(Some));
    expect_handle(&step, m1)?;
    steps.push(step);

    let step = Step::record("recv(#0)", &postmaster.recv(a0).map(Some));
    expect(&step, Status::QueueEmpty)?;
    steps.push(step);

    let pending_before = postmaster.stats().pending;
    let step = Step::record("delete(m3)", &postmaster.delete_message(m3).map(|()| None));
    expect(&step, Status::Success)?;
    steps.push(step);
    if postmaster.stats().pending != pending_before {
        return Err(MsgPassError::Other(
            "deleting an unsent message changed a mailbox".to_string(),
        ));
    }

    for (call, handle) in [("delete(m1)", m1), ("delete(m2)", m2)] {
        let step = Step::record(call, &postmaster.delete_message(handle).map(|()| None));
        expect(&step, Status::Success)?;
        steps.push(step);
    }

    let step = Step::record("delete(m1)", &postmaster.delete_message(m1).map(|()| None));
    expect(&step, Status::InvalidHandle)?;
    steps.push(step);

    info!(steps = steps.len(), "scenario passed");
    Ok(steps)
}

/// Every kind of invalid call, each of which must be rejected without
/// touching any mailbox
pub fn run_bad_input(postmaster: &Postmaster) -> Result<Vec<Step>> {
    let limit = postmaster.address_space().len() as u16;
    let before = postmaster.stats();
    let mut steps = Vec::new();

    let checks: [(String, Status, Outcome); 7] = [
        (
            "delete(null)".to_string(),
            Status::InvalidHandle,
            postmaster.delete_message(MessageHandle::NULL).map(|()| None),
        ),
        (
            format!("send(#{}, null)", u16::MAX),
            Status::InvalidAddress,
            postmaster.send(Address::new(u16::MAX), MessageHandle::NULL).map(|()| None),
        ),
        (
            format!("send(#{}, null)", limit),
            Status::InvalidAddress,
            postmaster.send(Address::new(limit), MessageHandle::NULL).map(|()| None),
        ),
        (
            "send(#0, null)".to_string(),
            Status::InvalidHandle,
            postmaster.send(Address::new(0), MessageHandle::NULL).map(|()| None),
        ),
        (
            format!("recv(#{})", u16::MAX),
            Status::InvalidAddress,
            postmaster.recv(Address::new(u16::MAX)).map(Some),
        ),
        (
            format!("recv(#{})", limit),
            Status::InvalidAddress,
            postmaster.recv(Address::new(limit)).map(Some),
        ),
        (
            format!("recv(#{})", limit - 1),
            Status::QueueEmpty,
            postmaster.recv(Address::new(limit - 1)).map(Some),
        ),
    ];

    for (call, status, result) in checks {
        let step = Step::record(call, &result);
        expect(&step, status)?;
        steps.push(step);
    }

    let after = postmaster.stats();
    if after.pending != before.pending || after.live_messages != before.live_messages {
        return Err(MsgPassError::Other(
            "an invalid call changed postmaster state".to_string(),
        ));
    }

    info!(steps = steps.len(), "bad input rejected");
    Ok(steps)
}

/// Totals from a stress run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StressReport {
    pub created: usize,
    pub allocation_failures: usize,
    /// Payload writes rejected for a message its producer still owned
    pub payload_writes_rejected: usize,
    pub sent: usize,
    pub sends_rejected: usize,
    pub received: usize,
    pub payload_reads_raced: usize,
    pub deleted: usize,
    /// Receives that returned a message whose deletion had already completed
    pub stale_receives: usize,
    pub live_after: usize,
    pub pending_after: usize,
}

impl StressReport {
    /// True if no receive ever observed a deleted message, every payload
    /// write landed and nothing leaked
    pub fn is_clean(&self) -> bool {
        self.stale_receives == 0
            && self.payload_writes_rejected == 0
            && self.live_after == 0
            && self.pending_after == 0
    }
}

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    allocation_failures: AtomicUsize,
    payload_writes_rejected: AtomicUsize,
    sent: AtomicUsize,
    sends_rejected: AtomicUsize,
    received: AtomicUsize,
    payload_reads_raced: AtomicUsize,
    deleted: AtomicUsize,
    stale_receives: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Producers create, fill, fan out and delete messages at random while
/// consumers poll their mailboxes
///
/// Producers delete roughly a third of their messages straight after sending
/// them, racing the consumers; the rest are deleted once the producer is done.
/// Consumer `i` polls address `i mod N`.
pub fn run_stress(postmaster: &Postmaster, config: &StressConfig) -> StressReport {
    let space = postmaster.address_space();
    let targets = config.consumers.clamp(1, space.len());
    let counters = Counters::default();
    // Handles whose delete has returned; consumers hold the read side across
    // recv so anything found here was deleted before that recv started
    let deleted: RwLock<HashSet<MessageHandle>> = RwLock::new(HashSet::new());
    let producers_done = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);

    info!(
        producers = config.producers,
        consumers = config.consumers,
        messages_per_producer = config.messages_per_producer,
        "starting stress run"
    );

    std::thread::scope(|scope| {
        for producer in 0..config.producers {
            let (counters, deleted, producers_done) = (&counters, &deleted, &producers_done);
            scope.spawn(move || {
                let mut rng = rand::thread_rng();
                let mut kept = Vec::new();

                let finish = |handle: MessageHandle| {
                    if postmaster.delete_message(handle).is_ok() {
                        write(deleted).insert(handle);
                        bump(&counters.deleted);
                    }
                };

                for _ in 0..config.messages_per_producer {
                    let handle = match postmaster.new_message() {
                        Ok(handle) => handle,
                        Err(_) => {
                            bump(&counters.allocation_failures);
                            std::thread::yield_now();
                            continue;
                        }
                    };
                    bump(&counters.created);

                    let len = rng.gen_range(0..=MAX_PAYLOAD);
                    if postmaster
                        .write_payload(handle, &vec![FILL_BYTE; len])
                        .is_err()
                    {
                        bump(&counters.payload_writes_rejected);
                    }

                    let fan = rng.gen_range(1..=3);
                    for _ in 0..fan {
                        let dest = Address::new(rng.gen_range(0..targets) as u16);
                        match postmaster.send(dest, handle) {
                            Ok(()) => bump(&counters.sent),
                            Err(_) => bump(&counters.sends_rejected),
                        }
                    }

                    if rng.gen_bool(1.0 / 3.0) {
                        finish(handle);
                    } else {
                        kept.push(handle);
                    }
                }

                for handle in kept {
                    finish(handle);
                }

                producers_done.fetch_add(1, Ordering::Release);
                debug!(producer, "producer finished");
            });
        }

        for consumer in 0..config.consumers {
            let (counters, deleted, stop) = (&counters, &deleted, &stop);
            let address = Address::new((consumer % space.len()) as u16);
            scope.spawn(move || loop {
                let result = {
                    let deleted = read(deleted);
                    let result = postmaster.recv(address);
                    if let Ok(handle) = result {
                        if deleted.contains(&handle) {
                            bump(&counters.stale_receives);
                        }
                    }
                    result
                };

                match result {
                    Ok(handle) => {
                        bump(&counters.received);
                        if postmaster.with_payload(handle, |p| p.len()).is_err() {
                            bump(&counters.payload_reads_raced);
                        }
                    }
                    Err(MailError::QueueEmpty(_)) if stop.load(Ordering::Acquire) => break,
                    Err(_) => std::thread::yield_now(),
                }
            });
        }

        // Consumers drain until every producer is done and their queue is empty
        while producers_done.load(Ordering::Acquire) < config.producers {
            std::thread::yield_now();
        }
        stop.store(true, Ordering::Release);
    });

    let stats = postmaster.stats();
    let report = StressReport {
        created: counters.created.into_inner(),
        allocation_failures: counters.allocation_failures.into_inner(),
        payload_writes_rejected: counters.payload_writes_rejected.into_inner(),
        sent: counters.sent.into_inner(),
        sends_rejected: counters.sends_rejected.into_inner(),
        received: counters.received.into_inner(),
        payload_reads_raced: counters.payload_reads_raced.into_inner(),
        deleted: counters.deleted.into_inner(),
        stale_receives: counters.stale_receives.into_inner(),
        live_after: stats.live_messages,
        pending_after: stats.pending_total,
    };

    info!(?report, "stress run finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::AddressSpace;

    #[test]
    fn test_scenario_passes() {
        let postmaster = Postmaster::default();
        let steps = run_scenario(&postmaster).unwrap();
        assert_eq!(steps.len(), 11);
        assert_eq!(steps[6].status, Status::QueueEmpty);
        assert!(postmaster.live_messages().is_empty());
    }

    #[test]
    fn test_bad_input_rejected() {
        let postmaster = Postmaster::new(AddressSpace::new(4).unwrap(), 4).unwrap();
        let steps = run_bad_input(&postmaster).unwrap();
        assert_eq!(steps.len(), 7);
        assert!(steps.iter().all(|s| !s.status.is_success()));
    }

    #[test]
    fn test_rejected_payload_write_makes_report_unclean() {
        let report = StressReport {
            created: 1,
            payload_writes_rejected: 1,
            deleted: 1,
            ..StressReport::default()
        };
        assert!(!report.is_clean());
        assert!(StressReport::default().is_clean());
    }

    #[test]
    fn test_small_stress_run_is_clean() {
        let postmaster = Postmaster::new(AddressSpace::new(4).unwrap(), 64).unwrap();
        let config = StressConfig {
            producers: 3,
            consumers: 2,
            messages_per_producer: 50,
        };

        let report = run_stress(&postmaster, &config);
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.payload_writes_rejected, 0);
        assert_eq!(report.created + report.allocation_failures, 150);
        assert_eq!(report.deleted, report.created);
        assert!(report.received <= report.sent);
    }
}
