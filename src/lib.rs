//! msgpass - Concurrent In-Process Mailboxes
//!
//! A fixed set of numbered mailboxes, each an independent FIFO, that any
//! thread can send message handles to and poll without blocking. Messages are
//! owned by a registry rather than by the mailboxes, so one message can sit in
//! many mailboxes at once; deleting it strips every pending reference before
//! the payload is freed, even while other threads are sending and receiving.
//!
//! # Architecture
//!
//! - **mail**: registry, mailboxes and the Postmaster API
//! - **config**: YAML configuration and validation
//! - **metrics**: Prometheus counters for mailbox traffic
//! - **logging**: tracing subscriber setup
//! - **demo**: scenario, invalid-input and stress workloads used by the CLI

// Core modules
pub mod config;
pub mod error;
pub mod mail;

// Ambient
pub mod demo;
pub mod logging;
pub mod metrics;

// Re-exports
pub use error::{MsgPassError, Result};
