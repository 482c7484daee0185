//! QSYNC Core Library
//!
//! This crate provides the core of QSYNC, a replicated amateur-radio contact
//! log. Every replica applies the same ordered stream of mutations and ends up
//! with the same set of contacts.
//!
//! # Architecture
//!
//! - **Replica**: owns the contact set and its collaborators
//! - **Merge engine**: applies add, edit, bulk add and delete idempotently
//! - **Transports**: broadcast updates and hand back deliveries with serials
//! - **Persistence**: JSON snapshot when no transport is configured
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let mut replica = Replica::open(&config);
//! replica.poll();
//!
//! replica.add(Qso::new("W1AW", "2024-01-01T12:00"));
//!
//! for qso in replica.records().iter() {
//!     println!("{} {}", qso.dt, qso.callsign);
//! }
//! ```
//!
//! # Modules
//!
//! - `store`: the `Replica` (main entry point)
//! - `actor`: the replica inside a tokio task
//! - `models`: the contact record and its fingerprint
//! - `merge`: the merge engine and record set
//! - `sync`: messages, chunking, delivery tracking and transports
//! - `storage`: snapshot persistence
//! - `tabular`: CSV import and export
//! - `freq`: frequency display
//! - `config`: application configuration

pub mod actor;
pub mod config;
pub mod freq;
pub mod merge;
pub mod models;
pub mod storage;
pub mod store;
pub mod sync;
pub mod tabular;

pub use actor::{ActorError, ReplicaActor, ReplicaHandle, ReplicaStatus};
pub use config::{Config, StorageBackend};
pub use freq::{display_freq, Frequency};
pub use merge::{apply_mutation, MergeOutcome, RecordSet};
pub use models::{parse_dt, Qso};
pub use storage::{Persistence, StorageError};
pub use store::{DeleteRequest, Dispatch, Replica};
pub use sync::{Delivery, FileExchange, LocalHub, Mutation, Transport, Update};
pub use tabular::{export_csv, parse_csv, ImportSummary};
