//! Replication plumbing
//!
//! Everything between a local change and the merge engine on each replica:
//!
//! 1. A change becomes an `Update` (`add_qso`, `edit_qso`, `bulk_add`,
//!    `delete_qso`); large batches are split by the `ChunkEncoder`
//! 2. A `Transport` broadcasts it and assigns a serial
//! 3. Each replica drops serials it has already applied (`DeliveryTracker`)
//!    and hands the rest to the merge engine
//!
//! ## Usage
//!
//! ```ignore
//! let hub = LocalHub::new(128_000);
//! let mut endpoint = hub.endpoint();
//! endpoint.send_update(&Update::add(qso), "")?;
//! for delivery in endpoint.poll()? { replica.receive(delivery); }
//! ```

mod chunk;
mod exchange;
mod hub;
mod message;
mod tracker;
mod transport;

pub use chunk::{encoded_len, ChunkEncoder};
pub use exchange::FileExchange;
pub use hub::{HubEndpoint, LocalHub};
pub use message::{Delivery, Mutation, ProtocolError, ProtocolResult, Update};
pub use tracker::DeliveryTracker;
pub use transport::{Transport, TransportError, TransportResult};
