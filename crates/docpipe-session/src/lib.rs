//! Durable session records for docpipe.
//!
//! A [`Session`] is the unit of work: the record of one end-to-end pipeline
//! run, with an embedded append-only checkpoint ledger that is the sole
//! resume signal. The [`SessionStore`] persists sessions crash-safely via
//! atomic writes and validates every record it reads back.

mod ledger;
mod model;
mod store;

pub use model::{Checkpoint, Session, SessionConfig, SourceRefs};
pub use store::SessionStore;
