//! Dining philosophers solved by message passing alone (Chandy-Misra).
//!
//! Every philosopher owns the record of its two forks and negotiates for them
//! through its neighbors' mailboxes; there is no shared fork table and no lock.

pub mod config;
pub mod error;
pub mod sync;
pub mod table;

pub use config::TableConfig;
pub use error::{Error, ProtocolViolation};
pub use table::Table;
