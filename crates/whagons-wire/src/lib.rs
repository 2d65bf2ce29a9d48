//! Wire types shared by the gateway and its clients.
//!
//! # Purpose
//! Centralizes the JSON frame taxonomy spoken over the `/ws` transport and
//! the parsing of Postgres NOTIFY payloads into typed change events.
//!
//! # How it fits
//! Tenant change listeners parse raw notification payloads into
//! [`ChangeEvent`]s; the fan-out router turns those into per-session
//! [`PublicationMessage`]s. Everything else on the socket is a
//! [`SystemFrame`] (welcome, echo, errors, pings, broadcasts).
//!
//! # Key invariants
//! - Every frame carries an RFC3339 timestamp and the recipient's session id.
//! - INSERT payloads must carry `new_data`, DELETE payloads `old_data`.

mod change;
mod frames;
mod task;

pub use change::{ChangeEvent, ChangeOp};
pub use frames::{CLOSE_NORMAL, CLOSE_POLICY, PublicationMessage, SystemFrame};
pub use task::{TASKS_TABLE, TaskRecord};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid notification payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("{op} notification missing {field}")]
    MissingData { op: ChangeOp, field: &'static str },
}
