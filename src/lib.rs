//! Token groups and badges for a multi-user tabletop board.
//!
//! ARCHITECTURE
//! ============
//! - `state`: group, shape, and batch records
//! - `charset`: badge alphabets and label rendering
//! - `services::groups`: membership and badge assignment
//! - `session`: per-game owner of the above plus the outbound channel
//! - `frame`: the wire message shared with the server
//! - `replay`: JSON-lines frame log driver used by the binary

pub mod charset;
pub mod config;
pub mod frame;
pub mod replay;
pub mod services;
pub mod session;
pub mod state;
