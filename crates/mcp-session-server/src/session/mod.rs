//! Session table — live sessions keyed by session id.

pub mod table;

pub use table::{Session, SessionTable};
