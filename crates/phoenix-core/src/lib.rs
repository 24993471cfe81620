// ABOUTME: Core library for phoenix, containing the alert record model and document codec.
// ABOUTME: This crate has no I/O; storage and concurrency live in phoenix-store.

pub mod codec;
pub mod record;

pub use codec::{COLUMNS, Decoded, MalformedReason, MalformedRow, append_row, decode, encode};
pub use record::{DEFAULT_STATUS, Record, RecordError, Severity};
