//! Subcommand implementations for the `dbfsync` binary.

pub mod inspect;
pub mod lock;
pub mod repair;
pub mod sync;
