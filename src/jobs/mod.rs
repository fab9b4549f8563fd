//! Background jobs.

pub mod cleanup;

pub use cleanup::SoftDeleteSweeper;
