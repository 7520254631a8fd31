//! Scheduled tasks
//!
//! - Daily auto-import of the TWSE warrant report (optional)

mod auto_import;

pub use auto_import::AutoImportScheduler;
