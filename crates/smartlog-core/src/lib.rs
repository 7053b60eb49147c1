//! Smart Logger Core Library
//!
//! Per-run log buffering with outcome-driven flushing.
//!
//! ## Overview
//!
//! Test code logs through a [`SmartLog`] exactly as it would through a
//! console, but nothing is printed while the run is in progress. Entries
//! are buffered (bounded, oldest evicted first) and only emitted when the
//! run's outcome matches one of the configured [`FlushTrigger`]s, by default
//! a failure or a retry. Passing runs stay silent.
//!
//! A flush writes one framed block to the console and, optionally, one
//! `smart-log` text attachment to the test report.
//!
//! ## Quick Start
//!
//! ```ignore
//! use smartlog_core::{args, RunOutcome, SmartLog, SmartLogRun};
//!
//! async fn checkout_test() -> smartlog_core::SmartLogResult<()> {
//!     let run = SmartLogRun::begin(SmartLog::builder("checkout pays in EUR").build());
//!
//!     run.log().group(["Setup"]);
//!     run.log().info(args!["cart items", 3]);
//!     run.log().group_end();
//!
//!     let result = place_order().await;
//!     run.finish(RunOutcome::from_result(&result)).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod console;
pub mod entry;
pub mod error;
pub mod flush;
pub mod format;
pub mod logger;
pub mod run;
pub mod sink;
pub mod store;
pub mod value;

// Re-exports
pub use config::{parse_trigger_list, FlushTrigger, SmartLogOptions, DEFAULT_MAX_BUFFER_SIZE};
pub use console::{ConsoleHub, ConsoleMessage, ExternalConsole, ListenerId};
pub use entry::{EntryKind, LogEntry, LogLevel, LogSource};
pub use error::{SmartLogError, SmartLogResult};
pub use flush::{should_flush, FlushPhase, RunOutcome, RunStatus};
pub use format::{format_table, format_timestamp, render_entry, safe_serialize, Palette};
pub use logger::{SmartLog, SmartLogBuilder};
pub use run::{current, enter, with_current, CurrentGuard, SmartLogRun};
pub use sink::{
    Attachment, AttachmentSink, DirectoryAttachments, MemoryAttachments, MemorySink,
    OutputSink, RejectingSink, StdoutSink,
};
pub use store::EntryStore;
pub use value::{ArrayRef, Inspect, InspectError, ObjectRef, Value};
