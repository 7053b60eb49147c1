//! The logger facade handed to test code.
//!
//! [`SmartLog`] mirrors the familiar console API (`log`, `group`, `time`,
//! `count`, `assert`, `table`, ...) but only records into the run's
//! [`EntryStore`]. Nothing is printed until [`SmartLog::flush`] runs, either
//! because the run's outcome matched a configured trigger or because test
//! code asked for it.
//!
//! ```ignore
//! use smartlog_core::{args, SmartLog};
//!
//! let log = SmartLog::builder("checkout flow").build();
//! log.group(["Setup"]);
//! log.info(args!["user id", 42]);
//! log.group_end();
//! log.time("login");
//! // ...
//! log.time_end("login");
//! ```

use std::backtrace::{Backtrace, BacktraceStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::SmartLogOptions;
use crate::console::{ConsoleMessage, ExternalConsole, ListenerId};
use crate::entry::{EntryKind, LogEntry, LogLevel, LogSource};
use crate::error::SmartLogResult;
use crate::flush::{self, FlushPhase, RunOutcome};
use crate::format::{render_attachment, render_console_block};
use crate::sink::{Attachment, AttachmentSink, OutputSink, StdoutSink};
use crate::store::{EntryStore, DEFAULT_LABEL};
use crate::value::Value;

/// Placeholder for an external console argument that could not be stringified.
const UNPRINTABLE_ARG: &str = "[object]";

/// Per-run logger. Cloning yields another handle to the same buffer.
#[derive(Clone)]
pub struct SmartLog {
    inner: Arc<Inner>,
}

struct Inner {
    title: String,
    options: SmartLogOptions,
    store: Mutex<EntryStore>,
    phase: Mutex<FlushPhase>,
    output: Arc<dyn OutputSink>,
    attachments: Option<Arc<dyn AttachmentSink>>,
    subscription: Mutex<Option<Subscription>>,
    finished: AtomicBool,
}

struct Subscription {
    console: Arc<dyn ExternalConsole>,
    id: ListenerId,
}

/// Builder for a [`SmartLog`].
pub struct SmartLogBuilder {
    title: String,
    options: SmartLogOptions,
    output: Arc<dyn OutputSink>,
    attachments: Option<Arc<dyn AttachmentSink>>,
    console: Option<Arc<dyn ExternalConsole>>,
}

impl SmartLogBuilder {
    pub fn options(mut self, options: SmartLogOptions) -> Self {
        self.options = options;
        self
    }

    /// Where console blocks go (default: coloured stdout).
    pub fn output(mut self, sink: impl OutputSink + 'static) -> Self {
        self.output = Arc::new(sink);
        self
    }

    /// Where attachments go when `attach_to_report` is enabled.
    pub fn attachments(mut self, sink: impl AttachmentSink + 'static) -> Self {
        self.attachments = Some(Arc::new(sink));
        self
    }

    /// External console to mirror when `capture_external_console` is enabled.
    pub fn external_console(mut self, console: Arc<dyn ExternalConsole>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn build(self) -> SmartLog {
        let inner = Arc::new(Inner {
            title: self.title,
            store: Mutex::new(EntryStore::new(self.options.max_buffer_size)),
            options: self.options,
            phase: Mutex::new(FlushPhase::Idle),
            output: self.output,
            attachments: self.attachments,
            subscription: Mutex::new(None),
            finished: AtomicBool::new(false),
        });

        if inner.options.capture_external_console {
            if let Some(console) = self.console {
                subscribe(&inner, console);
            }
        }

        SmartLog { inner }
    }
}

/// Register the mirroring listener. Failures are swallowed: a run without
/// mirrored output is still a perfectly good run.
fn subscribe(inner: &Arc<Inner>, console: Arc<dyn ExternalConsole>) {
    // The console outlives nothing of ours; hold the logger weakly so an
    // abandoned listener does not keep the buffer alive.
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let listener = Arc::new(move |msg: &ConsoleMessage| {
        if let Some(inner) = weak.upgrade() {
            inner.record_external(msg);
        }
    });

    match console.subscribe(listener) {
        Ok(id) => *inner.subscription.lock() = Some(Subscription { console, id }),
        Err(e) => tracing::debug!(error = %e, title = %inner.title, "External console capture unavailable"),
    }
}

impl Inner {
    fn record_external(&self, msg: &ConsoleMessage) {
        let level = LogLevel::from_console_type(&msg.kind);
        let args = msg
            .args
            .iter()
            .map(|arg| {
                Value::String(
                    arg.try_to_string()
                        .unwrap_or_else(|_| UNPRINTABLE_ARG.to_string()),
                )
            })
            .collect();
        self.store
            .lock()
            .append(level, args, LogSource::External, EntryKind::Plain);
    }
}

fn collect_args<I, V>(args: I) -> Vec<Value>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    args.into_iter().map(Into::into).collect()
}

impl SmartLog {
    pub fn builder(title: impl Into<String>) -> SmartLogBuilder {
        SmartLogBuilder {
            title: title.into(),
            options: SmartLogOptions::default(),
            output: Arc::new(StdoutSink::default()),
            attachments: None,
            console: None,
        }
    }

    /// Run title, used in attachment headers.
    pub fn title(&self) -> &str {
        &self.inner.title
    }

    pub fn options(&self) -> &SmartLogOptions {
        &self.inner.options
    }

    fn append(&self, level: LogLevel, args: Vec<Value>, kind: EntryKind) {
        self.inner
            .store
            .lock()
            .append(level, args, LogSource::Local, kind);
    }

    // --- Core logging ---

    pub fn log<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.append(LogLevel::Log, collect_args(args), EntryKind::Plain);
    }

    pub fn debug<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.append(LogLevel::Debug, collect_args(args), EntryKind::Plain);
    }

    pub fn info<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.append(LogLevel::Info, collect_args(args), EntryKind::Plain);
    }

    pub fn warn<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.append(LogLevel::Warn, collect_args(args), EntryKind::Plain);
    }

    pub fn error<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.append(LogLevel::Error, collect_args(args), EntryKind::Plain);
    }

    // --- Grouping ---

    /// Start a group; subsequent entries are indented one level deeper.
    pub fn group<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.inner.store.lock().begin_group(collect_args(args));
    }

    pub fn group_end(&self) {
        self.inner.store.lock().end_group();
    }

    // --- Structured data ---

    /// Record `data` for table rendering at flush time.
    pub fn table(&self, data: impl Into<Value>) {
        self.append(LogLevel::Log, vec![data.into()], EntryKind::Table);
    }

    /// Like [`table`](Self::table), restricted to (and ordered by) `columns`.
    pub fn table_with_columns<I, S>(&self, data: impl Into<Value>, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = Value::array(columns.into_iter().map(|c| Value::String(c.into())));
        self.append(LogLevel::Log, vec![data.into(), columns], EntryKind::Table);
    }

    /// Record `obj` for a full structured dump at flush time.
    pub fn dir(&self, obj: impl Into<Value>) {
        self.append(LogLevel::Log, vec![obj.into()], EntryKind::Dump);
    }

    // --- Timing ---

    pub fn time<'a>(&self, label: impl Into<Option<&'a str>>) {
        let label = label.into().unwrap_or(DEFAULT_LABEL);
        self.inner.store.lock().start_timer(label);
    }

    pub fn time_end<'a>(&self, label: impl Into<Option<&'a str>>) {
        let label = label.into().unwrap_or(DEFAULT_LABEL);
        self.inner.store.lock().stop_timer(label);
    }

    pub fn time_log<'a, I, V>(&self, label: impl Into<Option<&'a str>>, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let label = label.into().unwrap_or(DEFAULT_LABEL);
        self.inner
            .store
            .lock()
            .peek_timer(label, collect_args(args));
    }

    // --- Assertion ---

    /// Record an error entry when `condition` is falsy.
    pub fn assert<I, V>(&self, condition: impl Into<Value>, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if condition.into().is_truthy() {
            return;
        }
        let args = collect_args(args);
        let entry = if args.is_empty() {
            vec![Value::from("Assertion failed")]
        } else {
            let mut entry = Vec::with_capacity(args.len() + 1);
            entry.push(Value::from("Assertion failed:"));
            entry.extend(args);
            entry
        };
        self.append(LogLevel::Error, entry, EntryKind::Plain);
    }

    // --- Counting ---

    pub fn count<'a>(&self, label: impl Into<Option<&'a str>>) {
        let label = label.into().unwrap_or(DEFAULT_LABEL);
        self.inner.store.lock().increment(label);
    }

    pub fn count_reset<'a>(&self, label: impl Into<Option<&'a str>>) {
        let label = label.into().unwrap_or(DEFAULT_LABEL);
        self.inner.store.lock().reset_counter(label);
    }

    // --- Trace ---

    /// Record `Trace:`, the arguments, and the caller's stack.
    pub fn trace<I, V>(&self, args: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let stack = caller_stack();
        let mut entry = vec![Value::from("Trace:")];
        entry.extend(collect_args(args));
        entry.push(Value::from(format!("\n{}", stack)));
        self.append(LogLevel::Log, entry, EntryKind::Plain);
    }

    // --- Buffer ---

    /// Empty the buffer and reset group depth; timers and counters survive.
    pub fn clear(&self) {
        self.inner.store.lock().clear();
    }

    /// Independent copy of the buffered entries.
    pub fn buffer(&self) -> Vec<LogEntry> {
        self.inner.store.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.lock().is_empty()
    }

    pub fn group_depth(&self) -> usize {
        self.inner.store.lock().group_depth()
    }

    pub fn has_timer(&self, label: &str) -> bool {
        self.inner.store.lock().has_timer(label)
    }

    pub fn counter(&self, label: &str) -> Option<u64> {
        self.inner.store.lock().counter(label)
    }

    pub fn phase(&self) -> FlushPhase {
        *self.inner.phase.lock()
    }

    /// Whether [`cleanup`](Self::cleanup) has run. A finished run is never
    /// returned by [`current`](crate::current).
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Whether two handles share the same buffer.
    pub fn same_run(&self, other: &SmartLog) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // --- Flush ---

    /// Emit all buffered entries, then clear them. Returns the number of
    /// entries emitted.
    ///
    /// An empty buffer is a no-op. The report attachment is written before
    /// the console block, so a rejected attachment leaves the console
    /// untouched. If either sink fails the error is returned and the buffer
    /// is left intact for a later flush. Entries recorded while the emission
    /// is in flight are kept for the next flush.
    pub async fn flush(&self) -> SmartLogResult<usize> {
        let Some(_phase) = PhaseGuard::enter(&self.inner.phase) else {
            return Ok(0);
        };

        let entries = self.inner.store.lock().snapshot();
        let Some(last_seq) = entries.last().map(|e| e.seq) else {
            return Ok(0);
        };

        if self.inner.options.attach_to_report {
            match &self.inner.attachments {
                Some(sink) => {
                    let document = render_attachment(&self.inner.title, &entries);
                    sink.attach(Attachment::smart_log(document)).await?;
                }
                None => tracing::debug!(
                    title = %self.inner.title,
                    "attachToReport is set but no attachment sink is configured"
                ),
            }
        }

        let block = render_console_block(&entries, self.inner.output.palette());
        self.inner.output.write_block(&block).await?;

        self.inner.store.lock().clear_through(last_seq);
        tracing::debug!(title = %self.inner.title, entries = entries.len(), "Flushed smart log");
        Ok(entries.len())
    }

    /// Whether `outcome` should trigger an automatic flush.
    pub fn should_flush(&self, outcome: &RunOutcome) -> bool {
        flush::should_flush(&self.inner.options, outcome)
    }

    /// Run teardown: detach from the external console, drop timers and
    /// counters, and mark the run finished. Errors while detaching are
    /// swallowed.
    pub fn cleanup(&self) {
        self.inner.finished.store(true, Ordering::Release);
        if let Some(sub) = self.inner.subscription.lock().take() {
            if let Err(e) = sub.console.unsubscribe(sub.id) {
                tracing::debug!(error = %e, title = %self.inner.title, "Failed to detach external console");
            }
        }
        self.inner.store.lock().reset_state();
    }
}

impl std::fmt::Debug for SmartLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartLog")
            .field("title", &self.inner.title)
            .field("entries", &self.len())
            .finish()
    }
}

/// Marks the logger as flushing until dropped, even if the flush future is
/// cancelled part-way.
struct PhaseGuard<'a> {
    phase: &'a Mutex<FlushPhase>,
}

impl<'a> PhaseGuard<'a> {
    /// `None` if a flush is already in progress.
    fn enter(phase: &'a Mutex<FlushPhase>) -> Option<Self> {
        let mut current = phase.lock();
        if *current == FlushPhase::Flushing {
            return None;
        }
        *current = FlushPhase::Flushing;
        Some(Self { phase })
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.phase.lock() = FlushPhase::Idle;
    }
}

/// Stack of the code that called [`SmartLog::trace`].
#[inline(never)]
fn caller_stack() -> String {
    let backtrace = Backtrace::force_capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return String::new();
    }
    strip_capture_frames(&backtrace.to_string())
}

/// Drop the frames that belong to capturing the stack: the backtrace
/// machinery, [`caller_stack`] and `SmartLog::trace` itself.
fn strip_capture_frames(rendered: &str) -> String {
    let mut frames: Vec<Vec<&str>> = Vec::new();
    for line in rendered.lines() {
        if is_frame_header(line) || frames.is_empty() {
            frames.push(vec![line]);
        } else if let Some(frame) = frames.last_mut() {
            frame.push(line);
        }
    }

    let cut = frames
        .iter()
        .rposition(|frame| is_capture_frame(frame[0]))
        .map_or(0, |i| i + 1);

    frames[cut..]
        .iter()
        .map(|frame| frame.join("\n"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `  12: some::symbol`
fn is_frame_header(line: &str) -> bool {
    line.trim_start()
        .split_once(": ")
        .is_some_and(|(n, _)| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn is_capture_frame(header: &str) -> bool {
    header.contains("std::backtrace")
        || header.contains("logger::caller_stack")
        || header.contains("SmartLog::trace")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::console::ConsoleHub;
    use crate::error::SmartLogError;
    use crate::sink::{MemoryAttachments, MemorySink, RejectingSink};
    use crate::value::{Inspect, InspectError};
    use serde_json::json;

    fn quiet(title: &str) -> (SmartLog, MemorySink) {
        let sink = MemorySink::new();
        let log = SmartLog::builder(title).output(sink.clone()).build();
        (log, sink)
    }

    fn first_text(entry: &LogEntry) -> String {
        entry.args[0].to_string()
    }

    #[test]
    fn test_levels_are_recorded_in_order() {
        let (log, _) = quiet("levels");
        log.log(["a"]);
        log.debug(["b"]);
        log.info(["c"]);
        log.warn(["d"]);
        log.error(["e"]);

        let levels: Vec<_> = log.buffer().iter().map(|e| e.level).collect();
        assert_eq!(
            levels,
            vec![
                LogLevel::Log,
                LogLevel::Debug,
                LogLevel::Info,
                LogLevel::Warn,
                LogLevel::Error
            ]
        );
        assert!(log.buffer().iter().all(|e| e.source == LogSource::Local));
    }

    #[test]
    fn test_heterogeneous_args() {
        let (log, _) = quiet("args");
        log.info(args!["count", 3, true, Value::Null]);
        let entry = &log.buffer()[0];
        assert_eq!(
            entry.args,
            vec![Value::from("count"), Value::from(3), Value::from(true), Value::Null]
        );
    }

    #[test]
    fn test_group_with_no_args_records_empty_label() {
        let (log, _) = quiet("group");
        log.group(args![]);
        log.info(["inside"]);
        log.group_end();
        log.group_end();

        let buffer = log.buffer();
        assert_eq!(buffer[0].args, vec![Value::from("")]);
        assert_eq!(buffer[0].group_level, 0);
        assert_eq!(buffer[1].group_level, 1);
        assert_eq!(log.group_depth(), 0);
    }

    #[test]
    fn test_table_defers_formatting() {
        let (log, _) = quiet("table");
        let data = Value::from(json!([{"name": "Alice"}]));
        log.table(data.clone());
        log.table_with_columns(data.clone(), ["name"]);

        let buffer = log.buffer();
        assert_eq!(buffer[0].kind, EntryKind::Table);
        assert_eq!(buffer[0].args, vec![data.clone()]);
        assert_eq!(buffer[1].args.len(), 2);
        assert_eq!(buffer[1].args[0], data);
    }

    #[test]
    fn test_dir_records_dump() {
        let (log, _) = quiet("dir");
        log.dir(json!({"a": 1}));
        assert_eq!(log.buffer()[0].kind, EntryKind::Dump);
    }

    #[test]
    fn test_timers_through_facade() {
        let (log, _) = quiet("timers");
        log.time(None);
        log.time_log(None, ["step"]);
        log.time_end(None);
        log.time_end("never");

        let buffer = log.buffer();
        assert_eq!(buffer.len(), 3);
        assert!(first_text(&buffer[0]).starts_with("default: "));
        assert_eq!(buffer[0].args[1], Value::from("step"));
        assert!(first_text(&buffer[1]).starts_with("default: "));
        assert_eq!(first_text(&buffer[2]), "Timer \"never\" does not exist");
    }

    #[test]
    fn test_assert_uses_truthiness() {
        let (log, _) = quiet("assert");
        log.assert(true, ["never"]);
        log.assert(1, ["never"]);
        log.assert("text", ["never"]);
        assert!(log.is_empty());

        log.assert(false, args![]);
        log.assert(0, args!["zero", 0]);
        log.assert("", args![]);
        log.assert(Value::Undefined, ["undefined"]);

        let buffer = log.buffer();
        assert_eq!(buffer.len(), 4);
        assert!(buffer.iter().all(|e| e.level == LogLevel::Error));
        assert_eq!(buffer[0].args, vec![Value::from("Assertion failed")]);
        assert_eq!(
            buffer[1].args,
            vec![Value::from("Assertion failed:"), Value::from("zero"), Value::from(0)]
        );
    }

    #[test]
    fn test_count_and_reset() {
        let (log, _) = quiet("count");
        log.count(None);
        log.count(None);
        log.count("other");
        log.count_reset(None);
        log.count_reset("missing");

        let texts: Vec<_> = log.buffer().iter().map(first_text).collect();
        assert_eq!(
            texts,
            vec![
                "default: 1",
                "default: 2",
                "other: 1",
                "Count for \"missing\" does not exist"
            ]
        );
    }

    #[test]
    fn test_trace_entry_shape() {
        let (log, _) = quiet("trace");
        log.trace(["checkpoint"]);

        let entry = &log.buffer()[0];
        assert_eq!(entry.level, LogLevel::Log);
        assert_eq!(entry.args[0], Value::from("Trace:"));
        assert_eq!(entry.args[1], Value::from("checkpoint"));
        let stack = entry.args[2].to_string();
        assert!(stack.starts_with('\n'));
        assert!(!stack.contains("SmartLog::trace"));
        assert!(!stack.contains("caller_stack"));
    }

    #[test]
    fn test_strip_capture_frames() {
        let rendered = "   0: std::backtrace::Backtrace::force_capture\n             at lib.rs:1:1\n   1: smartlog_core::logger::caller_stack\n   2: smartlog_core::logger::SmartLog::trace\n             at logger.rs:10:5\n   3: my_tests::checkout\n             at checkout.rs:4:9\n   4: core::ops::function::FnOnce::call_once";
        assert_eq!(
            strip_capture_frames(rendered),
            "   3: my_tests::checkout\n             at checkout.rs:4:9\n   4: core::ops::function::FnOnce::call_once"
        );
    }

    #[test]
    fn test_clear_keeps_timers_and_counters() {
        let (log, _) = quiet("clear");
        log.time("t");
        log.count("c");
        log.group(["g"]);
        log.clear();

        assert!(log.is_empty());
        log.info(["after"]);
        assert_eq!(log.buffer()[0].group_level, 0);

        log.time_end("t");
        log.count("c");
        let texts: Vec<_> = log.buffer().iter().map(first_text).collect();
        assert!(texts[1].starts_with("t: "));
        assert_eq!(texts[2], "c: 2");
    }

    #[test]
    fn test_buffer_is_a_copy() {
        let (log, _) = quiet("copy");
        log.log(["original"]);
        let mut copy = log.buffer();
        copy.push(copy[0].clone());
        assert_eq!(log.buffer().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_writes_block_and_clears() {
        let (log, sink) = quiet("flush");
        log.info(["hello"]);
        log.group(["g"]);

        assert_eq!(log.flush().await.unwrap(), 2);
        assert!(log.is_empty());
        assert_eq!(log.group_depth(), 0);

        let out = sink.output();
        assert!(out.contains("=== Smart Logger Output ==="));
        assert!(out.contains("[INFO] hello"));
        assert!(out.contains("=== End Smart Logger Output ==="));
        assert_eq!(log.phase(), FlushPhase::Idle);
    }

    #[tokio::test]
    async fn test_flush_of_empty_buffer_is_silent() {
        let sink = MemorySink::new();
        let attachments = MemoryAttachments::new();
        let log = SmartLog::builder("empty")
            .options(SmartLogOptions::default().with_attach_to_report(true))
            .output(sink.clone())
            .attachments(attachments.clone())
            .build();

        assert_eq!(log.flush().await.unwrap(), 0);
        assert_eq!(log.flush().await.unwrap(), 0);
        assert!(sink.blocks().is_empty());
        assert!(attachments.attachments().is_empty());
    }

    #[tokio::test]
    async fn test_each_flush_produces_its_own_attachment() {
        let attachments = MemoryAttachments::new();
        let log = SmartLog::builder("two flushes")
            .options(SmartLogOptions::default().with_attach_to_report(true))
            .output(MemorySink::new())
            .attachments(attachments.clone())
            .build();

        log.info(["first"]);
        log.flush().await.unwrap();
        log.info(["second"]);
        log.flush().await.unwrap();

        let all = attachments.attachments();
        assert_eq!(all.len(), 2);
        assert!(all[0].text().contains("first"));
        assert!(!all[0].text().contains("second"));
        assert!(all[1].text().contains("second"));
        assert!(!all[1].text().contains("first"));
    }

    #[tokio::test]
    async fn test_attachment_sink_failure_propagates_and_keeps_buffer() {
        let console = MemorySink::new();
        let log = SmartLog::builder("rejected")
            .options(SmartLogOptions::default().with_attach_to_report(true))
            .output(console.clone())
            .attachments(RejectingSink)
            .build();
        log.error(["keep me"]);

        let err = log.flush().await.unwrap_err();
        assert!(matches!(err, SmartLogError::Sink(_)));
        assert_eq!(log.len(), 1);
        assert_eq!(log.phase(), FlushPhase::Idle);

        // Retrying must not print the same block twice
        assert!(log.flush().await.is_err());
        assert!(console.blocks().is_empty());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_external_console_mirroring() {
        let hub = ConsoleHub::new();
        let log = SmartLog::builder("mirror")
            .options(SmartLogOptions::default().with_external_console(true))
            .output(MemorySink::new())
            .external_console(Arc::new(hub.clone()))
            .build();

        log.info(["local"]);
        hub.emit(ConsoleMessage::text("warning", "from page"));
        hub.emit(ConsoleMessage::text("table", "odd type"));

        let external: Vec<_> = log.buffer().into_iter().filter(|e| e.is_external()).collect();
        assert_eq!(external.len(), 2);
        assert_eq!(external[0].level, LogLevel::Warn);
        assert_eq!(external[0].args, vec![Value::from("from page")]);
        assert_eq!(external[1].level, LogLevel::Log);
    }

    #[test]
    fn test_external_capture_disabled_by_default() {
        let hub = ConsoleHub::new();
        let log = SmartLog::builder("no mirror")
            .output(MemorySink::new())
            .external_console(Arc::new(hub.clone()))
            .build();

        hub.emit(ConsoleMessage::text("log", "ignored"));
        assert!(log.is_empty());
        assert_eq!(hub.listener_count(), 0);
    }

    struct Unprintable;

    impl Inspect for Unprintable {
        fn to_display(&self) -> Result<String, InspectError> {
            Err(InspectError::new("detached handle"))
        }

        fn inspect(&self) -> Result<Value, InspectError> {
            Err(InspectError::new("detached handle"))
        }
    }

    #[test]
    fn test_unprintable_external_arg_gets_placeholder() {
        let hub = ConsoleHub::new();
        let log = SmartLog::builder("placeholder")
            .options(SmartLogOptions::default().with_external_console(true))
            .output(MemorySink::new())
            .external_console(Arc::new(hub.clone()))
            .build();

        hub.emit(ConsoleMessage::new(
            "log",
            vec![Value::from("ok"), Value::opaque(Unprintable)],
        ));
        assert_eq!(
            log.buffer()[0].args,
            vec![Value::from("ok"), Value::from("[object]")]
        );
    }

    struct BrokenConsole;

    impl ExternalConsole for BrokenConsole {
        fn subscribe(&self, _listener: crate::console::ConsoleListener) -> SmartLogResult<ListenerId> {
            Err(SmartLogError::Subscription("page closed".into()))
        }

        fn unsubscribe(&self, _id: ListenerId) -> SmartLogResult<()> {
            Err(SmartLogError::Subscription("page closed".into()))
        }
    }

    #[test]
    fn test_subscription_failure_is_swallowed() {
        let log = SmartLog::builder("broken")
            .options(SmartLogOptions::default().with_external_console(true))
            .output(MemorySink::new())
            .external_console(Arc::new(BrokenConsole))
            .build();

        log.info(["still works"]);
        log.cleanup();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_cleanup_detaches_and_resets_state() {
        let hub = ConsoleHub::new();
        let log = SmartLog::builder("cleanup")
            .options(SmartLogOptions::default().with_external_console(true))
            .output(MemorySink::new())
            .external_console(Arc::new(hub.clone()))
            .build();
        assert_eq!(hub.listener_count(), 1);

        log.time("t");
        log.count("c");
        log.cleanup();

        assert_eq!(hub.listener_count(), 0);
        assert!(log.is_finished());
        assert!(!log.has_timer("t"));
        assert_eq!(log.counter("c"), None);
    }
}
