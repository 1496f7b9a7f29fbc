//! Log forwarding from the execution context to the observer.

use super::sanitize;
use crate::observer::PipelineObserver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as forwarding until dropped.
struct ForwardingGuard;

impl ForwardingGuard {
    /// Returns `None` if this thread is already forwarding.
    fn enter() -> Option<Self> {
        FORWARDING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(Self)
            }
        })
    }
}

impl Drop for ForwardingGuard {
    fn drop(&mut self) {
        FORWARDING.with(|flag| flag.set(false));
    }
}

/// One sanitized line of output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Line text, without trailing newline or control sequences.
    pub text: String,
}

impl LogLine {
    /// Creates a log line.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Where text goes when it cannot be forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFallback {
    /// The process's real stderr.
    #[default]
    Stderr,
    /// Nowhere.
    Discard,
}

impl LogFallback {
    fn writer(self) -> Box<dyn Write + Send> {
        match self {
            Self::Stderr => Box::new(io::stderr()),
            Self::Discard => Box::new(io::sink()),
        }
    }
}

/// Forwarding counters.
#[derive(Debug, Default)]
pub struct LogSinkMetrics {
    forwarded: AtomicU64,
    reentrant: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl LogSinkMetrics {
    /// Lines delivered to the observer.
    #[must_use]
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Chunks diverted to the fallback because forwarding re-entered.
    #[must_use]
    pub fn reentrant(&self) -> u64 {
        self.reentrant.load(Ordering::Relaxed)
    }

    /// Chunks diverted to the fallback because the observer panicked.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Chunks dropped because the sink was closed.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

struct Inner {
    observer: Arc<dyn PipelineObserver>,
    fallback: Mutex<Box<dyn Write + Send>>,
    metrics: LogSinkMetrics,
    closed: AtomicBool,
}

/// Sanitizes text produced during execution and forwards it line by line.
///
/// Stage executors receive a `LogSink` explicitly instead of having
/// process-wide stdout redirected. Forwarding is guarded per thread: output
/// produced while a line is being forwarded (for instance by an observer
/// that itself logs through a [`super::LogSinkLayer`]) goes to the fallback
/// writer instead of recursing. Forwarding failures never reach the caller.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Inner>,
}

impl LogSink {
    /// Creates a sink forwarding to `observer`.
    #[must_use]
    pub fn new(observer: Arc<dyn PipelineObserver>, fallback: LogFallback) -> Self {
        Self::with_fallback_writer(observer, fallback.writer())
    }

    /// Creates a sink with a custom fallback destination.
    #[must_use]
    pub fn with_fallback_writer(
        observer: Arc<dyn PipelineObserver>,
        fallback: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                observer,
                fallback: Mutex::new(fallback),
                metrics: LogSinkMetrics::default(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Forwards `text`, one observer notification per line.
    ///
    /// Lines that are empty after sanitizing are dropped, as is everything
    /// written after [`close`](Self::close).
    pub fn line(&self, text: &str) {
        if self.is_closed() {
            self.inner.metrics.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Some(_guard) = ForwardingGuard::enter() else {
            self.inner.metrics.reentrant.fetch_add(1, Ordering::Relaxed);
            self.write_fallback(text);
            return;
        };

        let clean = sanitize(text);
        for line in clean.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let observer = &self.inner.observer;
            let delivered = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                observer.on_log(&LogLine::new(line));
            }));
            if delivered.is_ok() {
                self.inner.metrics.forwarded.fetch_add(1, Ordering::Relaxed);
            } else {
                self.inner.metrics.failed.fetch_add(1, Ordering::Relaxed);
                self.write_fallback(line);
            }
        }
    }

    /// Stops forwarding. Every clone of this sink is affected.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Returns a line-buffered writer feeding this sink.
    #[must_use]
    pub fn writer(&self) -> LogWriter {
        LogWriter {
            sink: self.clone(),
            buffer: Vec::new(),
        }
    }

    /// Returns the forwarding counters.
    #[must_use]
    pub fn metrics(&self) -> &LogSinkMetrics {
        &self.inner.metrics
    }

    fn write_fallback(&self, text: &str) {
        let mut fallback = self.inner.fallback.lock();
        let _ = fallback.write_all(text.as_bytes());
        if !text.ends_with('\n') {
            let _ = fallback.write_all(b"\n");
        }
        let _ = fallback.flush();
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("metrics", &self.inner.metrics)
            .finish_non_exhaustive()
    }
}

/// [`Write`] adapter that forwards complete lines to a [`LogSink`].
///
/// Partial lines are held until a newline arrives, `flush` is called, or
/// the writer is dropped.
pub struct LogWriter {
    sink: LogSink,
    buffer: Vec<u8>,
}

impl LogWriter {
    fn forward_complete_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.sink.line(&String::from_utf8_lossy(&line));
        }
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.forward_complete_lines();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.sink.line(&String::from_utf8_lossy(&rest));
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RunResult, StageProgress};
    use crate::gate::HumanPrompt;
    use crate::observer::CollectingObserver;
    use std::sync::OnceLock;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Observer whose log callback writes back into the sink that feeds it.
    #[derive(Default)]
    struct EchoingObserver {
        sink: OnceLock<LogSink>,
        seen: Mutex<Vec<String>>,
    }

    impl PipelineObserver for EchoingObserver {
        fn on_log(&self, line: &crate::logging::LogLine) {
            self.seen.lock().push(line.text.clone());
            if let Some(sink) = self.sink.get() {
                sink.line(&format!("echo: {}", line.text));
            }
        }
        fn on_prompt(&self, _prompt: &HumanPrompt) {}
        fn on_progress(&self, _progress: StageProgress) {}
        fn on_finished(&self, _result: &RunResult) {}
        fn on_error(&self, _message: &str) {}
    }

    struct PanickingObserver;

    impl PipelineObserver for PanickingObserver {
        fn on_log(&self, _line: &crate::logging::LogLine) {
            panic!("observer exploded");
        }
        fn on_prompt(&self, _prompt: &HumanPrompt) {}
        fn on_progress(&self, _progress: StageProgress) {}
        fn on_finished(&self, _result: &RunResult) {}
        fn on_error(&self, _message: &str) {}
    }

    #[test]
    fn test_line_sanitizes_and_splits() {
        let observer = Arc::new(CollectingObserver::new());
        let sink = LogSink::new(observer.clone(), LogFallback::Discard);

        sink.line("\x1b[32mresearch\x1b[0m started\nsecond line\r\n\n");

        assert_eq!(observer.logs(), vec!["research started", "second line"]);
        assert_eq!(sink.metrics().forwarded(), 2);
    }

    #[test]
    fn test_empty_after_sanitizing_is_dropped() {
        let observer = Arc::new(CollectingObserver::new());
        let sink = LogSink::new(observer.clone(), LogFallback::Discard);

        sink.line("\x1b[0m");
        assert!(observer.is_empty());
    }

    #[test]
    fn test_writer_buffers_partial_lines() {
        let observer = Arc::new(CollectingObserver::new());
        let sink = LogSink::new(observer.clone(), LogFallback::Discard);

        let mut writer = sink.writer();
        write!(writer, "Generating image ").unwrap();
        assert!(observer.is_empty());
        writeln!(writer, "1 of 5").unwrap();
        write!(writer, "tail without newline").unwrap();
        drop(writer);

        assert_eq!(observer.logs(), vec!["Generating image 1 of 5", "tail without newline"]);
    }

    #[test]
    fn test_reentrant_forwarding_goes_to_fallback() {
        let observer = Arc::new(EchoingObserver::default());
        let fallback = SharedBuffer::default();
        let sink = LogSink::with_fallback_writer(observer.clone(), Box::new(fallback.clone()));
        let _ = observer.sink.set(sink.clone());

        sink.line("hello");

        assert_eq!(*observer.seen.lock(), vec!["hello".to_string()]);
        assert_eq!(fallback.contents(), "echo: hello\n");
        assert_eq!(sink.metrics().reentrant(), 1);

        // The guard is released afterwards.
        sink.line("again");
        assert_eq!(observer.seen.lock().len(), 2);
    }

    #[test]
    fn test_observer_panic_degrades_to_fallback() {
        let fallback = SharedBuffer::default();
        let sink = LogSink::with_fallback_writer(Arc::new(PanickingObserver), Box::new(fallback.clone()));

        sink.line("still recorded");

        assert_eq!(fallback.contents(), "still recorded\n");
        assert_eq!(sink.metrics().failed(), 1);
    }

    #[test]
    fn test_closed_sink_discards_lines() {
        let observer = Arc::new(CollectingObserver::new());
        let sink = LogSink::new(observer.clone(), LogFallback::Discard);
        let stage_copy = sink.clone();

        sink.line("before");
        sink.close();
        stage_copy.line("after");

        assert!(stage_copy.is_closed());
        assert_eq!(observer.logs(), vec!["before"]);
        assert_eq!(sink.metrics().discarded(), 1);
    }
}
