//! Chrome Trace span profiler for engine and batch operations.
//!
//! Feature-gated with `--features profiling`.
//!
//! Usage:
//!   batch_compute::profiler::init("profile/trace.json");
//!   {
//!     let _g = batch_compute::profiler::span("upload");
//!     // build and wait on batches...
//!   }
//!   batch_compute::profiler::shutdown();
//!
//! The engine itself opens spans around device acquisition, library loads,
//! each call, each dispatch and each wait.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

#[cfg(feature = "profiling")]
mod enabled {
    use std::cell::RefCell;
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Mutex, OnceLock};
    use std::time::Instant;

    use super::*;

    /// Complete event (`ph:"X"`) or thread-name metadata event (`ph:"M"`).
    #[derive(Debug)]
    enum TraceEvent {
        Span {
            name: String,
            ts_us: u64,
            dur_us: u64,
            tid: u64,
            args: Vec<(String, Arg)>,
        },
        ThreadName {
            ts_us: u64,
            tid: u64,
            name: String,
        },
    }

    struct Recorder {
        start: Instant,
        out_path: PathBuf,
        recording: AtomicBool,
        events: Mutex<Vec<TraceEvent>>,
    }

    const PID: u32 = 1;

    static RECORDER: OnceLock<Recorder> = OnceLock::new();
    static NEXT_TID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
        static QUEUED_ARGS: RefCell<Vec<(String, Arg)>> = const { RefCell::new(Vec::new()) };
    }

    fn active() -> Option<&'static Recorder> {
        RECORDER.get().filter(|r| r.recording.load(Ordering::Acquire))
    }

    fn now_us(recorder: &Recorder) -> u64 {
        recorder.start.elapsed().as_micros() as u64
    }

    fn tid() -> u64 {
        TID.with(|t| *t)
    }

    /// Starts recording; events are written to `path` on [`shutdown`].
    pub fn init<P: AsRef<Path>>(path: P) {
        let _ = RECORDER.set(Recorder {
            start: Instant::now(),
            out_path: path.as_ref().to_path_buf(),
            recording: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
        });
    }

    /// Stops recording and writes the trace file.
    pub fn shutdown() {
        if let Some(recorder) = RECORDER.get() {
            recorder.recording.store(false, Ordering::Release);
            if let Err(e) = write_trace(recorder) {
                log::warn!("profiler: failed to write {}: {e}", recorder.out_path.display());
            }
        }
    }

    fn write_trace(recorder: &Recorder) -> std::io::Result<()> {
        let events = match recorder.events.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        if let Some(parent) = recorder.out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut w = BufWriter::new(File::create(&recorder.out_path)?);

        write!(w, "{{\"traceEvents\":[")?;
        for (i, event) in events.into_iter().enumerate() {
            if i > 0 {
                write!(w, ",")?;
            }
            match event {
                TraceEvent::Span { name, ts_us, dur_us, tid, args } => {
                    write!(w, "{{\"name\":")?;
                    write_json_string(&mut w, &name)?;
                    write!(
                        w,
                        ",\"cat\":\"gpu\",\"ph\":\"X\",\"ts\":{ts_us},\"dur\":{dur_us},\"pid\":{PID},\"tid\":{tid}"
                    )?;
                    if !args.is_empty() {
                        write!(w, ",\"args\":{{")?;
                        for (j, (key, value)) in args.iter().enumerate() {
                            if j > 0 {
                                write!(w, ",")?;
                            }
                            write_json_string(&mut w, key)?;
                            write!(w, ":")?;
                            write_arg(&mut w, value)?;
                        }
                        write!(w, "}}")?;
                    }
                    write!(w, "}}")?;
                }
                TraceEvent::ThreadName { ts_us, tid, name } => {
                    write!(
                        w,
                        "{{\"name\":\"thread_name\",\"ph\":\"M\",\"ts\":{ts_us},\"pid\":{PID},\"tid\":{tid},\"args\":{{\"name\":"
                    )?;
                    write_json_string(&mut w, &name)?;
                    write!(w, "}}}}")?;
                }
            }
        }
        write!(w, "]}}")?;
        w.flush()
    }

    fn write_arg<W: Write>(w: &mut W, value: &Arg) -> std::io::Result<()> {
        match value {
            Arg::Str(s) => write_json_string(w, s),
            Arg::U64(v) => write!(w, "{v}"),
            Arg::I64(v) => write!(w, "{v}"),
            Arg::F64(v) if v.is_finite() => write!(w, "{v}"),
            Arg::F64(v) => write_json_string(w, &v.to_string()),
            Arg::Bool(v) => write!(w, "{v}"),
        }
    }

    fn write_json_string<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
        write!(w, "\"")?;
        for ch in s.chars() {
            match ch {
                '"' => write!(w, "\\\"")?,
                '\\' => write!(w, "\\\\")?,
                '\n' => write!(w, "\\n")?,
                '\r' => write!(w, "\\r")?,
                '\t' => write!(w, "\\t")?,
                c if c.is_control() => write!(w, "\\u{:04x}", c as u32)?,
                c => write!(w, "{c}")?,
            }
        }
        write!(w, "\"")
    }

    fn record(recorder: &Recorder, event: TraceEvent) {
        if let Ok(mut events) = recorder.events.lock() {
            events.push(event);
        }
    }

    /// Names the calling thread in the trace viewer.
    pub fn thread_name(name: impl Into<String>) {
        if let Some(recorder) = active() {
            let event = TraceEvent::ThreadName { ts_us: now_us(recorder), tid: tid(), name: name.into() };
            record(recorder, event);
        }
    }

    /// Queues an argument for the next span opened on this thread.
    pub fn next_arg(key: impl Into<String>, value: Arg) {
        QUEUED_ARGS.with(|q| q.borrow_mut().push((key.into(), value)));
    }

    /// Opens a span that closes when the guard is dropped.
    pub fn span(name: impl Into<SpanName>) -> SpanGuard {
        let Some(recorder) = active() else {
            return SpanGuard { open: None };
        };
        let args = QUEUED_ARGS.with(|q| std::mem::take(&mut *q.borrow_mut()));
        SpanGuard {
            open: Some(OpenSpan {
                name: name.into().0.into_owned(),
                ts0: now_us(recorder),
                tid: tid(),
                args,
            }),
        }
    }

    /// Opens a span named by `format_args!`.
    pub fn span_fmt(args: fmt::Arguments<'_>) -> SpanGuard {
        span(args.to_string())
    }

    struct OpenSpan {
        name: String,
        ts0: u64,
        tid: u64,
        args: Vec<(String, Arg)>,
    }

    /// Records a complete event on drop.
    pub struct SpanGuard {
        open: Option<OpenSpan>,
    }

    impl SpanGuard {
        /// Attaches an argument to this span.
        #[inline]
        pub fn arg(mut self, key: impl Into<String>, value: Arg) -> Self {
            if let Some(open) = self.open.as_mut() {
                open.args.push((key.into(), value));
            }
            self
        }
    }

    impl Drop for SpanGuard {
        fn drop(&mut self) {
            let (Some(open), Some(recorder)) = (self.open.take(), active()) else {
                return;
            };
            let dur_us = now_us(recorder).saturating_sub(open.ts0);
            record(
                recorder,
                TraceEvent::Span { name: open.name, ts_us: open.ts0, dur_us, tid: open.tid, args: open.args },
            );
        }
    }
}

#[cfg(not(feature = "profiling"))]
mod disabled {
    use super::*;

    /// Starts recording (no-op when profiling is disabled).
    #[inline]
    pub fn init<P: AsRef<Path>>(_path: P) {}

    /// Stops recording (no-op).
    #[inline]
    pub fn shutdown() {}

    /// Names the calling thread (no-op).
    #[inline]
    pub fn thread_name(_name: impl Into<String>) {}

    /// Queues an argument for the next span (no-op).
    #[inline]
    pub fn next_arg(_key: impl Into<String>, _value: Arg) {}

    /// Opens a span (no-op).
    #[inline]
    pub fn span(_name: impl Into<SpanName>) -> SpanGuard {
        SpanGuard
    }

    /// Opens a span named by `format_args!` (no-op).
    #[inline]
    pub fn span_fmt(_args: fmt::Arguments<'_>) -> SpanGuard {
        SpanGuard
    }

    /// No-op span guard.
    pub struct SpanGuard;

    impl SpanGuard {
        /// Attaches an argument to this span (no-op).
        #[inline]
        pub fn arg(self, _key: impl Into<String>, _value: Arg) -> Self {
            self
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API surface (stable regardless of feature flag)
// ─────────────────────────────────────────────────────────────────────────────

/// A span name; accepts `&'static str`, `String`, or `Cow<'static, str>`.
pub struct SpanName(pub Cow<'static, str>);

impl From<&'static str> for SpanName {
    fn from(s: &'static str) -> Self {
        SpanName(Cow::Borrowed(s))
    }
}

impl From<String> for SpanName {
    fn from(s: String) -> Self {
        SpanName(Cow::Owned(s))
    }
}

impl From<Cow<'static, str>> for SpanName {
    fn from(s: Cow<'static, str>) -> Self {
        SpanName(s)
    }
}

/// Argument value attached to a span, shown under `args` in the viewer.
#[derive(Debug, Clone)]
pub enum Arg {
    /// UTF-8 string value.
    Str(String),

    /// Unsigned 64-bit integer value.
    U64(u64),

    /// Signed 64-bit integer value.
    I64(i64),

    /// 64-bit floating-point value.
    F64(f64),

    /// Boolean value.
    Bool(bool),
}

#[cfg(feature = "profiling")]
pub use enabled::SpanGuard;

#[cfg(not(feature = "profiling"))]
pub use disabled::SpanGuard;

#[cfg(feature = "profiling")]
pub use enabled::{init, next_arg, shutdown, span, span_fmt, thread_name};

#[cfg(not(feature = "profiling"))]
pub use disabled::{init, next_arg, shutdown, span, span_fmt, thread_name};
