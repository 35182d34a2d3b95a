//! Fixture module and helpers shared by the unit tests.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, Stream};

use crate::host::{LogLevel, LogSink};
use crate::{Bridge, BridgeConfig};

/// Where the fixture stores the bytes `hi`.
pub(crate) const HI_OFFSET: u32 = 64;

/// Guest with a stack-discipline bump allocator starting at 1024: freeing the
/// most recent allocation makes its space available again.
pub(crate) const FIXTURE: &str = r#"
(module
  (import "env" "console_log" (func $console_log (param i32 i32)))
  (import "env" "console_error" (func $console_error (param i32 i32)))
  (memory (export "memory") 4)
  (global $top (mut i32) (i32.const 1024))
  (global $inits (mut i32) (i32.const 0))
  (data (i32.const 16) "init done")
  (data (i32.const 32) "guest failure")
  (data (i32.const 64) "hi")
  (data (i32.const 80) "\ef\bb\bfbom line")

  (func (export "alloc") (param $size i32) (param $align i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    (local.set $ptr
      (i32.and
        (i32.add (global.get $top) (i32.sub (local.get $align) (i32.const 1)))
        (i32.sub (i32.const 0) (local.get $align))))
    (local.set $end (i32.add (local.get $ptr) (local.get $size)))
    (if (i32.gt_u (local.get $end) (i32.shl (memory.size) (i32.const 16)))
      (then (return (i32.const 0))))
    (global.set $top (local.get $end))
    (local.get $ptr))

  (func (export "dealloc") (param $size i32) (param $align i32) (param $ptr i32)
    (if (i32.eq (i32.add (local.get $ptr) (local.get $size)) (global.get $top))
      (then (global.set $top (local.get $ptr)))))

  (func (export "init")
    (global.set $inits (i32.add (global.get $inits) (i32.const 1)))
    (call $console_log (i32.const 16) (i32.const 9)))

  (func (export "init_count") (result i32)
    (global.get $inits))

  (func (export "fail")
    (call $console_error (i32.const 32) (i32.const 13)))

  (func (export "bom_log")
    (call $console_log (i32.const 80) (i32.const 11)))

  (func (export "bad_log")
    (call $console_log (i32.const -16) (i32.const 64)))

  (func (export "grow") (param $pages i32) (result i32)
    (memory.grow (local.get $pages)))

  (func (export "trap")
    unreachable)

  (func (export "sum") (param $ptr i32) (param $len i32) (result i32)
    (local $acc i32)
    (block $done
      (loop $next
        (br_if $done (i32.eqz (local.get $len)))
        (local.set $acc (i32.add (local.get $acc) (i32.load8_u (local.get $ptr))))
        (local.set $ptr (i32.add (local.get $ptr) (i32.const 1)))
        (local.set $len (i32.sub (local.get $len) (i32.const 1)))
        (br $next)))
    (local.get $acc))
)
"#;

pub(crate) const NO_ALLOC: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "dealloc") (param i32 i32 i32))
  (func (export "init"))
)
"#;

pub(crate) const TRAPPING_INIT: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "alloc") (param i32 i32) (result i32) (i32.const 0))
  (func (export "dealloc") (param i32 i32 i32))
  (func (export "init") unreachable)
)
"#;

/// Guest whose allocator hands out space near the end of its single page
/// without checking the request, and counts `dealloc` calls.
pub(crate) const OVERRUNNING_ALLOC: &str = r#"
(module
  (memory (export "memory") 1)
  (global $deallocs (mut i32) (i32.const 0))
  (func (export "alloc") (param i32 i32) (result i32) (i32.const 65000))
  (func (export "dealloc") (param i32 i32 i32)
    (global.set $deallocs (i32.add (global.get $deallocs) (i32.const 1))))
  (func (export "init"))
  (func (export "dealloc_count") (result i32) (global.get $deallocs))
)
"#;

/// Sink that keeps every line it receives.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSink {
    lines: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl RecordingSink {
    pub(crate) fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().unwrap().clone()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: LogLevel, text: &str) {
        self.lines.lock().unwrap().push((level, text.to_string()));
    }
}

pub(crate) fn fixture_bridge() -> (Bridge, RecordingSink) {
    let sink = RecordingSink::default();
    let bridge = Bridge::instantiate(
        FIXTURE.as_bytes(),
        Arc::new(sink.clone()),
        &BridgeConfig::default(),
    )
    .unwrap();
    (bridge, sink)
}

/// A source emitting `parts` in order.
pub(crate) fn chunks(parts: &[&str]) -> impl Stream<Item = io::Result<Bytes>> + Unpin {
    let parts: Vec<io::Result<Bytes>> = parts
        .iter()
        .map(|part| Ok(Bytes::copy_from_slice(part.as_bytes())))
        .collect();
    stream::iter(parts)
}

/// Wraps a source and counts how many times it is dropped.
pub(crate) struct Tracked<S> {
    inner: S,
    released: Arc<AtomicUsize>,
}

impl<S> Tracked<S> {
    pub(crate) fn new(inner: S) -> (Self, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                released: Arc::clone(&released),
            },
            released,
        )
    }
}

impl<S: Stream + Unpin> Stream for Tracked<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl<S> Drop for Tracked<S> {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
