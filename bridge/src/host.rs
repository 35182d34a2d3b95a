//! Host functions the module imports.
//!
//! The module logs by passing `(offset, length)` of a UTF-8 string in its own
//! linear memory. The binding decodes the range and hands the text to a
//! [`LogSink`] chosen at instantiation time.

use std::sync::Arc;
use wasmtime::{Caller, Extern, Linker};

use crate::memory::{checked_range, decode_lossy};

/// Severity of a line logged by the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Sent through `console_log`.
    Info,
    /// Sent through `console_error`.
    Error,
}

/// Receives text the module logs.
pub trait LogSink: Send + Sync + 'static {
    fn log(&self, level: LogLevel, text: &str);
}

impl<F> LogSink for F
where
    F: Fn(LogLevel, &str) + Send + Sync + 'static,
{
    fn log(&self, level: LogLevel, text: &str) {
        self(level, text)
    }
}

/// Forwards module output to `tracing` under the `membridge::guest` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, text: &str) {
        match level {
            LogLevel::Info => tracing::info!(target: "membridge::guest", "{text}"),
            LogLevel::Error => tracing::error!(target: "membridge::guest", "{text}"),
        }
    }
}

/// Per-store state visible to host functions.
pub(crate) struct HostState {
    sink: Arc<dyn LogSink>,
}

impl HostState {
    pub(crate) fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

/// Registers `console_log` and `console_error` under `module`.
pub(crate) fn define_imports(linker: &mut Linker<HostState>, module: &str) -> wasmtime::Result<()> {
    linker.func_wrap(
        module,
        "console_log",
        |caller: Caller<'_, HostState>, offset: u32, len: u32| {
            forward(caller, LogLevel::Info, offset, len)
        },
    )?;
    linker.func_wrap(
        module,
        "console_error",
        |caller: Caller<'_, HostState>, offset: u32, len: u32| {
            forward(caller, LogLevel::Error, offset, len)
        },
    )?;
    Ok(())
}

// An out-of-range message traps the calling export.
fn forward(
    mut caller: Caller<'_, HostState>,
    level: LogLevel,
    offset: u32,
    len: u32,
) -> wasmtime::Result<()> {
    let memory = match caller.get_export("memory") {
        Some(Extern::Memory(memory)) => memory,
        _ => return Err(wasmtime::Error::msg("module exports no memory")),
    };

    let data = memory.data(&caller);
    let range = checked_range(data.len(), offset, len as usize)?;
    let text = decode_lossy(&data[range]);
    caller.data().sink.log(level, &text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_bridge, RecordingSink};

    #[test]
    fn closures_are_sinks() {
        let sink = RecordingSink::default();
        let closure = {
            let sink = sink.clone();
            move |level: LogLevel, text: &str| sink.log(level, text)
        };
        closure.log(LogLevel::Error, "boom");
        assert_eq!(sink.lines(), vec![(LogLevel::Error, "boom".to_string())]);
    }

    #[test]
    fn tracing_sink_accepts_both_levels() {
        TracingSink.log(LogLevel::Info, "info line");
        TracingSink.log(LogLevel::Error, "error line");
    }

    #[test]
    fn console_error_reaches_error_level() {
        let (mut bridge, sink) = fixture_bridge();
        bridge.invoke("fail").unwrap();

        let lines = sink.lines();
        assert_eq!(lines.last(), Some(&(LogLevel::Error, "guest failure".to_string())));
    }

    #[test]
    fn console_log_drops_leading_bom() {
        let (mut bridge, sink) = fixture_bridge();
        bridge.invoke("bom_log").unwrap();

        let lines = sink.lines();
        assert_eq!(lines.last(), Some(&(LogLevel::Info, "bom line".to_string())));
    }

    #[test]
    fn out_of_range_log_traps_the_caller() {
        let (mut bridge, sink) = fixture_bridge();
        let before = sink.lines().len();

        let err = bridge.invoke("bad_log").unwrap_err();
        assert!(matches!(err, crate::Error::Call { ref export, .. } if export == "bad_log"));
        assert_eq!(sink.lines().len(), before);
    }
}
