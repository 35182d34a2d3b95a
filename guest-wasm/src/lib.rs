//! Reference guest for the memory bridge.
//!
//! Exports `alloc`, `dealloc` and `init` for the host, plus `inspect`, which
//! reports on a buffer the host ingested. Logging goes through the host's
//! `console_log` / `console_error` imports.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod ffi;

use ffi::{Layout, Slice};

mod console {
    #[cfg(target_arch = "wasm32")]
    use crate::ffi::IntoFfi;

    #[cfg(target_arch = "wasm32")]
    #[link(wasm_import_module = "env")]
    extern "C" {
        fn console_log(ptr: *const u8, len: usize);
        fn console_error(ptr: *const u8, len: usize);
    }

    #[cfg(target_arch = "wasm32")]
    pub fn log(msg: &str) {
        let msg = msg.into_ffi().0;
        unsafe { console_log(msg.ptr, msg.len) }
    }

    #[cfg(target_arch = "wasm32")]
    pub fn error(msg: &str) {
        let msg = msg.into_ffi().0;
        unsafe { console_error(msg.ptr, msg.len) }
    }

    // Native builds (tests) print instead.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn log(msg: &str) {
        println!("{msg}");
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn error(msg: &str) {
        eprintln!("{msg}");
    }
}

/// Returns null for zero sizes and invalid alignments.
///
/// # Safety
/// The returned region must be released with `dealloc` using the same size
/// and alignment.
#[cfg_attr(target_arch = "wasm32", no_mangle)]
pub unsafe extern "C" fn alloc(size: usize, align: usize) -> *mut u8 {
    match (Layout { size, align }).to_native() {
        Some(layout) if layout.size() != 0 => unsafe { std::alloc::alloc(layout) },
        _ => std::ptr::null_mut(),
    }
}

/// # Safety
/// `ptr` must come from `alloc(size, align)` and not have been freed.
#[cfg_attr(target_arch = "wasm32", no_mangle)]
pub unsafe extern "C" fn dealloc(size: usize, align: usize, ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    if let Some(layout) = (Layout { size, align }).to_native() {
        unsafe { std::alloc::dealloc(ptr, layout) };
    }
}

#[cfg_attr(target_arch = "wasm32", no_mangle)]
pub extern "C" fn init() {
    std::panic::set_hook(Box::new(|info| {
        console::error(&info.to_string());
    }));
}

/// Logs the size and line count of `len` bytes at `ptr`.
///
/// # Safety
/// `ptr..ptr + len` must be readable.
#[cfg_attr(target_arch = "wasm32", no_mangle)]
pub unsafe extern "C" fn inspect(ptr: *const u8, len: usize) {
    let data = unsafe { Slice { ptr, len }.as_native() };
    for line in summarize(data) {
        console::log(&line);
    }
}

fn summarize(data: &[u8]) -> Vec<String> {
    let mut lines = vec![format!("received {} bytes!", data.len())];
    match std::str::from_utf8(data) {
        Ok(text) => lines.push(format!("{} lines of utf-8 text", text.lines().count())),
        Err(err) => lines.push(format!("binary data (utf-8 error at byte {})", err.valid_up_to())),
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::IntoFfi;

    #[test]
    fn summarizes_text() {
        assert_eq!(
            summarize(b"one\ntwo\nthree"),
            vec!["received 13 bytes!", "3 lines of utf-8 text"]
        );
    }

    #[test]
    fn summarizes_binary() {
        assert_eq!(
            summarize(&[b'o', b'k', 0xff]),
            vec!["received 3 bytes!", "binary data (utf-8 error at byte 2)"]
        );
    }

    #[test]
    fn alloc_rejects_zero_and_bad_alignment() {
        unsafe {
            assert!(alloc(0, 1).is_null());
            assert!(alloc(8, 3).is_null());
        }
    }

    #[test]
    fn alloc_round_trip() {
        let layout = std::alloc::Layout::from_size_align(32, 8).unwrap().into_ffi();
        unsafe {
            let ptr = alloc(layout.size, layout.align);
            assert!(!ptr.is_null());
            assert_eq!(ptr as usize % 8, 0);
            dealloc(layout.size, layout.align, ptr);
        }
    }

    #[test]
    fn inspect_accepts_empty_input() {
        unsafe { inspect(std::ptr::null(), 0) };
        let data = b"a\nb";
        unsafe { inspect(data.as_ptr(), data.len()) };
    }
}
