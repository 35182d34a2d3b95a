//! `#[repr(C)]` shapes for values that cross the host boundary.
//!
//! Exports and imports take these flattened into `(ptr, len)` or
//! `(size, align)` scalar pairs, which is what the host passes.

/// Borrowed slice as a pointer and element count.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Slice<T> {
    pub ptr: *const T,
    pub len: usize,
}

impl<T> Slice<T> {
    /// # Safety
    /// `ptr..ptr + len` must be readable for `'a` and hold initialized `T`s.
    pub unsafe fn as_native<'a>(self) -> &'a [T] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

/// UTF-8 text as a byte slice.
#[repr(transparent)]
#[derive(Debug, Clone, Copy)]
pub struct Str(pub Slice<u8>);

impl Str {
    /// `None` when the bytes are not UTF-8.
    ///
    /// # Safety
    /// Same as [`Slice::as_native`].
    pub unsafe fn as_native<'a>(self) -> Option<&'a str> {
        std::str::from_utf8(unsafe { self.0.as_native() }).ok()
    }
}

/// Size and alignment of an allocation request.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: usize,
    pub align: usize,
}

impl Layout {
    /// `None` for alignments that are not a power of two or sizes that
    /// overflow once rounded up.
    pub fn to_native(self) -> Option<std::alloc::Layout> {
        std::alloc::Layout::from_size_align(self.size, self.align).ok()
    }
}

/// Conversion into the boundary shape.
pub trait IntoFfi {
    type Ffi;

    fn into_ffi(self) -> Self::Ffi;
}

impl<T> IntoFfi for &[T] {
    type Ffi = Slice<T>;

    fn into_ffi(self) -> Slice<T> {
        Slice {
            ptr: self.as_ptr(),
            len: self.len(),
        }
    }
}

impl IntoFfi for &str {
    type Ffi = Str;

    fn into_ffi(self) -> Str {
        Str(self.as_bytes().into_ffi())
    }
}

impl IntoFfi for std::alloc::Layout {
    type Ffi = Layout;

    fn into_ffi(self) -> Layout {
        Layout {
            size: self.size(),
            align: self.align(),
        }
    }
}
