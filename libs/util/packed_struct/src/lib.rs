// Overlay fixed-layout binary structs onto byte slices without copying.
//
// IMG section headers and FAT entries are all fixed-size, little-endian,
// tightly packed records. `packed_struct!` declares a `#[repr(packed)]`
// struct plus typed accessor methods (so callers never touch a raw
// unaligned field reference) and two overlay constructors: `overlay_prefix`
// reads one instance from the front of a slice, `overlay_slice` reads a
// contiguous array of them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayError {
    pub wanted: usize,
    pub have: usize,
    pub what: &'static str,
}

impl fmt::Display for OverlayError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "buffer too short to overlay {}: wanted at least {} bytes, have {}",
            self.what, self.wanted, self.have
        )
    }
}

impl std::error::Error for OverlayError {}

pub type Result<T> = std::result::Result<T, OverlayError>;

#[macro_export]
macro_rules! _make_packed_struct_accessor {
    ($field:ident, $field_name:ident, $field_ty:ty, bool) => {
        pub fn $field_name(&self) -> bool {
            self.$field != 0
        }
    };
    ($field:ident, $field_name:ident, $field_ty:ty, $output_ty:ty) => {
        pub fn $field_name(&self) -> $output_ty {
            self.$field as $output_ty
        }
    };
    ($field:ident, $field_name:ident, $field_ty:ty, ) => {
        pub fn $field_name(&self) -> $field_ty {
            self.$field
        }
    };
}

/// Declares a `#[repr(C, packed)]` struct with one accessor per field and
/// two overlay constructors. Field order is the on-disk byte order.
#[macro_export]
macro_rules! packed_struct {
    ($name:ident {
        $( $field:ident => $field_name:ident : $field_ty:ty $(as $field_name_ty:ty),* ),+ $(,)?
    }) => {
        #[repr(C, packed)]
        #[derive(Clone, Copy)]
        pub struct $name {
            $( $field: $field_ty ),+
        }

        impl $name {
            $(
                $crate::_make_packed_struct_accessor!($field, $field_name, $field_ty, $($field_name_ty),*);
            )+

            /// Overlay a single instance at the front of `buf`.
            pub fn overlay_prefix(buf: &[u8]) -> $crate::Result<&$name> {
                let wanted = std::mem::size_of::<$name>();
                if buf.len() < wanted {
                    return Err($crate::OverlayError { wanted, have: buf.len(), what: stringify!($name) });
                }
                let ptr: *const $name = buf.as_ptr() as *const _;
                Ok(unsafe { &*ptr })
            }

            /// Overlay `buf` as a contiguous array of instances. Any
            /// trailing bytes that do not fill a whole instance are
            /// ignored.
            pub fn overlay_slice(buf: &[u8]) -> $crate::Result<&[$name]> {
                let elem = std::mem::size_of::<$name>();
                if buf.len() < elem {
                    return Err($crate::OverlayError { wanted: elem, have: buf.len(), what: stringify!($name) });
                }
                let count = buf.len() / elem;
                let ptr: *const $name = buf.as_ptr() as *const _;
                Ok(unsafe { std::slice::from_raw_parts(ptr, count) })
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    $(.field(stringify!($field_name), &self.$field_name()))*
                    .finish()
            }
        }
    };
}
