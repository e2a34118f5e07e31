//! Big-endian <-> native conversion
//!
//! Every multi-byte field on the wire is big-endian. Integers convert through
//! [`Endian`]; floats have dedicated helpers that swap the raw bytes of the
//! IEEE-754 representation rather than reinterpreting through an integer of a
//! different width.
//!
//! On big-endian hosts every conversion is the identity.

use byteorder::{BigEndian, ByteOrder};

/// Fixed-width integers that can be converted between host and wire order
pub trait Endian: Copy {
    /// Convert a host-order value to big-endian representation
    fn to_big(self) -> Self;
    /// Convert a big-endian representation to host order
    fn from_big(self) -> Self;
}

macro_rules! impl_endian {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Endian for $ty {
                #[inline]
                fn to_big(self) -> Self {
                    <$ty>::to_be(self)
                }

                #[inline]
                fn from_big(self) -> Self {
                    <$ty>::from_be(self)
                }
            }
        )*
    };
}

impl_endian!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Convert a host-order integer to big-endian
#[inline]
pub fn native_to_big<T: Endian>(value: T) -> T {
    value.to_big()
}

/// Convert a big-endian integer to host order
#[inline]
pub fn big_to_native<T: Endian>(value: T) -> T {
    value.from_big()
}

/// Convert a host-order `f32` to its big-endian representation
#[inline]
pub fn native_to_big_f32(value: f32) -> f32 {
    swap_f32_on_little(value)
}

/// Convert a big-endian `f32` representation to host order
#[inline]
pub fn big_to_native_f32(value: f32) -> f32 {
    swap_f32_on_little(value)
}

#[inline]
fn swap_f32_on_little(value: f32) -> f32 {
    if cfg!(target_endian = "big") {
        return value;
    }

    let bytes = value.to_ne_bytes();
    f32::from_ne_bytes([bytes[3], bytes[2], bytes[1], bytes[0]])
}

/// Read a big-endian `i32` from the first four bytes of `buf`
///
/// Panics if `buf` holds fewer than four bytes; callers check lengths first.
#[inline]
pub fn read_i32(buf: &[u8]) -> i32 {
    BigEndian::read_i32(buf)
}

/// Read a big-endian `u32` from the first four bytes of `buf`
#[inline]
pub fn read_u32(buf: &[u8]) -> u32 {
    BigEndian::read_u32(buf)
}

/// Read a big-endian `f32` from the first four bytes of `buf`
#[inline]
pub fn read_f32(buf: &[u8]) -> f32 {
    BigEndian::read_f32(buf)
}

/// Write `value` as big-endian into the first four bytes of `buf`
#[inline]
pub fn write_i32(buf: &mut [u8], value: i32) {
    BigEndian::write_i32(buf, value);
}

/// Write `value` as big-endian into the first four bytes of `buf`
#[inline]
pub fn write_u32(buf: &mut [u8], value: u32) {
    BigEndian::write_u32(buf, value);
}

/// Write `value` as big-endian into the first four bytes of `buf`
#[inline]
pub fn write_f32(buf: &mut [u8], value: f32) {
    BigEndian::write_f32(buf, value);
}
