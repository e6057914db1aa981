//! Element values stored in the vector.

use core::fmt::Debug;

/// A fixed-width value that can be stored in a transactional vector.
///
/// Every implementation reserves one bit pattern, [`UNSET`], that the vector
/// uses internally to mean "this slot holds no value" — a position above the
/// current size, or one vacated by a pop. `UNSET` must never be submitted as
/// a user value; a transaction that would return it through an internal
/// read aborts instead.
///
/// Values travel through the shared structure as `u64` bits, so an element
/// type must round-trip losslessly through [`to_bits`] / [`from_bits`].
///
/// The provided implementations cover the unsigned integer types, each using
/// its maximum value as the sentinel:
///
/// ```
/// use txvec::Element;
///
/// assert_eq!(u32::UNSET, u32::MAX);
/// assert!(u64::MAX.is_unset());
/// assert!(!7_u32.is_unset());
/// ```
///
/// [`UNSET`]: Element::UNSET
/// [`to_bits`]: Element::to_bits
/// [`from_bits`]: Element::from_bits
pub trait Element: Copy + Eq + Debug + Send + Sync + 'static {
  /// The reserved bit pattern meaning "no value".
  const UNSET: Self;

  /// Converts the value to its raw bit transport.
  fn to_bits(self) -> u64;

  /// Recovers a value from its raw bit transport.
  ///
  /// Only bit patterns previously produced by [`to_bits`] are passed in by
  /// the vector.
  ///
  /// [`to_bits`]: Element::to_bits
  fn from_bits(bits: u64) -> Self;

  /// Returns `true` if this value is the reserved sentinel.
  #[inline]
  fn is_unset(self) -> bool {
    self == Self::UNSET
  }
}

macro_rules! impl_element {
  ($($name:ty),+ $(,)?) => {
    $(
      impl Element for $name {
        const UNSET: Self = <$name>::MAX;

        #[inline]
        fn to_bits(self) -> u64 {
          self as u64
        }

        #[inline]
        fn from_bits(bits: u64) -> Self {
          bits as $name
        }
      }
    )+
  };
}

impl_element!(u8, u16, u32, u64, usize);
