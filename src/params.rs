//! Compile-time configuration.

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;

// -----------------------------------------------------------------------------
// Configurable Params
// -----------------------------------------------------------------------------

/// Configuration parameters for a [`TransactionalVector`].
///
/// All knobs are compile-time constants so the hot paths specialize per
/// configuration. The defaults match [`DefaultParams`]; override individual
/// constants by implementing `Params` on a marker type:
///
/// ```
/// use txvec::{Params, TransactionalVector};
///
/// struct SmallSegments;
///
/// impl Params for SmallSegments {
///   const SEG_SIZE: usize = 4;
///   const FIRST_BUCKET: usize = 2;
/// }
///
/// let vector: TransactionalVector<u64, SmallSegments> = TransactionalVector::new(8);
/// ```
///
/// The install order ([`HIGH_TO_LOW`]) must be identical for every
/// transaction touching one vector; since it is a compile-time property of
/// the vector type, this holds by construction.
///
/// [`TransactionalVector`]: crate::TransactionalVector
/// [`HIGH_TO_LOW`]: Params::HIGH_TO_LOW
pub trait Params {
  /// Slots per segment. Must be a power of two no larger than 64 (slot
  /// bitmasks live in a `u64`).
  ///
  /// The default keeps one page worth of old/new `u64` pairs inside a
  /// single cache line.
  const SEG_SIZE: usize = DefaultParams::SEG_SIZE;

  /// Segment capacity of the first storage bucket. Must be a power of two;
  /// bucket `k` holds `FIRST_BUCKET << k` segments.
  const FIRST_BUCKET: usize = DefaultParams::FIRST_BUCKET;

  /// Install pages from the highest touched segment to the lowest instead
  /// of low to high. Either direction is correct on its own; what matters
  /// is that all transactions share one.
  const HIGH_TO_LOW: bool = DefaultParams::HIGH_TO_LOW;

  /// Enable the read-only fast path for descriptors constructed with
  /// [`Descriptor::new_conflict_free`].
  ///
  /// [`Descriptor::new_conflict_free`]: crate::Descriptor::new_conflict_free
  const CONFLICT_FREE_READS: bool = DefaultParams::CONFLICT_FREE_READS;

  /// Allow helpers to abort a transaction that has not published its plan
  /// after [`HELP_SPIN`] polls. Disabling this trades lock-freedom for
  /// strictly fewer aborts.
  ///
  /// [`HELP_SPIN`]: Params::HELP_SPIN
  const HELPING: bool = DefaultParams::HELPING;

  /// Number of polls a helper performs before declaring the owner stalled.
  const HELP_SPIN: usize = DefaultParams::HELP_SPIN;
}

// -----------------------------------------------------------------------------
// Configurable Params - Extensions
// -----------------------------------------------------------------------------

/// Derived parameters computed from [`Params`].
///
/// Automatically implemented for every `Params` type; exposed so advanced
/// callers can inspect the resolved configuration.
pub trait ParamsExt: Params + Sealed {
  /// `log2(SEG_SIZE)`.
  const SEG_SHIFT: u32 = Self::SEG_SIZE.trailing_zeros();

  /// `SEG_SIZE - 1`.
  const SEG_MASK: usize = Self::SEG_SIZE.wrapping_sub(1);

  /// `log2(FIRST_BUCKET)`.
  const FIRST_SHIFT: u32 = Self::FIRST_BUCKET.trailing_zeros();

  /// Number of bucket pointers needed to address every representable
  /// segment index.
  const BUCKET_COUNT: usize = (usize::BITS - Self::FIRST_SHIFT) as usize;

  /// Panics when the configuration is unusable. Called once per vector
  /// construction.
  fn validate() {
    assert!(
      Self::SEG_SIZE.is_power_of_two(),
      "invalid params: `SEG_SIZE` must be a power of two",
    );
    assert!(
      Self::SEG_SIZE <= 64,
      "invalid params: `SEG_SIZE` must fit a 64-bit slot mask",
    );
    assert!(
      Self::FIRST_BUCKET.is_power_of_two(),
      "invalid params: `FIRST_BUCKET` must be a power of two",
    );
    assert!(Self::HELP_SPIN > 0, "invalid params: `HELP_SPIN` must be non-zero");
  }

  /// Splits an element index into `(segment, slot)`.
  #[inline]
  fn split(index: usize) -> (usize, usize) {
    (index >> Self::SEG_SHIFT, index & Self::SEG_MASK)
  }

  /// First element index of a segment.
  #[inline]
  fn segment_start(segment: usize) -> usize {
    segment << Self::SEG_SHIFT
  }

  /// Maps a segment index to `(bucket, offset)` in the two-level store.
  ///
  /// Shifting the segment index up by `FIRST_BUCKET` makes the bucket
  /// number fall out of the highest set bit; clearing that bit leaves the
  /// offset.
  #[inline]
  fn locate(segment: usize) -> (usize, usize) {
    let pos: usize = segment + Self::FIRST_BUCKET;
    let hi: u32 = usize::BITS - 1 - pos.leading_zeros();

    ((hi - Self::FIRST_SHIFT) as usize, pos ^ (1 << hi))
  }

  /// Segment capacity of a bucket.
  #[inline]
  fn bucket_len(bucket: usize) -> usize {
    Self::FIRST_BUCKET << bucket
  }
}

// -----------------------------------------------------------------------------
// Default Params
// -----------------------------------------------------------------------------

/// The default configuration: 8-slot segments, helping and conflict-free
/// reads enabled, high-to-low install order.
#[derive(Clone, Copy)]
#[non_exhaustive]
pub struct DefaultParams;

impl Params for DefaultParams {
  const SEG_SIZE: usize = 8;
  const FIRST_BUCKET: usize = 8;
  const HIGH_TO_LOW: bool = true;
  const CONFLICT_FREE_READS: bool = true;
  const HELPING: bool = true;
  const HELP_SPIN: usize = 1 << 10;
}

impl Debug for DefaultParams {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("DefaultParams")
      .field("SEG_SIZE", &Self::SEG_SIZE)
      .field("FIRST_BUCKET", &Self::FIRST_BUCKET)
      .field("HIGH_TO_LOW", &Self::HIGH_TO_LOW)
      .field("CONFLICT_FREE_READS", &Self::CONFLICT_FREE_READS)
      .field("HELPING", &Self::HELPING)
      .field("HELP_SPIN", &Self::HELP_SPIN)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Auto-implement Derive
// -----------------------------------------------------------------------------

mod private {
  pub trait Sealed {}
}

use private::Sealed;

impl<P> Sealed for P where P: Params + ?Sized {}
impl<P> ParamsExt for P where P: Params + ?Sized {}
