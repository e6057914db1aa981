//! Abort causes surfaced through a terminal descriptor.

use thiserror::Error;

/// Why a transaction reached the aborted state.
///
/// Every abort cause leaves the vector untouched: pages installed by an
/// aborted descriptor are skipped by all readers, so no partial effect is
/// ever observable. The reason is recorded best-effort by whichever thread
/// wins the status transition; [`Descriptor::abort_reason`] may return
/// [`None`] for a brief moment after the status itself becomes visible.
///
/// [`Descriptor::abort_reason`]: crate::Descriptor::abort_reason
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AbortReason {
  /// A `read` or `write` targeted an index at or above the vector size at
  /// commit time.
  #[error("index out of bounds at commit time")]
  OutOfBounds,
  /// A `pop_back` observed an empty vector.
  #[error("pop from an empty vector")]
  PopOnEmpty,
  /// A `push_back` would overflow the size counter.
  #[error("vector size overflow")]
  SizeOverflow,
  /// A `read` would have returned the reserved unset value written earlier
  /// in the same transaction.
  #[error("read of an unset value written within the transaction")]
  UnsetForwarded,
  /// A helper gave up waiting for this transaction to publish its plan and
  /// aborted it to preserve lock-freedom.
  #[error("aborted by a helper after a prolonged stall")]
  HelpTimeout,
}

impl AbortReason {
  /// Encoding used by the descriptor's atomic reason cell. Zero is reserved
  /// for "not recorded".
  #[inline]
  pub(crate) const fn into_raw(self) -> u32 {
    match self {
      Self::OutOfBounds => 1,
      Self::PopOnEmpty => 2,
      Self::SizeOverflow => 3,
      Self::UnsetForwarded => 4,
      Self::HelpTimeout => 5,
    }
  }

  #[inline]
  pub(crate) const fn from_raw(raw: u32) -> Option<Self> {
    match raw {
      1 => Some(Self::OutOfBounds),
      2 => Some(Self::PopOnEmpty),
      3 => Some(Self::SizeOverflow),
      4 => Some(Self::UnsetForwarded),
      5 => Some(Self::HelpTimeout),
      _ => None,
    }
  }
}
