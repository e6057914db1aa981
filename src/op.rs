//! Operations bundled into a transaction and their results.

use crate::element::Element;

/// One operation inside a transaction.
///
/// A transaction is an ordered list of operations that commits or aborts as
/// a unit. Index-based operations ([`Read`], [`Write`]) address absolute
/// positions and are bounds-checked at commit time; the stack-style
/// operations ([`PushBack`], [`PopBack`]) address positions relative to the
/// size the transaction observes, and are never bounds-checked.
///
/// # Examples
///
/// ```
/// use txvec::{Descriptor, Op, TransactionalVector};
///
/// let vector: TransactionalVector<u64> = TransactionalVector::new(16);
/// let desc: Descriptor<u64> = Descriptor::new([
///   Op::PushBack { value: 7 },
///   Op::Size,
/// ]);
///
/// vector.execute(&desc);
/// ```
///
/// [`Read`]: Op::Read
/// [`Write`]: Op::Write
/// [`PushBack`]: Op::PushBack
/// [`PopBack`]: Op::PopBack
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op<V> {
  /// Read the value at an absolute index.
  Read {
    /// Position to read from.
    index: usize,
  },
  /// Write a value at an absolute index.
  Write {
    /// Position to write to.
    index: usize,
    /// Value to store.
    value: V,
  },
  /// Append a value at the current size.
  PushBack {
    /// Value to append.
    value: V,
  },
  /// Remove and return the last value.
  PopBack,
  /// Observe the vector size, offset by this transaction's earlier pushes
  /// and pops.
  Size,
  /// Ensure backing storage exists for at least `capacity` elements.
  Reserve {
    /// Element capacity to pre-allocate.
    capacity: usize,
  },
}

impl<V> Op<V>
where
  V: Element,
{
  /// Returns `true` for operations that read an absolute index.
  #[inline]
  pub const fn is_read(&self) -> bool {
    matches!(self, Self::Read { .. })
  }

  /// The bit pattern this operation leaves in its target slot, if it writes
  /// one. A pop deposits the unset sentinel so bounds checks of later
  /// transactions fail at the vacated position.
  #[inline]
  pub(crate) fn pending_bits(&self) -> Option<u64> {
    match self {
      Self::Write { value, .. } => Some(value.to_bits()),
      Self::PushBack { value } => Some(value.to_bits()),
      Self::PopBack => Some(V::UNSET.to_bits()),
      _ => None,
    }
  }
}

/// The value produced by one committed operation.
///
/// `Read` and `PopBack` produce element values; `Size` produces a length.
/// `Write`, `PushBack`, and `Reserve` produce nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpResult<V> {
  /// An element value, from a read or a pop.
  Value(V),
  /// A length, from a size observation.
  Len(usize),
}

impl<V> OpResult<V> {
  /// Returns the element value, or [`None`] for a length result.
  #[inline]
  pub fn value(self) -> Option<V> {
    match self {
      Self::Value(value) => Some(value),
      Self::Len(_) => None,
    }
  }

  /// Returns the length, or [`None`] for a value result.
  #[inline]
  pub fn len(self) -> Option<usize> {
    match self {
      Self::Value(_) => None,
      Self::Len(len) => Some(len),
    }
  }
}
