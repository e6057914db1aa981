//! Transaction descriptors.
//!
//! A [`Descriptor`] is the record shared between the submitting thread and
//! any helpers: the operation list, the atomic transaction status, the
//! per-operation result cells, and the published read/write set. The public
//! type is a cheap handle over a reference-counted record so pages installed
//! in the shared structure can keep their owner alive across reclamation
//! epochs.

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;

use sdd::AtomicShared;
use sdd::Guard;
use sdd::Ptr;
use sdd::Shared;
use sdd::Tag;

use crate::element::Element;
use crate::error::AbortReason;
use crate::op::Op;
use crate::op::OpResult;
use crate::rwset::RwSet;
use crate::sync::atomic::AtomicBool;
use crate::sync::atomic::AtomicU32;
use crate::sync::atomic::AtomicU64;
use crate::sync::atomic::AtomicUsize;
use crate::sync::atomic::Ordering::AcqRel;
use crate::sync::atomic::Ordering::Acquire;
use crate::sync::atomic::Ordering::Relaxed;
use crate::sync::atomic::Ordering::Release;

// -----------------------------------------------------------------------------
// Transaction Status
// -----------------------------------------------------------------------------

/// The lifecycle state of a transaction.
///
/// A descriptor starts [`Active`] and moves exactly once, by compare-and-set,
/// to one of the terminal states. Terminal states never change.
///
/// [`Active`]: TxStatus::Active
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TxStatus {
  /// Submitted but not yet resolved.
  Active = 0,
  /// Every operation took effect atomically; results are readable.
  Committed = 1,
  /// No operation took effect; no results were produced.
  Aborted = 2,
}

impl TxStatus {
  #[inline]
  const fn from_raw(raw: u32) -> Self {
    match raw {
      0 => Self::Active,
      1 => Self::Committed,
      _ => Self::Aborted,
    }
  }
}

// -----------------------------------------------------------------------------
// Shared Transaction Record
// -----------------------------------------------------------------------------

/// The record a descriptor handle points at.
///
/// Installed pages hold a strong reference to this record, so it stays
/// reachable for as long as any segment chain mentions the transaction.
pub(crate) struct TxState<V>
where
  V: Element,
{
  /// Raw [`TxStatus`] value.
  status: AtomicU32,
  /// Raw [`AbortReason`] encoding; zero while unrecorded.
  reason: AtomicU32,
  /// Set once results have been copied out of the installed pages.
  published: AtomicBool,
  /// Set once a thread has taken ownership of preprocessing and driving
  /// this transaction.
  claimed: AtomicBool,
  /// Fast-path hint assigned at construction.
  conflict_free: bool,
  /// Version stamp sampled by conflict-free reads.
  version: AtomicUsize,
  /// The operations, in submission order.
  ops: Box<[Op<V>]>,
  /// One result cell per operation, transported as element bits.
  results: Box<[AtomicU64]>,
  /// The preprocessed plan, published for helpers once preprocessing ends.
  set: AtomicShared<RwSet>,
}

impl<V> TxState<V>
where
  V: Element,
{
  fn new(ops: Box<[Op<V>]>, conflict_free: bool) -> Self {
    let results: Box<[AtomicU64]> = ops
      .iter()
      .map(|_| AtomicU64::new(V::UNSET.to_bits()))
      .collect();

    Self {
      status: AtomicU32::new(TxStatus::Active as u32),
      reason: AtomicU32::new(0),
      published: AtomicBool::new(false),
      claimed: AtomicBool::new(false),
      conflict_free,
      version: AtomicUsize::new(0),
      ops,
      results,
      set: AtomicShared::null(),
    }
  }

  #[inline]
  pub(crate) fn status(&self) -> TxStatus {
    TxStatus::from_raw(self.status.load(Acquire))
  }

  #[inline]
  pub(crate) fn is_active(&self) -> bool {
    self.status() == TxStatus::Active
  }

  /// Attempts the `active -> committed` transition. Returns `true` when this
  /// caller performed it.
  #[inline]
  pub(crate) fn try_commit(&self) -> bool {
    self
      .status
      .compare_exchange(
        TxStatus::Active as u32,
        TxStatus::Committed as u32,
        AcqRel,
        Acquire,
      )
      .is_ok()
  }

  /// Attempts the `active -> aborted` transition, recording `reason` when
  /// this caller performed it.
  #[inline]
  pub(crate) fn try_abort(&self, reason: AbortReason) -> bool {
    let won: bool = self
      .status
      .compare_exchange(
        TxStatus::Active as u32,
        TxStatus::Aborted as u32,
        AcqRel,
        Acquire,
      )
      .is_ok();

    if won {
      self.reason.store(reason.into_raw(), Release);
    }

    won
  }

  #[inline]
  pub(crate) fn abort_reason(&self) -> Option<AbortReason> {
    AbortReason::from_raw(self.reason.load(Acquire))
  }

  /// Claims the right to preprocess and drive this transaction. Exactly one
  /// caller ever wins; later callers fall back to helping.
  #[inline]
  pub(crate) fn try_claim(&self) -> bool {
    !self.claimed.swap(true, AcqRel)
  }

  #[inline]
  pub(crate) fn ops(&self) -> &[Op<V>] {
    &self.ops
  }

  #[inline]
  pub(crate) fn set_result_bits(&self, index: usize, bits: u64) {
    self.results[index].store(bits, Relaxed);
  }

  #[inline]
  pub(crate) fn result_bits(&self, index: usize) -> u64 {
    self.results[index].load(Relaxed)
  }

  #[inline]
  pub(crate) fn mark_published(&self) {
    self.published.store(true, Release);
  }

  #[inline]
  pub(crate) fn is_published(&self) -> bool {
    self.published.load(Acquire)
  }

  #[inline]
  pub(crate) fn is_conflict_free(&self) -> bool {
    self.conflict_free
  }

  #[inline]
  pub(crate) fn set_version(&self, version: usize) {
    self.version.store(version, Relaxed);
  }

  #[inline]
  pub(crate) fn version(&self) -> usize {
    self.version.load(Relaxed)
  }

  /// Makes the preprocessed plan visible to helpers.
  #[inline]
  pub(crate) fn publish_set(&self, set: Shared<RwSet>) {
    let previous: (Option<Shared<RwSet>>, Tag) = self.set.swap((Some(set), Tag::None), Release);

    debug_assert!(previous.0.is_none(), "plan published twice");
  }

  #[inline]
  pub(crate) fn load_set<'guard>(&self, guard: &'guard Guard) -> Ptr<'guard, RwSet> {
    self.set.load(Acquire, guard)
  }

  /// Drops the plan once the transaction has retired; helpers observe the
  /// terminal status before ever reaching for it again.
  #[inline]
  pub(crate) fn clear_set(&self) {
    drop(self.set.swap((None, Tag::None), AcqRel));
  }
}

// -----------------------------------------------------------------------------
// Public Descriptor
// -----------------------------------------------------------------------------

/// A transaction: an ordered list of operations resolved atomically.
///
/// Build a descriptor from [`Op`] values, hand it to
/// [`TransactionalVector::execute`], then inspect [`Descriptor::status`] and
/// pull per-operation results with [`Descriptor::result`]. Descriptors are
/// cheap to clone and safe to share across threads: a descriptor resolves
/// exactly once even when several threads execute it concurrently (the
/// first caller claims it; the rest help it finish), and re-executing a
/// finished one is a no-op.
///
/// [`TransactionalVector::execute`]: crate::TransactionalVector::execute
///
/// # Examples
///
/// ```
/// use txvec::{Descriptor, Op, OpResult, TransactionalVector, TxStatus};
///
/// let vector: TransactionalVector<u64> = TransactionalVector::new(16);
/// let desc: Descriptor<u64> = Descriptor::new([
///   Op::PushBack { value: 40 },
///   Op::PushBack { value: 41 },
///   Op::PopBack,
/// ]);
///
/// vector.execute(&desc);
///
/// assert_eq!(desc.status(), TxStatus::Committed);
/// assert_eq!(desc.result(2), Some(OpResult::Value(41)));
/// assert_eq!(vector.len(), 1);
/// ```
pub struct Descriptor<V>
where
  V: Element,
{
  inner: Shared<TxState<V>>,
}

impl<V> Descriptor<V>
where
  V: Element,
{
  /// Creates a descriptor from an operation list.
  pub fn new<I>(ops: I) -> Self
  where
    I: IntoIterator<Item = Op<V>>,
  {
    Self {
      inner: Shared::new(TxState::new(ops.into_iter().collect(), false)),
    }
  }

  /// Creates a descriptor hinted as conflict-free.
  ///
  /// A conflict-free transaction must consist exclusively of [`Op::Read`]
  /// operations; it then resolves by sampling the shared structure once,
  /// without ever writing to it. A mis-marked descriptor silently takes the
  /// general path instead.
  pub fn new_conflict_free<I>(ops: I) -> Self
  where
    I: IntoIterator<Item = Op<V>>,
  {
    Self {
      inner: Shared::new(TxState::new(ops.into_iter().collect(), true)),
    }
  }

  /// Current transaction status.
  #[inline]
  pub fn status(&self) -> TxStatus {
    self.inner.status()
  }

  /// The value produced by operation `index`.
  ///
  /// Returns [`None`] while the transaction is unresolved, when it aborted,
  /// when `index` is out of range, or when the operation produces nothing
  /// (writes, pushes, reserves).
  pub fn result(&self, index: usize) -> Option<OpResult<V>> {
    if self.inner.status() != TxStatus::Committed || !self.inner.is_published() {
      return None;
    }

    match *self.inner.ops().get(index)? {
      Op::Read { .. } | Op::PopBack => {
        Some(OpResult::Value(V::from_bits(self.inner.result_bits(index))))
      }
      Op::Size => Some(OpResult::Len(self.inner.result_bits(index) as usize)),
      _ => None,
    }
  }

  /// Why the transaction aborted, when that has been recorded.
  #[inline]
  pub fn abort_reason(&self) -> Option<AbortReason> {
    self.inner.abort_reason()
  }

  /// The version stamp sampled by a conflict-free execution.
  #[inline]
  pub(crate) fn version_stamp(&self) -> usize {
    self.inner.version()
  }

  /// Number of operations in the transaction.
  #[inline]
  pub fn len(&self) -> usize {
    self.inner.ops().len()
  }

  /// Returns `true` for a transaction with no operations.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.inner.ops().is_empty()
  }

  /// The operations, in submission order.
  #[inline]
  pub fn ops(&self) -> &[Op<V>] {
    self.inner.ops()
  }

  #[inline]
  pub(crate) fn state(&self) -> &Shared<TxState<V>> {
    &self.inner
  }
}

impl<V> Clone for Descriptor<V>
where
  V: Element,
{
  #[inline]
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<V> Debug for Descriptor<V>
where
  V: Element,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Descriptor")
      .field("status", &self.status())
      .field("ops", &self.inner.ops().len())
      .finish()
  }
}
