//! Delta pages: the unit of versioning for one segment.
//!
//! A page records everything one transaction does to one segment: which
//! slots it reads, writes, and bounds-checks, the values it wants to store,
//! and the values the slots held immediately before it. Pages chain through
//! `prev` into the segment's history; the head of the chain is the
//! authoritative view of the segment.
//!
//! A page is built privately by one install attempt and becomes shared only
//! through the successful head compare-and-set, so every reachable page is
//! immutable. The head cell and newer pages' `prev` links share ownership;
//! reclamation is deferred by the epoch collector until no thread can still
//! observe a page.

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;

use sdd::Shared;

use crate::descriptor::TxState;
use crate::descriptor::TxStatus;
use crate::element::Element;
use crate::rwset::PagePlan;
use crate::sync::atomic::AtomicUsize;
use crate::sync::atomic::Ordering::Acquire;
use crate::sync::atomic::Ordering::Release;

// -----------------------------------------------------------------------------
// Delta Page
// -----------------------------------------------------------------------------

/// Old and new value bits for one touched slot.
#[derive(Clone, Copy)]
pub(crate) struct SlotPair {
  pub(crate) old: u64,
  pub(crate) new: u64,
}

/// One transaction's effect on one segment.
pub(crate) struct DeltaPage<V>
where
  V: Element,
{
  /// The transaction that produced this page.
  owner: Shared<TxState<V>>,
  /// The page this one superseded, or [`None`] for the first page of a
  /// segment.
  prev: Option<Shared<DeltaPage<V>>>,
  /// Slots some operation reads.
  read: u64,
  /// Slots some operation writes.
  write: u64,
  /// Slots that must pass a bounds check at install time.
  check: u64,
  /// Value pairs for touched slots, ordered by ascending slot index.
  slots: Box<[SlotPair]>,
}

impl<V> DeltaPage<V>
where
  V: Element,
{
  /// Builds an installable page: plan masks and new values, old values and
  /// the chain link captured from the head this attempt observed.
  pub(crate) fn materialize(
    plan: &PagePlan,
    owner: Shared<TxState<V>>,
    head: Option<&DeltaPage<V>>,
    prev: Option<Shared<DeltaPage<V>>>,
  ) -> Self {
    let touched: u64 = plan.read | plan.write;
    let mut slots: Vec<SlotPair> = Vec::with_capacity(touched.count_ones() as usize);

    let mut bits: u64 = touched;

    while bits != 0 {
      let slot: usize = bits.trailing_zeros() as usize;

      slots.push(SlotPair {
        old: Self::lookup(head, slot),
        new: plan.slots[slots.len()],
      });

      bits &= bits - 1;
    }

    Self {
      owner,
      prev,
      read: plan.read,
      write: plan.write,
      check: plan.check,
      slots: slots.into_boxed_slice(),
    }
  }

  #[inline]
  pub(crate) fn owner(&self) -> &TxState<V> {
    &self.owner
  }

  #[inline]
  pub(crate) fn owner_shared(&self) -> &Shared<TxState<V>> {
    &self.owner
  }

  #[inline]
  pub(crate) fn prev(&self) -> Option<&DeltaPage<V>> {
    self.prev.as_deref()
  }

  #[inline]
  pub(crate) const fn touched(&self) -> u64 {
    self.read | self.write
  }

  #[inline]
  pub(crate) const fn touches(&self, slot: usize) -> bool {
    self.touched() & (1 << slot) != 0
  }

  /// Position of `slot` within the compressed slot array.
  #[inline]
  fn rank(&self, slot: usize) -> usize {
    (self.touched() & ((1 << slot) - 1)).count_ones() as usize
  }

  /// The value this slot held immediately before the owning transaction.
  #[inline]
  pub(crate) fn old_bits(&self, slot: usize) -> u64 {
    debug_assert!(self.touches(slot));

    self.slots[self.rank(slot)].old
  }

  /// The value this page assigns to `slot`, if the chain walk can stop
  /// here. A committed write surfaces its new value; a read-only touch or
  /// an aborted owner leaves the slot at its captured pre-image, which is
  /// equally authoritative because neither changed it.
  #[inline]
  fn assigned_bits(&self, slot: usize) -> Option<u64> {
    if !self.touches(slot) {
      return None;
    }

    let pair: SlotPair = self.slots[self.rank(slot)];

    if self.write & (1 << slot) != 0 && self.owner.status() == TxStatus::Committed {
      Some(pair.new)
    } else {
      Some(pair.old)
    }
  }

  /// Walks a page chain and returns the current value bits of `slot`.
  ///
  /// Callers must have driven the head's owner to a terminal status first;
  /// pages deeper in the chain had terminal owners the moment they were
  /// superseded.
  pub(crate) fn lookup(head: Option<&DeltaPage<V>>, slot: usize) -> u64 {
    let mut cursor: Option<&DeltaPage<V>> = head;

    while let Some(page) = cursor {
      if let Some(bits) = page.assigned_bits(slot) {
        return bits;
      }

      cursor = page.prev();
    }

    V::UNSET.to_bits()
  }
}

impl<V> Debug for DeltaPage<V>
where
  V: Element,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("DeltaPage")
      .field("status", &self.owner.status())
      .field("read", &format_args!("{:b}", self.read))
      .field("write", &format_args!("{:b}", self.write))
      .field("check", &format_args!("{:b}", self.check))
      .field("slots", &self.slots.len())
      .finish()
  }
}

impl<V> Drop for DeltaPage<V>
where
  V: Element,
{
  fn drop(&mut self) {
    // Unlink the chain iteratively; the naive recursive drop would overflow
    // the stack on a long history.
    let mut cursor: Option<Shared<DeltaPage<V>>> = self.prev.take();

    while let Some(mut page) = cursor {
      cursor = match unsafe { page.get_mut() } {
        Some(inner) => inner.prev.take(),
        None => None,
      };
    }
  }
}

// -----------------------------------------------------------------------------
// Size Page
// -----------------------------------------------------------------------------

/// The page installed at the size cell by a transaction that observes or
/// changes the vector size.
///
/// Unlike segment pages, size pages do not chain: the superseded page is
/// released to the collector outright, and an aborted or still-active
/// owner's page answers with the captured previous size.
pub(crate) struct SizePage<V>
where
  V: Element,
{
  owner: Shared<TxState<V>>,
  /// Committed size at install time.
  old: usize,
  /// Size after the owning transaction; finalized once preprocessing has
  /// consumed the whole operation list, always before the plan is
  /// published.
  new: AtomicUsize,
}

impl<V> SizePage<V>
where
  V: Element,
{
  #[inline]
  pub(crate) fn new(owner: Shared<TxState<V>>, old: usize) -> Self {
    Self {
      owner,
      old,
      new: AtomicUsize::new(old),
    }
  }

  #[inline]
  pub(crate) fn owner(&self) -> &TxState<V> {
    &self.owner
  }

  #[inline]
  pub(crate) fn owner_shared(&self) -> &Shared<TxState<V>> {
    &self.owner
  }

  #[inline]
  pub(crate) fn finalize(&self, size: usize) {
    self.new.store(size, Release);
  }

  /// The committed vector size as witnessed through this page.
  #[inline]
  pub(crate) fn committed_size(&self) -> usize {
    if self.owner.status() == TxStatus::Committed {
      self.new.load(Acquire)
    } else {
      self.old
    }
  }
}
