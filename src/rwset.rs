//! Transaction preprocessing.
//!
//! Before touching shared memory (other than the size cell), a transaction
//! is flattened into a per-segment plan: operations are grouped by the slot
//! they land on, consecutive accesses to one slot collapse into at most one
//! effective write plus a list of pending readers, and reads of slots the
//! transaction itself wrote are answered immediately without ever reaching
//! the shared structure. The resulting [`RwSet`] is the blueprint every
//! install attempt — the owner's and any helper's — materializes pages
//! from.

use std::collections::BTreeMap;

use sdd::Guard;
use sdd::Shared;

use crate::descriptor::TxState;
use crate::element::Element;
use crate::error::AbortReason;
use crate::op::Op;
use crate::page::SizePage;
use crate::params::Params;
use crate::params::ParamsExt;
use crate::vector::TransactionalVector;

// -----------------------------------------------------------------------------
// Published Plan
// -----------------------------------------------------------------------------

/// Pending readers of one slot, keyed by operation index.
pub(crate) struct SlotReaders {
  pub(crate) slot: usize,
  pub(crate) ops: Box<[usize]>,
}

/// The blueprint for one segment's page.
pub(crate) struct PagePlan {
  pub(crate) segment: usize,
  pub(crate) read: u64,
  pub(crate) write: u64,
  pub(crate) check: u64,
  /// New-value bits per touched slot, ascending by slot index. Slots
  /// without an effective write carry the unset filler and are never
  /// surfaced.
  pub(crate) slots: Box<[u64]>,
  /// Operations waiting for pre-transaction values, for result publication.
  pub(crate) readers: Box<[SlotReaders]>,
}

/// The preprocessed form of a transaction, published on its descriptor so
/// helpers can re-drive the installation.
pub(crate) struct RwSet {
  /// Plans ascending by segment index; installation direction is applied at
  /// iteration time.
  plans: Box<[PagePlan]>,
  touches_size: bool,
  final_size: usize,
}

impl RwSet {
  #[inline]
  pub(crate) fn plans(&self) -> &[PagePlan] {
    &self.plans
  }

  #[inline]
  pub(crate) const fn touches_size(&self) -> bool {
    self.touches_size
  }

  #[inline]
  pub(crate) const fn final_size(&self) -> usize {
    self.final_size
  }

  /// Whether installing this plan changes observable state.
  #[inline]
  pub(crate) fn is_mutating(&self) -> bool {
    self.touches_size || self.plans.iter().any(|plan| plan.write != 0)
  }
}

// -----------------------------------------------------------------------------
// Preprocessing
// -----------------------------------------------------------------------------

/// Per-slot accumulator while scanning the operation list.
#[derive(Default)]
struct SlotPlan {
  readers: Vec<usize>,
  last_write: Option<usize>,
  check: Option<bool>,
}

/// Flattens the descriptor's operations into an [`RwSet`].
///
/// Acquires the size cell on the first size-dependent operation, answers
/// intra-transaction reads by forwarding, reserves backing storage for every
/// touched index, and finalizes the size page. Returns [`None`] when the
/// transaction aborted during preprocessing — whether by its own doing
/// (pop on empty, overflow, unset forwarding) or by a helper's timeout.
pub(crate) fn preprocess<V, P>(
  vector: &TransactionalVector<V, P>,
  state: &Shared<TxState<V>>,
  guard: &Guard,
) -> Option<RwSet>
where
  V: Element,
  P: Params + ?Sized,
{
  let ops: &[Op<V>] = state.ops();
  let unset: u64 = V::UNSET.to_bits();

  let mut groups: BTreeMap<usize, BTreeMap<usize, SlotPlan>> = BTreeMap::new();
  let mut size_page: Option<Shared<SizePage<V>>> = None;
  let mut local_size: usize = 0;
  let mut max_reserve: usize = 0;

  for index in 0..ops.len() {
    match ops[index] {
      Op::Read { index: at } => {
        let (segment, slot) = P::split(at);
        let plan: &mut SlotPlan = groups.entry(segment).or_default().entry(slot).or_default();

        if let Some(write) = plan.last_write {
          // The slot was written earlier in this transaction; answer from
          // the pending value.
          let bits: u64 = ops[write].pending_bits().unwrap_or(unset);

          state.set_result_bits(index, bits);

          if bits == unset {
            state.try_abort(AbortReason::UnsetForwarded);
            return None;
          }
        } else {
          plan.check.get_or_insert(true);
          plan.readers.push(index);
        }
      }
      Op::Write { index: at, .. } => {
        let (segment, slot) = P::split(at);
        let plan: &mut SlotPlan = groups.entry(segment).or_default().entry(slot).or_default();

        plan.check.get_or_insert(true);
        plan.last_write = Some(index);
      }
      Op::PushBack { .. } => {
        if size_page.is_none() {
          let (size, page) = vector.acquire_size(state, guard)?;

          local_size = size;
          size_page = Some(page);
        }

        if local_size == usize::MAX {
          state.try_abort(AbortReason::SizeOverflow);
          return None;
        }

        let (segment, slot) = P::split(local_size);
        let plan: &mut SlotPlan = groups.entry(segment).or_default().entry(slot).or_default();

        local_size += 1;

        // A freshly created position is in bounds by construction.
        plan.check.get_or_insert(false);
        plan.last_write = Some(index);
      }
      Op::PopBack => {
        if size_page.is_none() {
          let (size, page) = vector.acquire_size(state, guard)?;

          local_size = size;
          size_page = Some(page);
        }

        if local_size == 0 {
          state.try_abort(AbortReason::PopOnEmpty);
          return None;
        }

        local_size -= 1;

        let (segment, slot) = P::split(local_size);
        let plan: &mut SlotPlan = groups.entry(segment).or_default().entry(slot).or_default();

        if let Some(write) = plan.last_write {
          state.set_result_bits(index, ops[write].pending_bits().unwrap_or(unset));
        } else {
          plan.readers.push(index);
        }

        // The pop itself deposits the unset sentinel at the vacated slot.
        plan.check.get_or_insert(false);
        plan.last_write = Some(index);
      }
      Op::Size => {
        if size_page.is_none() {
          let (size, page) = vector.acquire_size(state, guard)?;

          local_size = size;
          size_page = Some(page);
        }

        state.set_result_bits(index, local_size as u64);
      }
      Op::Reserve { capacity } => {
        // Only the largest reservation matters; it is issued once below.
        max_reserve = max_reserve.max(capacity);
      }
    }
  }

  fail::fail_point!("txvec-preprocess");

  if let Some(page) = &size_page {
    page.finalize(local_size);
  }

  // Materialize the per-segment blueprints, ascending by segment.
  let mut plans: Vec<PagePlan> = Vec::with_capacity(groups.len());
  let mut top: usize = 0;

  for (segment, slots) in groups {
    let mut read: u64 = 0;
    let mut write: u64 = 0;
    let mut check: u64 = 0;
    let mut vals: Vec<u64> = Vec::with_capacity(slots.len());
    let mut readers: Vec<SlotReaders> = Vec::new();

    for (slot, plan) in slots {
      let bit: u64 = 1 << slot;

      if !plan.readers.is_empty() {
        read |= bit;
        readers.push(SlotReaders {
          slot,
          ops: plan.readers.into_boxed_slice(),
        });
      }

      if plan.last_write.is_some() {
        write |= bit;
      }

      if plan.check == Some(true) {
        check |= bit;
      }

      vals.push(
        plan
          .last_write
          .and_then(|write| ops[write].pending_bits())
          .unwrap_or(unset),
      );

      top = top.max(P::segment_start(segment) + slot);
    }

    plans.push(PagePlan {
      segment,
      read,
      write,
      check,
      slots: vals.into_boxed_slice(),
      readers: readers.into_boxed_slice(),
    });
  }

  // One reservation covers the explicit reserve calls and every touched
  // position.
  let needed: usize = if plans.is_empty() {
    max_reserve
  } else {
    max_reserve.max(top + 1)
  };

  if needed > 0 {
    vector.reserve_elements(needed);
  }

  Some(RwSet {
    plans: plans.into_boxed_slice(),
    touches_size: size_page.is_some(),
    final_size: local_size,
  })
}
