//! The transactional vector orchestrator.
//!
//! `execute` drives a descriptor through its lifecycle: preprocessing into
//! an [`RwSet`], acquisition of the size cell, ordered installation of delta
//! pages into the segment chains, the terminal status transition, and
//! result publication. Any thread that finds an in-flight transaction in
//! its way re-drives that transaction from its published plan instead of
//! waiting for its owner — the structure stays lock-free because every
//! published state carries enough information for a stranger to finish the
//! job.

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::hint;
use core::ptr;

use sdd::AtomicShared;
use sdd::Guard;
use sdd::Ptr;
use sdd::Shared;
use sdd::Tag;

use crate::descriptor::Descriptor;
use crate::descriptor::TxState;
use crate::descriptor::TxStatus;
use crate::element::Element;
use crate::error::AbortReason;
use crate::op::Op;
use crate::page::DeltaPage;
use crate::page::SizePage;
use crate::padded::CachePadded;
use crate::params::DefaultParams;
use crate::params::Params;
use crate::params::ParamsExt;
use crate::rwset::preprocess;
use crate::rwset::PagePlan;
use crate::rwset::RwSet;
use crate::segvec::SegmentedVector;
use crate::sync::atomic::AtomicUsize;
use crate::sync::atomic::Ordering::AcqRel;
use crate::sync::atomic::Ordering::Acquire;

/// Outcome of one pass over a transaction's page plans.
enum Install {
  /// Every segment is installed; the commit transition may be attempted.
  Done,
  /// The descriptor reached a terminal status mid-pass, or this pass
  /// aborted it.
  Stopped,
  /// A helping pass ran into a third in-flight transaction and backed out;
  /// the caller's retry loop re-drives it.
  Blocked,
}

/// A linearizable, growable vector updated through atomic multi-operation
/// transactions.
///
/// Many threads submit [`Descriptor`]s concurrently; each commits or aborts
/// as a unit, with the successful status transition as its linearization
/// point. The implementation is lock-free: a stalled transaction is either
/// finished or aborted by whichever thread runs into it.
///
/// # Examples
///
/// ```
/// use txvec::{Descriptor, Op, OpResult, TransactionalVector, TxStatus};
///
/// let vector: TransactionalVector<u64> = TransactionalVector::new(64);
///
/// let push: Descriptor<u64> = Descriptor::new([
///   Op::PushBack { value: 1 },
///   Op::PushBack { value: 2 },
/// ]);
/// vector.execute(&push);
/// assert_eq!(push.status(), TxStatus::Committed);
///
/// let read: Descriptor<u64> = Descriptor::new([Op::Read { index: 1 }]);
/// vector.execute(&read);
/// assert_eq!(read.result(0), Some(OpResult::Value(2)));
/// ```
///
/// # Configuration
///
/// The second type parameter selects a [`Params`] implementation fixing the
/// segment size, storage growth, install order, and the helping policy at
/// compile time.
pub struct TransactionalVector<V, P = DefaultParams>
where
  V: Element,
  P: Params + ?Sized,
{
  /// Bumped before each mutating transaction installs; sampled by
  /// conflict-free reads.
  version: CachePadded<AtomicUsize>,
  /// The size cell: a single-slot segment with its own page chain of
  /// length one.
  size: CachePadded<AtomicShared<SizePage<V>>>,
  /// Segment head storage.
  storage: SegmentedVector<V, P>,
}

impl<V, P> TransactionalVector<V, P>
where
  V: Element,
  P: Params + ?Sized,
{
  /// Creates an empty vector with backing storage for at least
  /// `initial_capacity` elements (and always at least one bucket).
  pub fn new(initial_capacity: usize) -> Self {
    P::validate();

    let this: Self = Self {
      version: CachePadded::new(AtomicUsize::new(0)),
      size: CachePadded::new(AtomicShared::null()),
      storage: SegmentedVector::new(),
    };

    this.reserve_elements(initial_capacity.max(1));
    this
  }

  /// Executes a transaction, returning once its status is terminal.
  ///
  /// On commit, every result is published before this returns; inspect the
  /// descriptor for status, results, and the abort reason. Re-executing a
  /// finished descriptor is a no-op, and concurrent calls for one
  /// descriptor are safe: the first caller claims the transaction and
  /// preprocesses it, while the rest help its installation along and wait
  /// for the terminal status.
  pub fn execute(&self, desc: &Descriptor<V>) {
    let state: &Shared<TxState<V>> = desc.state();

    if !state.is_active() {
      return;
    }

    let guard: Guard = Guard::new();

    if !state.try_claim() {
      self.await_resolution(state, &guard);
      return;
    }

    if P::CONFLICT_FREE_READS && state.is_conflict_free() && state.ops().iter().all(Op::is_read) {
      self.execute_conflict_free(state, &guard);
      return;
    }

    let Some(set) = preprocess(self, state, &guard) else {
      // Aborted during preprocessing.
      return;
    };

    let set: Shared<RwSet> = Shared::new(set);

    if set.is_mutating() {
      self.version.fetch_add(1, AcqRel);
    }

    state.publish_set(set.clone());

    fail::fail_point!("txvec-install");

    if let Install::Done = self.install(state, &set, false, &guard) {
      state.try_commit();
    }

    debug_assert!(!state.is_active());

    if state.status() == TxStatus::Committed {
      self.publish_results(state, &set, &guard);
    }

    // The transaction has retired; the plan is no longer needed by anyone.
    state.clear_set();
  }

  /// Waits out a descriptor another caller already claimed.
  ///
  /// Unlike [`complete`], this never times the owner out: the claim winner
  /// is live inside `execute` by construction, so this caller only helps
  /// with the installation once the plan is visible and otherwise spins.
  ///
  /// [`complete`]: Self::complete
  fn await_resolution(&self, state: &Shared<TxState<V>>, guard: &Guard) {
    while state.is_active() {
      if !state.load_set(guard).is_null() {
        self.complete(state, guard);
      }

      hint::spin_loop();
    }

    if state.status() == TxStatus::Committed {
      // Honor the publication promise for waiting callers as well: copy the
      // results out if the plan is still around, or let the claim winner
      // finish its own copy.
      if let Some(set) = state.load_set(guard).as_ref() {
        self.publish_results(state, set, guard);
      }

      while !state.is_published() {
        hint::spin_loop();
      }
    }
  }

  /// The committed size of the vector at some recent instant.
  pub fn len(&self) -> usize {
    self.committed_size(&Guard::new())
  }

  /// Returns `true` if the committed size was zero at some recent instant.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Ensures backing storage for `capacity` elements.
  pub(crate) fn reserve_elements(&self, capacity: usize) -> bool {
    self.storage.reserve(capacity.div_ceil(P::SEG_SIZE))
  }

  // ---------------------------------------------------------------------------
  // Size cell
  // ---------------------------------------------------------------------------

  /// Installs this transaction's page at the size cell and returns the
  /// committed size it captured.
  ///
  /// This is the linearization anchor for any transaction that pushes,
  /// pops, or observes the size. An in-flight owner at the size head is
  /// helped to a terminal status first. Returns [`None`] once the
  /// descriptor stopped being active — for instance when a helper aborted
  /// it for stalling.
  pub(crate) fn acquire_size(
    &self,
    state: &Shared<TxState<V>>,
    guard: &Guard,
  ) -> Option<(usize, Shared<SizePage<V>>)> {
    loop {
      if !state.is_active() {
        return None;
      }

      let head: Ptr<'_, SizePage<V>> = self.size.load(Acquire, guard);

      let old: usize = match head.as_ref() {
        None => 0,
        Some(page) => {
          if page.owner().is_active() && !ptr::eq(page.owner(), &**state) {
            if P::HELPING {
              self.complete(page.owner_shared(), guard);
            } else {
              hint::spin_loop();
            }

            continue;
          }

          page.committed_size()
        }
      };

      let fresh: Shared<SizePage<V>> = Shared::new(SizePage::new(state.clone(), old));

      match self
        .size
        .compare_exchange(head, (Some(fresh.clone()), Tag::None), AcqRel, Acquire, guard)
      {
        Ok(_) => return Some((old, fresh)),
        Err(_) => continue,
      }
    }
  }

  /// The committed size as witnessed through the current size page.
  fn committed_size(&self, guard: &Guard) -> usize {
    match self.size.load(Acquire, guard).as_ref() {
      Some(page) => page.committed_size(),
      None => 0,
    }
  }

  // ---------------------------------------------------------------------------
  // Installation
  // ---------------------------------------------------------------------------

  /// Runs the installation loop for a descriptor, either as its owner or on
  /// behalf of a stalled one.
  ///
  /// Plans are visited in the process-wide order so transactions with
  /// overlapping segment sets serialize on the first segment they share.
  /// Idempotence across concurrent passes comes from the head cells
  /// themselves: a pass recognizes an already-installed segment by finding
  /// a page owned by this descriptor at the head, and every compare-and-set
  /// succeeds at most once.
  fn install(&self, state: &Shared<TxState<V>>, set: &RwSet, helping: bool, guard: &Guard) -> Install {
    let plans: &[PagePlan] = set.plans();

    for position in 0..plans.len() {
      let plan: &PagePlan = if P::HIGH_TO_LOW {
        &plans[plans.len() - 1 - position]
      } else {
        &plans[position]
      };

      loop {
        if !state.is_active() {
          return Install::Stopped;
        }

        let Some(cell) = self.storage.head(plan.segment) else {
          // Reservation could not cover this segment.
          state.try_abort(AbortReason::OutOfBounds);
          return Install::Stopped;
        };

        let head: Ptr<'_, DeltaPage<V>> = cell.load(Acquire, guard);

        if let Some(page) = head.as_ref() {
          if ptr::eq(page.owner(), &**state) {
            // Another pass already installed this segment.
            break;
          }

          if page.owner().is_active() {
            if helping {
              return Install::Blocked;
            }

            self.complete(page.owner_shared(), guard);
            continue;
          }
        }

        if !self.check_bounds(plan, set, guard) {
          state.try_abort(AbortReason::OutOfBounds);
          return Install::Stopped;
        }

        let prev: Option<Shared<DeltaPage<V>>> = match head.as_ref() {
          Some(_) => match head.get_shared() {
            Some(shared) => Some(shared),
            // The observed head is already being replaced; reload.
            None => continue,
          },
          None => None,
        };

        let page: Shared<DeltaPage<V>> = Shared::new(DeltaPage::materialize(
          plan,
          state.clone(),
          head.as_ref(),
          prev,
        ));

        match cell.compare_exchange(head, (Some(page), Tag::None), AcqRel, Acquire, guard) {
          Ok(_) => break,
          Err(_) => continue,
        }
      }
    }

    Install::Done
  }

  /// Verifies every bounds-checked slot of a plan against the effective
  /// size: the transaction's own final size when it acquired the size cell,
  /// the committed size otherwise.
  fn check_bounds(&self, plan: &PagePlan, set: &RwSet, guard: &Guard) -> bool {
    if plan.check == 0 {
      return true;
    }

    let limit: usize = if set.touches_size() {
      set.final_size()
    } else {
      self.committed_size(guard)
    };

    let mut bits: u64 = plan.check;

    while bits != 0 {
      let slot: usize = bits.trailing_zeros() as usize;

      if P::segment_start(plan.segment) + slot >= limit {
        return false;
      }

      bits &= bits - 1;
    }

    true
  }

  // ---------------------------------------------------------------------------
  // Helping
  // ---------------------------------------------------------------------------

  /// Drives someone else's in-flight transaction toward a terminal status.
  ///
  /// Polls for the owner's published plan, re-runs its installation, and
  /// attempts its commit transition. An owner that never publishes within
  /// the poll bound is aborted (when [`Params::HELPING`] allows) so this
  /// thread is never blocked behind a stalled peer. A helping pass that
  /// itself runs into a third active transaction backs out; the encountered
  /// transaction makes progress through its own contention, and our retry
  /// loop comes back here.
  fn complete(&self, owner: &Shared<TxState<V>>, guard: &Guard) {
    let mut spins: usize = 0;

    loop {
      if !owner.is_active() {
        break;
      }

      let published: Ptr<'_, RwSet> = owner.load_set(guard);

      let Some(set) = published.as_ref() else {
        spins += 1;

        if P::HELPING && spins >= P::HELP_SPIN {
          owner.try_abort(AbortReason::HelpTimeout);
        }

        hint::spin_loop();
        continue;
      };

      match self.install(owner, set, true, guard) {
        Install::Done => {
          owner.try_commit();
        }
        Install::Stopped => {}
        Install::Blocked => return,
      }

      break;
    }

    // A finished transaction's results can be published by any thread; the
    // flag makes the copy idempotent.
    if owner.status() == TxStatus::Committed {
      if let Some(set) = owner.load_set(guard).as_ref() {
        self.publish_results(owner, set, guard);
      }
    }
  }

  // ---------------------------------------------------------------------------
  // Results
  // ---------------------------------------------------------------------------

  /// Copies pre-transaction values out of the installed pages into the
  /// waiting operations' result cells, then flips the published flag.
  fn publish_results(&self, state: &Shared<TxState<V>>, set: &RwSet, guard: &Guard) {
    if state.is_published() {
      return;
    }

    for plan in set.plans() {
      if plan.readers.is_empty() {
        continue;
      }

      let Some(cell) = self.storage.head(plan.segment) else {
        continue;
      };

      // The page is still in the chain; newer transactions may have piled
      // on top of it since.
      let mut cursor: Option<&DeltaPage<V>> = cell.load(Acquire, guard).as_ref();

      while let Some(page) = cursor {
        if ptr::eq(page.owner(), &**state) {
          break;
        }

        cursor = page.prev();
      }

      let Some(page) = cursor else {
        continue;
      };

      for readers in plan.readers.iter() {
        let bits: u64 = page.old_bits(readers.slot);

        for &op in readers.ops.iter() {
          state.set_result_bits(op, bits);
        }
      }
    }

    state.mark_published();
  }

  // ---------------------------------------------------------------------------
  // Conflict-free reads
  // ---------------------------------------------------------------------------

  /// Resolves an all-reads transaction by sampling the segment heads once,
  /// without installing anything. Writers are never blocked or slowed by
  /// this path; its linearization point is the version sample.
  fn execute_conflict_free(&self, state: &Shared<TxState<V>>, guard: &Guard) {
    state.set_version(self.version.load(Acquire));

    let limit: usize = self.committed_size(guard);

    for op in state.ops() {
      if let Op::Read { index } = *op {
        if index >= limit {
          state.try_abort(AbortReason::OutOfBounds);
          return;
        }
      }
    }

    for (position, op) in state.ops().iter().enumerate() {
      let Op::Read { index } = *op else {
        continue;
      };

      let (segment, slot) = P::split(index);

      let bits: u64 = loop {
        let Some(cell) = self.storage.head(segment) else {
          break V::UNSET.to_bits();
        };

        let head: Ptr<'_, DeltaPage<V>> = cell.load(Acquire, guard);

        if let Some(page) = head.as_ref() {
          if page.owner().is_active() {
            self.complete(page.owner_shared(), guard);
            continue;
          }
        }

        break DeltaPage::lookup(head.as_ref(), slot);
      };

      state.set_result_bits(position, bits);
    }

    if state.try_commit() {
      state.mark_published();
    }
  }
}

impl<V, P> Default for TransactionalVector<V, P>
where
  V: Element,
  P: Params + ?Sized,
{
  #[inline]
  fn default() -> Self {
    Self::new(P::SEG_SIZE * P::FIRST_BUCKET)
  }
}

impl<V, P> Debug for TransactionalVector<V, P>
where
  V: Element,
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("TransactionalVector")
      .field("len", &self.len())
      .finish_non_exhaustive()
  }
}
