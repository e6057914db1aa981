//! Two-level storage for segment head pointers.
//!
//! Segment heads live in geometrically growing buckets: bucket `k` holds
//! `FIRST_BUCKET << k` cells, so the structure reaches any address width in
//! a few dozen bucket pointers and already-installed cells never move.
//! Buckets are allocated on demand, low to high, and installed by
//! compare-and-set so concurrent reservations stay idempotent: losers free
//! their allocation and adopt the winner's.

use core::marker::PhantomData;
use core::ptr;

use sdd::AtomicShared;

use crate::element::Element;
use crate::page::DeltaPage;
use crate::params::Params;
use crate::params::ParamsExt;
use crate::sync::atomic::AtomicPtr;
use crate::sync::atomic::Ordering::AcqRel;
use crate::sync::atomic::Ordering::Acquire;

/// A segment head cell: the most recent page installed for the segment.
pub(crate) type Head<V> = AtomicShared<DeltaPage<V>>;

pub(crate) struct SegmentedVector<V, P>
where
  V: Element,
  P: Params + ?Sized,
{
  buckets: Box<[AtomicPtr<Head<V>>]>,
  marker: PhantomData<fn(P)>,
}

impl<V, P> SegmentedVector<V, P>
where
  V: Element,
  P: Params + ?Sized,
{
  pub(crate) fn new() -> Self {
    Self {
      buckets: (0..P::BUCKET_COUNT)
        .map(|_| AtomicPtr::new(ptr::null_mut()))
        .collect(),
      marker: PhantomData,
    }
  }

  /// Returns the head cell of `segment`, or [`None`] when the segment lies
  /// outside the reserved range. Out-of-range access never faults.
  #[inline]
  pub(crate) fn head(&self, segment: usize) -> Option<&Head<V>> {
    let (bucket, offset) = P::locate(segment);

    if bucket >= P::BUCKET_COUNT {
      return None;
    }

    let base: *mut Head<V> = self.buckets[bucket].load(Acquire);

    if base.is_null() {
      return None;
    }

    // SAFETY: `locate` yields `offset < bucket_len(bucket)` and the
    // published allocation holds exactly `bucket_len(bucket)` cells.
    Some(unsafe { &*base.add(offset) })
  }

  /// Ensures every bucket up to the one containing `segments - 1` exists.
  /// Idempotent and monotone; returns `false` only for a segment count that
  /// cannot be addressed at all.
  pub(crate) fn reserve(&self, segments: usize) -> bool {
    if segments == 0 {
      return true;
    }

    let (target, _) = P::locate(segments - 1);

    if target >= P::BUCKET_COUNT {
      return false;
    }

    // Buckets fill low to high, so a populated target bucket means every
    // lower bucket is populated as well.
    if !self.buckets[target].load(Acquire).is_null() {
      return true;
    }

    for bucket in 0..=target {
      self.alloc_bucket(bucket);
    }

    true
  }

  #[cold]
  #[inline(never)]
  fn alloc_bucket(&self, bucket: usize) {
    if !self.buckets[bucket].load(Acquire).is_null() {
      return;
    }

    let fresh: Box<[Head<V>]> = (0..P::bucket_len(bucket))
      .map(|_| AtomicShared::null())
      .collect();

    let raw: *mut Head<V> = Box::into_raw(fresh).cast::<Head<V>>();

    if self
      .buckets[bucket]
      .compare_exchange(ptr::null_mut(), raw, AcqRel, Acquire)
      .is_err()
    {
      // Another thread published this bucket first.
      //
      // SAFETY: `raw` came from `Box::into_raw` of a boxed slice with
      // `bucket_len(bucket)` elements and was never shared.
      drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(raw, P::bucket_len(bucket))) });
    }
  }
}

impl<V, P> Drop for SegmentedVector<V, P>
where
  V: Element,
  P: Params + ?Sized,
{
  fn drop(&mut self) {
    for bucket in 0..P::BUCKET_COUNT {
      let raw: *mut Head<V> = self.buckets[bucket].load(Acquire);

      if raw.is_null() {
        continue;
      }

      // SAFETY: the pointer was published by `alloc_bucket` from a boxed
      // slice of `bucket_len(bucket)` cells; `Drop` has exclusive access.
      drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(raw, P::bucket_len(bucket))) });
    }
  }
}
