use sdd::Guard;

use crate::descriptor::Descriptor;
use crate::descriptor::TxStatus;
use crate::error::AbortReason;
use crate::op::Op;
use crate::params::Params;
use crate::rwset::preprocess;
use crate::rwset::RwSet;
use crate::vector::TransactionalVector;

struct TestParams;

impl Params for TestParams {
  const SEG_SIZE: usize = 4;
  const FIRST_BUCKET: usize = 2;
}

type TestVector = TransactionalVector<u64, TestParams>;

fn plan_of(vector: &TestVector, desc: &Descriptor<u64>) -> Option<RwSet> {
  let guard: Guard = Guard::new();

  preprocess(vector, desc.state(), &guard)
}

#[test]
fn test_pushes_collapse_into_one_plan() {
  let vector: TestVector = TransactionalVector::new(4);
  let desc: Descriptor<u64> = Descriptor::new([
    Op::PushBack { value: 1 },
    Op::PushBack { value: 2 },
  ]);

  let set: RwSet = plan_of(&vector, &desc).unwrap();

  assert!(set.touches_size());
  assert!(set.is_mutating());
  assert_eq!(set.final_size(), 2);
  assert_eq!(set.plans().len(), 1);

  let plan = &set.plans()[0];

  assert_eq!(plan.segment, 0);
  assert_eq!(plan.read, 0b00);
  assert_eq!(plan.write, 0b11);
  // Freshly created positions skip the bounds check.
  assert_eq!(plan.check, 0b00);
  assert_eq!(&*plan.slots, &[1, 2]);
}

#[test]
fn test_pushes_span_segments() {
  let vector: TestVector = TransactionalVector::new(4);
  let desc: Descriptor<u64> = Descriptor::new((0..6).map(|value| Op::PushBack { value }));

  let set: RwSet = plan_of(&vector, &desc).unwrap();

  assert_eq!(set.final_size(), 6);
  assert_eq!(set.plans().len(), 2);
  assert_eq!(set.plans()[0].segment, 0);
  assert_eq!(set.plans()[0].write, 0b1111);
  assert_eq!(set.plans()[1].segment, 1);
  assert_eq!(set.plans()[1].write, 0b0011);
}

#[test]
fn test_write_then_read_forwards() {
  let vector: TestVector = TransactionalVector::new(4);
  let desc: Descriptor<u64> = Descriptor::new([
    Op::Write { index: 0, value: 7 },
    Op::Read { index: 0 },
  ]);

  let set: RwSet = plan_of(&vector, &desc).unwrap();
  let plan = &set.plans()[0];

  // The read was satisfied internally: no read bit, no reader entry.
  assert_eq!(plan.read, 0b00);
  assert_eq!(plan.write, 0b01);
  assert_eq!(plan.check, 0b01);
  assert!(plan.readers.is_empty());
  assert_eq!(desc.state().result_bits(1), 7);
}

#[test]
fn test_read_before_write_stays_shared() {
  let vector: TestVector = TransactionalVector::new(4);
  let desc: Descriptor<u64> = Descriptor::new([
    Op::Read { index: 1 },
    Op::Write { index: 1, value: 9 },
  ]);

  let set: RwSet = plan_of(&vector, &desc).unwrap();
  let plan = &set.plans()[0];

  assert_eq!(plan.read, 0b10);
  assert_eq!(plan.write, 0b10);
  assert_eq!(plan.check, 0b10);
  assert_eq!(plan.readers.len(), 1);
  assert_eq!(plan.readers[0].slot, 1);
  assert_eq!(&*plan.readers[0].ops, &[0]);
}

#[test]
fn test_push_then_pop_balances() {
  let vector: TestVector = TransactionalVector::new(4);
  let desc: Descriptor<u64> = Descriptor::new([Op::PushBack { value: 5 }, Op::PopBack]);

  let set: RwSet = plan_of(&vector, &desc).unwrap();

  // The pop consumed the push in place: size is unchanged and the pop's
  // result was forwarded during preprocessing.
  assert_eq!(set.final_size(), 0);
  assert_eq!(desc.state().result_bits(1), 5);
}

#[test]
fn test_size_records_running_total() {
  let vector: TestVector = TransactionalVector::new(4);
  let desc: Descriptor<u64> = Descriptor::new([
    Op::Size,
    Op::PushBack { value: 3 },
    Op::Size,
  ]);

  let set: RwSet = plan_of(&vector, &desc).unwrap();

  assert_eq!(set.final_size(), 1);
  assert_eq!(desc.state().result_bits(0), 0);
  assert_eq!(desc.state().result_bits(2), 1);
}

#[test]
fn test_pop_on_empty_aborts() {
  let vector: TestVector = TransactionalVector::new(4);
  let desc: Descriptor<u64> = Descriptor::new([Op::PopBack]);

  assert!(plan_of(&vector, &desc).is_none());
  assert_eq!(desc.status(), TxStatus::Aborted);
  assert_eq!(desc.abort_reason(), Some(AbortReason::PopOnEmpty));
}

#[test]
fn test_read_of_popped_slot_aborts() {
  let vector: TestVector = TransactionalVector::new(4);

  let fill: Descriptor<u64> = Descriptor::new([Op::PushBack { value: 1 }]);
  vector.execute(&fill);

  // The pop leaves the unset sentinel at slot 0; forwarding it into the
  // read is a malformed transaction.
  let desc: Descriptor<u64> = Descriptor::new([Op::PopBack, Op::Read { index: 0 }]);

  assert!(plan_of(&vector, &desc).is_none());
  assert_eq!(desc.status(), TxStatus::Aborted);
  assert_eq!(desc.abort_reason(), Some(AbortReason::UnsetForwarded));
}

#[test]
fn test_reserve_folds_to_maximum() {
  let vector: TestVector = TransactionalVector::new(4);
  let desc: Descriptor<u64> = Descriptor::new([
    Op::Reserve { capacity: 100 },
    Op::Reserve { capacity: 10 },
  ]);

  let set: RwSet = plan_of(&vector, &desc).unwrap();

  assert!(set.plans().is_empty());
  assert!(!set.touches_size());
  assert!(!set.is_mutating());
}

#[test]
fn test_read_only_plan_is_not_mutating() {
  let vector: TestVector = TransactionalVector::new(4);
  let desc: Descriptor<u64> = Descriptor::new([Op::Read { index: 0 }, Op::Read { index: 1 }]);

  let set: RwSet = plan_of(&vector, &desc).unwrap();

  assert!(!set.is_mutating());
  assert_eq!(set.plans()[0].read, 0b11);
  assert_eq!(set.plans()[0].write, 0b00);
  assert_eq!(set.plans()[0].check, 0b11);
}
