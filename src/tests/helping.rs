//! Recovery scenarios driven by fail points.
//!
//! Fail point configuration is process-global, so both scenarios run inside
//! one test to keep them from tearing each other down.

#![cfg(not(miri))]

use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;

use crate::descriptor::Descriptor;
use crate::descriptor::TxStatus;
use crate::error::AbortReason;
use crate::op::Op;
use crate::op::OpResult;
use crate::params::Params;
use crate::vector::TransactionalVector;

struct TestParams;

impl Params for TestParams {
  const SEG_SIZE: usize = 4;
  const FIRST_BUCKET: usize = 2;
  const HELP_SPIN: usize = 64;
}

type TestVector = TransactionalVector<u64, TestParams>;
type ArcVector = Arc<TestVector>;

/// Parks threads with a matching name at a fail point until released, and
/// reports that someone arrived.
struct Gate {
  arrived: (Mutex<bool>, Condvar),
  release: (Mutex<bool>, Condvar),
}

impl Gate {
  fn new() -> Arc<Self> {
    Arc::new(Self {
      arrived: (Mutex::new(false), Condvar::new()),
      release: (Mutex::new(false), Condvar::new()),
    })
  }

  fn install(self: &Arc<Self>, point: &str, name: &'static str) {
    let gate: Arc<Self> = Arc::clone(self);

    fail::cfg_callback(point, move || {
      if thread::current().name() != Some(name) {
        return;
      }

      {
        let (lock, cvar) = &gate.arrived;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
      }

      let (lock, cvar) = &gate.release;
      let mut released = lock.lock().unwrap();

      while !*released {
        released = cvar.wait(released).unwrap();
      }
    })
    .unwrap();
  }

  fn wait_arrived(&self) {
    let (lock, cvar) = &self.arrived;
    let mut arrived = lock.lock().unwrap();

    while !*arrived {
      arrived = cvar.wait(arrived).unwrap();
    }
  }

  fn open(&self) {
    let (lock, cvar) = &self.release;
    *lock.lock().unwrap() = true;
    cvar.notify_all();
  }
}

#[test]
fn test_helping_scenarios() {
  let scenario = fail::FailScenario::setup();

  // A thread parks after publishing its plan but before installing any
  // page. A second transaction that needs the size cell must drive the
  // parked transaction all the way to committed, then complete on its own.
  {
    let vector: ArcVector = Arc::new(TransactionalVector::new(8));
    let gate: Arc<Gate> = Gate::new();

    gate.install("txvec-install", "stall-install");

    let stalled: Descriptor<u64> = Descriptor::new((1..=6).map(|value| Op::PushBack { value }));

    let worker: JoinHandle<()> = {
      let vector: ArcVector = Arc::clone(&vector);
      let stalled: Descriptor<u64> = stalled.clone();

      thread::Builder::new()
        .name("stall-install".into())
        .spawn(move || vector.execute(&stalled))
        .unwrap()
    };

    gate.wait_arrived();

    let helper: Descriptor<u64> = Descriptor::new([Op::PushBack { value: 100 }]);

    vector.execute(&helper);

    // The helper could only get past the size cell by finishing the parked
    // transaction first.
    assert_eq!(helper.status(), TxStatus::Committed);
    assert_eq!(stalled.status(), TxStatus::Committed);
    assert_eq!(vector.len(), 7);

    gate.open();
    worker.join().unwrap();

    let readback: Descriptor<u64> = Descriptor::new((0..7).map(|index| Op::Read { index }));

    vector.execute(&readback);

    for index in 0..6 {
      assert_eq!(
        readback.result(index),
        Some(OpResult::Value(index as u64 + 1)),
      );
    }

    assert_eq!(readback.result(6), Some(OpResult::Value(100)));

    fail::remove("txvec-install");
  }

  // A thread parks before publishing its plan, with its size page already
  // visible. A helper cannot make progress on its behalf, so after the poll
  // bound it aborts the stalled transaction and proceeds.
  {
    let vector: ArcVector = Arc::new(TransactionalVector::new(8));
    let gate: Arc<Gate> = Gate::new();

    gate.install("txvec-preprocess", "stall-preprocess");

    let stalled: Descriptor<u64> = Descriptor::new([Op::PushBack { value: 1 }]);

    let worker: JoinHandle<()> = {
      let vector: ArcVector = Arc::clone(&vector);
      let stalled: Descriptor<u64> = stalled.clone();

      thread::Builder::new()
        .name("stall-preprocess".into())
        .spawn(move || vector.execute(&stalled))
        .unwrap()
    };

    gate.wait_arrived();

    let helper: Descriptor<u64> = Descriptor::new([Op::PushBack { value: 100 }]);

    vector.execute(&helper);

    assert_eq!(helper.status(), TxStatus::Committed);
    assert_eq!(stalled.status(), TxStatus::Aborted);
    assert_eq!(stalled.abort_reason(), Some(AbortReason::HelpTimeout));
    assert_eq!(vector.len(), 1);

    gate.open();
    worker.join().unwrap();

    // The aborted transaction still changed nothing after resuming.
    assert_eq!(vector.len(), 1);

    let readback: Descriptor<u64> = Descriptor::new([Op::Read { index: 0 }]);

    vector.execute(&readback);

    assert_eq!(readback.result(0), Some(OpResult::Value(100)));

    fail::remove("txvec-preprocess");
  }

  scenario.teardown();
}
