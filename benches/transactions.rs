use std::sync::OnceLock;

use divan::Bencher;
use divan::black_box;

use txvec::Descriptor;
use txvec::Op;
use txvec::TransactionalVector;

fn main() {
  divan::main();
}

const SIZES: &[usize] = &[1, 4, 16, 64];

#[divan::bench(args = SIZES)]
fn push_transaction(bencher: Bencher<'_, '_>, ops: usize) {
  bencher
    .with_inputs(|| TransactionalVector::<u64>::new(1 << 12))
    .bench_values(|vector| {
      let desc: Descriptor<u64> =
        Descriptor::new((0..ops as u64).map(|value| Op::PushBack { value }));

      vector.execute(&desc);
      black_box(desc.status());
    });
}

#[divan::bench(args = SIZES)]
fn read_transaction(bencher: Bencher<'_, '_>, ops: usize) {
  let vector: TransactionalVector<u64> = TransactionalVector::new(1 << 12);

  let fill: Descriptor<u64> = Descriptor::new((0..1024).map(|value| Op::PushBack { value }));
  vector.execute(&fill);

  bencher.bench(|| {
    let desc: Descriptor<u64> = Descriptor::new((0..ops).map(|index| Op::Read { index }));

    vector.execute(&desc);
    black_box(desc.result(0));
  });
}

#[divan::bench(args = SIZES)]
fn conflict_free_read_transaction(bencher: Bencher<'_, '_>, ops: usize) {
  let vector: TransactionalVector<u64> = TransactionalVector::new(1 << 12);

  let fill: Descriptor<u64> = Descriptor::new((0..1024).map(|value| Op::PushBack { value }));
  vector.execute(&fill);

  bencher.bench(|| {
    let desc: Descriptor<u64> =
      Descriptor::new_conflict_free((0..ops).map(|index| Op::Read { index }));

    vector.execute(&desc);
    black_box(desc.result(0));
  });
}

#[divan::bench(threads = [1, 2, 4, 8])]
fn contended_push(bencher: Bencher<'_, '_>) {
  static VECTOR: OnceLock<TransactionalVector<u64>> = OnceLock::new();

  let vector: &TransactionalVector<u64> = VECTOR.get_or_init(|| TransactionalVector::new(1 << 20));

  bencher.bench(|| {
    let desc: Descriptor<u64> = Descriptor::new([Op::PushBack { value: 7 }]);

    vector.execute(&desc);
    black_box(desc.status());
  });
}
