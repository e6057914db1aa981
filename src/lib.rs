//! A lock-free transactional vector.
//!
//! `txvec` provides [`TransactionalVector`], a growable indexed sequence of
//! fixed-width values updated through multi-operation transactions. Many
//! threads submit transactions concurrently; each transaction — an arbitrary
//! mix of reads, writes, pushes, pops, size observations, and reservations —
//! commits or aborts atomically, and the whole structure stays lock-free.
//!
//! # Overview
//!
//! A transaction is described by a [`Descriptor`] holding a list of [`Op`]
//! values. Executing it flattens the operations into one page per touched
//! segment of the vector, installs those pages into per-segment version
//! chains by compare-and-set, and flips the descriptor's status in a single
//! atomic step. Threads that run into an unfinished transaction finish it
//! themselves from its published plan rather than waiting.
//!
//! # Usage
//!
//! ```
//! use txvec::{Descriptor, Op, OpResult, TransactionalVector, TxStatus};
//!
//! let vector: TransactionalVector<u64> = TransactionalVector::new(64);
//!
//! // Push two values and observe the size, atomically.
//! let tx: Descriptor<u64> = Descriptor::new([
//!   Op::PushBack { value: 10 },
//!   Op::PushBack { value: 11 },
//!   Op::Size,
//! ]);
//!
//! vector.execute(&tx);
//!
//! assert_eq!(tx.status(), TxStatus::Committed);
//! assert_eq!(tx.result(2), Some(OpResult::Len(2)));
//! assert_eq!(vector.len(), 2);
//! ```
//!
//! On abort nothing takes effect and no result is produced:
//!
//! ```
//! use txvec::{AbortReason, Descriptor, Op, TransactionalVector, TxStatus};
//!
//! let vector: TransactionalVector<u64> = TransactionalVector::new(64);
//! let tx: Descriptor<u64> = Descriptor::new([Op::Read { index: 0 }]);
//!
//! vector.execute(&tx);
//!
//! assert_eq!(tx.status(), TxStatus::Aborted);
//! assert_eq!(tx.abort_reason(), Some(AbortReason::OutOfBounds));
//! ```
//!
//! # Configuration
//!
//! Segment size, storage growth, the install order, and the helping policy
//! are compile-time constants selected through the [`Params`] trait; see
//! [`DefaultParams`] for the defaults.
//!
//! # Elements
//!
//! The element type implements [`Element`]: a fixed-width value with one
//! reserved bit pattern, [`Element::UNSET`], that callers must never submit.
//! Implementations are provided for the unsigned integers, using their
//! maximum value as the sentinel.
//!
//! # Memory Reclamation
//!
//! Page chains are reference-counted and reclaimed through the epoch-based
//! collector of [`sdd`]: a page stays alive while any segment head, newer
//! page, or pinned reader can still observe it, so no traversal ever touches
//! freed memory.
//!
//! [`sdd`]: https://docs.rs/sdd

mod descriptor;
mod element;
mod error;
mod op;
mod padded;
mod page;
mod params;
mod rwset;
mod segvec;
mod vector;

#[cfg(all(test, not(any(loom, shuttle))))]
mod tests;

pub mod implementation {
  #![doc = include_str!("../IMPLEMENTATION.md")]
}

pub use self::descriptor::Descriptor;
pub use self::descriptor::TxStatus;
pub use self::element::Element;
pub use self::error::AbortReason;
pub use self::op::Op;
pub use self::op::OpResult;
pub use self::params::DefaultParams;
pub use self::params::Params;
pub use self::params::ParamsExt;
pub use self::vector::TransactionalVector;

mod sync {
  #[cfg(all(loom, shuttle))]
  compile_error!("cannot use loom and shuttle at once");

  #[cfg(not(any(loom, shuttle)))]
  mod exports {
    pub(crate) mod atomic {
      pub(crate) use ::core::sync::atomic::AtomicBool;
      pub(crate) use ::core::sync::atomic::AtomicPtr;
      pub(crate) use ::core::sync::atomic::AtomicU32;
      pub(crate) use ::core::sync::atomic::AtomicU64;
      pub(crate) use ::core::sync::atomic::AtomicUsize;
      pub(crate) use ::core::sync::atomic::Ordering;
    }
  }

  #[cfg(loom)]
  mod exports {
    pub(crate) mod atomic {
      pub(crate) use ::loom::sync::atomic::AtomicBool;
      pub(crate) use ::loom::sync::atomic::AtomicPtr;
      pub(crate) use ::loom::sync::atomic::AtomicU32;
      pub(crate) use ::loom::sync::atomic::AtomicU64;
      pub(crate) use ::loom::sync::atomic::AtomicUsize;
      pub(crate) use ::loom::sync::atomic::Ordering;
    }
  }

  #[cfg(shuttle)]
  mod exports {
    pub(crate) mod atomic {
      pub(crate) use ::shuttle::sync::atomic::AtomicBool;
      pub(crate) use ::shuttle::sync::atomic::AtomicPtr;
      pub(crate) use ::shuttle::sync::atomic::AtomicU32;
      pub(crate) use ::shuttle::sync::atomic::AtomicU64;
      pub(crate) use ::shuttle::sync::atomic::AtomicUsize;
      pub(crate) use ::shuttle::sync::atomic::Ordering;
    }
  }

  pub(crate) use self::exports::*;
}
