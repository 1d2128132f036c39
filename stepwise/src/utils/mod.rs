//! Small data structures used internally by the event loop.
//!
//! [`Slab`] provides indexed storage with slot reuse; the loop keys
//! external readiness registrations by slab index.

mod slab;

pub(crate) use slab::Slab;
