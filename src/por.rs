//! Partial-order reduction: the schedule [`Stack`] that systematic exploration walks, sleep sets,
//! and dynamic partial-order reduction ([`DporAlgorithm`]) over vector clocks.
//!
//! Each step of a schedule is recorded as a [`TidEntryList`] frame holding one [`TidEntry`] per
//! actor. After every run, the DPOR analysis detects pairs of racing sends and marks alternative
//! actors to explore at the frame where the earlier send was chosen.

mod dpor;
mod sleep_sets;
mod stack;
mod tid_entry;

pub use dpor::*;
pub use sleep_sets::*;
pub use stack::*;
pub use tid_entry::*;
