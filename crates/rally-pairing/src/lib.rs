//! Round-robin pairing for Rally tournaments.
//!
//! [`schedule`] turns an ordered participant list into rounds of matches
//! in which every participant meets every other exactly once. It is a
//! pure function: no I/O, no state. Creating the match sessions for a
//! round, and deciding when the next round starts, is up to the caller.
//!
//! ```rust
//! use rally_pairing::schedule;
//!
//! let s = schedule(&["ada", "bob", "cy", "dee"]);
//! assert_eq!(s.len(), 3);
//! assert_eq!(s.pairings().count(), 6);
//! ```

mod schedule;

pub use schedule::{schedule, Pairing, Round, Schedule};
