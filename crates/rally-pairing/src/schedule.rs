//! The circle method.
//!
//! Participants sit in a ring of slots. Slot 0 never moves; every round,
//! slot `i` plays slot `n - 1 - i`, then the other slots rotate one step.
//! An odd field gets one empty slot (the bye): whoever faces it that round
//! rests.
//!
//! ```text
//! round 1: [A B C D]   A-D  B-C
//! round 2: [A D B C]   A-C  D-B
//! round 3: [A C D B]   A-B  C-D
//! ```

use serde::Serialize;

/// Two participants who play each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pairing<T> {
    pub player_a: T,
    pub player_b: T,
}

/// One round of simultaneous matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Round<T> {
    /// 1-based.
    pub number: usize,
    pub pairings: Vec<Pairing<T>>,
    /// The participant sitting out this round (odd fields only).
    pub bye: Option<T>,
}

/// A complete round-robin schedule. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule<T> {
    rounds: Vec<Round<T>>,
}

impl<T> Schedule<T> {
    pub fn rounds(&self) -> &[Round<T>] {
        &self.rounds
    }

    /// Every pairing, round by round.
    pub fn pairings(&self) -> impl Iterator<Item = &Pairing<T>> {
        self.rounds.iter().flat_map(|r| r.pairings.iter())
    }

    /// Number of rounds.
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn round(&self, number: usize) -> Option<&Round<T>> {
        number.checked_sub(1).and_then(|i| self.rounds.get(i))
    }
}

impl<T> IntoIterator for Schedule<T> {
    type Item = Round<T>;
    type IntoIter = std::vec::IntoIter<Round<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.rounds.into_iter()
    }
}

/// Builds the round-robin schedule for `participants`.
///
/// Deterministic for a given input order; shuffle first for random
/// pairings. An even field of `n` gets `n - 1` rounds, an odd field `n`
/// rounds. Fewer than two participants produce an empty schedule.
pub fn schedule<T: Clone>(participants: &[T]) -> Schedule<T> {
    if participants.len() < 2 {
        return Schedule { rounds: Vec::new() };
    }

    let mut slots: Vec<Option<T>> = participants.iter().cloned().map(Some).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let n = slots.len();
    let half = n / 2;

    let mut rounds = Vec::with_capacity(n - 1);
    for index in 0..n - 1 {
        let mut pairings = Vec::with_capacity(half);
        let mut bye = None;

        for i in 0..half {
            match (&slots[i], &slots[n - 1 - i]) {
                (Some(a), Some(b)) => pairings.push(Pairing {
                    player_a: a.clone(),
                    player_b: b.clone(),
                }),
                (Some(p), None) | (None, Some(p)) => bye = Some(p.clone()),
                (None, None) => {}
            }
        }

        rounds.push(Round {
            number: index + 1,
            pairings,
            bye,
        });
        slots[1..].rotate_right(1);
    }

    tracing::debug!(
        participants = participants.len(),
        rounds = rounds.len(),
        "round-robin schedule built"
    );
    Schedule { rounds }
}
