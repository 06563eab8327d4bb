//! Pairing of silos for the exchange phase, and the tournament that reduces
//! pair-local winners to one global winner.

/// Partner of position `i`: `i ^ 1`.
pub const fn pair(i: usize) -> usize {
    i ^ 1
}

/// Whether position `i` initiates its pair's exchange.
pub const fn is_initiator(i: usize) -> bool {
    i % 2 == 0
}

/// One entry of a round's pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// `initiator` (even position) is compared with `responder`.
    Pair {
        /// Silo at the even position.
        initiator: usize,
        /// Silo at the odd position.
        responder: usize,
    },
    /// The last silo of an odd-sized round advances unopposed.
    Bye(usize),
}

/// Silos still in contention, in roster order.
///
/// Each round re-indexes the survivors by their position in the list, pairs
/// position `2k` with `2k + 1`, and keeps the winners in their relative order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tournament {
    contenders: Vec<usize>,
    round: usize,
}

impl Tournament {
    /// A tournament over silos `0..n`.
    pub fn new(n: usize) -> Self {
        Self {
            contenders: (0..n).collect(),
            round: 0,
        }
    }

    /// Silos still in contention.
    pub fn contenders(&self) -> &[usize] {
        &self.contenders
    }

    /// Number of completed rounds.
    pub fn round(&self) -> usize {
        self.round
    }

    /// The winner, once a single contender is left.
    pub fn winner(&self) -> Option<usize> {
        match self.contenders.as_slice() {
            [w] => Some(*w),
            _ => None,
        }
    }

    /// Position of `silo` in the current round, if still in contention.
    pub fn position(&self, silo: usize) -> Option<usize> {
        self.contenders.iter().position(|s| *s == silo)
    }

    /// Partner of `silo` in the current round, if it has one.
    pub fn partner(&self, silo: usize) -> Option<usize> {
        self.position(silo)
            .and_then(|p| self.contenders.get(pair(p)).copied())
    }

    /// Pairing of the current round.
    pub fn matches(&self) -> Vec<Match> {
        self.contenders
            .chunks(2)
            .map(|c| match c {
                [initiator, responder] => Match::Pair {
                    initiator: *initiator,
                    responder: *responder,
                },
                [bye] => Match::Bye(*bye),
                _ => unreachable!("chunks(2) yields one or two elements"),
            })
            .collect()
    }

    /// Advances to the next round; `initiator_wins` is called once per pair.
    ///
    /// Fails with the first error returned by `initiator_wins`.
    pub fn play<E, F>(&mut self, mut initiator_wins: F) -> Result<(), E>
    where
        F: FnMut(usize, usize) -> Result<bool, E>,
    {
        let mut winners = Vec::with_capacity(self.contenders.len().div_ceil(2));
        for m in self.matches() {
            match m {
                Match::Pair {
                    initiator,
                    responder,
                } => {
                    if initiator_wins(initiator, responder)? {
                        winners.push(initiator)
                    } else {
                        winners.push(responder)
                    }
                }
                Match::Bye(silo) => winners.push(silo),
            }
        }
        self.contenders = winners;
        self.round += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{is_initiator, pair, Match, Tournament};
    use proptest::prelude::*;
    use std::convert::Infallible;

    #[test]
    fn pairing() {
        assert_eq!(pair(0), 1);
        assert_eq!(pair(1), 0);
        assert_eq!(pair(6), 7);
        assert!(is_initiator(0));
        assert!(!is_initiator(3));
    }

    #[test]
    fn matches_with_bye() {
        let t = Tournament::new(5);
        assert_eq!(
            t.matches(),
            vec![
                Match::Pair {
                    initiator: 0,
                    responder: 1
                },
                Match::Pair {
                    initiator: 2,
                    responder: 3
                },
                Match::Bye(4),
            ]
        );
        assert_eq!(t.partner(3), Some(2));
        assert_eq!(t.partner(4), None);
    }

    #[test]
    fn single_silo_wins_without_rounds() {
        let t = Tournament::new(1);
        assert_eq!(t.winner(), Some(0));
        assert_eq!(t.round(), 0);
    }

    #[test]
    fn ties_go_to_lowest_index() -> Result<(), Infallible> {
        let mut t = Tournament::new(4);
        while t.winner().is_none() {
            t.play(|_, _| Ok::<_, Infallible>(true))?;
        }
        assert_eq!(t.winner(), Some(0));
        assert_eq!(t.round(), 2);
        Ok(())
    }

    #[test]
    fn errors_stop_the_round() {
        let mut t = Tournament::new(4);
        assert_eq!(t.play(|_, _| Err("down")), Err("down"));
        assert_eq!(t.round(), 0);
        assert_eq!(t.contenders(), &[0, 1, 2, 3]);
    }

    proptest! {
        #[test]
        fn pair_is_an_involution(i in 0usize..1_000_000) {
            prop_assert_eq!(pair(pair(i)), i);
        }

        #[test]
        fn tournament_finds_minimum(distances in prop::collection::vec(0i64..50, 1..20)) {
            let mut t = Tournament::new(distances.len());
            let mut rounds = 0;
            while t.winner().is_none() {
                t.play(|a, b| Ok::<_, Infallible>(distances[a] <= distances[b])).unwrap();
                rounds += 1;
            }
            let min = *distances.iter().min().unwrap();
            let first = distances.iter().position(|d| *d == min).unwrap();
            prop_assert_eq!(t.winner(), Some(first));
            let n = distances.len();
            let expected = if n == 1 { 0 } else { (usize::BITS - (n - 1).leading_zeros()) as usize };
            prop_assert_eq!(rounds, expected);
        }
    }
}
