//! Pour rules. Every operation borrows a board and returns new values.

use std::collections::BTreeMap;

use crate::model::{Board, Bottle, ColorId, MoveRecord, Step};

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum RulesError {
    #[display("cannot pour from bottle {from} into bottle {to}")]
    InvalidPour { from: usize, to: usize },
    #[display("cannot reverse-pour {count} unit(s) from bottle {from} into bottle {to}")]
    InvalidUnpour { from: usize, to: usize, count: usize },
    #[display("bottle {bottle} exceeds capacity: {len} > {capacity}")]
    CapacityExceeded {
        bottle: usize,
        len: usize,
        capacity: usize,
    },
    #[display("move {from} -> {to} of {count} unit(s) did not produce this board")]
    InvalidUndo { from: usize, to: usize, count: usize },
    #[display("invalid count for color {color}: {count}")]
    InvalidColorCount { color: ColorId, count: usize },
}

impl Bottle {
    pub fn top_color(&self) -> Option<ColorId> {
        self.layers().last().copied()
    }

    /// Number of consecutive units sharing the top color.
    pub fn top_run_length(&self) -> usize {
        let Some(top) = self.top_color() else {
            return 0;
        };
        self.layers()
            .iter()
            .rev()
            .take_while(|&&color| color == top)
            .count()
    }

    pub fn free_space(&self, capacity: usize) -> usize {
        capacity.saturating_sub(self.len())
    }

    /// Empty, or full and monochrome.
    pub fn is_complete(&self, capacity: usize) -> bool {
        if self.is_empty() {
            return true;
        }
        self.len() == capacity && self.top_run_length() == capacity
    }
}

impl Board {
    pub fn can_pour(&self, source: usize, target: usize) -> bool {
        if source == target {
            return false;
        }
        let (Some(from), Some(to)) = (self.bottle(source), self.bottle(target)) else {
            return false;
        };
        if from.is_empty() || to.len() >= self.capacity() {
            return false;
        }
        to.is_empty() || from.top_color() == to.top_color()
    }

    /// Pours the top run of `source` into `target`, as far as space allows.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::InvalidPour`] exactly when [`Board::can_pour`] is false.
    pub fn pour(&self, source: usize, target: usize) -> Result<(Board, MoveRecord), RulesError> {
        if !self.can_pour(source, target) {
            return Err(RulesError::InvalidPour {
                from: source,
                to: target,
            });
        }
        let from = &self.bottles()[source];
        let to = &self.bottles()[target];
        let Some(color) = from.top_color() else {
            return Err(RulesError::InvalidPour {
                from: source,
                to: target,
            });
        };
        let count = from.top_run_length().min(to.free_space(self.capacity()));

        let next = self.transfer(source, target, count);
        let record = MoveRecord {
            source,
            target,
            color,
            count,
        };
        Ok((next, record))
    }

    /// Reverts `record`, which must be the pour that produced `self`.
    pub fn undo(&self, record: &MoveRecord) -> Board {
        debug_assert!(
            self.bottle(record.target).is_some_and(|b| {
                b.len() >= record.count
                    && b.layers()[b.len() - record.count..]
                        .iter()
                        .all(|&c| c == record.color)
            }),
            "undo applied to a board that does not follow {record:?}"
        );
        self.transfer(record.target, record.source, record.count)
    }

    /// [`Board::undo`] for records read from outside the engine. Succeeds only
    /// when pouring `record` on the returned board reproduces `self` and
    /// `record` exactly.
    ///
    /// # Errors
    ///
    /// [`RulesError::InvalidUndo`] when `record` is not the pour that produced
    /// `self`.
    pub fn try_undo(&self, record: &MoveRecord) -> Result<Board, RulesError> {
        let invalid = RulesError::InvalidUndo {
            from: record.source,
            to: record.target,
            count: record.count,
        };
        let (Some(from), Some(to)) = (self.bottle(record.source), self.bottle(record.target))
        else {
            return Err(invalid);
        };
        let fits = record.source != record.target
            && record.count >= 1
            && to.top_color() == Some(record.color)
            && to.top_run_length() >= record.count
            && from.free_space(self.capacity()) >= record.count;
        if !fits {
            return Err(invalid);
        }
        let previous = self.transfer(record.target, record.source, record.count);
        match previous.pour(record.source, record.target) {
            Ok((next, replayed)) if next == *self && replayed == *record => Ok(previous),
            _ => Err(invalid),
        }
    }

    /// Whether moving `count` top units of `source` onto `target` can be
    /// exactly undone by the forward pour `target -> source`.
    pub fn can_unpour(&self, source: usize, target: usize, count: usize) -> bool {
        if source == target || count == 0 {
            return false;
        }
        let (Some(from), Some(to)) = (self.bottle(source), self.bottle(target)) else {
            return false;
        };
        let run = from.top_run_length();
        if count > run {
            return false;
        }
        // The pour back needs the source's new top to match, or the source empty.
        if count != from.len() && count == run {
            return false;
        }
        if to.len() + count > self.capacity() {
            return false;
        }
        // The pour back must move exactly `count`: either the moved run is not
        // extended by same-colored units in the target, or the source's free
        // space caps the transfer.
        to.top_color() != from.top_color() || from.len() == self.capacity()
    }

    /// Reverse pour. Returns the new board and the forward pour that restores `self`.
    ///
    /// # Errors
    ///
    /// Returns [`RulesError::InvalidUnpour`] when [`Board::can_unpour`] is false.
    pub fn unpour(
        &self,
        source: usize,
        target: usize,
        count: usize,
    ) -> Result<(Board, MoveRecord), RulesError> {
        let invalid = RulesError::InvalidUnpour {
            from: source,
            to: target,
            count,
        };
        if !self.can_unpour(source, target, count) {
            return Err(invalid);
        }
        let color = self
            .bottle(source)
            .and_then(Bottle::top_color)
            .ok_or(invalid)?;
        let next = self.transfer(source, target, count);
        let restore = MoveRecord {
            source: target,
            target: source,
            color,
            count,
        };
        Ok((next, restore))
    }

    /// Completeness of one bottle; false for an index off the board.
    pub fn is_bottle_complete(&self, index: usize) -> bool {
        self.bottle(index)
            .is_some_and(|bottle| bottle.is_complete(self.capacity()))
    }

    pub fn is_solved(&self) -> bool {
        self.bottles()
            .iter()
            .all(|bottle| bottle.is_complete(self.capacity()))
    }

    /// All pours allowed by [`Board::can_pour`], ordered by source then target.
    pub fn legal_moves(&self) -> Vec<Step> {
        let n = self.len();
        let mut moves = Vec::new();
        for source in 0..n {
            for target in 0..n {
                if self.can_pour(source, target) {
                    moves.push(Step::new(source, target));
                }
            }
        }
        moves
    }

    pub fn count_colors(&self) -> BTreeMap<ColorId, usize> {
        let mut counts = BTreeMap::new();
        for bottle in self.bottles() {
            for &color in bottle.layers() {
                *counts.entry(color).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Gate for boards the engine did not build itself (stored or hand-authored).
    ///
    /// # Errors
    ///
    /// [`RulesError::CapacityExceeded`] for an overfull bottle,
    /// [`RulesError::InvalidColorCount`] for a non-positive color tally.
    pub fn validate_invariants(&self) -> Result<(), RulesError> {
        for (index, bottle) in self.bottles().iter().enumerate() {
            if bottle.len() > self.capacity() {
                return Err(RulesError::CapacityExceeded {
                    bottle: index,
                    len: bottle.len(),
                    capacity: self.capacity(),
                });
            }
        }
        for (&color, &count) in &self.count_colors() {
            if count == 0 {
                return Err(RulesError::InvalidColorCount { color, count });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn board(text: &str) -> Board {
        text.parse().unwrap()
    }

    fn colors(text: &str) -> Vec<ColorId> {
        text.chars()
            .map(|ch| ColorId::from_label(&ch.to_string()).unwrap())
            .collect()
    }

    #[test]
    fn top_of_bottle() {
        let b = Bottle::from_layers(colors("ABB"));
        assert_eq!(b.top_color(), Some(ColorId::new(1)));
        assert_eq!(b.top_run_length(), 2);
        assert_eq!(Bottle::new().top_color(), None);
        assert_eq!(Bottle::new().top_run_length(), 0);
    }

    #[test]
    fn pour_onto_empty_bottle() {
        let b = board("AB.. ....");
        assert!(b.can_pour(0, 1));
        let (next, record) = b.pour(0, 1).unwrap();
        assert_eq!(next, board("A... B..."));
        assert_eq!(
            record,
            MoveRecord {
                source: 0,
                target: 1,
                color: ColorId::new(1),
                count: 1
            }
        );
    }

    #[test]
    fn pour_moves_whole_top_run() {
        let (next, record) = board("ABB. B...").pour(0, 1).unwrap();
        assert_eq!(next, board("A... BBB."));
        assert_eq!(record.count, 2);
    }

    #[test]
    fn pour_is_limited_by_target_space() {
        let (next, record) = board("BBB. BB..").pour(0, 1).unwrap();
        assert_eq!(next, board("B... BBBB"));
        assert_eq!(record.count, 2);
    }

    #[test]
    fn solved_board_detected() {
        assert!(board("AAAA BBBB ....").is_solved());
        assert!(!board("AAA. BBBB A...").is_solved());
    }

    #[test]
    fn mismatched_tops_cannot_pour() {
        let b = board("AB.. AC..");
        assert!(!b.can_pour(0, 1));
        assert!(!b.legal_moves().contains(&Step::new(0, 1)));
        assert!(!b.legal_moves().contains(&Step::new(1, 0)));
        assert_eq!(
            b.pour(0, 1),
            Err(RulesError::InvalidPour { from: 0, to: 1 })
        );
    }

    #[test]
    fn can_pour_fails_closed() {
        let b = board("AB.. .... AAAA");
        assert!(!b.can_pour(0, 0));
        assert!(!b.can_pour(0, 7));
        assert!(!b.can_pour(7, 0));
        assert!(!b.can_pour(1, 0));
        assert!(!b.can_pour(0, 2));
    }

    #[test]
    fn legal_moves_are_ordered_by_source_then_target() {
        let b = board("A.. B.. ...");
        assert_eq!(
            b.legal_moves(),
            vec![Step::new(0, 2), Step::new(1, 2)]
        );
        let b = board("A.. A.. ...");
        assert_eq!(
            b.legal_moves(),
            vec![
                Step::new(0, 1),
                Step::new(0, 2),
                Step::new(1, 0),
                Step::new(1, 2)
            ]
        );
    }

    #[test]
    fn undo_restores_previous_board() {
        let b = board("ABB. B... ....");
        let (next, record) = b.pour(0, 1).unwrap();
        assert_eq!(next.undo(&record), b);
    }

    #[test]
    fn checked_undo_matches_undo_for_real_pours() {
        let b = board("ABB. B... ....");
        let (next, record) = b.pour(0, 1).unwrap();
        assert_eq!(next.try_undo(&record), Ok(b));
    }

    #[test]
    fn checked_undo_rejects_records_that_did_not_happen() {
        let b = board("AAAB BBBA ....");
        let forged = MoveRecord {
            source: 0,
            target: 1,
            color: ColorId::new(0),
            count: 3,
        };
        assert_eq!(
            b.try_undo(&forged),
            Err(RulesError::InvalidUndo {
                from: 0,
                to: 1,
                count: 3
            })
        );
        // Right color and room, but the pour back would have moved both A units.
        let b = board("AA.. AA.. ....");
        let partial = MoveRecord {
            source: 0,
            target: 1,
            color: ColorId::new(0),
            count: 1,
        };
        assert!(b.try_undo(&partial).is_err());
        let off_board = MoveRecord {
            source: 0,
            target: 9,
            ..partial
        };
        assert!(b.try_undo(&off_board).is_err());
    }

    #[test]
    fn completeness_shapes() {
        assert!(Bottle::new().is_complete(4));
        assert!(Bottle::new().is_complete(0));
        assert!(Bottle::from_layers(colors("AAAA")).is_complete(4));
        assert!(!Bottle::from_layers(colors("AAA")).is_complete(4));
        assert!(!Bottle::from_layers(colors("AABA")).is_complete(4));
        let b = board("AAAA AAB. ....");
        assert!(b.is_bottle_complete(0));
        assert!(!b.is_bottle_complete(1));
        assert!(b.is_bottle_complete(2));
        assert!(!b.is_bottle_complete(3));
    }

    #[test]
    fn unpour_returns_restoring_pour() {
        let b = board("AAAA .... ....");
        let (next, restore) = b.unpour(0, 1, 3).unwrap();
        assert_eq!(next, board("A... AAA. ...."));
        assert_eq!(restore.step(), Step::new(1, 0));
        let (back, record) = next.pour(restore.source, restore.target).unwrap();
        assert_eq!(record, restore);
        assert_eq!(back, b);
    }

    #[test]
    fn unpour_rejects_uninvertible_moves() {
        // Taking the whole run would expose B, which the pour back cannot land on.
        assert!(!board("BAA. ....").can_unpour(0, 1, 2));
        // The pour back would also take the A already in the target.
        assert!(!board("AAA. A...").can_unpour(0, 1, 1));
        // ...unless the source is full, which caps the pour back.
        assert!(board("AAAA A...").can_unpour(0, 1, 1));
        assert!(!board("AA.. AAA.").can_unpour(0, 1, 2));
        assert_eq!(
            board("A... ....").unpour(0, 0, 1),
            Err(RulesError::InvalidUnpour {
                from: 0,
                to: 0,
                count: 1
            })
        );
    }

    #[test]
    fn validate_rejects_overfull_bottles() {
        let b = Board::from_layers(2, vec![colors("AAA"), vec![]]);
        assert_eq!(
            b.validate_invariants(),
            Err(RulesError::CapacityExceeded {
                bottle: 0,
                len: 3,
                capacity: 2
            })
        );
        assert_eq!(board("AB.. BA..").validate_invariants(), Ok(()));
    }

    #[test]
    fn counts_colors_across_bottles() {
        let counts = board("AB.. BA.. C...").count_colors();
        assert_eq!(counts.get(&ColorId::new(0)), Some(&2));
        assert_eq!(counts.get(&ColorId::new(1)), Some(&2));
        assert_eq!(counts.get(&ColorId::new(2)), Some(&1));
    }

    fn arb_board() -> impl Strategy<Value = Board> {
        (1usize..=5, 1usize..=6).prop_flat_map(|(capacity, bottles)| {
            prop::collection::vec(
                prop::collection::vec((0u16..4).prop_map(ColorId::new), 0..=capacity),
                bottles,
            )
            .prop_map(move |layers| Board::from_layers(capacity, layers))
        })
    }

    proptest! {
        #[test]
        fn pour_conserves_and_inverts(b in arb_board()) {
            for source in 0..b.len() {
                for target in 0..b.len() {
                    match b.pour(source, target) {
                        Ok((next, record)) => {
                            prop_assert!(b.can_pour(source, target));
                            prop_assert!(record.count >= 1);
                            prop_assert_eq!(next.count_colors(), b.count_colors());
                            let back = next.undo(&record);
                            prop_assert_eq!(back.count_colors(), b.count_colors());
                            prop_assert_eq!(back, b.clone());
                            for (i, bottle) in next.bottles().iter().enumerate() {
                                prop_assert!(bottle.len() <= b.capacity());
                                if i != source && i != target {
                                    prop_assert_eq!(bottle, &b.bottles()[i]);
                                }
                            }
                        }
                        Err(_) => prop_assert!(!b.can_pour(source, target)),
                    }
                }
            }
        }

        #[test]
        fn unpour_is_undone_by_its_record(b in arb_board()) {
            for source in 0..b.len() {
                for target in 0..b.len() {
                    for count in 1..=b.capacity() {
                        if let Ok((next, restore)) = b.unpour(source, target, count) {
                            let (back, record) = next.pour(restore.source, restore.target).unwrap();
                            prop_assert_eq!(record, restore);
                            prop_assert_eq!(back, b.clone());
                        } else {
                            prop_assert!(!b.can_unpour(source, target, count));
                        }
                    }
                }
            }
        }

        #[test]
        fn only_complete_bottles_count(layers in prop::collection::vec(0u16..3, 0..=4), capacity in 1usize..=4) {
            let bottle = Bottle::from_layers(layers.iter().copied().map(ColorId::new).collect());
            let monochrome = layers.windows(2).all(|w| w[0] == w[1]);
            let expected = layers.is_empty() || (layers.len() == capacity && monochrome);
            prop_assert_eq!(bottle.is_complete(capacity), expected);
        }
    }
}
