use std::collections::{HashSet, VecDeque};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::debug;

use crate::model::{Board, Step};

/// Bounds for a single search. The default is unbounded.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchLimits {
    /// Stop after this many distinct boards have been discovered.
    pub max_states: Option<usize>,
}

impl SearchLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn max_states(max_states: usize) -> Self {
        Self {
            max_states: Some(max_states),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, derive_more::IsVariant)]
pub enum SearchOutcome {
    /// A shortest sequence of pours reaching a solved board.
    Solved(Vec<Step>),
    /// Every reachable board was explored without finding a solved one.
    Unsolvable,
    /// The search hit its limit or was cancelled. Solvability is unknown.
    Aborted,
}

impl SearchOutcome {
    pub fn into_steps(self) -> Option<Vec<Step>> {
        match self {
            SearchOutcome::Solved(steps) => Some(steps),
            SearchOutcome::Unsolvable | SearchOutcome::Aborted => None,
        }
    }
}

/// Breadth-first search over boards reachable through legal pours.
///
/// Boards are deduplicated by value, so each distinct board is queued at most
/// once. The solved check happens when a board leaves the queue; since the
/// queue is in distance order, the first solved board found is a closest one.
#[derive(Clone, Debug, Default)]
pub struct Solver {
    limits: SearchLimits,
    cancel: Option<Arc<AtomicBool>>,
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Share a flag the caller can set from another thread to abandon the search.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub fn search(&self, start: &Board) -> SearchOutcome {
        if start.is_solved() {
            return SearchOutcome::Solved(Vec::new());
        }
        if start.is_definitely_unsolvable() {
            debug!("Color counts do not fill whole bottles, unsolvable.");
            return SearchOutcome::Unsolvable;
        }

        // parents[i] links discovered board i back to the board it came from.
        let mut parents: Vec<Option<(usize, Step)>> = vec![None];
        let mut visited: HashSet<Board> = HashSet::new();
        let mut queue: VecDeque<(Board, usize)> = VecDeque::new();
        visited.insert(start.clone());
        queue.push_back((start.clone(), 0));

        while let Some((board, node)) = queue.pop_front() {
            if self.is_cancelled() {
                debug!("Search cancelled after {} states.", parents.len());
                return SearchOutcome::Aborted;
            }
            if board.is_solved() {
                debug!("Solved after discovering {} states.", parents.len());
                return SearchOutcome::Solved(Self::path_to(&parents, node));
            }
            for step in board.legal_moves() {
                let Ok((next, _)) = board.pour(step.source, step.target) else {
                    continue;
                };
                if visited.contains(&next) {
                    continue;
                }
                if self
                    .limits
                    .max_states
                    .is_some_and(|max| parents.len() >= max)
                {
                    debug!("State limit of {} reached.", parents.len());
                    return SearchOutcome::Aborted;
                }
                parents.push(Some((node, step)));
                visited.insert(next.clone());
                queue.push_back((next, parents.len() - 1));
            }
        }
        debug!("Frontier exhausted after {} states.", parents.len());
        SearchOutcome::Unsolvable
    }

    fn path_to(parents: &[Option<(usize, Step)>], mut node: usize) -> Vec<Step> {
        let mut steps = Vec::new();
        while let Some(Some((parent, step))) = parents.get(node) {
            steps.push(*step);
            node = *parent;
        }
        steps.reverse();
        steps
    }
}

impl Board {
    /// A solved board holds each color in whole bottles, so every color's
    /// unit count must be a multiple of the capacity.
    pub fn is_definitely_unsolvable(&self) -> bool {
        let capacity = self.capacity();
        if capacity == 0 {
            return self.bottles().iter().any(|b| !b.is_empty());
        }
        self.count_colors()
            .values()
            .any(|&count| count % capacity != 0)
    }

    pub fn is_solvable(&self) -> bool {
        Solver::new().search(self).is_solved()
    }

    /// Shortest sequence of pours that solves the board, if any.
    pub fn solution_steps(&self) -> Option<Vec<Step>> {
        Solver::new().search(self).into_steps()
    }

    /// Applies `steps` in order, failing on the first illegal pour.
    pub fn replay(&self, steps: &[Step]) -> Option<Board> {
        let mut board = self.clone();
        for step in steps {
            board = board.pour(step.source, step.target).ok()?.0;
        }
        Some(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(text: &str) -> Board {
        text.parse().unwrap()
    }

    #[test]
    fn single_pour_solution() {
        let b = board("AAA. A...");
        assert!(b.is_solvable());
        assert_eq!(b.solution_steps(), Some(vec![Step::new(0, 1)]));
    }

    #[test]
    fn lone_unit_can_never_complete_a_bottle() {
        // One unit cannot fill a bottle of four, whichever bottle it is in.
        let b = board("A... ....");
        assert!(b.can_pour(0, 1));
        assert!(!b.pour(0, 1).unwrap().0.is_solved());
        assert_eq!(b.solution_steps(), None);
    }

    #[test]
    fn solved_board_needs_no_steps() {
        assert_eq!(board("AAAA ....").solution_steps(), Some(vec![]));
    }

    #[test]
    fn returns_a_shortest_solution() {
        // Two swapped halves and one spare bottle: three pours at minimum.
        let b = board("AB BA ..");
        let steps = b.solution_steps().unwrap();
        assert_eq!(steps.len(), 3);
        assert!(b.replay(&steps).unwrap().is_solved());
    }

    #[test]
    fn shortest_solution_of_a_three_color_board() {
        let b = board("AB BC CA ..");
        assert_eq!(
            b.solution_steps(),
            Some(vec![
                Step::new(0, 3),
                Step::new(2, 0),
                Step::new(1, 2),
                Step::new(1, 3)
            ])
        );
    }

    #[test]
    fn shortest_solution_with_capacity_limited_pours() {
        let b = board("AAAB BBBA ....");
        assert_eq!(
            b.solution_steps(),
            Some(vec![Step::new(0, 2), Step::new(1, 0), Step::new(1, 2)])
        );
    }

    #[test]
    fn stuck_board_is_unsolvable() {
        let b = board("AB BA");
        assert!(b.legal_moves().is_empty());
        assert!(!b.is_solvable());
        assert_eq!(b.solution_steps(), None);
    }

    #[test]
    fn partial_color_counts_are_rejected_without_search() {
        let b = board("AAB. ....");
        assert!(b.is_definitely_unsolvable());
        assert_eq!(Solver::new().search(&b), SearchOutcome::Unsolvable);
    }

    #[test]
    fn state_limit_aborts() {
        let b = board("ABAB BABA .... ....");
        let outcome = Solver::new()
            .with_limits(SearchLimits::max_states(2))
            .search(&b);
        assert_eq!(outcome, SearchOutcome::Aborted);
        assert!(b.is_solvable());
    }

    #[test]
    fn cancel_flag_aborts() {
        let cancel = Arc::new(AtomicBool::new(true));
        let outcome = Solver::new()
            .with_cancel_flag(Arc::clone(&cancel))
            .search(&board("AABB BBAA ...."));
        assert_eq!(outcome, SearchOutcome::Aborted);
    }
}
