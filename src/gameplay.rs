use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::model::{Board, Level, MoveRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    None,
    Bottle(usize),
}

/// Result of tapping a bottle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum SelectOutcome {
    Selected(usize),
    Deselected,
    Poured(MoveRecord),
    /// The pour was illegal; the selection is cleared.
    Rejected,
    Ignored,
}

/// Serializable state of a session in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub level_id: u32,
    pub board: Board,
    pub history: Vec<MoveRecord>,
    pub redo: Vec<MoveRecord>,
    pub moves: usize,
}

/// One play-through of a level.
#[derive(Debug, Clone)]
pub struct GameSession {
    level_id: u32,
    initial: Board,
    board: Board,
    selected: Selection,
    history: Vec<MoveRecord>,
    redo_stack: Vec<MoveRecord>,
    moves: usize,
    won: bool,
}

impl GameSession {
    pub fn new(level: &Level) -> Self {
        let won = level.board.is_solved();
        Self {
            level_id: level.id,
            initial: level.board.clone(),
            board: level.board.clone(),
            selected: Selection::None,
            history: Vec::new(),
            redo_stack: Vec::new(),
            moves: 0,
            won,
        }
    }

    pub fn level_id(&self) -> u32 {
        self.level_id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn selected(&self) -> Option<usize> {
        match self.selected {
            Selection::Bottle(index) => Some(index),
            Selection::None => None,
        }
    }

    pub fn moves(&self) -> usize {
        self.moves
    }

    pub fn is_won(&self) -> bool {
        self.won
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn select(&mut self, index: usize) -> SelectOutcome {
        if self.won {
            return SelectOutcome::Ignored;
        }
        match self.selected {
            Selection::None => {
                if self.board.bottle(index).is_some_and(|b| !b.is_empty()) {
                    self.selected = Selection::Bottle(index);
                    SelectOutcome::Selected(index)
                } else {
                    SelectOutcome::Ignored
                }
            }
            Selection::Bottle(from) if from == index => {
                self.selected = Selection::None;
                SelectOutcome::Deselected
            }
            Selection::Bottle(from) => {
                self.selected = Selection::None;
                match self.board.pour(from, index) {
                    Ok((next, record)) => {
                        self.apply(next, record);
                        self.redo_stack.clear();
                        SelectOutcome::Poured(record)
                    }
                    Err(_) => SelectOutcome::Rejected,
                }
            }
        }
    }

    fn apply(&mut self, next: Board, record: MoveRecord) {
        self.board = next;
        self.history.push(record);
        self.moves += 1;
        self.won = self.board.is_solved();
        if self.won {
            info!("Level {} solved in {} moves.", self.level_id, self.moves);
        }
    }

    pub fn undo(&mut self) -> Option<MoveRecord> {
        let record = self.history.pop()?;
        self.board = self.board.undo(&record);
        self.moves = self.moves.saturating_sub(1);
        self.won = false;
        self.selected = Selection::None;
        self.redo_stack.push(record);
        Some(record)
    }

    pub fn redo(&mut self) -> Option<MoveRecord> {
        let record = self.redo_stack.pop()?;
        self.selected = Selection::None;
        match self.board.pour(record.source, record.target) {
            Ok((next, replayed)) => {
                self.apply(next, replayed);
                Some(replayed)
            }
            Err(err) => {
                warn!("Dropping redo history: {err}");
                self.redo_stack.clear();
                None
            }
        }
    }

    pub fn restart(&mut self) {
        self.board = self.initial.clone();
        self.selected = Selection::None;
        self.history.clear();
        self.redo_stack.clear();
        self.moves = 0;
        self.won = self.board.is_solved();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            level_id: self.level_id,
            board: self.board.clone(),
            history: self.history.clone(),
            redo: self.redo_stack.clone(),
            moves: self.moves,
        }
    }

    /// Resumes a saved session, or starts `level` afresh when the snapshot
    /// does not belong to it.
    pub fn restore(snapshot: SessionSnapshot, level: &Level) -> Self {
        if let Err(reason) = Self::check_snapshot(&snapshot, level) {
            warn!("Discarding saved session for level {}: {reason}", level.id);
            return Self::new(level);
        }
        let won = snapshot.board.is_solved();
        Self {
            level_id: level.id,
            initial: level.board.clone(),
            board: snapshot.board,
            selected: Selection::None,
            history: snapshot.history,
            redo_stack: snapshot.redo,
            moves: snapshot.moves,
            won,
        }
    }

    fn check_snapshot(snapshot: &SessionSnapshot, level: &Level) -> Result<(), String> {
        if snapshot.level_id != level.id {
            return Err(format!("saved for level {}", snapshot.level_id));
        }
        let board = &snapshot.board;
        board.validate_invariants().map_err(|err| err.to_string())?;
        if board.capacity() != level.board.capacity() || board.len() != level.board.len() {
            return Err("board shape differs from the level".to_owned());
        }
        if board.count_colors() != level.board.count_colors() {
            return Err("color counts differ from the level".to_owned());
        }
        if snapshot.moves != snapshot.history.len() {
            return Err(format!(
                "move count {} does not match {} recorded pours",
                snapshot.moves,
                snapshot.history.len()
            ));
        }

        let mut earlier = board.clone();
        for record in snapshot.history.iter().rev() {
            earlier = earlier.try_undo(record).map_err(|err| err.to_string())?;
        }
        if earlier != level.board {
            return Err("history does not lead back to the level".to_owned());
        }

        // Redo pops from the end, so the last record is replayed first.
        let mut later = board.clone();
        for record in snapshot.redo.iter().rev() {
            let (next, replayed) = later
                .pour(record.source, record.target)
                .map_err(|err| err.to_string())?;
            if replayed != *record {
                return Err(format!("redo entry {record:?} does not replay"));
            }
            later = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColorId, Difficulty, Step};

    fn level(text: &str) -> Level {
        Level::new(7, "test", Difficulty::Easy, text.parse().unwrap())
    }

    #[test]
    fn select_then_pour() {
        let mut session = GameSession::new(&level("AAAB BBBA ...."));
        assert_eq!(session.select(2), SelectOutcome::Ignored);
        assert_eq!(session.select(0), SelectOutcome::Selected(0));
        assert_eq!(session.selected(), Some(0));
        let outcome = session.select(2);
        assert!(outcome.is_poured());
        assert_eq!(session.selected(), None);
        assert_eq!(session.moves(), 1);
        assert_eq!(session.board().to_string(), "AAA. BBBA B...");
    }

    #[test]
    fn same_bottle_deselects() {
        let mut session = GameSession::new(&level("AAAB BBBA ...."));
        session.select(1);
        assert_eq!(session.select(1), SelectOutcome::Deselected);
        assert_eq!(session.selected(), None);
        assert_eq!(session.moves(), 0);
    }

    #[test]
    fn illegal_pour_is_rejected() {
        let mut session = GameSession::new(&level("AAAB BBBA ...."));
        session.select(0);
        assert_eq!(session.select(1), SelectOutcome::Rejected);
        assert_eq!(session.selected(), None);
        assert_eq!(session.moves(), 0);
        assert_eq!(session.select(9), SelectOutcome::Ignored);
    }

    #[test]
    fn winning_locks_input() {
        let mut session = GameSession::new(&level("AAAB BBBA ...."));
        for step in [Step::new(0, 2), Step::new(1, 0), Step::new(1, 2)] {
            session.select(step.source);
            assert!(session.select(step.target).is_poured());
        }
        assert!(session.is_won());
        assert_eq!(session.select(0), SelectOutcome::Ignored);
    }

    #[test]
    fn undo_and_redo_walk_history() {
        let lvl = level("AAAB BBBA ....");
        let mut session = GameSession::new(&lvl);
        session.select(0);
        session.select(2);
        session.select(1);
        session.select(0);
        let after_two = session.board().clone();

        let second = session.undo().unwrap();
        assert_eq!(second.step(), Step::new(1, 0));
        session.undo();
        assert_eq!(*session.board(), lvl.board);
        assert_eq!(session.moves(), 0);
        assert_eq!(session.undo(), None);

        session.redo();
        session.redo();
        assert_eq!(*session.board(), after_two);
        assert_eq!(session.moves(), 2);
        assert!(!session.can_redo());
    }

    #[test]
    fn new_pour_clears_redo() {
        let mut session = GameSession::new(&level("AAAB BBBA ...."));
        session.select(0);
        session.select(2);
        session.undo();
        assert!(session.can_redo());
        session.select(1);
        session.select(2);
        assert!(!session.can_redo());
        assert_eq!(session.redo(), None);
    }

    #[test]
    fn undo_clears_win() {
        let mut session = GameSession::new(&level("AAAB BBBA ...."));
        for step in [Step::new(0, 2), Step::new(1, 0), Step::new(1, 2)] {
            session.select(step.source);
            session.select(step.target);
        }
        assert!(session.is_won());
        session.undo();
        assert!(!session.is_won());
        assert!(session.select(1).is_selected());
    }

    #[test]
    fn restart_resets_everything() {
        let lvl = level("AAAB BBBA ....");
        let mut session = GameSession::new(&lvl);
        session.select(0);
        session.select(2);
        session.undo();
        session.restart();
        assert_eq!(*session.board(), lvl.board);
        assert!(!session.can_undo());
        assert!(!session.can_redo());
        assert_eq!(session.moves(), 0);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let lvl = level("AAAB BBBA ....");
        let mut session = GameSession::new(&lvl);
        session.select(0);
        session.select(2);
        let json = serde_json::to_string(&session.snapshot()).unwrap();
        let snapshot: SessionSnapshot = serde_json::from_str(&json).unwrap();
        let mut restored = GameSession::restore(snapshot, &lvl);
        assert_eq!(restored.board(), session.board());
        assert_eq!(restored.moves(), 1);
        assert!(restored.undo().is_some());
        assert_eq!(*restored.board(), lvl.board);
    }

    #[test]
    fn snapshot_with_forged_history_is_discarded() {
        let lvl = level("AAAB BBBA ....");
        let mut snapshot = GameSession::new(&lvl).snapshot();
        snapshot.history.push(MoveRecord {
            source: 0,
            target: 1,
            color: ColorId::new(0),
            count: 3,
        });
        snapshot.moves = 1;
        let mut restored = GameSession::restore(snapshot, &lvl);
        assert!(!restored.can_undo());
        assert_eq!(restored.undo(), None);
        assert_eq!(*restored.board(), lvl.board);
        assert!(restored.board().validate_invariants().is_ok());
    }

    #[test]
    fn snapshot_history_must_lead_back_to_the_level() {
        let lvl = level("AAAB BBBA ....");
        let mut session = GameSession::new(&lvl);
        session.select(0);
        session.select(2);
        let mut snapshot = session.snapshot();
        snapshot.history.clear();
        snapshot.moves = 0;
        let restored = GameSession::restore(snapshot, &lvl);
        assert_eq!(*restored.board(), lvl.board);
    }

    #[test]
    fn snapshot_with_forged_redo_is_discarded() {
        let lvl = level("AAAB BBBA ....");
        let mut session = GameSession::new(&lvl);
        session.select(0);
        session.select(2);
        session.undo();
        let mut snapshot = session.snapshot();
        assert_eq!(snapshot.redo.len(), 1);
        snapshot.redo[0].count = 2;
        let mut restored = GameSession::restore(snapshot, &lvl);
        assert!(!restored.can_redo());
        assert_eq!(restored.redo(), None);

        let mut kept = GameSession::restore(session.snapshot(), &lvl);
        assert!(kept.redo().is_some());
        assert_eq!(kept.board().to_string(), "AAA. BBBA B...");
    }

    #[test]
    fn mismatched_snapshot_falls_back_to_fresh_session() {
        let lvl = level("AAAB BBBA ....");
        let mut snapshot = GameSession::new(&lvl).snapshot();
        snapshot.board = "AAAA AAAA ....".parse().unwrap();
        snapshot.moves = 3;
        let restored = GameSession::restore(snapshot.clone(), &lvl);
        assert_eq!(*restored.board(), lvl.board);
        assert_eq!(restored.moves(), 0);

        snapshot.board = "AAAB BBBA".parse().unwrap();
        let restored = GameSession::restore(snapshot, &lvl);
        assert_eq!(*restored.board(), lvl.board);
    }
}
