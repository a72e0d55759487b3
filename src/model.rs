//! Board, bottle and move definitions plus their text representation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a liquid color.
///
/// The mapping to an on-screen color belongs to the presentation layer; the
/// engine only compares identifiers. The text form uses spreadsheet-style
/// letters: `A` is 0, `Z` is 25, `AA` is 26 and so on.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorId(u16);

impl ColorId {
    pub const fn new(id: u16) -> Self {
        ColorId(id)
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Convert a single letter (A-Z, either case) into a 0-based id.
    fn letter_value(ch: char) -> Option<u32> {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let up = ch.to_ascii_uppercase();
        Some(u32::from(up as u8 - b'A'))
    }

    /// Parse a letter label like "A", "Z" or "AB".
    pub fn from_label(label: &str) -> Option<Self> {
        let mut acc: u32 = 0;
        let mut saw_any = false;

        for ch in label.chars() {
            let digit = Self::letter_value(ch)?;
            // Excel-style accumulation works on 1..=26.
            acc = acc.checked_mul(26)?.checked_add(digit + 1)?;
            saw_any = true;
        }

        if !saw_any {
            return None;
        }
        let id = u16::try_from(acc.checked_sub(1)?).ok()?;
        Some(ColorId(id))
    }

    pub fn label(self) -> String {
        let mut chars = Vec::new();
        let mut id = u32::from(self.0) + 1;
        while id > 0 {
            let rem = (id - 1) % 26;
            chars.push(char::from(b'A' + rem as u8));
            id = (id - 1) / 26;
        }
        chars.iter().rev().collect()
    }
}

impl fmt::Display for ColorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A stack of color units, bottom first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bottle {
    layers: Vec<ColorId>,
}

impl Bottle {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn from_layers(layers: Vec<ColorId>) -> Self {
        Self { layers }
    }

    /// A bottle filled to `capacity` with a single color.
    pub fn filled(color: ColorId, capacity: usize) -> Self {
        Self {
            layers: vec![color; capacity],
        }
    }

    pub fn layers(&self) -> &[ColorId] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Removes the top `count` units, preserving their bottom-to-top order.
    pub(crate) fn take_top(&mut self, count: usize) -> Vec<ColorId> {
        let at = self.layers.len().saturating_sub(count);
        self.layers.split_off(at)
    }

    pub(crate) fn put_top(&mut self, units: Vec<ColorId>) {
        self.layers.extend(units);
    }

    fn text_representation(&self, capacity: usize) -> String {
        let mut repr: Vec<String> = self.layers.iter().map(|color| color.label()).collect();
        while repr.len() < capacity {
            repr.push(".".to_string());
        }
        let has_multi_char = repr.iter().any(|s| s.len() > 1);
        let separator = if has_multi_char { "," } else { "" };
        repr.join(separator)
    }
}

/// Index pair of a pour: `source` pours into `target`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Step {
    pub source: usize,
    pub target: usize,
}

impl Step {
    pub fn new(source: usize, target: usize) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// A completed pour, with enough detail to invert it exactly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveRecord {
    pub source: usize,
    pub target: usize,
    pub color: ColorId,
    /// Units moved; always at least 1.
    pub count: usize,
}

impl MoveRecord {
    pub fn step(&self) -> Step {
        Step::new(self.source, self.target)
    }
}

/// The puzzle state: an index-addressed row of bottles sharing one capacity.
///
/// Boards are values. Every engine operation borrows a board and hands back a
/// fresh one, so a board given to the presentation layer or stored in history
/// never changes underneath its holder.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    capacity: usize,
    bottles: Vec<Bottle>,
}

impl Board {
    pub fn new(capacity: usize, bottles: Vec<Bottle>) -> Self {
        Self { capacity, bottles }
    }

    pub fn from_layers(capacity: usize, layers: Vec<Vec<ColorId>>) -> Self {
        Self::new(capacity, layers.into_iter().map(Bottle::from_layers).collect())
    }

    /// The sorted board: one full bottle per color followed by `empty` empty bottles.
    pub fn solved(num_colors: u16, empty: usize, capacity: usize) -> Self {
        let mut bottles: Vec<Bottle> = (0..num_colors)
            .map(|color| Bottle::filled(ColorId::new(color), capacity))
            .collect();
        bottles.extend(std::iter::repeat_with(Bottle::new).take(empty));
        Self::new(capacity, bottles)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bottles(&self) -> &[Bottle] {
        &self.bottles
    }

    pub fn bottle(&self, index: usize) -> Option<&Bottle> {
        self.bottles.get(index)
    }

    pub fn len(&self) -> usize {
        self.bottles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bottles.is_empty()
    }

    pub fn empty_bottle_count(&self) -> usize {
        self.bottles.iter().filter(|b| b.is_empty()).count()
    }

    pub(crate) fn bottles_mut(&mut self) -> &mut [Bottle] {
        &mut self.bottles
    }

    /// Moves the top `count` units of `from` onto `to` in a copy of `self`.
    pub(crate) fn transfer(&self, from: usize, to: usize, count: usize) -> Board {
        let mut next = self.clone();
        let bottles = next.bottles_mut();
        if from < bottles.len() && to < bottles.len() {
            let units = bottles[from].take_top(count);
            bottles[to].put_top(units);
        }
        next
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr: Vec<String> = self
            .bottles
            .iter()
            .map(|bottle| bottle.text_representation(self.capacity))
            .collect();
        f.write_str(&repr.join(" "))
    }
}

/// Failure to read a board from its text form.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ParseError {
    #[display("board text contains no bottles")]
    EmptyBoard,
    #[display("bottle {bottle}: invalid color label {label:?}")]
    InvalidColor { bottle: usize, label: String },
    #[display("bottle {bottle}: color above an empty slot")]
    Gap { bottle: usize },
    #[display("bottle {bottle}: expected {expected} slots, found {found}")]
    CapacityMismatch {
        bottle: usize,
        expected: usize,
        found: usize,
    },
}

fn parse_bottle(index: usize, token: &str) -> Result<(Bottle, usize), ParseError> {
    let slots: Vec<String> = if token.contains(',') {
        token.split(',').map(|s| s.trim().to_string()).collect()
    } else {
        token.chars().map(|ch| ch.to_string()).collect()
    };

    let mut layers = Vec::new();
    let mut seen_gap = false;
    for slot in &slots {
        if slot.is_empty() || slot == "." {
            seen_gap = true;
            continue;
        }
        if seen_gap {
            return Err(ParseError::Gap { bottle: index });
        }
        let color = ColorId::from_label(slot).ok_or_else(|| ParseError::InvalidColor {
            bottle: index,
            label: slot.clone(),
        })?;
        layers.push(color);
    }
    Ok((Bottle::from_layers(layers), slots.len()))
}

impl FromStr for Board {
    type Err = ParseError;

    /// Reads `AB.. BA.. ....`-style text: one token per bottle, bottom first,
    /// `.` for free space. Tokens split on whitespace or `/`. The shared token
    /// length is the capacity.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s
            .split(|c: char| c.is_whitespace() || c == '/')
            .filter(|t| !t.is_empty())
            .collect();

        let mut capacity = None;
        let mut bottles = Vec::with_capacity(tokens.len());
        for (index, token) in tokens.iter().enumerate() {
            let (bottle, slots) = parse_bottle(index, token)?;
            match capacity {
                None => capacity = Some(slots),
                Some(expected) if expected != slots => {
                    return Err(ParseError::CapacityMismatch {
                        bottle: index,
                        expected,
                        found: slots,
                    });
                }
                Some(_) => {}
            }
            bottles.push(bottle);
        }

        let capacity = capacity.ok_or(ParseError::EmptyBoard)?;
        Ok(Board::new(capacity, bottles))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[display("easy")]
    Easy,
    #[display("medium")]
    Medium,
    #[display("hard")]
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
}

/// A playable puzzle as supplied by the level catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: u32,
    pub name: String,
    pub difficulty: Difficulty,
    pub board: Board,
}

impl Level {
    pub fn new(id: u32, name: impl Into<String>, difficulty: Difficulty, board: Board) -> Self {
        Self {
            id,
            name: name.into(),
            difficulty,
            board,
        }
    }

    pub fn capacity(&self) -> usize {
        self.board.capacity()
    }
}
