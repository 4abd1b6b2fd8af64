//! Board constants and rule tables
//!
//! Fixed tables for each game variant: the board adjacency graph, the mill
//! lines, the per-square mill-line membership lists, and the per-variant
//! piece count. Squares are numbered 0..23 in the database order (inner
//! ring, middle ring, outer ring, clockwise from 12 o'clock).

use smallvec::SmallVec;

use crate::state::{GameState, EMPTY};

/// Number of board squares.
pub const SQUARES: usize = 24;

/// Successive slide moves after which the game is declared drawn.
pub const IRREVERSIBLE_MOVE_LIMIT: u32 = 50;

/// Game variant selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Nine Men's Morris, 9 pieces per side.
    Standard,
    /// Lasker Morris: placing and sliding phases overlap, 10 pieces.
    Lasker,
    /// Morabaraba: diagonal lines and connections, 12 pieces.
    Morabaraba,
}

impl Variant {
    /// Short name used in database file names.
    pub fn name(self) -> &'static str {
        match self {
            Variant::Standard => "std",
            Variant::Lasker => "lask",
            Variant::Morabaraba => "mora",
        }
    }

    /// Pieces each player gets to place.
    pub fn max_pieces(self) -> u8 {
        match self {
            Variant::Standard => 9,
            Variant::Lasker => 10,
            Variant::Morabaraba => 12,
        }
    }

    /// Parse the short database name.
    pub fn from_name(name: &str) -> Option<Variant> {
        match name {
            "std" => Some(Variant::Standard),
            "lask" => Some(Variant::Lasker),
            "mora" => Some(Variant::Morabaraba),
            _ => None,
        }
    }
}

/// Per-variant rule tables, built once at engine start.
pub struct Rules {
    pub variant: Variant,
    /// Each mill line as a triple of squares. 16 lines for std/Lasker,
    /// 20 for Morabaraba.
    pub mill_lines: Vec<[u8; 3]>,
    /// For each square, the indices of the mill lines through it.
    pub lines_of: [SmallVec<[u8; 4]>; SQUARES],
    /// Full adjacency matrix.
    pub board_graph: [[bool; SQUARES]; SQUARES],
    /// Adjacency lists (up to 4 neighbors per square).
    pub adjacent: [SmallVec<[u8; 4]>; SQUARES],
    /// Pieces each player places during the game.
    pub max_pieces: u8,
}

fn ring_lines() -> Vec<[u8; 3]> {
    // The four lines of the inner ring, repeated on the middle and outer
    // rings, then the four cross-ring spokes.
    let mut lines: Vec<[u8; 3]> = vec![[1, 2, 3], [3, 4, 5], [5, 6, 7], [7, 0, 1]];
    for i in 0..8 {
        let base = lines[i % 4];
        let off = 8 * (1 + i as u8 / 4);
        lines.push([base[0] + off, base[1] + off, base[2] + off]);
    }
    for start in [0u8, 2, 4, 6] {
        lines.push([start, start + 8, start + 16]);
    }
    lines
}

fn diagonal_lines() -> Vec<[u8; 3]> {
    [1u8, 3, 5, 7]
        .iter()
        .map(|&s| [s, s + 8, s + 16])
        .collect()
}

fn build_graph(variant: Variant) -> [[bool; SQUARES]; SQUARES] {
    let mut graph = [[false; SQUARES]; SQUARES];
    let mut connect = |a: usize, b: usize| {
        graph[a][b] = true;
        graph[b][a] = true;
    };

    // Ring edges.
    for ring in 0..3 {
        for i in 0..8 {
            connect(ring * 8 + i, ring * 8 + (i + 1) % 8);
        }
    }

    // Spokes at the even squares; Morabaraba also connects the corners.
    for i in 0..16 {
        if i % 2 == 0 || variant == Variant::Morabaraba {
            connect(i, i + 8);
        }
    }

    graph
}

impl Rules {
    pub fn new(variant: Variant) -> Rules {
        let mut mill_lines = ring_lines();
        if variant == Variant::Morabaraba {
            mill_lines.extend(diagonal_lines());
        }

        let mut lines_of: [SmallVec<[u8; 4]>; SQUARES] =
            std::array::from_fn(|_| SmallVec::new());
        for (li, line) in mill_lines.iter().enumerate() {
            for &sq in line {
                lines_of[sq as usize].push(li as u8);
            }
        }

        let board_graph = build_graph(variant);
        let adjacent: [SmallVec<[u8; 4]>; SQUARES] = std::array::from_fn(|i| {
            (0..SQUARES)
                .filter(|&j| board_graph[i][j])
                .map(|j| j as u8)
                .collect()
        });

        Rules {
            variant,
            mill_lines,
            lines_of,
            board_graph,
            adjacent,
            max_pieces: variant.max_pieces(),
        }
    }

    /// The mill line completed through `sq`, if the stone there is part of
    /// one. With several completed lines the highest line index wins.
    pub fn check_mill(&self, sq: usize, board: &[i8; SQUARES]) -> Option<usize> {
        if board[sq] == EMPTY {
            return None;
        }
        let mut result = None;
        for &li in &self.lines_of[sq] {
            let line = self.mill_lines[li as usize];
            if line.iter().all(|&p| board[p as usize] == board[sq]) {
                result = Some(li as usize);
            }
        }
        result
    }

    /// Whether the side to move has any legal move. Does not handle the
    /// removal-pending case; a removal-pending position always has a move.
    pub fn can_move(&self, s: &GameState) -> bool {
        debug_assert!(!s.removal_pending);
        let stm = s.side_to_move as usize;
        if s.set_stone_count[stm] == self.max_pieces && s.stone_count[stm] > 3 {
            for i in 0..SQUARES {
                if s.board[i] == s.side_to_move as i8 {
                    for &j in &self.adjacent[i] {
                        if s.board[j as usize] == EMPTY {
                            return true;
                        }
                    }
                }
            }
            false
        } else {
            true
        }
    }

    /// True when every stone of the opponent of the side to move stands in a
    /// mill (which lifts the out-of-mill removal restriction).
    pub fn all_opponent_pieces_in_mill(&self, s: &GameState) -> bool {
        let opp = 1 - s.side_to_move as i8;
        for i in 0..SQUARES {
            if s.board[i] == opp && self.check_mill(i, &s.board).is_none() {
                return false;
            }
        }
        true
    }
}
