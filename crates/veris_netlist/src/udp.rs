//! User-defined primitive truth tables.
//!
//! A UDP is either combinational (input levels to output bit) or
//! sequential (a finite state machine keyed by the current output and one
//! input edge). Tables are built from source rows whose pattern alphabet
//! includes level, edge, and glob characters:
//!
//! ```text
//!   0 1 x  -- levels
//!   r -- (01)    R -- (x1)    f -- (10)
//!   F -- (x0)    P -- (0x)    N -- (1x)
//!   p -- 01, 0x or x1          n -- 10, 1x or x0
//!   ? -- 0, 1, or x            * -- any edge
//!   + -- 01 or x1              _ -- 10 or x0
//!   % -- 0x or 1x
//! ```
//!
//! Rows are expanded into canonical entries: combinational entries are
//! pure level strings; sequential entries carry the current output in
//! position 0 and exactly one edge among the inputs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output character meaning "no change" for sequential lookups.
pub const UDP_NO_CHANGE: char = '-';

/// A canonical UDP truth table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UdpTable {
    sequential: bool,
    ninputs: u32,
    init: char,
    /// Combinational: level pattern -> output.
    comb: BTreeMap<String, char>,
    /// Sequential: current output + inputs (one edge) -> next output.
    sequ: BTreeMap<String, char>,
}

/// The expansions of one pattern character: levels and/or (from, to)
/// edges.
fn expand_char(c: char) -> Option<(Vec<char>, Vec<(char, char)>)> {
    let levels: Vec<char> = match c {
        '0' | '1' | 'x' => vec![c],
        '?' => vec!['0', '1', 'x'],
        _ => vec![],
    };
    let edges: Vec<(char, char)> = match c {
        'r' => vec![('0', '1')],
        'R' => vec![('x', '1')],
        'f' => vec![('1', '0')],
        'F' => vec![('x', '0')],
        'P' => vec![('0', 'x')],
        'N' => vec![('1', 'x')],
        'p' => vec![('0', '1'), ('0', 'x'), ('x', '1')],
        'n' => vec![('1', '0'), ('1', 'x'), ('x', '0')],
        '+' => vec![('0', '1'), ('x', '1')],
        '_' => vec![('1', '0'), ('x', '0')],
        '%' => vec![('0', 'x'), ('1', 'x')],
        '*' => vec![
            ('0', '1'),
            ('x', '1'),
            ('1', '0'),
            ('x', '0'),
            ('0', 'x'),
            ('1', 'x'),
        ],
        _ => vec![],
    };
    if levels.is_empty() && edges.is_empty() {
        return None;
    }
    Some((levels, edges))
}

/// The canonical single character for an observed edge.
fn edge_char(from: char, to: char) -> char {
    match (from, to) {
        ('0', '1') => 'r',
        ('x', '1') => 'R',
        ('1', '0') => 'f',
        ('x', '0') => 'F',
        ('0', 'x') => 'P',
        ('1', 'x') => 'N',
        // No change or unknown transition.
        _ => to,
    }
}

/// Canonical form of an edge pair.
fn edge_to_char(e: (char, char)) -> char {
    edge_char(e.0, e.1)
}

/// Normalizes z to x; the tables only distinguish levels 0, 1, x.
fn norm_level(c: char) -> char {
    match c {
        'z' | 'Z' | 'X' => 'x',
        other => other,
    }
}

impl UdpTable {
    /// Creates an empty combinational table for `ninputs` input pins.
    pub fn combinational(ninputs: u32) -> Self {
        Self {
            sequential: false,
            ninputs,
            init: 'x',
            comb: BTreeMap::new(),
            sequ: BTreeMap::new(),
        }
    }

    /// Creates an empty sequential table for `ninputs` input pins.
    pub fn sequential(ninputs: u32) -> Self {
        Self {
            sequential: true,
            ninputs,
            init: 'x',
            comb: BTreeMap::new(),
            sequ: BTreeMap::new(),
        }
    }

    /// Returns `true` for a sequential table.
    pub fn is_sequential(&self) -> bool {
        self.sequential
    }

    /// The number of input pins.
    pub fn ninputs(&self) -> u32 {
        self.ninputs
    }

    /// Sets the sequential power-up output value.
    pub fn set_initial(&mut self, init: char) {
        self.init = norm_level(init);
    }

    /// The sequential power-up output value.
    pub fn initial(&self) -> char {
        self.init
    }

    /// Number of canonical entries stored.
    pub fn entry_count(&self) -> usize {
        if self.sequential {
            self.sequ.len()
        } else {
            self.comb.len()
        }
    }

    /// Adds a source row to the table.
    ///
    /// For a combinational table `input` has one character per input pin.
    /// For a sequential table the first character is the current output
    /// and the rest are the input pins; each expanded entry must contain
    /// exactly one edge.
    ///
    /// Returns `false` if the row is malformed or any expanded entry
    /// conflicts with an existing one. In the conflict case the new
    /// output still overrides.
    pub fn set_table(&mut self, input: &str, output: char) -> bool {
        let output = norm_level(output);
        if self.sequential {
            self.set_sequ(input, output)
        } else {
            self.set_comb(input, output)
        }
    }

    fn set_comb(&mut self, input: &str, output: char) -> bool {
        let chars: Vec<char> = input.chars().collect();
        if chars.len() != self.ninputs as usize {
            return false;
        }
        let mut ok = true;
        let mut patterns = vec![String::new()];
        for &c in &chars {
            let Some((levels, edges)) = expand_char(norm_level(c)) else {
                return false;
            };
            // Level-sensitive tables admit no edges.
            if !edges.is_empty() {
                return false;
            }
            let mut next = Vec::with_capacity(patterns.len() * levels.len());
            for p in &patterns {
                for &l in &levels {
                    let mut q = p.clone();
                    q.push(l);
                    next.push(q);
                }
            }
            patterns = next;
        }
        for p in patterns {
            if let Some(&old) = self.comb.get(&p) {
                if old != output {
                    ok = false;
                }
            }
            self.comb.insert(p, output);
        }
        ok
    }

    fn set_sequ(&mut self, input: &str, output: char) -> bool {
        let chars: Vec<char> = input.chars().collect();
        if chars.len() != self.ninputs as usize + 1 {
            return false;
        }
        let Some((cur_levels, cur_edges)) = expand_char(norm_level(chars[0])) else {
            return false;
        };
        if !cur_edges.is_empty() {
            return false;
        }

        // Expand input positions; each partial pattern tracks whether an
        // edge has been placed yet.
        let mut patterns: Vec<(String, bool)> = cur_levels
            .iter()
            .map(|&c| (c.to_string(), false))
            .collect();
        for &c in &chars[1..] {
            let Some((levels, edges)) = expand_char(norm_level(c)) else {
                return false;
            };
            let mut next = Vec::new();
            for (p, has_edge) in &patterns {
                for &l in &levels {
                    let mut q = p.clone();
                    q.push(l);
                    next.push((q, *has_edge));
                }
                if !*has_edge {
                    for &e in &edges {
                        let mut q = p.clone();
                        q.push(edge_to_char(e));
                        next.push((q, true));
                    }
                }
            }
            patterns = next;
        }

        let mut ok = true;
        let mut inserted = 0usize;
        for (p, has_edge) in patterns {
            // Canonical sequential entries carry exactly one edge.
            if !has_edge {
                continue;
            }
            if let Some(&old) = self.sequ.get(&p) {
                if old != output {
                    ok = false;
                }
            }
            self.sequ.insert(p, output);
            inserted += 1;
        }
        ok && inserted > 0
    }

    /// Looks up a combinational output for the given input levels.
    ///
    /// Z reads as X; a missing entry yields `'x'`.
    pub fn lookup_comb(&self, levels: &str) -> char {
        let key: String = levels.chars().map(norm_level).collect();
        self.comb.get(&key).copied().unwrap_or('x')
    }

    /// Looks up the next sequential output.
    ///
    /// `prev_inputs` holds the input levels before the change, `pin` is
    /// the input that changed, `new_val` its new level, and `cur_out` the
    /// current output. A missing entry yields [`UDP_NO_CHANGE`].
    pub fn lookup_sequ(&self, prev_inputs: &str, pin: usize, new_val: char, cur_out: char) -> char {
        let mut key = String::with_capacity(self.ninputs as usize + 1);
        key.push(norm_level(cur_out));
        for (i, c) in prev_inputs.chars().enumerate() {
            if i == pin {
                key.push(edge_char(norm_level(c), norm_level(new_val)));
            } else {
                key.push(norm_level(c));
            }
        }
        self.sequ.get(&key).copied().unwrap_or(UDP_NO_CHANGE)
    }
}
