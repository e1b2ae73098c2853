//! # Chord Module
//!
//! Chord inference from a histogram of detected pitch classes, plus the table
//! that maps free-text vision-classifier labels onto chord names.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::tuning::{Note, PitchClass};

/// Number of most frequent pitch classes kept as evidence.
pub const EVIDENCE_SIZE: usize = 3;

/// A named triad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordPattern {
    pub name: String,
    pub members: [PitchClass; 3],
}

impl ChordPattern {
    pub fn new(name: &str, members: [PitchClass; 3]) -> Self {
        Self {
            name: name.to_string(),
            members,
        }
    }

    /// How many members of this triad appear in `evidence`.
    pub fn matches(&self, evidence: &[PitchClass]) -> usize {
        self.members
            .iter()
            .filter(|member| evidence.contains(member))
            .count()
    }
}

/// The chord library in declared (matching) order.
static CHORD_LIBRARY: Lazy<Vec<ChordPattern>> = Lazy::new(|| {
    use PitchClass::*;
    vec![
        ChordPattern::new("A", [A, CSharp, E]),
        ChordPattern::new("Am", [A, C, E]),
        ChordPattern::new("Bm", [B, D, FSharp]),
        ChordPattern::new("C", [C, E, G]),
        ChordPattern::new("D", [D, FSharp, A]),
        ChordPattern::new("Dm", [D, F, A]),
        ChordPattern::new("E", [E, GSharp, B]),
        ChordPattern::new("Em", [E, G, B]),
        ChordPattern::new("F", [F, A, C]),
        ChordPattern::new("Fm", [F, GSharp, C]),
        ChordPattern::new("G", [G, B, D]),
    ]
});

/// The built-in chord library.
pub fn chord_library() -> &'static [ChordPattern] {
    &CHORD_LIBRARY
}

/// Outcome of chord inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "chord", rename_all = "kebab-case")]
pub enum ChordInference {
    /// A pattern matched, either fully or partially.
    Chord(String),
    /// Notes were heard but no pattern matched.
    Unresolved,
    /// Nothing usable was heard.
    NoEvidence,
}

impl ChordInference {
    pub fn chord(&self) -> Option<&str> {
        match self {
            ChordInference::Chord(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ChordInference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChordInference::Chord(name) => f.write_str(name),
            ChordInference::Unresolved => f.write_str("unresolved"),
            ChordInference::NoEvidence => f.write_str("no evidence"),
        }
    }
}

/// Counts detected notes by pitch class, octave discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteHistogram {
    /// (pitch class, count) in order of first appearance.
    counts: Vec<(PitchClass, usize)>,
    notes: Vec<Note>,
}

impl NoteHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, note: Note) {
        self.notes.push(note);
        match self
            .counts
            .iter_mut()
            .find(|(pc, _)| *pc == note.pitch_class)
        {
            Some((_, count)) => *count += 1,
            None => self.counts.push((note.pitch_class, 1)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Every note that was tallied, in arrival order.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn count(&self, pitch_class: PitchClass) -> usize {
        self.counts
            .iter()
            .find(|(pc, _)| *pc == pitch_class)
            .map_or(0, |(_, count)| *count)
    }

    /// Up to `EVIDENCE_SIZE` most frequent pitch classes; equal counts keep
    /// first-appearance order.
    pub fn top_pitch_classes(&self) -> Vec<PitchClass> {
        let mut ranked = self.counts.clone();
        // Stable sort keeps first-appearance order among ties.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
            .into_iter()
            .take(EVIDENCE_SIZE)
            .map(|(pc, _)| pc)
            .collect()
    }
}

/// Matches evidence against a pattern library.
///
/// First pass: the first pattern in `library` order whose members are all
/// present. Second pass: the first pattern with at least `min_partial`
/// members present.
pub fn infer_chord(
    evidence: &[PitchClass],
    library: &[ChordPattern],
    min_partial: usize,
) -> ChordInference {
    if evidence.is_empty() {
        return ChordInference::NoEvidence;
    }
    let exact = library
        .iter()
        .find(|pattern| pattern.matches(evidence) == pattern.members.len());
    let partial = || {
        library
            .iter()
            .find(|pattern| pattern.matches(evidence) >= min_partial)
    };
    exact
        .or_else(partial)
        .map(|pattern| ChordInference::Chord(pattern.name.clone()))
        .unwrap_or(ChordInference::Unresolved)
}

/// Chord names the vision classifier can report, matching the library.
const VISION_CHORDS: [&str; 11] = ["A", "Am", "Bm", "C", "D", "Dm", "E", "Em", "F", "Fm", "G"];

/// Normalized vision-classifier labels mapped to chord names.
///
/// Each chord is reachable by its uppercased name ("AM") and by spelled-out
/// quality forms ("A MINOR", "A_MIN", "G-MAJOR", ...).
static VISION_LABELS: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let mut table = HashMap::new();
    for name in VISION_CHORDS {
        let (root, qualities): (&str, &[&str]) = match name.strip_suffix('m') {
            Some(root) => (root, &["MINOR", "MIN"]),
            None => (name, &["MAJOR", "MAJ"]),
        };
        table.insert(name.to_uppercase(), name);
        for quality in qualities {
            for sep in ["", " ", "_", "-"] {
                table.insert(format!("{root}{sep}{quality}"), name);
            }
        }
    }
    table
});

/// Maps a raw classifier label onto a chord name.
///
/// The label is trimmed and uppercased first; unrecognized labels yield `None`.
pub fn chord_from_label(raw: &str) -> Option<&'static str> {
    let normalized = raw.trim().to_uppercase();
    VISION_LABELS.get(&normalized).copied()
}
