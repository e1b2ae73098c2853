//! # Musical Tuning Module
//!
//! Equal-temperament note handling for guitar tuning and chord analysis.
//! It converts frequencies to the nearest note and back, parses note names
//! (flat spellings included), and holds the tuning presets a player can select.
//!
//! ## Features
//! - 12-tone equal temperament with A4 = 440 Hz
//! - Sharp-only pitch class table with enharmonic normalization of flats
//! - Cent deviation calculations for tuning accuracy
//! - Built-in six-string presets plus validated custom presets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, NoteError};

/// Reference pitch for A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;
/// MIDI note number of A4.
const A4_NOTE_NUMBER: i32 = 69;

/// One of the 12 pitch classes, spelled with sharps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    /// All pitch classes in table order, starting at C.
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitone index above C (0-11).
    pub fn index(self) -> i32 {
        self as i32
    }

    /// Pitch class for any semitone count, wrapping modulo 12.
    pub fn from_index(index: i32) -> Self {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    /// Parses a spelling into a letter offset and accidental, without wrapping.
    ///
    /// "Cb" yields -1 so that note parsing can carry the octave correctly.
    fn semitones_from_c(spelling: &str) -> Result<i32, NoteError> {
        let mut chars = spelling.chars();
        let letter = chars
            .next()
            .ok_or_else(|| NoteError::UnknownPitchClass(spelling.to_string()))?;
        let base = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(NoteError::UnknownPitchClass(spelling.to_string())),
        };
        let accidental = match chars.as_str() {
            "" => 0,
            "#" | "♯" => 1,
            "b" | "♭" => -1,
            _ => return Err(NoteError::UnknownPitchClass(spelling.to_string())),
        };
        Ok(base + accidental)
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = NoteError;

    /// Accepts sharp and flat spellings; flats map to their sharp equivalent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PitchClass::semitones_from_c(s.trim()).map(PitchClass::from_index)
    }
}

/// A pitch class together with its scientific-pitch octave (e.g. "E2").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i32,
}

impl Note {
    pub fn new(pitch_class: PitchClass, octave: i32) -> Self {
        Self {
            pitch_class,
            octave,
        }
    }

    /// Builds a note from its MIDI note number (A4 = 69).
    pub fn from_note_number(number: i32) -> Self {
        Self {
            pitch_class: PitchClass::from_index(number),
            octave: number.div_euclid(12) - 1,
        }
    }

    /// MIDI note number of this note (C4 = 60).
    pub fn note_number(&self) -> i32 {
        (self.octave + 1) * 12 + self.pitch_class.index()
    }

    /// Equal-temperament frequency in Hz.
    pub fn frequency(&self) -> f32 {
        A4_FREQUENCY * 2.0_f32.powf((self.note_number() - A4_NOTE_NUMBER) as f32 / 12.0)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

impl FromStr for Note {
    type Err = NoteError;

    /// Parses names such as "E2", "G#3", "Bb3" or "C-1".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .char_indices()
            .skip(1)
            .find(|(_, c)| c.is_ascii_digit() || *c == '-')
            .map(|(i, _)| i)
            .ok_or_else(|| NoteError::InvalidOctave(s.to_string()))?;
        let (spelling, octave) = s.split_at(split);
        let octave: i32 = octave
            .parse()
            .map_err(|_| NoteError::InvalidOctave(s.to_string()))?;
        let semitones = PitchClass::semitones_from_c(spelling)?;
        // Spellings like "Cb4" or "B#3" cross an octave boundary.
        Ok(Note::from_note_number((octave + 1) * 12 + semitones))
    }
}

impl TryFrom<String> for Note {
    type Error = NoteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Note> for String {
    fn from(note: Note) -> Self {
        note.to_string()
    }
}

/// Finds the closest equal-temperament note to a given frequency.
///
/// # Returns
/// * `Ok(note)` - Nearest note, rounding the fractional note number
/// * `Err(NoteError::InvalidFrequency)` - Frequency is not finite and positive
pub fn frequency_to_note(freq: f32) -> Result<Note, NoteError> {
    if !freq.is_finite() || freq <= 0.0 {
        return Err(NoteError::InvalidFrequency(freq));
    }
    let note_number = 12.0 * (freq / A4_FREQUENCY).log2() + A4_NOTE_NUMBER as f32;
    Ok(Note::from_note_number(note_number.round() as i32))
}

/// Converts a note name such as "A4" or "Bb3" to its frequency in Hz.
pub fn note_to_frequency(name: &str) -> Result<f32, NoteError> {
    name.parse::<Note>().map(|note| note.frequency())
}

/// Finds the nearest note to a frequency along with that note's exact frequency.
pub fn find_nearest_note(freq: f32) -> Result<(Note, f32), NoteError> {
    let note = frequency_to_note(freq)?;
    Ok((note, note.frequency()))
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values are flat; 100 cents is one semitone.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Name of the preset selected when nothing else is configured.
pub const DEFAULT_PRESET: &str = "Standard";

/// Built-in six-string presets, lowest string first.
const BUILTIN_PRESETS: [(&str, [&str; 6]); 5] = [
    ("Standard", ["E2", "A2", "D3", "G3", "B3", "E4"]),
    ("Half-Step Down", ["Eb2", "Ab2", "Db3", "Gb3", "Bb3", "Eb4"]),
    ("Drop D", ["D2", "A2", "D3", "G3", "B3", "E4"]),
    ("Open E", ["E2", "B2", "E3", "G#3", "B3", "E4"]),
    ("DADGAD", ["D2", "A2", "D3", "G3", "A3", "D4"]),
];

/// A named, ordered list of target notes, one per string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningPreset {
    pub name: String,
    pub strings: Vec<Note>,
}

/// Raw preset entries as written in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetDefinition {
    pub name: String,
    pub strings: Vec<String>,
}

impl TuningPreset {
    /// Builds a preset, rejecting any entry that is not a valid note name.
    pub fn new<S: AsRef<str>>(name: &str, entries: &[S]) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyPreset(name.to_string()));
        }
        let strings = entries
            .iter()
            .map(|entry| {
                entry
                    .as_ref()
                    .parse::<Note>()
                    .map_err(|source| ConfigError::InvalidPresetEntry {
                        preset: name.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            strings,
        })
    }

    /// The built-in presets in declaration order.
    pub fn builtin() -> Result<Vec<TuningPreset>, ConfigError> {
        BUILTIN_PRESETS
            .iter()
            .map(|(name, entries)| TuningPreset::new(name, entries))
            .collect()
    }

    /// Standard EADGBE tuning.
    pub fn standard() -> Result<TuningPreset, ConfigError> {
        Self::find(DEFAULT_PRESET, &[])
    }

    /// Looks a preset up by name, custom definitions first, then built-ins.
    pub fn find(name: &str, custom: &[PresetDefinition]) -> Result<TuningPreset, ConfigError> {
        if let Some(def) = custom.iter().find(|d| d.name == name) {
            return TuningPreset::new(&def.name, &def.strings);
        }
        BUILTIN_PRESETS
            .iter()
            .find(|(preset_name, _)| *preset_name == name)
            .map(|(preset_name, entries)| TuningPreset::new(preset_name, entries))
            .unwrap_or_else(|| Err(ConfigError::UnknownPreset(name.to_string())))
    }

    /// Index of a string by note name, accepting flat or sharp spellings.
    pub fn string_index(&self, name: &str) -> Result<usize, ConfigError> {
        let note: Note = name.parse()?;
        self.strings
            .iter()
            .position(|s| *s == note)
            .ok_or_else(|| ConfigError::StringNotInPreset {
                preset: self.name.clone(),
                string: name.to_string(),
            })
    }
}
