use serde::{Deserialize, Serialize};

use crate::core::random::Randomness;

pub const A4_HZ: f32 = 440.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Scale {
    Dorian,
    Aeolian,
    Phrygian,
    Mixolydian,
    Lydian,
    Major,
    Minor,
    Pentatonic,
    PentatonicMinor,
    Japanese,
    Arabian,
    Hungarian,
    WholeTone,
    Chromatic,
}

impl Scale {
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Aeolian | Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Pentatonic => &[0, 2, 4, 7, 9],
            Scale::PentatonicMinor => &[0, 3, 5, 7, 10],
            Scale::Japanese => &[0, 1, 5, 7, 8],
            Scale::Arabian => &[0, 2, 4, 5, 6, 8, 10],
            Scale::Hungarian => &[0, 2, 3, 6, 7, 8, 11],
            Scale::WholeTone => &[0, 2, 4, 6, 8, 10],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    /// Scales that suit a mood value (0 = dark, 1 = bright).
    pub fn candidates_for_mood(mood: f32) -> &'static [Scale] {
        if mood < 0.2 {
            &[Scale::Phrygian, Scale::Aeolian]
        } else if mood < 0.4 {
            &[Scale::Dorian, Scale::Aeolian, Scale::PentatonicMinor]
        } else if mood < 0.6 {
            &[Scale::Dorian, Scale::Mixolydian]
        } else if mood < 0.8 {
            &[Scale::Lydian, Scale::Mixolydian, Scale::Major]
        } else {
            &[Scale::Lydian, Scale::WholeTone, Scale::Pentatonic]
        }
    }

    pub fn for_mood(mood: f32, rng: &mut Randomness) -> Scale {
        rng.choice(Self::candidates_for_mood(mood))
            .copied()
            .unwrap_or(Scale::Dorian)
    }
}

impl std::fmt::Display for Scale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Scale::Dorian => "dorian",
            Scale::Aeolian => "aeolian",
            Scale::Phrygian => "phrygian",
            Scale::Mixolydian => "mixolydian",
            Scale::Lydian => "lydian",
            Scale::Major => "major",
            Scale::Minor => "minor",
            Scale::Pentatonic => "pentatonic",
            Scale::PentatonicMinor => "pentatonic-minor",
            Scale::Japanese => "japanese",
            Scale::Arabian => "arabian",
            Scale::Hungarian => "hungarian",
            Scale::WholeTone => "whole-tone",
            Scale::Chromatic => "chromatic",
        };
        write!(f, "{name}")
    }
}

pub fn midi_to_freq(midi: f32) -> f32 {
    A4_HZ * 2.0f32.powf((midi - 69.0) / 12.0)
}

pub fn freq_to_midi(freq: f32) -> f32 {
    69.0 + 12.0 * (freq / A4_HZ).log2()
}

pub fn midi_to_name(midi: u8) -> String {
    let octave = midi as i32 / 12 - 1;
    format!("{}{octave}", NOTE_NAMES[(midi % 12) as usize])
}

/// Notes of `scale` from `root` over `octaves`, closed by the top octave root.
pub fn scale_notes(root: u8, scale: Scale, octaves: u8) -> Vec<u8> {
    let intervals = scale.intervals();
    let mut notes = Vec::with_capacity(intervals.len() * octaves as usize + 1);
    for oct in 0..octaves {
        for &interval in intervals {
            notes.push(root.saturating_add(interval).saturating_add(oct * 12));
        }
    }
    notes.push(root.saturating_add(octaves.saturating_mul(12)));
    notes
}
