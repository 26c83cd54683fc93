//! Character sets: the alphabets used to render group badges.
//!
//! DESIGN
//! ======
//! Badges are stored as 0-based integers. `Numbers` renders them 1-based in
//! base 10. Every other alphabet renders them as a bijective numeral in
//! base `len` (the spreadsheet-column progression: `A..Z, AA, AB, ...`),
//! so labels grow without bound as badges grow.
//!
//! On the wire a character set is a plain array of strings. Arrays equal
//! to a built-in alphabet decode to that variant.

use serde::{Deserialize, Serialize};

const NUMBER_SYMBOLS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

const LATIN_SYMBOLS: [&str; 26] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V",
    "W", "X", "Y", "Z",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("character set must contain at least one symbol")]
pub struct EmptyCharacterSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub enum CharacterSet {
    /// Digits `0-9`, rendered as 1-based decimal numbers.
    #[default]
    Numbers,
    /// Letters `A-Z`.
    Latin,
    /// Any other non-empty alphabet.
    Custom(Vec<String>),
}

impl CharacterSet {
    /// Build a character set from raw symbols, collapsing built-ins.
    ///
    /// # Errors
    ///
    /// Returns `EmptyCharacterSet` if `symbols` is empty.
    pub fn custom(symbols: Vec<String>) -> Result<Self, EmptyCharacterSet> {
        if symbols.is_empty() {
            return Err(EmptyCharacterSet);
        }
        let builtin = Self::builtins()
            .into_iter()
            .find(|set| symbols.iter().map(String::as_str).eq(set.symbols()));
        Ok(builtin.unwrap_or(Self::Custom(symbols)))
    }

    /// Built-in alphabets offered to users.
    #[must_use]
    pub fn builtins() -> [Self; 2] {
        [Self::Numbers, Self::Latin]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numbers => NUMBER_SYMBOLS.len(),
            Self::Latin => LATIN_SYMBOLS.len(),
            Self::Custom(symbols) => symbols.len(),
        }
    }

    /// Always false: construction rejects empty alphabets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn symbols(&self) -> impl Iterator<Item = &str> {
        (0..self.len()).map(|index| self.symbol(index))
    }

    fn symbol(&self, index: usize) -> &str {
        match self {
            Self::Numbers => NUMBER_SYMBOLS[index],
            Self::Latin => LATIN_SYMBOLS[index],
            Self::Custom(symbols) => &symbols[index],
        }
    }

    /// Render a 0-based badge as a label in this alphabet.
    #[must_use]
    pub fn label(&self, badge: u32) -> String {
        if matches!(self, Self::Numbers) {
            return (u64::from(badge) + 1).to_string();
        }

        let base = self.len() as u64;
        let mut value = u64::from(badge);
        let mut symbols = Vec::new();
        loop {
            #[allow(clippy::cast_possible_truncation)]
            symbols.push(self.symbol((value % base) as usize));
            if value < base {
                break;
            }
            value = value / base - 1;
        }
        symbols.reverse();
        symbols.concat()
    }
}

impl From<CharacterSet> for Vec<String> {
    fn from(set: CharacterSet) -> Self {
        match set {
            CharacterSet::Numbers => NUMBER_SYMBOLS.iter().map(|s| (*s).to_string()).collect(),
            CharacterSet::Latin => LATIN_SYMBOLS.iter().map(|s| (*s).to_string()).collect(),
            CharacterSet::Custom(symbols) => symbols,
        }
    }
}

impl TryFrom<Vec<String>> for CharacterSet {
    type Error = EmptyCharacterSet;

    fn try_from(symbols: Vec<String>) -> Result<Self, Self::Error> {
        Self::custom(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alphabet(symbols: &[&str]) -> CharacterSet {
        CharacterSet::custom(symbols.iter().map(|s| (*s).to_string()).collect()).unwrap()
    }

    #[test]
    fn numbers_render_one_based() {
        assert_eq!(CharacterSet::Numbers.label(0), "1");
        assert_eq!(CharacterSet::Numbers.label(4), "5");
        assert_eq!(CharacterSet::Numbers.label(u32::MAX), "4294967296");
    }

    #[test]
    fn latin_follows_column_progression() {
        let latin = CharacterSet::Latin;
        assert_eq!(latin.label(0), "A");
        assert_eq!(latin.label(25), "Z");
        assert_eq!(latin.label(26), "AA");
        assert_eq!(latin.label(27), "AB");
        assert_eq!(latin.label(51), "AZ");
        assert_eq!(latin.label(52), "BA");
        assert_eq!(latin.label(701), "ZZ");
        assert_eq!(latin.label(702), "AAA");
    }

    #[test]
    fn two_symbol_alphabet_is_bijective() {
        let xy = alphabet(&["X", "Y"]);
        assert_eq!(xy.label(0), "X");
        assert_eq!(xy.label(1), "Y");
        assert_eq!(xy.label(2), "XX");
        assert_eq!(xy.label(3), "XY");
        assert_eq!(xy.label(5), "YY");
        assert_eq!(xy.label(6), "XXX");

        let labels: std::collections::HashSet<String> = (0..64).map(|b| xy.label(b)).collect();
        assert_eq!(labels.len(), 64);
    }

    #[test]
    fn single_symbol_alphabet_grows_by_repetition() {
        let bang = alphabet(&["!"]);
        assert_eq!(bang.label(0), "!");
        assert_eq!(bang.label(2), "!!!");
    }

    #[test]
    fn custom_collapses_builtins() {
        let digits: Vec<String> = (0..10).map(|d| d.to_string()).collect();
        assert_eq!(CharacterSet::custom(digits).unwrap(), CharacterSet::Numbers);

        let letters: Vec<String> = ('A'..='Z').map(|c| c.to_string()).collect();
        assert_eq!(CharacterSet::custom(letters).unwrap(), CharacterSet::Latin);

        let reversed: Vec<String> = (0..10).rev().map(|d| d.to_string()).collect();
        assert!(matches!(CharacterSet::custom(reversed).unwrap(), CharacterSet::Custom(_)));
    }

    #[test]
    fn custom_rejects_empty() {
        assert_eq!(CharacterSet::custom(Vec::new()), Err(EmptyCharacterSet));
        assert!(serde_json::from_str::<CharacterSet>("[]").is_err());
    }

    #[test]
    fn wire_form_is_symbol_array() {
        let json = serde_json::to_value(CharacterSet::Latin).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(26));

        let parsed: CharacterSet = serde_json::from_str(r#"["a","b","c"]"#).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed.label(3), "aa");
    }

    #[test]
    fn builtins_are_numbers_then_latin() {
        assert_eq!(CharacterSet::builtins(), [CharacterSet::Numbers, CharacterSet::Latin]);
        assert!(!CharacterSet::Latin.is_empty());
    }
}
