//! Languages and their allowed-word alphabets.
//!
//! Each language accepts words of the shape `^(start)(middle)*(end)$` over its
//! own lower-case alphabet, where the middle part may also contain hyphens.

use std::collections::HashMap;
use std::fmt;

use fancy_regex::Regex;
use tracing::warn;

const EN: &str = "a-z";
const FR: &str = "a-zàâæçéèêëîïôœùûüÿ";
const DE_START: &str = "a-zäöü";
const DE: &str = "a-zäöüß";
const NL: &str = "a-zéèëç";
const ES: &str = "a-záéíóúüñ";
const PT: &str = "a-záâãàçéêíóôõú";
const IT: &str = "a-zàèéìíîòóùú";
const NORTH_GERMANIC: &str = "a-zæøå";
const SV: &str = "a-zåäö";
const IS_START: &str = "a-záéíóúýþæö";
const IS: &str = "a-záéíóúýþæöð";
const PL: &str = "a-ząćęłńóśźż";
const CS: &str = "a-záčďéěíňóřšťůýž";
const SOUTH_SLAVIC: &str = "a-zčćđšž";
const HU: &str = "a-záéíóöőúüű";
const RO: &str = "a-zăâîșț";
const SQ: &str = "a-zëç";
const GA: &str = "a-záéíóú";
const GD: &str = "a-zàèìòù";
const CY: &str = "a-zâêîôûŷ";
const MT: &str = "a-zċġħż";
const TR: &str = "a-zçğıöşü";

/// A playable language identified by its ISO-639-1 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    English,
    French,
    German,
    Dutch,
    Luxembourgish,
    Spanish,
    Portuguese,
    Italian,
    Catalan,
    Galician,
    Danish,
    Norwegian,
    Swedish,
    Icelandic,
    Faroese,
    Polish,
    Czech,
    Slovak,
    Slovene,
    Croatian,
    Bosnian,
    Serbian,
    Hungarian,
    Romanian,
    Albanian,
    Irish,
    ScottishGaelic,
    Welsh,
    Breton,
    Basque,
    Maltese,
    Turkish,
}

impl Language {
    pub const ALL: [Language; 32] = [
        Language::English,
        Language::French,
        Language::German,
        Language::Dutch,
        Language::Luxembourgish,
        Language::Spanish,
        Language::Portuguese,
        Language::Italian,
        Language::Catalan,
        Language::Galician,
        Language::Danish,
        Language::Norwegian,
        Language::Swedish,
        Language::Icelandic,
        Language::Faroese,
        Language::Polish,
        Language::Czech,
        Language::Slovak,
        Language::Slovene,
        Language::Croatian,
        Language::Bosnian,
        Language::Serbian,
        Language::Hungarian,
        Language::Romanian,
        Language::Albanian,
        Language::Irish,
        Language::ScottishGaelic,
        Language::Welsh,
        Language::Breton,
        Language::Basque,
        Language::Maltese,
        Language::Turkish,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::French => "fr",
            Language::German => "de",
            Language::Dutch => "nl",
            Language::Luxembourgish => "lb",
            Language::Spanish => "es",
            Language::Portuguese => "pt",
            Language::Italian => "it",
            Language::Catalan => "ca",
            Language::Galician => "gl",
            Language::Danish => "da",
            Language::Norwegian => "no",
            Language::Swedish => "sv",
            Language::Icelandic => "is",
            Language::Faroese => "fo",
            Language::Polish => "pl",
            Language::Czech => "cs",
            Language::Slovak => "sk",
            Language::Slovene => "sl",
            Language::Croatian => "hr",
            Language::Bosnian => "bs",
            Language::Serbian => "sr",
            Language::Hungarian => "hu",
            Language::Romanian => "ro",
            Language::Albanian => "sq",
            Language::Irish => "ga",
            Language::ScottishGaelic => "gd",
            Language::Welsh => "cy",
            Language::Breton => "br",
            Language::Basque => "eu",
            Language::Maltese => "mt",
            Language::Turkish => "tr",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_lowercase();
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    /// Parse a comma or whitespace separated list of codes, e.g. "en, de".
    pub fn parse_list(codes: &str) -> Result<Vec<Self>, String> {
        let mut languages = Vec::new();
        for code in codes.split(|c: char| c == ',' || c.is_whitespace()).filter(|c| !c.is_empty()) {
            let language = Self::from_code(code).ok_or_else(|| code.to_string())?;
            if !languages.contains(&language) {
                languages.push(language);
            }
        }
        Ok(languages)
    }

    /// Character classes for the first, middle and last letter.
    fn classes(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Language::English => (EN, EN, EN),
            Language::French | Language::Catalan | Language::Galician | Language::Breton => (FR, FR, FR),
            Language::German | Language::Luxembourgish => (DE_START, DE, DE),
            Language::Dutch => (NL, NL, NL),
            Language::Spanish | Language::Basque => (ES, ES, ES),
            Language::Portuguese => (PT, PT, PT),
            Language::Italian => (IT, IT, IT),
            Language::Danish | Language::Norwegian => (NORTH_GERMANIC, NORTH_GERMANIC, NORTH_GERMANIC),
            Language::Swedish => (SV, SV, SV),
            Language::Icelandic | Language::Faroese => (IS_START, IS, IS),
            Language::Polish => (PL, PL, PL),
            Language::Czech | Language::Slovak => (CS, CS, CS),
            Language::Slovene | Language::Croatian | Language::Bosnian | Language::Serbian => {
                (SOUTH_SLAVIC, SOUTH_SLAVIC, SOUTH_SLAVIC)
            }
            Language::Hungarian => (HU, HU, HU),
            Language::Romanian => (RO, RO, RO),
            Language::Albanian => (SQ, SQ, SQ),
            Language::Irish => (GA, GA, GA),
            Language::ScottishGaelic => (GD, GD, GD),
            Language::Welsh => (CY, CY, CY),
            Language::Maltese => (MT, MT, MT),
            Language::Turkish => (TR, TR, TR),
        }
    }

    /// Allowed-word pattern for this language.
    pub fn word_pattern(self) -> String {
        let (start, middle, end) = self.classes();
        // Swedish words never contain hyphens.
        let middle = if self == Language::Swedish {
            format!("[{}]", middle)
        } else {
            format!("[-]|[{}]", middle)
        };
        format!("^([{}])({})*([{}])$", start, middle, end)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Compiled allowed-word patterns for every language.
#[derive(Debug, Clone)]
pub struct Alphabets {
    patterns: HashMap<Language, Regex>,
}

impl Alphabets {
    /// Compile the patterns of all languages. A pattern that fails to compile
    /// is logged and that language then rejects every word.
    pub fn new() -> Self {
        let patterns = Language::ALL
            .into_iter()
            .filter_map(|language| match Regex::new(&language.word_pattern()) {
                Ok(regex) => Some((language, regex)),
                Err(e) => {
                    warn!("Invalid word pattern for language '{}': {}", language, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// Whether `word` is spelled entirely in the alphabet of `language`.
    pub fn accepts(&self, language: Language, word: &str) -> bool {
        self.patterns.get(&language).is_some_and(|regex| {
            regex.is_match(word).unwrap_or_else(|e| {
                warn!("Regex match error for language '{}': {}", language, e);
                false
            })
        })
    }

    /// Languages among `candidates` that accept `word`, in candidate order.
    pub fn matching(&self, candidates: &[Language], word: &str) -> Vec<Language> {
        candidates
            .iter()
            .copied()
            .filter(|&language| self.accepts(language, word))
            .collect()
    }

    /// Whether `word` could be a word of any of `candidates`, ignoring length.
    ///
    /// Single letters are spelled-correctly but never match the full pattern,
    /// which needs at least two characters.
    pub fn is_legal(&self, candidates: &[Language], word: &str) -> bool {
        if word.chars().count() == 1 {
            let doubled = format!("{word}{word}");
            return !self.matching(candidates, &doubled).is_empty();
        }
        !self.matching(candidates, word).is_empty()
    }
}

impl Default for Alphabets {
    fn default() -> Self {
        Self::new()
    }
}
