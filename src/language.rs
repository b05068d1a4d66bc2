/*!
 * Supported languages and the writing scripts they use.
 *
 * Languages are a closed set with upper-case two-letter codes (`ZH`, `EN`,
 * ...). Each one maps to the scripts a correct translation into it may
 * contain, which is what residue detection is built on.
 */

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A language the translator can work from or into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    Zh,
    En,
    Ja,
    Ko,
    Ru,
    Ar,
    De,
    Fr,
    Pl,
    Es,
    It,
    Pt,
    Hu,
    Tr,
    Th,
    Id,
    Vi,
}

/// A writing script that can be recognised in text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    Han,
    Hiragana,
    Katakana,
    Hangul,
    Cyrillic,
    Arabic,
    Thai,
    Latin,
}

static HAN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Han}").unwrap());
static HIRAGANA_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Hiragana}").unwrap());
static KATAKANA_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Katakana}").unwrap());
static HANGUL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Hangul}").unwrap());
static CYRILLIC_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Cyrillic}").unwrap());
static ARABIC_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Arabic}").unwrap());
static THAI_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Thai}").unwrap());
static LATIN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Latin}").unwrap());

impl Script {
    fn regex(&self) -> &'static Regex {
        match self {
            Self::Han => &HAN_REGEX,
            Self::Hiragana => &HIRAGANA_REGEX,
            Self::Katakana => &KATAKANA_REGEX,
            Self::Hangul => &HANGUL_REGEX,
            Self::Cyrillic => &CYRILLIC_REGEX,
            Self::Arabic => &ARABIC_REGEX,
            Self::Thai => &THAI_REGEX,
            Self::Latin => &LATIN_REGEX,
        }
    }

    /// Iterate over every character of `text` written in this script
    pub fn find_chars<'a>(&self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.regex().find_iter(text).map(|m| m.as_str())
    }

    /// Whether `text` contains at least one character of this script
    pub fn is_present(&self, text: &str) -> bool {
        self.regex().is_match(text)
    }
}

impl Language {
    /// All supported languages
    pub const ALL: [Language; 17] = [
        Self::Zh,
        Self::En,
        Self::Ja,
        Self::Ko,
        Self::Ru,
        Self::Ar,
        Self::De,
        Self::Fr,
        Self::Pl,
        Self::Es,
        Self::It,
        Self::Pt,
        Self::Hu,
        Self::Tr,
        Self::Th,
        Self::Id,
        Self::Vi,
    ];

    /// Upper-case code as used in configuration
    pub fn code(&self) -> &'static str {
        match self {
            Self::Zh => "ZH",
            Self::En => "EN",
            Self::Ja => "JA",
            Self::Ko => "KO",
            Self::Ru => "RU",
            Self::Ar => "AR",
            Self::De => "DE",
            Self::Fr => "FR",
            Self::Pl => "PL",
            Self::Es => "ES",
            Self::It => "IT",
            Self::Pt => "PT",
            Self::Hu => "HU",
            Self::Tr => "TR",
            Self::Th => "TH",
            Self::Id => "ID",
            Self::Vi => "VI",
        }
    }

    /// English display name, resolved through ISO 639-1
    pub fn name(&self) -> String {
        let iso = self.code().to_lowercase();
        isolang::Language::from_639_1(&iso)
            .map(|lang| lang.to_name().to_string())
            .unwrap_or_else(|| self.code().to_string())
    }

    /// Scripts a text written in this language is expected to use
    pub fn scripts(&self) -> &'static [Script] {
        match self {
            Self::Zh => &[Script::Han],
            Self::Ja => &[Script::Hiragana, Script::Katakana, Script::Han],
            Self::Ko => &[Script::Hangul],
            Self::Ru => &[Script::Cyrillic],
            Self::Ar => &[Script::Arabic],
            Self::Th => &[Script::Thai],
            _ => &[Script::Latin],
        }
    }

    /// Scripts that should not survive a translation from `self` into `target`
    ///
    /// Source scripts shared with the target are excluded, so Japanese into
    /// Chinese only flags kana and Chinese into Japanese flags nothing.
    pub fn residue_scripts(&self, target: Language) -> Vec<Script> {
        let allowed = target.scripts();
        self.scripts()
            .iter()
            .filter(|script| !allowed.contains(script))
            .copied()
            .collect()
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_uppercase();
        Self::ALL
            .iter()
            .find(|lang| lang.code() == code)
            .copied()
            .ok_or_else(|| anyhow!("Unsupported language code: {}", s))
    }
}
