//! Page language classification
//!
//! Detection is an ordered chain of pure detectors over a closed set of
//! supported languages. The first detector returning a language wins; pages no
//! detector recognizes land in the [`Language::Other`] partition.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

/// Supported language partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    El,
    En,
    Fr,
    De,
    Es,
    It,
    /// Residual partition for unrecognized or undetectable languages
    Other,
}

impl Language {
    /// Languages a detector may return, in tie-break order
    pub const SUPPORTED: [Language; 6] = [
        Language::El,
        Language::En,
        Language::Fr,
        Language::De,
        Language::Es,
        Language::It,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Language::El => "el",
            Language::En => "en",
            Language::Fr => "fr",
            Language::De => "de",
            Language::Es => "es",
            Language::It => "it",
            Language::Other => "other",
        }
    }

    /// English name used in prompts
    pub fn name(&self) -> &'static str {
        match self {
            Language::El => "Greek",
            Language::En => "English",
            Language::Fr => "French",
            Language::De => "German",
            Language::Es => "Spanish",
            Language::It => "Italian",
            Language::Other => "English",
        }
    }

    /// Map a BCP 47 style tag (`en-US`, `el_GR`) onto a supported language
    pub fn from_tag(tag: &str) -> Option<Language> {
        let primary = tag
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::SUPPORTED
            .into_iter()
            .find(|lang| lang.code() == primary)
    }

    fn stop_words(&self) -> &'static [&'static str] {
        match self {
            Language::El => &["και", "είναι", "για", "από", "στο", "στη", "με", "που", "αυτό", "μας", "σας"],
            Language::En => &["the", "and", "for", "are", "with", "this", "that", "from", "they", "have"],
            Language::Fr => &["le", "et", "dans", "les", "des", "est", "pour", "une", "avec", "sur"],
            Language::De => &["der", "die", "und", "den", "von", "zu", "das", "mit", "sich", "nicht"],
            Language::Es => &["el", "que", "los", "las", "por", "una", "con", "para", "es", "del"],
            Language::It => &["il", "che", "per", "non", "una", "della", "sono", "gli", "con", "del"],
            Language::Other => &[],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "other" => Ok(Language::Other),
            code => Language::SUPPORTED
                .into_iter()
                .find(|lang| lang.code() == code)
                .ok_or_else(|| {
                    format!(
                        "unsupported language '{}', expected one of: el, en, fr, de, es, it",
                        s
                    )
                }),
        }
    }
}

/// Inputs available to the detectors
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    /// Value of the `<html lang>` attribute
    pub lang_attribute: Option<&'a str>,
    pub url: &'a Url,
    /// Visible text of the page
    pub text: &'a str,
}

type Detector = fn(&DetectionInput<'_>) -> Option<Language>;

/// Detectors in precedence order
const DETECTORS: &[(&str, Detector)] = &[
    ("html-lang", from_lang_attribute),
    ("url-path", from_url_path),
    ("content", from_content),
];

/// Minimum number of distinct stop words before the content detector commits
const STOP_WORD_THRESHOLD: usize = 3;

/// Classify a page, falling back to [`Language::Other`]
pub fn detect_language(input: &DetectionInput<'_>) -> Language {
    DETECTORS
        .iter()
        .find_map(|(name, detector)| {
            detector(input).inspect(|lang| {
                tracing::trace!(detector = name, language = %lang, url = %input.url, "language detected")
            })
        })
        .unwrap_or(Language::Other)
}

fn from_lang_attribute(input: &DetectionInput<'_>) -> Option<Language> {
    input.lang_attribute.and_then(Language::from_tag)
}

fn from_url_path(input: &DetectionInput<'_>) -> Option<Language> {
    static SEGMENT: OnceLock<Regex> = OnceLock::new();
    let segment = SEGMENT.get_or_init(|| {
        Regex::new(r"(?i)(?:^|/)(el|gr|en|fr|de|es|it)(?:/|$)").expect("valid language segment regex")
    });

    let path = input.url.path();
    let code = segment.captures(path)?.get(1)?.as_str().to_ascii_lowercase();
    match code.as_str() {
        "gr" => Some(Language::El),
        other => Language::from_tag(other),
    }
}

fn from_content(input: &DetectionInput<'_>) -> Option<Language> {
    let letters = input.text.chars().filter(|c| c.is_alphabetic()).count();
    if letters == 0 {
        return None;
    }

    let greek = input
        .text
        .chars()
        .filter(|c| matches!(c, '\u{0370}'..='\u{03FF}' | '\u{1F00}'..='\u{1FFF}'))
        .count();
    if greek * 10 >= letters * 3 {
        return Some(Language::El);
    }

    let words: Vec<String> = input
        .text
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();

    let (best, score) = Language::SUPPORTED
        .into_iter()
        .map(|lang| {
            let hits = lang
                .stop_words()
                .iter()
                .filter(|stop| words.iter().any(|w| w == *stop))
                .count();
            (lang, hits)
        })
        .fold((Language::Other, 0), |best, candidate| {
            if candidate.1 > best.1 { candidate } else { best }
        });

    (score >= STOP_WORD_THRESHOLD).then_some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(lang: Option<&str>, url: &str, text: &str) -> Language {
        let url = Url::parse(url).unwrap();
        detect_language(&DetectionInput {
            lang_attribute: lang,
            url: &url,
            text,
        })
    }

    #[test]
    fn test_lang_attribute_wins() {
        assert_eq!(detect(Some("el-GR"), "https://example.com/en/page", "the and for"), Language::El);
        assert_eq!(detect(Some("DE"), "https://example.com/", ""), Language::De);
    }

    #[test]
    fn test_unrecognized_lang_attribute_falls_through() {
        assert_eq!(detect(Some("ru"), "https://example.com/fr/accueil", ""), Language::Fr);
    }

    #[test]
    fn test_url_path_segment() {
        assert_eq!(detect(None, "https://example.com/gr/products", ""), Language::El);
        assert_eq!(detect(None, "https://example.com/es", ""), Language::Es);
        // Segments must be whole path components
        assert_eq!(detect(None, "https://example.com/entry/demo", ""), Language::Other);
    }

    #[test]
    fn test_content_heuristics() {
        assert_eq!(
            detect(None, "https://example.com/", "Καλώς ήρθατε στο κατάστημά μας"),
            Language::El
        );
        assert_eq!(
            detect(
                None,
                "https://example.com/",
                "This is the shop for people that have taste and style"
            ),
            Language::En
        );
        assert_eq!(
            detect(
                None,
                "https://example.com/",
                "Der Laden und die Werkstatt sind mit dem Bus zu erreichen"
            ),
            Language::De
        );
    }

    #[test]
    fn test_fallback_other() {
        assert_eq!(detect(None, "https://example.com/", "12345 ---"), Language::Other);
        assert_eq!(detect(None, "https://example.com/", "lorem ipsum"), Language::Other);
    }

    #[test]
    fn test_parse_language() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert_eq!("other".parse::<Language>().unwrap(), Language::Other);
        assert!("pt".parse::<Language>().is_err());
    }
}
