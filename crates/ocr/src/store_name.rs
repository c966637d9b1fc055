use regex::Regex;
use std::sync::OnceLock;

use receiptly_core::config::StoreNameConfig;
use receiptly_core::StoreNameMethod;

re!(re_corporate_suffix, r"(?i)\s+(?:INC|LLC|CO|CORP|LTD)\.?$");
re!(re_noise, r"[^\w\s&'-]");
re!(re_company_line, r"^[A-Z][A-Za-z\s&'-]+(?:INC|LLC|CO|CORP)?\.?$");
re!(re_caps_line, r"^[A-Z\s&'-]{3,}$");
re!(re_street_address,
    r"(?i)\d+\s+[A-Za-z]+\s+(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr)");
re!(re_numbered_clause, r"^\d+\s+[A-Za-z\s]+,");
re!(re_phone_separators, r"[\s\-()]");

/// A store name picked from OCR lines, with the tactic that found it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreNameMatch {
    pub name: String,
    pub confidence: f32,
    pub method: StoreNameMethod,
    /// Index among the non-empty lines.
    pub line_index: usize,
}

/// Ordered store-name tactics; the first one to produce a plausible name wins.
#[derive(Debug, Clone)]
pub struct StoreNameLadder {
    config: StoreNameConfig,
    chains: Vec<String>,
}

impl Default for StoreNameLadder {
    fn default() -> Self {
        Self::new(StoreNameConfig::default())
    }
}

impl StoreNameLadder {
    pub fn new(config: StoreNameConfig) -> Self {
        let chains = config.known_chains.iter().map(|c| c.to_lowercase()).collect();
        Self { config, chains }
    }

    pub fn find(&self, lines: &[&str]) -> Option<StoreNameMatch> {
        let lines: Vec<&str> = lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty()).collect();
        self.by_known_chain(&lines)
            .or_else(|| self.by_position(&lines))
            .or_else(|| self.by_capitalization(&lines))
            .or_else(|| self.by_pattern(&lines))
    }

    fn by_known_chain(&self, lines: &[&str]) -> Option<StoreNameMatch> {
        lines.iter().take(10).enumerate().find_map(|(i, line)| {
            let lower = line.to_lowercase();
            if !self.chains.iter().any(|chain| contains_at_word_start(&lower, chain)) {
                return None;
            }
            let cleaned = self.clean(line);
            (cleaned.chars().count() >= 3).then(|| StoreNameMatch {
                name: cleaned,
                confidence: self.config.known_chain_confidence,
                method: StoreNameMethod::KnownChain,
                line_index: i,
            })
        })
    }

    fn by_position(&self, lines: &[&str]) -> Option<StoreNameMatch> {
        lines.iter().take(5).enumerate().find_map(|(i, line)| {
            let len = line.chars().count();
            if len < 3 || looks_like_address(line) || looks_like_phone(line) {
                return None;
            }
            let digits = line.chars().filter(|c| c.is_ascii_digit()).count();
            if digits as f32 / len as f32 > 0.5 {
                return None;
            }
            self.accept(line, i, self.config.position_confidence, StoreNameMethod::Position)
        })
    }

    fn by_capitalization(&self, lines: &[&str]) -> Option<StoreNameMatch> {
        lines.iter().take(8).enumerate().find_map(|(i, line)| {
            if line.chars().count() < 3 {
                return None;
            }
            let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
            if letters.is_empty() {
                return None;
            }
            let upper = letters.iter().filter(|c| c.is_uppercase()).count();
            if upper as f32 / letters.len() as f32 <= 0.7 {
                return None;
            }
            self.accept(line, i, self.config.capitalization_confidence, StoreNameMethod::Capitalization)
        })
    }

    fn by_pattern(&self, lines: &[&str]) -> Option<StoreNameMatch> {
        lines.iter().take(8).enumerate().find_map(|(i, line)| {
            if !(re_company_line().is_match(line) || re_caps_line().is_match(line)) {
                return None;
            }
            self.accept(line, i, self.config.pattern_confidence, StoreNameMethod::Pattern)
        })
    }

    fn accept(&self, line: &str, index: usize, confidence: f32, method: StoreNameMethod) -> Option<StoreNameMatch> {
        let cleaned = self.clean(line);
        self.is_plausible(&cleaned).then(|| StoreNameMatch {
            name: cleaned,
            confidence,
            method,
            line_index: index,
        })
    }

    /// Strip corporate suffixes and noise, collapse whitespace, title-case,
    /// and cap the length.
    pub fn clean(&self, text: &str) -> String {
        let text = re_corporate_suffix().replace(text.trim(), "");
        let text = re_noise().replace_all(&text, "");
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let titled = title_case(&collapsed);
        titled.chars().take(self.config.max_len).collect::<String>().trim().to_string()
    }

    pub fn is_plausible(&self, text: &str) -> bool {
        let len = text.chars().count();
        if len < 3 || len > self.config.max_len {
            return false;
        }
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        if (letters as f32 / len as f32) < 0.3 {
            return false;
        }
        let has_word = text
            .split_whitespace()
            .any(|w| w.chars().filter(|c| c.is_alphabetic()).count() >= 2);
        let all_digits = text.chars().filter(|c| !c.is_whitespace()).all(|c| c.is_ascii_digit());
        has_word && !all_digits
    }
}

/// `needle` occurs in `haystack` starting at a word boundary.
fn contains_at_word_start(haystack: &str, needle: &str) -> bool {
    haystack
        .match_indices(needle)
        .any(|(i, _)| haystack[..i].chars().next_back().map_or(true, |c| !c.is_alphanumeric()))
}

fn looks_like_address(line: &str) -> bool {
    re_street_address().is_match(line) || re_numbered_clause().is_match(line)
}

fn looks_like_phone(line: &str) -> bool {
    let cleaned = re_phone_separators().replace_all(line, "");
    cleaned.chars().count() >= 10 && cleaned.chars().filter(|c| c.is_ascii_digit()).count() >= 10
}

/// Uppercase the first letter of every run of letters, lowercase the rest.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}
