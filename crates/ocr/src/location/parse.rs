//! Field heuristics over header OCR text.

use regex::Regex;
use std::sync::OnceLock;

use receiptly_core::{Country, FieldWeights, LocationCandidate};

use crate::store_name::StoreNameLadder;

// ── Address ──────────────────────────────────────────────────────────────────

const ADDRESS_KEYWORDS: [&str; 18] = [
    "street", "road", "avenue", "blvd", "drive", "lane", "level", "floor", "unit", "#", "bldg",
    "building", "mall", "plaza", "center", "centre", "jalan", "jln",
];

re!(re_numbered_address, r"\b\d+[-\s]+[A-Za-z]");

// ── Phone ────────────────────────────────────────────────────────────────────

re!(re_phone_labeled,
    r"(?i)(?:Tel|Ph[o0]ne|Ph|C[o0]ntact)[:\s]*\+?\d{1,3}[-.\s]?\(?\d{1,4}\)?[-.\s]?\d{1,4}[-.\s]?\d{1,9}");
re!(re_phone_international, r"\+\d{1,3}[-.\s]?\(?\d{1,4}\)?[-.\s]?\d{1,4}[-.\s]?\d{1,9}");
re!(re_phone_trunk, r"0[1-9][-.\s]?\d{3,4}[-.\s]?\d{4}");
re!(re_phone_north_american, r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}");
re!(re_phone_local, r"\d{4}[-.\s]?\d{4}");
re!(re_phone_digit_run, r"\d{8,}");
re!(re_phone_label, r"(?i)(?:Tel|Ph[o0]ne|Ph|C[o0]ntact)[:\s]*");

// ── Postal code ──────────────────────────────────────────────────────────────

re!(re_postal_labeled, r"(?i)(?:postal|post\s*code|zip)[:\s]+([A-Z0-9 \t-]{4,10})");
re!(re_postal_my_city, r"(?i)\b([5-9]\d{4})\s*(?:kuala|lumpur|kl|malaysia)");
re!(re_postal_my_context,
    r"(?i)[$5-9]?\d{4,5}\s+(?:kuala\s+lumpur|kl|selangor|penang|johor|ipoh|melaka)");
re!(re_postal_sg, r"(?i)\bS\s*\d{6}\b");
re!(re_postal_my, r"(?i)\b[5-9]\d{4}\b");
re!(re_postal_us, r"(?i)\b\d{5}(?:-\d{4})?\b");
re!(re_postal_uk, r"(?i)\b[A-Z]{1,2}\d{1,2}\s*\d[A-Z]{2}\b");
re!(re_postal_ca, r"(?i)\b[A-Z]\d[A-Z]\s*\d[A-Z]\d\b");
re!(re_postal_exclusion,
    r"invoice|receipt|trans|bill|no[:\s.]*\d|vat\d+|\d{2}[/-]\d{2}[/-]\d{2}|[($]\d+[-)]|sdn\s+bhd");

const EXCLUSION_RADIUS: usize = 30;

// ── Country ──────────────────────────────────────────────────────────────────

const COUNTRY_KEYWORDS: [(Country, &[&str]); 9] = [
    (Country::Singapore, &["singapore", "republic of singapore"]),
    (Country::Malaysia, &["malaysia", "kuala lumpur", "selangor", "penang", "johor"]),
    (Country::Thailand, &["thailand", "bangkok"]),
    (Country::Indonesia, &["indonesia", "jakarta"]),
    (Country::Philippines, &["philippines", "manila"]),
    (Country::Australia, &["australia", "sydney", "melbourne"]),
    (Country::Canada, &["canada", "toronto", "vancouver"]),
    (Country::UnitedKingdom, &["united kingdom", "england", "scotland", "wales", "london"]),
    (Country::UnitedStates, &["united states", "america"]),
];

re!(re_dial_sg, r"(?m)\+65|^65[-\s]");
re!(re_dial_my, r"(?m)\+60|^60[-\s]|03[-\s]\d{4}");
re!(re_dial_th, r"\+66");
re!(re_dial_id, r"\+62");
re!(re_dial_ph, r"\+63");
re!(re_dial_nanp, r"\+1[-\s]\d{3}");
re!(re_dial_uk, r"\+44");
re!(re_dial_au, r"\+61");

re!(re_signal_my, r"\b[5-9]\d{4}\b.*(?:kuala|lumpur|malaysia)");
re!(re_signal_uk, r"\b[A-Z]{1,2}\d{1,2}\s*\d[A-Z]{2}\b");
re!(re_signal_ca, r"\b[A-Z]\d[A-Z]\s*\d[A-Z]\d\b");
re!(re_signal_us_zip, r"\b\d{5}(?:-\d{4})?\b");
re!(re_signal_us_context, r"\b(?:usa|united states|ca|ny|tx|fl)\b");

// ── Location section ─────────────────────────────────────────────────────────

const SECTION_END_MARKERS: [&str; 4] = ["date", "time", "cashier", "terminal"];

/// Run every heuristic over one OCR text and score the result.
pub fn parse_location(text: &str, ladder: &StoreNameLadder, weights: &FieldWeights) -> LocationCandidate {
    let lines: Vec<&str> = text.lines().collect();
    let store = ladder.find(&lines);
    let mut candidate = LocationCandidate {
        store_name: store.as_ref().map(|m| m.name.clone()),
        store_name_confidence: store.as_ref().map(|m| m.confidence),
        store_name_method: store.map(|m| m.method),
        address: extract_address(&lines),
        phone: extract_phone(&lines),
        postal_code: extract_postal_code(text),
        country: detect_country(text),
        location_text: location_section(&lines),
        ..Default::default()
    };
    candidate.confidence = weights.score(&candidate);
    candidate
}

/// Address-looking lines among the first 15 non-empty ones, joined.
pub fn extract_address(lines: &[&str]) -> Option<String> {
    let parts: Vec<String> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .take(15)
        .map(correct_address_numerals)
        .filter(|line| {
            let lower = line.to_lowercase();
            ADDRESS_KEYWORDS.iter().any(|k| lower.contains(k)) || re_numbered_address().is_match(line)
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// `$` misread for `5` next to a digit, and `O` misread for `0` after a digit.
fn correct_address_numerals(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let after_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next = chars.get(i + 1);
            let before_digit = next.is_some_and(|n| n.is_ascii_digit());
            let before_break = next.map_or(true, |n| n.is_ascii_digit() || n.is_whitespace());
            if c == '$' && (after_digit || before_digit) {
                '5'
            } else if (c == 'O' || c == 'o') && after_digit && before_break {
                '0'
            } else {
                c
            }
        })
        .collect()
}

/// First phone-shaped run with at least seven digits. Only `+` and digits
/// are kept.
pub fn extract_phone(lines: &[&str]) -> Option<String> {
    let patterns = [
        re_phone_labeled(),
        re_phone_international(),
        re_phone_trunk(),
        re_phone_north_american(),
        re_phone_local(),
        re_phone_digit_run(),
    ];
    for line in lines.iter().take(20) {
        let line = line.replace(['O', 'o'], "0").replace('?', "7");
        for re in patterns {
            let Some(m) = re.find(&line) else { continue };
            let unlabeled = re_phone_label().replace_all(m.as_str(), "");
            let phone: String = unlabeled.chars().filter(|c| c.is_ascii_digit() || *c == '+').collect();
            if phone.chars().filter(|c| c.is_ascii_digit()).count() >= 7 {
                return Some(phone);
            }
        }
    }
    None
}

pub fn extract_postal_code(text: &str) -> Option<String> {
    if let Some(caps) = re_postal_labeled().captures(text) {
        let code = correct_postal(caps[1].trim());
        if !code.is_empty() {
            return Some(code);
        }
    }
    if let Some(caps) = re_postal_my_city().captures(text) {
        return Some(caps[1].to_string());
    }
    if let Some(code) = malaysian_postal_from_address(text) {
        return Some(code);
    }

    for re in [re_postal_sg(), re_postal_my(), re_postal_us(), re_postal_uk(), re_postal_ca()] {
        for m in re.find_iter(text) {
            let context = context_window(text, m.start(), m.end()).to_lowercase();
            if !re_postal_exclusion().is_match(&context) {
                return Some(correct_postal(m.as_str()));
            }
        }
    }
    None
}

/// Five-digit code directly before a Malaysian city, tolerating a leading
/// `$` for `5`.
fn malaysian_postal_from_address(text: &str) -> Option<String> {
    re_postal_my_context().find_iter(text).find_map(|m| {
        let token = m.as_str().split_whitespace().next()?;
        let code = correct_postal(token);
        let value: u32 = code.parse().ok()?;
        (50_000..=99_999).contains(&value).then_some(code)
    })
}

fn correct_postal(code: &str) -> String {
    code.replace('$', "5").replace('O', "0")
}

fn context_window(text: &str, start: usize, end: usize) -> &str {
    let mut lo = start.saturating_sub(EXCLUSION_RADIUS);
    while !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + EXCLUSION_RADIUS).min(text.len());
    while !text.is_char_boundary(hi) {
        hi += 1;
    }
    &text[lo..hi]
}

/// Country by explicit name, then dialing code, then postal-code shape.
pub fn detect_country(text: &str) -> Option<Country> {
    let lower = text.to_lowercase();
    if let Some((country, _)) = COUNTRY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
    {
        return Some(*country);
    }

    let dialing = [
        (Country::Singapore, re_dial_sg()),
        (Country::Malaysia, re_dial_my()),
        (Country::Thailand, re_dial_th()),
        (Country::Indonesia, re_dial_id()),
        (Country::Philippines, re_dial_ph()),
        (Country::UnitedStates, re_dial_nanp()),
        (Country::UnitedKingdom, re_dial_uk()),
        (Country::Australia, re_dial_au()),
    ];
    if let Some((country, _)) = dialing.iter().find(|(_, re)| re.is_match(text)) {
        return Some(*country);
    }

    if re_signal_my().is_match(&lower) {
        Some(Country::Malaysia)
    } else if re_postal_sg().is_match(text) {
        Some(Country::Singapore)
    } else if re_signal_uk().is_match(text) {
        Some(Country::UnitedKingdom)
    } else if re_signal_ca().is_match(text) {
        Some(Country::Canada)
    } else if re_signal_us_zip().is_match(text) && re_signal_us_context().is_match(&lower) {
        Some(Country::UnitedStates)
    } else {
        None
    }
}

/// Header lines up to and including the first date/time/cashier line.
pub fn location_section(lines: &[&str]) -> String {
    let mut section = Vec::new();
    for line in lines.iter().take(15).map(|l| l.trim()) {
        if line.is_empty() {
            continue;
        }
        section.push(line);
        let lower = line.to_lowercase();
        if SECTION_END_MARKERS.iter().any(|m| lower.contains(m)) {
            break;
        }
    }
    section.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use receiptly_core::StoreNameMethod;

    const KL_HEADER: &str = "ACME MART\nLot 12, Jalan Bukit Bintang\n50450 Kuala Lumpur\nTel: 03-2141 8888\nDate: 12/01/2024\nCashier: Aida\nNasi Lemak 8.50";

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn full_header_is_parsed_and_scored() {
        let c = parse_location(KL_HEADER, &StoreNameLadder::default(), &FieldWeights::default());
        assert_eq!(c.store_name.as_deref(), Some("Acme Mart"));
        assert_eq!(c.store_name_method, Some(StoreNameMethod::Position));
        assert_eq!(c.address.as_deref(), Some("Lot 12, Jalan Bukit Bintang 50450 Kuala Lumpur"));
        assert_eq!(c.phone.as_deref(), Some("0321418888"));
        assert_eq!(c.postal_code.as_deref(), Some("50450"));
        assert_eq!(c.country, Some(Country::Malaysia));
        assert_eq!(c.confidence, 1.0);
        assert!(c.location_text.ends_with("Date: 12/01/2024"));
        assert!(!c.location_text.contains("Cashier"));
    }

    #[test]
    fn empty_text_scores_zero() {
        let c = parse_location("", &StoreNameLadder::default(), &FieldWeights::default());
        assert_eq!(c.confidence, 0.0);
        assert!(c.store_name.is_none() && c.address.is_none() && c.phone.is_none());
    }

    #[test]
    fn address_corrects_misread_digits() {
        let addr = extract_address(&lines("12O Orchard Road #0$-01")).unwrap();
        assert_eq!(addr, "120 Orchard Road #05-01");
        assert!(extract_address(&lines("THANK YOU\nTOTAL 12.00")).is_none());
    }

    #[test]
    fn dollar_sign_is_a_digit_only_beside_digits() {
        assert_eq!(correct_address_numerals("$8 Jalan Ampang"), "58 Jalan Ampang");
        assert_eq!(correct_address_numerals("Unit 1$ Mall"), "Unit 15 Mall");
        assert_eq!(correct_address_numerals("12 Main St $ Save"), "12 Main St $ Save");
        assert_eq!(correct_address_numerals("$AVE-MART Road"), "$AVE-MART Road");
    }

    #[test]
    fn phone_patterns_in_priority_order() {
        assert_eq!(extract_phone(&lines("Contact: +65 6123 4567")).as_deref(), Some("+6561234567"));
        assert_eq!(extract_phone(&lines("(217) 555-0142")).as_deref(), Some("2175550142"));
        assert_eq!(extract_phone(&lines("Ph: 6?23-O456")).as_deref(), Some("67230456"));
        assert!(extract_phone(&lines("Qty 12 x 3")).is_none());
    }

    #[test]
    fn postal_code_sources() {
        assert_eq!(extract_postal_code("Postal: 238801\nThanks").as_deref(), Some("238801"));
        assert_eq!(extract_postal_code("$0450 Kuala Lumpur").as_deref(), Some("50450"));
        assert_eq!(extract_postal_code("Singapore S 049315").as_deref(), Some("S 049315"));
        assert_eq!(extract_postal_code("London W1 2AB").as_deref(), Some("W1 2AB"));
    }

    #[test]
    fn postal_code_skips_document_numbers() {
        assert!(extract_postal_code("Invoice No: 60012").is_none());
        let far_apart = format!("Receipt 70001{}Springfield 62704", "\n".repeat(27));
        assert_eq!(extract_postal_code(&far_apart).as_deref(), Some("62704"));
    }

    #[test]
    fn country_by_keyword_dialing_code_and_postal_shape() {
        assert_eq!(detect_country("Orchard Rd, Singapore"), Some(Country::Singapore));
        assert_eq!(detect_country("Tel +66 2 123 4567"), Some(Country::Thailand));
        assert_eq!(detect_country("Tel 03-2141 8888"), Some(Country::Malaysia));
        assert_eq!(detect_country("Store 5\nS 049315"), Some(Country::Singapore));
        assert_eq!(detect_country("Toronto ON"), Some(Country::Canada));
        assert_eq!(detect_country("K1A 0B1"), Some(Country::Canada));
        assert_eq!(detect_country("Austin, TX 78701"), Some(Country::UnitedStates));
        assert_eq!(detect_country("Cash 78701"), None);
    }

    #[test]
    fn section_stops_at_first_transaction_line() {
        let text = "A\n\nB\nTerminal 3\nC";
        assert_eq!(location_section(&lines(text)), "A\nB\nTerminal 3");
    }
}
