use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Country {
    Singapore,
    Malaysia,
    Thailand,
    Indonesia,
    Philippines,
    Australia,
    Canada,
    UnitedKingdom,
    UnitedStates,
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Country::Singapore => "Singapore",
            Country::Malaysia => "Malaysia",
            Country::Thailand => "Thailand",
            Country::Indonesia => "Indonesia",
            Country::Philippines => "Philippines",
            Country::Australia => "Australia",
            Country::Canada => "Canada",
            Country::UnitedKingdom => "United Kingdom",
            Country::UnitedStates => "United States",
        };
        write!(f, "{name}")
    }
}

/// Image preparation applied before a local OCR pass over the store header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStrategy {
    Enhanced,
    Simple,
    HighContrast,
}

impl fmt::Display for LocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationStrategy::Enhanced => write!(f, "enhanced"),
            LocationStrategy::Simple => write!(f, "simple"),
            LocationStrategy::HighContrast => write!(f, "high_contrast"),
        }
    }
}

/// Which store-name tactic produced a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreNameMethod {
    KnownChain,
    Position,
    Capitalization,
    Pattern,
}

impl fmt::Display for StoreNameMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreNameMethod::KnownChain => write!(f, "known_chain"),
            StoreNameMethod::Position => write!(f, "position"),
            StoreNameMethod::Capitalization => write!(f, "capitalization"),
            StoreNameMethod::Pattern => write!(f, "pattern"),
        }
    }
}

/// Per-field contribution to a location candidate's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub store_name: f32,
    pub address: f32,
    pub phone: f32,
    pub postal_code: f32,
    pub country: f32,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self { store_name: 0.25, address: 0.30, phone: 0.20, postal_code: 0.15, country: 0.10 }
    }
}

impl FieldWeights {
    /// Sum of the weights of populated fields, rounded to two decimals.
    pub fn score(&self, candidate: &LocationCandidate) -> f32 {
        let parts = [
            (candidate.store_name.is_some(), self.store_name),
            (candidate.address.is_some(), self.address),
            (candidate.phone.is_some(), self.phone),
            (candidate.postal_code.is_some(), self.postal_code),
            (candidate.country.is_some(), self.country),
        ];
        let sum: f32 = parts.iter().filter(|(present, _)| *present).map(|(_, w)| w).sum();
        ((sum * 100.0).round() / 100.0).clamp(0.0, 1.0)
    }
}

/// Store location details read from the receipt header by local OCR.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationCandidate {
    pub store_name: Option<String>,
    /// Confidence of the tactic that found `store_name`.
    pub store_name_confidence: Option<f32>,
    pub store_name_method: Option<StoreNameMethod>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<Country>,
    pub confidence: f32,
    /// OCR output for the winning variant, truncated.
    pub raw_text: String,
    /// Header lines up to the first date/cashier line.
    pub location_text: String,
    pub strategy_used: Option<LocationStrategy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_sum_of_populated_weights() {
        let weights = FieldWeights::default();
        let candidate = LocationCandidate {
            store_name: Some("Acme Mart".into()),
            address: Some("12 Jalan Besar".into()),
            ..Default::default()
        };
        assert_eq!(weights.score(&candidate), 0.55);
    }

    #[test]
    fn full_candidate_scores_one() {
        let candidate = LocationCandidate {
            store_name: Some("a".into()),
            address: Some("b".into()),
            phone: Some("c".into()),
            postal_code: Some("d".into()),
            country: Some(Country::Malaysia),
            ..Default::default()
        };
        assert_eq!(FieldWeights::default().score(&candidate), 1.0);
        assert_eq!(FieldWeights::default().score(&LocationCandidate::default()), 0.0);
    }

    #[test]
    fn custom_weights_are_respected() {
        let weights = FieldWeights { phone: 0.5, ..Default::default() };
        let candidate = LocationCandidate { phone: Some("0312345678".into()), ..Default::default() };
        assert_eq!(weights.score(&candidate), 0.5);
    }
}
