// Keyword-based section guess for freshly extracted questions
use crate::types::SectionId;

const RULES: [(SectionId, &[&str]); 6] = [
    (
        SectionId::S1,
        &["scarcity", "opportunity cost", "ppf", "choice", "basic economic problem"],
    ),
    (
        SectionId::S2,
        &["demand", "supply", "elasticity", "market", "equilibrium", "price"],
    ),
    (
        SectionId::S3,
        &["household", "firm", "bank", "wage", "revenue", "profit", "costs"],
    ),
    (
        SectionId::S4,
        &["gdp", "inflation", "unemployment", "fiscal", "monetary", "interest", "aggregate"],
    ),
    (
        SectionId::S5,
        &["poverty", "development", "hdi", "sustain", "aid", "inequality"],
    ),
    (
        SectionId::S6,
        &["trade", "tariff", "quota", "exchange rate", "global", "imports", "exports"],
    ),
];

/// First section whose keyword list hits the question text; S2 otherwise.
/// Only a starting value for the review table.
pub fn guess_section(text: &str) -> SectionId {
    let lower = text.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(section, _)| *section)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("What is the Opportunity Cost of building a school?", SectionId::S1)]
    #[case("A rise in GDP per head", SectionId::S4)]
    #[case("Which is a reason for a tariff?", SectionId::S6)]
    #[case("The HDI includes", SectionId::S5)]
    #[case("Which is a merit good?", SectionId::S2)]
    fn test_guess_section(#[case] text: &str, #[case] expected: SectionId) {
        assert_eq!(guess_section(text), expected);
    }
}
