// Bundled default bank shipped inside the binary
use super::model::Bank;
use once_cell::sync::Lazy;
use tracing::warn;

const BUNDLED_JSON: &str = include_str!("../../assets/default_bank.json");

static BUNDLED: Lazy<Bank> = Lazy::new(|| match Bank::from_json(BUNDLED_JSON) {
    Ok(mut bank) => {
        bank.stamp_ids();
        bank
    }
    Err(e) => {
        warn!("bundled default bank is unreadable, using an empty one: {}", e);
        Bank::new()
    }
});

/// The read-only default bank, with ids stamped from the bundled content.
pub fn bundled() -> &'static Bank {
    &BUNDLED
}
