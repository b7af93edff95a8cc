use log::warn;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::shared::models::Lead;
use crate::store::{Store, StoreError};

const CODE_PREFIX: &str = "CF";

/// Referral codes look like `CF-DANA-7Q2K`: a short prefix, up to five
/// letters of the customer's first name, and four random characters.
pub fn generate_referral_code(name: &str) -> String {
    let first: String = name
        .split_whitespace()
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(5)
        .collect::<String>()
        .to_uppercase();
    let first = if first.is_empty() {
        "GUEST".to_string()
    } else {
        first
    };

    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|b| char::from(b).to_ascii_uppercase())
        .take(4)
        .collect();

    format!("{}-{}-{}", CODE_PREFIX, first, random)
}

/// Write a fresh code to the lead, retrying once with a different code if
/// the first write hits a uniqueness conflict.
pub fn assign_referral_code(store: &dyn Store, lead: &Lead) -> Result<String, StoreError> {
    let code = generate_referral_code(&lead.name);
    match store.set_referral_code(lead.id, &code) {
        Ok(()) => Ok(code),
        Err(e) => {
            warn!(
                "Referral code write for lead {} failed ({}), retrying with a new code",
                lead.id, e
            );
            let retry = generate_referral_code(&lead.name);
            store.set_referral_code(lead.id, &retry)?;
            Ok(retry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tests::test_util::test_lead;

    #[test]
    fn code_format() {
        let code = generate_referral_code("Dana Whitfield");
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CF");
        assert_eq!(parts[1], "DANA");
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn long_and_empty_names() {
        let code = generate_referral_code("Bartholomew Kuznetsov");
        assert!(code.starts_with("CF-BARTH-"));

        let code = generate_referral_code("  ");
        assert!(code.starts_with("CF-GUEST-"));
    }

    #[test]
    fn assigns_code_to_lead() {
        let store = MemoryStore::new();
        let lead = test_lead();
        store.seed_lead(lead.clone());

        let code = assign_referral_code(&store, &lead).unwrap();
        let stored = store.lead(lead.id).unwrap().unwrap();
        assert_eq!(stored.referral_code.as_deref(), Some(code.as_str()));
    }
}
