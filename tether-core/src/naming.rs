//! Companion naming.
//!
//! Companions are named `"{template} #{n}"`, taking the lowest free `n > 0`
//! among the live names of the same family.

use std::collections::BTreeSet;

/// Separator between the template name and the number.
const SUFFIX_SEPARATOR: &str = " #";

/// Split `"Lounge #3"` into `("Lounge", 3)`.
///
/// Only canonical positive numbers count (`"#03"` and `"#0"` do not).
pub fn parse_numbered(name: &str) -> Option<(&str, u32)> {
    let (base, digits) = name.rsplit_once(SUFFIX_SEPARATOR)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u32 = digits.parse().ok()?;
    if n == 0 || n.to_string() != digits {
        return None;
    }
    Some((base, n))
}

/// Whether a name carries the numbering suffix of a derived companion.
pub fn is_derived_name(name: &str) -> bool {
    parse_numbered(name).is_some()
}

/// Lowest unused number for `template_name` among `existing` names.
pub fn next_number<'a, I>(template_name: &str, existing: I) -> u32
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: BTreeSet<u32> = existing
        .into_iter()
        .filter_map(parse_numbered)
        .filter(|(base, _)| *base == template_name)
        .map(|(_, n)| n)
        .collect();

    let mut candidate = 1;
    for n in taken {
        if n != candidate {
            break;
        }
        candidate += 1;
    }
    candidate
}

/// Full companion name for the next free slot.
pub fn next_companion_name<'a, I>(template_name: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    format!(
        "{}{}{}",
        template_name,
        SUFFIX_SEPARATOR,
        next_number(template_name, existing)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_companion_is_one() {
        assert_eq!(next_companion_name("Lounge", []), "Lounge #1");
    }

    #[test]
    fn test_next_after_contiguous() {
        let existing = ["Lounge #1", "Lounge #2"];
        assert_eq!(next_companion_name("Lounge", existing), "Lounge #3");
    }

    #[test]
    fn test_fills_gap() {
        let existing = ["Lounge #1", "Lounge #3"];
        assert_eq!(next_companion_name("Lounge", existing), "Lounge #2");
    }

    #[test]
    fn test_ignores_other_families_and_base() {
        let existing = ["Lounge", "Lounge #1", "Lounge Two #2", "Gaming #2", "Lounge #x"];
        assert_eq!(next_companion_name("Lounge", existing), "Lounge #2");
    }

    #[test]
    fn test_template_name_with_hash() {
        let existing = ["Room #5 #1"];
        assert_eq!(next_companion_name("Room #5", existing), "Room #5 #2");
    }

    #[test]
    fn test_is_derived_name() {
        assert!(is_derived_name("Lounge #1"));
        assert!(is_derived_name("Lounge #12"));
        assert!(!is_derived_name("Lounge"));
        assert!(!is_derived_name("Lounge #"));
        assert!(!is_derived_name("Lounge #0"));
        assert!(!is_derived_name("Lounge #01"));
        assert!(!is_derived_name("Lounge#1"));
    }
}
