//! Synonym tables translating the labels the form shows to the values the
//! provider roster actually stores.

/// Location labels whose database value differs from what the form displays.
/// Everything else passes through unchanged.
const LOCATION_SYNONYMS: &[(&str, &str)] = &[("LIC", "Long Island City")];

/// Plan labels that fan out to multiple roster insurance values.
const INSURANCE_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "Healthfirst",
        &[
            "Healthfirst Medicaid",
            "Healthfirst Medicare",
            "Healthfirst Other LOB",
        ],
    ),
    (
        "United Healthcare",
        &["UHC Medicare", "UHC Medicaid NY", "UHC Other LOB"],
    ),
    ("Anthem/Empire", &["BCBS Empire", "BC Empire"]),
];

pub fn normalize_location(label: &str) -> &str {
    for (from, to) in LOCATION_SYNONYMS {
        if *from == label {
            return to;
        }
    }
    label
}

/// Expands a user-facing plan label to the roster insurance values it covers.
/// Unknown labels expand to themselves.
pub fn expand_insurance(label: &str) -> Vec<&str> {
    for (from, to) in INSURANCE_SYNONYMS {
        if *from == label {
            return to.to_vec();
        }
    }
    vec![label]
}
