use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct FormField {
    pub field: &'static str,
    pub required: bool,
}

const fn req(field: &'static str) -> FormField {
    FormField {
        field,
        required: true,
    }
}

const fn opt(field: &'static str) -> FormField {
    FormField {
        field,
        required: false,
    }
}

/// Per-plan form templates. Each plan's change-of-PCP form asks for a
/// different subset of member data, so the frontend renders whatever this
/// table says.
const INSURANCE_TEMPLATES: &[(&str, &[FormField])] = &[
    (
        "Healthfirst",
        &[
            req("First Name"),
            req("Last Name"),
            req("Subscriber ID"),
            req("Phone Number"),
            req("Signature"),
        ],
    ),
    (
        "United Healthcare",
        &[
            req("Subscriber ID"),
            req("Full Name"),
            req("Address"),
            req("City"),
            req("State"),
            req("Zip Code"),
            req("Phone Number"),
            req("Signature"),
        ],
    ),
    (
        "Anthem/Empire",
        &[
            req("Full Name"),
            req("Birth Date"),
            req("Subscriber ID"),
            req("State"),
            req("Phone Number"),
            req("Signature"),
        ],
    ),
    (
        "Aetna",
        &[
            req("First Name"),
            opt("Middle Initial"),
            req("Last Name"),
            req("Birth Date"),
            req("Subscriber ID"),
            req("SSN"),
            req("Address"),
            req("Phone Number"),
            req("City"),
            req("State"),
            req("Zip"),
            req("Signature"),
        ],
    ),
    (
        "Fidelis",
        &[
            req("First Name"),
            req("Last Name"),
            req("Birth Date"),
            req("Subscriber ID"),
            req("Signature"),
        ],
    ),
    (
        "Humana",
        &[
            req("Full Name"),
            req("Birth Date"),
            req("Subscriber ID"),
            req("Phone Number"),
            req("Previous PCP"),
            req("Previous PCP Location"),
            req("Signature"),
        ],
    ),
    (
        "Wellcare",
        &[
            req("First Name"),
            req("Last Name"),
            req("Birth Date"),
            req("Phone Number"),
            req("Subscriber ID"),
            req("Previous PCP"),
            req("Previous PCP Location"),
            req("Signature"),
        ],
    ),
    (
        "Wellpoint",
        &[
            req("Full Name"),
            req("Birth Date"),
            req("Phone Number"),
            req("State"),
            req("Subscriber ID"),
            req("Medicaid ID"),
            req("Signature"),
        ],
    ),
    (
        "Elder Plan",
        &[
            req("Full Name"),
            req("Subscriber ID"),
            req("Phone Number"),
            req("Email"),
            req("Address"),
            req("City"),
            req("Zip"),
            req("Previous PCP"),
            req("Signature"),
        ],
    ),
];

/// Fields filled into the PDF by the server side only (never shown in the UI).
pub const PDF_ONLY_FIELDS: &[FormField] = &[req("Provider"), req("ProviderID"), req("Date")];

/// Template for a plan, or an empty slice for unknown plans.
pub fn template_for(insurance: &str) -> &'static [FormField] {
    for (name, fields) in INSURANCE_TEMPLATES {
        if *name == insurance {
            return fields;
        }
    }
    &[]
}
