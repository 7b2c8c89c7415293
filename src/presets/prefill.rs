//! Geotagging contact form and its prefill from a client preset.

use serde::Serialize;

use crate::presets::model::ClientPreset;

/// Contact fields of the geotagging form. Blank means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactForm {
    pub creator: String,
    pub creator_title: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    pub email: String,
    pub url: String,
    /// Comma-separated, as typed.
    pub keywords: String,
}

impl ContactForm {
    /// Keywords split on `,`, trimmed, blanks dropped.
    pub fn keyword_list(&self) -> Vec<String> {
        ClientPreset::parse_keywords(&self.keywords).unwrap_or_default()
    }
}

/// Copies every present field of `preset` into `form`. Absent fields leave
/// the form untouched.
pub fn apply_client_preset(form: &mut ContactForm, preset: &ClientPreset) {
    let pairs: [(&mut String, &Option<String>); 10] = [
        (&mut form.creator, &preset.creator),
        (&mut form.creator_title, &preset.creator_title),
        (&mut form.address, &preset.address),
        (&mut form.city, &preset.city),
        (&mut form.state, &preset.state),
        (&mut form.postal_code, &preset.postal_code),
        (&mut form.country, &preset.country),
        (&mut form.phone, &preset.phone),
        (&mut form.email, &preset.email),
        (&mut form.url, &preset.url),
    ];

    for (field, value) in pairs {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            *field = value.to_string();
        }
    }

    if let Some(keywords) = preset.keywords.as_ref().filter(|k| !k.is_empty()) {
        form.keywords = keywords.join(", ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_present_fields_only() {
        let mut form = ContactForm {
            creator: "Existing".into(),
            phone: "000".into(),
            ..Default::default()
        };
        let preset = ClientPreset {
            id: "acme".into(),
            name: "ACME".into(),
            phone: Some("555-0100".into()),
            url: Some("https://acme.test".into()),
            keywords: Some(vec!["travel".into(), "city".into()]),
            ..Default::default()
        };

        apply_client_preset(&mut form, &preset);

        assert_eq!(form.creator, "Existing");
        assert_eq!(form.phone, "555-0100");
        assert_eq!(form.url, "https://acme.test");
        assert_eq!(form.keywords, "travel, city");
    }

    #[test]
    fn keyword_list_splits_and_trims() {
        let form = ContactForm {
            keywords: "travel,  city ,,night".into(),
            ..Default::default()
        };
        assert_eq!(form.keyword_list(), vec!["travel", "city", "night"]);
        assert!(ContactForm::default().keyword_list().is_empty());
    }
}
