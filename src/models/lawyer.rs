use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawyerProfile {
    pub id: String,
    pub user_id: String,
    pub bio: Option<String>,
    pub specialization: Specialization,
    pub license_number: String,
    pub experience: i64,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Raw slot configuration as stored. Legacy rows hold either a JSON
    /// array or a comma separated string; use [`LawyerProfile::slot_labels`]
    /// for the normalized view.
    pub available_slots: String,
    pub fees: i64,
    pub is_verified: bool,
    pub is_active: bool,
}

impl LawyerProfile {
    pub fn slot_labels(&self) -> Vec<String> {
        parse_slot_config(&self.available_slots)
    }
}

/// Normalizes a stored slot configuration into a list of labels.
///
/// Accepted shapes, in order:
/// - empty string: no slots configured
/// - valid JSON array: its elements, verbatim
/// - valid JSON that is not an array: treated as misconfigured, no slots
/// - anything else: comma separated labels, trimmed, empties dropped
pub fn parse_slot_config(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Ok(_) => Vec::new(),
        Err(_) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// Converts an incoming slot configuration to its stored string form.
/// JSON strings are kept verbatim, anything else is stored as compact
/// JSON so [`parse_slot_config`] can read it back.
pub fn slot_config_string(value: Option<&serde_json::Value>) -> String {
    match value {
        None => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Specialization {
    #[serde(rename = "Criminal Law")]
    CriminalLaw,
    #[serde(rename = "Civil Law")]
    CivilLaw,
    #[serde(rename = "Corporate Law")]
    CorporateLaw,
    #[serde(rename = "Family Law")]
    FamilyLaw,
    #[serde(rename = "Intellectual Property")]
    IntellectualProperty,
    #[serde(rename = "Tax Law")]
    TaxLaw,
    #[serde(rename = "Labor Law")]
    LaborLaw,
    #[serde(rename = "Real Estate Law")]
    RealEstateLaw,
    #[serde(rename = "Immigration Law")]
    ImmigrationLaw,
    #[serde(rename = "Other")]
    Other,
}

impl Specialization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Specialization::CriminalLaw => "Criminal Law",
            Specialization::CivilLaw => "Civil Law",
            Specialization::CorporateLaw => "Corporate Law",
            Specialization::FamilyLaw => "Family Law",
            Specialization::IntellectualProperty => "Intellectual Property",
            Specialization::TaxLaw => "Tax Law",
            Specialization::LaborLaw => "Labor Law",
            Specialization::RealEstateLaw => "Real Estate Law",
            Specialization::ImmigrationLaw => "Immigration Law",
            Specialization::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Criminal Law" => Some(Specialization::CriminalLaw),
            "Civil Law" => Some(Specialization::CivilLaw),
            "Corporate Law" => Some(Specialization::CorporateLaw),
            "Family Law" => Some(Specialization::FamilyLaw),
            "Intellectual Property" => Some(Specialization::IntellectualProperty),
            "Tax Law" => Some(Specialization::TaxLaw),
            "Labor Law" => Some(Specialization::LaborLaw),
            "Real Estate Law" => Some(Specialization::RealEstateLaw),
            "Immigration Law" => Some(Specialization::ImmigrationLaw),
            "Other" => Some(Specialization::Other),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_config_empty_string() {
        assert!(parse_slot_config("").is_empty());
    }

    #[test]
    fn slot_config_json_array() {
        assert_eq!(
            parse_slot_config(r#"["10:00 AM", "11:00 AM"]"#),
            vec!["10:00 AM".to_string(), "11:00 AM".to_string()]
        );
    }

    #[test]
    fn slot_config_json_non_array_yields_nothing() {
        // A lone JSON scalar parses but is not a slot list.
        assert!(parse_slot_config(r#""10:00 AM""#).is_empty());
        assert!(parse_slot_config("123").is_empty());
        assert!(parse_slot_config(r#"{"slot": "10:00 AM"}"#).is_empty());
    }

    #[test]
    fn slot_config_comma_separated() {
        assert_eq!(
            parse_slot_config("10:00 AM, 11:00 AM ,,  2:00 PM"),
            vec![
                "10:00 AM".to_string(),
                "11:00 AM".to_string(),
                "2:00 PM".to_string()
            ]
        );
    }

    #[test]
    fn slot_config_single_label() {
        // Not valid JSON, so it falls through to the comma branch.
        assert_eq!(parse_slot_config("10:00 AM"), vec!["10:00 AM".to_string()]);
    }

    #[test]
    fn slot_config_string_keeps_raw_strings() {
        let json = serde_json::json!("10:00 AM, 11:00 AM");
        assert_eq!(slot_config_string(Some(&json)), "10:00 AM, 11:00 AM");

        let array = serde_json::json!(["10:00 AM", "11:00 AM"]);
        let stored = slot_config_string(Some(&array));
        assert_eq!(parse_slot_config(&stored), vec!["10:00 AM", "11:00 AM"]);

        assert_eq!(slot_config_string(None), "");
    }

    #[test]
    fn specialization_round_trip() {
        for label in [
            "Criminal Law",
            "Civil Law",
            "Corporate Law",
            "Family Law",
            "Intellectual Property",
            "Tax Law",
            "Labor Law",
            "Real Estate Law",
            "Immigration Law",
            "Other",
        ] {
            let parsed = Specialization::parse(label).unwrap();
            assert_eq!(parsed.as_str(), label);
        }
        assert!(Specialization::parse("Maritime Law").is_none());
    }
}
