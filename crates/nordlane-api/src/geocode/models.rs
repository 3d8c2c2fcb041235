use serde::{Deserialize, Serialize};

/// Response of `GET /reverse?format=jsonv2`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReverseResponse {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: Address,
}

/// Address components. Nominatim fills a different subset depending on
/// how populated the area is, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_district: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

impl Address {
    /// Locality names from most to least specific, deduplicated.
    pub fn locality_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in [
            &self.village,
            &self.town,
            &self.city,
            &self.suburb,
            &self.region,
            &self.state,
            &self.state_district,
        ]
        .into_iter()
        .flatten()
        {
            let trimmed = name.trim();
            if !trimmed.is_empty() && !names.iter().any(|n| n == trimmed) {
                names.push(trimmed.to_owned());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn locality_names_skip_missing_and_duplicates() {
        let address = Address {
            city: Some("Sydney".into()),
            suburb: Some("Surry Hills".into()),
            state: Some("New South Wales".into()),
            state_district: Some("Sydney".into()),
            ..Address::default()
        };

        assert_eq!(
            address.locality_names(),
            vec!["Sydney", "Surry Hills", "New South Wales"]
        );
    }

    #[test]
    fn empty_address_has_no_names() {
        assert!(Address::default().locality_names().is_empty());
    }
}
