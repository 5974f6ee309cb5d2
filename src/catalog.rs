use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::SurveyResponse;

/// Score used when an effectiveness label is missing or unrecognized.
pub const DEFAULT_EFFECTIVENESS_SCORE: u8 = 3;

/// Role assigned when neither `role` nor a mapped organization type exists.
pub const UNKNOWN_ROLE: &str = "unknown";

const DEFAULT_SKILL_AREAS: [&str; 20] = [
    "biblical_knowledge",
    "theology",
    "preaching",
    "teaching",
    "pastoral_care",
    "counseling",
    "leadership",
    "administration",
    "evangelism",
    "discipleship",
    "missions",
    "worship",
    "youth_ministry",
    "children_ministry",
    "church_planting",
    "community_development",
    "conflict_resolution",
    "financial_management",
    "technology",
    "cross_cultural_ministry",
];

const DEFAULT_EFFECTIVENESS: [(&str, u8); 5] = [
    ("Very Effective", 5),
    ("Effective", 4),
    ("Somewhat Effective", 3),
    ("Slightly Effective", 2),
    ("Not Effective", 1),
];

const DEFAULT_ROLE_MAPPING: [(&str, &str); 6] = [
    ("church", "pastor"),
    ("congregation", "pastor"),
    ("institution", "faculty"),
    ("seminary", "faculty"),
    ("bible_college", "faculty"),
    ("non_formal", "ministry_leader"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub skill_areas: Vec<String>,
    pub effectiveness: BTreeMap<String, u8>,
    pub role_mapping: BTreeMap<String, String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            skill_areas: DEFAULT_SKILL_AREAS.iter().map(|s| s.to_string()).collect(),
            effectiveness: DEFAULT_EFFECTIVENESS
                .iter()
                .map(|(label, score)| (label.to_string(), *score))
                .collect(),
            role_mapping: DEFAULT_ROLE_MAPPING
                .iter()
                .map(|(org, role)| (org.to_string(), role.to_string()))
                .collect(),
        }
    }
}

impl Catalog {
    /// Maps an effectiveness label to its 1-5 score. Matching ignores case
    /// and surrounding whitespace; anything else scores 3.
    pub fn effectiveness_score(&self, label: Option<&str>) -> u8 {
        let Some(label) = label.map(str::trim) else {
            return DEFAULT_EFFECTIVENESS_SCORE;
        };
        self.effectiveness
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(label))
            .map(|(_, score)| *score)
            .unwrap_or(DEFAULT_EFFECTIVENESS_SCORE)
    }

    /// The role a response is grouped under, lowercased.
    pub fn resolve_role(&self, response: &SurveyResponse) -> String {
        if let Some(role) = response.role.as_deref().map(str::trim) {
            if !role.is_empty() {
                return role.to_lowercase();
            }
        }
        let Some(org) = response.organization_type.as_deref().map(str::trim) else {
            return UNKNOWN_ROLE.to_string();
        };
        self.role_mapping
            .iter()
            .find(|(org_type, _)| org_type.trim().eq_ignore_ascii_case(org))
            .map(|(_, role)| role.trim().to_lowercase())
            .unwrap_or_else(|| UNKNOWN_ROLE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::response;

    #[test]
    fn effectiveness_labels_map_to_scores() {
        let catalog = Catalog::default();
        assert_eq!(catalog.effectiveness_score(Some("Very Effective")), 5);
        assert_eq!(catalog.effectiveness_score(Some(" not effective ")), 1);
        assert_eq!(catalog.effectiveness_score(Some("unknown label")), 3);
        assert_eq!(catalog.effectiveness_score(None), 3);
    }

    #[test]
    fn explicit_role_wins_over_organization_type() {
        let catalog = Catalog::default();
        let mut r = response("r1", "p1");
        r.role = Some("Elder".to_string());
        r.organization_type = Some("church".to_string());
        assert_eq!(catalog.resolve_role(&r), "elder");

        r.role = None;
        assert_eq!(catalog.resolve_role(&r), "pastor");

        r.organization_type = Some("hospital".to_string());
        assert_eq!(catalog.resolve_role(&r), UNKNOWN_ROLE);
    }

    #[test]
    fn configured_mapping_keys_match_any_case() {
        let mut catalog = Catalog::default();
        catalog
            .role_mapping
            .insert("Mission_Agency".to_string(), "Missionary".to_string());
        let mut r = response("r1", "p1");
        r.organization_type = Some(" mission_agency ".to_string());
        assert_eq!(catalog.resolve_role(&r), "missionary");
    }

    #[test]
    fn default_catalog_has_twenty_skill_areas() {
        assert_eq!(Catalog::default().skill_areas.len(), 20);
    }
}
