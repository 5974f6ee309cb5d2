use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{calculate_average_training_scores, mean_of_means};
use crate::catalog::Catalog;
use crate::models::{ReportRecord, SurveyResponse};

pub fn filter_by_country(responses: &[SurveyResponse], country: &str) -> Vec<SurveyResponse> {
    retain(responses, |r| r.country.as_deref() == Some(country))
}

pub fn filter_by_education_level(
    responses: &[SurveyResponse],
    education_level: &str,
) -> Vec<SurveyResponse> {
    retain(responses, |r| {
        r.education_level.as_deref() == Some(education_level)
    })
}

pub fn filter_by_age_group(responses: &[SurveyResponse], age_group: &str) -> Vec<SurveyResponse> {
    retain(responses, |r| r.age_group.as_deref() == Some(age_group))
}

/// Only institution responses carry an accreditation flag; everything else
/// is excluded for either value.
pub fn filter_by_actea_accreditation(
    responses: &[SurveyResponse],
    accredited: bool,
) -> Vec<SurveyResponse> {
    retain(responses, |r| r.actea_accredited() == Some(accredited))
}

fn retain(
    responses: &[SurveyResponse],
    keep: impl Fn(&SurveyResponse) -> bool,
) -> Vec<SurveyResponse> {
    responses.iter().filter(|r| keep(*r)).cloned().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub min: i32,
    pub max: i32,
}

impl Range {
    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndividualFilters {
    pub filter_by_role: bool,
    pub selected_roles: Vec<String>,
    pub filter_by_organization: bool,
    pub selected_organizations: Vec<String>,
    pub age_range: Option<Range>,
    pub experience_range: Option<Range>,
    pub education_levels: Vec<String>,
    pub regions: Vec<String>,
    pub compare_across_individuals: bool,
}

impl IndividualFilters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Applies each active predicate in turn: role, organization, age,
/// experience, education level, region. An empty selection leaves the set
/// unchanged. When comparing across individuals, only the first response
/// per respondent survives.
pub fn apply_individual_filters(
    responses: &[SurveyResponse],
    filters: &IndividualFilters,
    catalog: &Catalog,
) -> Vec<SurveyResponse> {
    let mut filtered = responses.to_vec();

    if filters.filter_by_role && !filters.selected_roles.is_empty() {
        let roles: HashSet<String> = filters
            .selected_roles
            .iter()
            .map(|role| role.trim().to_lowercase())
            .collect();
        filtered.retain(|r| roles.contains(&catalog.resolve_role(r)));
    }

    if filters.filter_by_organization && !filters.selected_organizations.is_empty() {
        filtered.retain(|r| {
            r.organization
                .as_ref()
                .is_some_and(|org| filters.selected_organizations.contains(org))
        });
    }

    if let Some(range) = filters.age_range {
        filtered.retain(|r| r.age.is_some_and(|age| range.contains(age)));
    }

    if let Some(range) = filters.experience_range {
        filtered.retain(|r| r.years_experience.is_some_and(|years| range.contains(years)));
    }

    if !filters.education_levels.is_empty() {
        filtered.retain(|r| {
            r.education_level
                .as_ref()
                .is_some_and(|level| filters.education_levels.contains(level))
        });
    }

    if !filters.regions.is_empty() {
        filtered.retain(|r| {
            r.region
                .as_ref()
                .is_some_and(|region| filters.regions.contains(region))
        });
    }

    debug!(
        before = responses.len(),
        after = filtered.len(),
        "applied individual filters"
    );

    if filters.compare_across_individuals {
        dedupe_by_respondent(filtered)
    } else {
        filtered
    }
}

pub fn dedupe_by_respondent(responses: Vec<SurveyResponse>) -> Vec<SurveyResponse> {
    let mut seen = HashSet::new();
    responses
        .into_iter()
        .filter(|r| seen.insert(r.respondent_id.clone()))
        .collect()
}

/// One record per respondent, valued at the mean of their own skill scores.
/// Respondents without any scores are left out.
pub fn individual_comparison_records(
    responses: &[SurveyResponse],
    catalog: &Catalog,
) -> Vec<ReportRecord> {
    dedupe_by_respondent(responses.to_vec())
        .iter()
        .filter_map(|response| {
            let averages = calculate_average_training_scores(std::slice::from_ref(response), catalog);
            let score = mean_of_means(&averages)?;
            let mut record = ReportRecord::new(response.name.clone(), score);
            record.role = Some(catalog.resolve_role(response));
            record.region = response.region.clone();
            Some(record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SurveyDetails;
    use crate::testing::{response, scored};
    use pretty_assertions::assert_eq;

    fn ids(responses: &[SurveyResponse]) -> Vec<&str> {
        responses.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn country_filter_uses_exact_match() {
        let mut a = response("a", "a");
        a.country = Some("Kenya".to_string());
        let mut b = response("b", "b");
        b.country = Some("kenya".to_string());
        let c = response("c", "c");
        let input = vec![a, b, c];

        let filtered = filter_by_country(&input, "Kenya");
        assert_eq!(ids(&filtered), vec!["a"]);
        assert_eq!(input.len(), 3);
    }

    #[test]
    fn accreditation_filter_only_matches_institutions() {
        let mut inst = response("i", "i");
        inst.details = SurveyDetails::Institution {
            institution_type: None,
            actea_accredited: Some(false),
            student_count: None,
        };
        let church = response("c", "c");
        let input = vec![inst, church];

        assert_eq!(ids(&filter_by_actea_accreditation(&input, false)), vec!["i"]);
        assert!(filter_by_actea_accreditation(&input, true).is_empty());
    }

    #[test]
    fn role_filter_resolves_role_from_organization_type() {
        let catalog = Catalog::default();
        let explicit = scored("explicit", "Pastor", "East", &[]);
        let mut mapped = response("mapped", "mapped");
        mapped.organization_type = Some("church".to_string());
        let trainer = scored("trainer", "trainer", "East", &[]);
        let input = vec![explicit, mapped, trainer];

        let filters = IndividualFilters {
            filter_by_role: true,
            selected_roles: vec!["pastor".to_string()],
            ..IndividualFilters::default()
        };
        assert_eq!(
            ids(&apply_individual_filters(&input, &filters, &catalog)),
            vec!["explicit", "mapped"]
        );
    }

    #[test]
    fn empty_role_selection_is_a_no_op() {
        let catalog = Catalog::default();
        let input = vec![
            scored("a", "pastor", "East", &[]),
            scored("b", "trainer", "West", &[]),
        ];
        let filters = IndividualFilters {
            filter_by_role: true,
            ..IndividualFilters::default()
        };
        assert_eq!(apply_individual_filters(&input, &filters, &catalog), input);
    }

    #[test]
    fn ranges_and_sets_combine_as_and() {
        let catalog = Catalog::default();
        let mut a = scored("a", "pastor", "East", &[]);
        a.age = Some(35);
        a.years_experience = Some(10);
        a.education_level = Some("Masters".to_string());
        let mut b = a.clone();
        b.id = "b".to_string();
        b.age = Some(61);
        let mut c = a.clone();
        c.id = "c".to_string();
        c.region = Some("West".to_string());
        let mut d = a.clone();
        d.id = "d".to_string();
        d.years_experience = None;

        let filters = IndividualFilters {
            age_range: Some(Range { min: 30, max: 60 }),
            experience_range: Some(Range { min: 5, max: 20 }),
            education_levels: vec!["Masters".to_string()],
            regions: vec!["East".to_string()],
            ..IndividualFilters::default()
        };
        let input = vec![a, b, c, d];
        assert_eq!(
            ids(&apply_individual_filters(&input, &filters, &catalog)),
            vec!["a"]
        );
    }

    #[test]
    fn comparing_individuals_keeps_first_response_per_respondent() {
        let catalog = Catalog::default();
        let mut first = scored("r1", "pastor", "East", &[("preaching", 4.0)]);
        first.respondent_id = "p1".to_string();
        let mut second = scored("r2", "pastor", "East", &[("preaching", 2.0)]);
        second.respondent_id = "p1".to_string();
        let other = scored("r3", "pastor", "East", &[("preaching", 3.0)]);

        let filters = IndividualFilters {
            compare_across_individuals: true,
            ..IndividualFilters::default()
        };
        let input = vec![first, second, other];
        let filtered = apply_individual_filters(&input, &filters, &catalog);
        assert_eq!(ids(&filtered), vec!["r1", "r3"]);

        let records = individual_comparison_records(&input, &catalog);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value, 4.0);
    }

    #[test]
    fn filters_are_idempotent() {
        let catalog = Catalog::default();
        let input = vec![
            scored("a", "pastor", "East", &[]),
            scored("b", "trainer", "West", &[]),
        ];
        let filters = IndividualFilters {
            regions: vec!["West".to_string()],
            ..IndividualFilters::default()
        };
        assert_eq!(
            apply_individual_filters(&input, &filters, &catalog),
            apply_individual_filters(&input, &filters, &catalog)
        );
    }
}
