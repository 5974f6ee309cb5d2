use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{
    average_scores_of, calculate_average_training_scores, mean_of_means, Dimension,
};
use crate::catalog::Catalog;
use crate::error::{DataError, Result};
use crate::models::{round2, ReportRecord, SurveyResponse};

pub const OVERALL_AVERAGE: &str = "Overall Average";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    WithinRole,
    #[default]
    AcrossRoles,
    RoleVsAverage,
    CrossRegional,
}

/// Which demographic summaries to attach to each group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemographicToggles {
    pub age: bool,
    pub experience: bool,
    pub education: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleComparisonConfig {
    enabled: bool,
    comparison_mode: ComparisonMode,
    selected_roles: Vec<String>,
    selected_regions: Vec<String>,
    benchmark_role: Option<String>,
    demographics: DemographicToggles,
}

impl RoleComparisonConfig {
    pub fn new(
        comparison_mode: ComparisonMode,
        selected_roles: Vec<String>,
        selected_regions: Vec<String>,
        benchmark_role: Option<String>,
        demographics: DemographicToggles,
    ) -> Result<Self> {
        let config = Self {
            enabled: true,
            comparison_mode,
            selected_roles,
            selected_regions,
            benchmark_role,
            demographics,
        };
        config.validate()?;
        Ok(config)
    }

    /// The configuration a fresh report starts from.
    pub fn reset() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        match self.comparison_mode {
            ComparisonMode::WithinRole if self.selected_roles.is_empty() => Err(
                DataError::InvalidConfig("within_role comparison needs at least one role".into()),
            ),
            ComparisonMode::RoleVsAverage
                if self
                    .benchmark_role
                    .as_deref()
                    .map_or(true, |role| role.trim().is_empty()) =>
            {
                Err(DataError::InvalidConfig(
                    "role_vs_average comparison needs a benchmark role".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn comparison_mode(&self) -> ComparisonMode {
        self.comparison_mode
    }

    pub fn selected_roles(&self) -> &[String] {
        &self.selected_roles
    }

    pub fn selected_regions(&self) -> &[String] {
        &self.selected_regions
    }

    pub fn benchmark_role(&self) -> Option<&str> {
        self.benchmark_role.as_deref()
    }

    pub fn demographics(&self) -> DemographicToggles {
        self.demographics
    }
}

pub fn generate_role_based_report_data(
    responses: &[SurveyResponse],
    config: &RoleComparisonConfig,
    catalog: &Catalog,
) -> Result<Vec<ReportRecord>> {
    config.validate()?;
    let records = match config.comparison_mode {
        ComparisonMode::WithinRole => compare_within_role(responses, config, catalog),
        ComparisonMode::AcrossRoles => compare_across_roles(responses, config, catalog),
        ComparisonMode::RoleVsAverage => {
            let benchmark = config.benchmark_role.as_deref().unwrap_or_default();
            let [overall, role] = compare_role_vs_average(responses, benchmark, catalog);
            vec![overall, role]
        }
        ComparisonMode::CrossRegional => compare_cross_regional(responses, config, catalog),
    };
    debug!(mode = ?config.comparison_mode, records = records.len(), "role comparison generated");
    Ok(records)
}

pub fn compare_within_role(
    responses: &[SurveyResponse],
    config: &RoleComparisonConfig,
    catalog: &Catalog,
) -> Vec<ReportRecord> {
    let mut groups: IndexMap<String, Vec<&SurveyResponse>> = config
        .selected_roles
        .iter()
        .map(|role| (role.trim().to_lowercase(), Vec::new()))
        .collect();

    for response in responses {
        if !in_regions(response, &config.selected_regions) {
            continue;
        }
        if let Some(members) = groups.get_mut(&catalog.resolve_role(response)) {
            members.push(response);
        }
    }

    groups
        .into_iter()
        .filter_map(|(role, members)| {
            let mut record = group_record(&role, &members, config.demographics, catalog)?;
            record.role = Some(role);
            Some(record)
        })
        .collect()
}

pub fn compare_across_roles(
    responses: &[SurveyResponse],
    config: &RoleComparisonConfig,
    catalog: &Catalog,
) -> Vec<ReportRecord> {
    let mut groups: IndexMap<String, Vec<&SurveyResponse>> = IndexMap::new();
    for response in responses {
        groups
            .entry(catalog.resolve_role(response))
            .or_default()
            .push(response);
    }

    let mut records: Vec<ReportRecord> = groups
        .into_iter()
        .filter_map(|(role, members)| {
            let mut record = group_record(&role, &members, config.demographics, catalog)?;
            record.satisfaction_score = Some(label_average(&members, catalog, |r| {
                r.program_satisfaction.as_deref()
            }));
            record.training_effectiveness = Some(label_average(&members, catalog, |r| {
                r.training_effectiveness.as_deref()
            }));
            record.role = Some(role);
            Some(record)
        })
        .collect();

    records.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));
    records
}

/// Always two records: the overall average, then the benchmark role with
/// its variance against that average. A side with no scores counts as 0.
pub fn compare_role_vs_average(
    responses: &[SurveyResponse],
    benchmark_role: &str,
    catalog: &Catalog,
) -> [ReportRecord; 2] {
    let benchmark_key = benchmark_role.trim().to_lowercase();
    let members: Vec<&SurveyResponse> = responses
        .iter()
        .filter(|r| catalog.resolve_role(r) == benchmark_key)
        .collect();

    let overall_score =
        mean_of_means(&calculate_average_training_scores(responses, catalog)).unwrap_or(0.0);
    let benchmark_score =
        mean_of_means(&average_scores_of(members.iter().copied(), catalog)).unwrap_or(0.0);

    let mut overall = ReportRecord::new(OVERALL_AVERAGE, overall_score);
    overall.count = Some(responses.len());

    let mut benchmark = ReportRecord::new(benchmark_role.trim(), benchmark_score);
    benchmark.count = Some(members.len());
    benchmark.role = Some(benchmark_key);
    benchmark.role_average = Some(round2(overall_score));
    benchmark.variance = Some(round2(benchmark_score - overall_score));

    [overall, benchmark]
}

pub fn compare_cross_regional(
    responses: &[SurveyResponse],
    config: &RoleComparisonConfig,
    catalog: &Catalog,
) -> Vec<ReportRecord> {
    let mut groups: IndexMap<(String, String), Vec<&SurveyResponse>> = IndexMap::new();
    for response in responses {
        if !in_regions(response, &config.selected_regions) {
            continue;
        }
        let region = Dimension::Region.key(response, catalog);
        groups
            .entry((region, catalog.resolve_role(response)))
            .or_default()
            .push(response);
    }

    let mut records: Vec<ReportRecord> = groups
        .into_iter()
        .filter_map(|((region, role), members)| {
            let name = format!("{region} - {role}");
            let mut record = group_record(&name, &members, config.demographics, catalog)?;
            record.region = Some(region);
            record.role = Some(role);
            Some(record)
        })
        .collect();

    records.sort_by(|a, b| a.region.cmp(&b.region));
    records
}

fn in_regions(response: &SurveyResponse, regions: &[String]) -> bool {
    regions.is_empty()
        || response
            .region
            .as_ref()
            .is_some_and(|region| regions.contains(region))
}

fn group_record(
    name: &str,
    members: &[&SurveyResponse],
    demographics: DemographicToggles,
    catalog: &Catalog,
) -> Option<ReportRecord> {
    let Some(score) = mean_of_means(&average_scores_of(members.iter().copied(), catalog)) else {
        debug!(group = name, members = members.len(), "skipping group without scores");
        return None;
    };

    let mut record = ReportRecord::new(name, score);
    record.count = Some(members.len());
    if demographics.age {
        record.average_age = average(members.iter().filter_map(|r| r.age));
    }
    if demographics.experience {
        record.average_experience = average(members.iter().filter_map(|r| r.years_experience));
    }
    if demographics.education {
        record.top_education_level =
            most_common(members.iter().filter_map(|r| r.education_level.as_deref()));
    }
    Some(record)
}

fn label_average(
    members: &[&SurveyResponse],
    catalog: &Catalog,
    label: impl Fn(&SurveyResponse) -> Option<&str>,
) -> f64 {
    let total: f64 = members
        .iter()
        .map(|r| f64::from(catalog.effectiveness_score(label(*r))))
        .sum();
    round2(total / members.len().max(1) as f64)
}

fn average(values: impl Iterator<Item = i32>) -> Option<f64> {
    let (total, count) = values.fold((0i64, 0usize), |(t, c), v| (t + i64::from(v), c + 1));
    (count > 0).then(|| round2(total as f64 / count as f64))
}

/// Most frequent value; ties go to the value seen first.
fn most_common<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}
