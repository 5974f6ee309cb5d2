use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::models::{round2, ReportRecord, SurveyResponse, TrainingGap};

/// Bounds of the 1-5 Likert scale used by every training score.
pub const SCORE_FLOOR: f64 = 1.0;
pub const SCORE_CEILING: f64 = 5.0;

pub const UNKNOWN_BUCKET: &str = "Unknown";

pub type SkillAverages = IndexMap<String, f64>;

/// Mean of the recorded values for each catalog skill area. Missing and
/// null scores are ignored; a skill area nobody scored is left out.
pub fn calculate_average_training_scores(
    responses: &[SurveyResponse],
    catalog: &Catalog,
) -> SkillAverages {
    average_scores_of(responses.iter(), catalog)
}

pub fn average_scores_of<'a, I>(responses: I, catalog: &Catalog) -> SkillAverages
where
    I: Iterator<Item = &'a SurveyResponse> + Clone,
{
    let mut averages = SkillAverages::new();

    for skill in &catalog.skill_areas {
        let (total, count) = responses
            .clone()
            .filter_map(|r| r.score(skill))
            .fold((0.0, 0usize), |(total, count), score| (total + score, count + 1));

        if count > 0 {
            averages.insert(skill.clone(), total / count as f64);
        }
    }

    averages
}

/// Distance from the ceiling for each skill area, largest gap first.
pub fn training_gaps(averages: &SkillAverages) -> Vec<TrainingGap> {
    let mut gaps: Vec<TrainingGap> = averages
        .iter()
        .map(|(skill, average)| TrainingGap {
            skill_area: skill.clone(),
            average: round2(*average),
            gap: round2(SCORE_CEILING - average),
        })
        .collect();

    gaps.sort_by(|a, b| b.gap.partial_cmp(&a.gap).unwrap_or(std::cmp::Ordering::Equal));
    gaps
}

/// Mean across skill-area averages, or `None` when nothing was scored.
pub fn mean_of_means(averages: &SkillAverages) -> Option<f64> {
    if averages.is_empty() {
        None
    } else {
        Some(averages.values().sum::<f64>() / averages.len() as f64)
    }
}

pub fn skill_average_records(averages: &SkillAverages) -> Vec<ReportRecord> {
    averages
        .iter()
        .map(|(skill, average)| ReportRecord::new(skill.clone(), *average))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Country,
    EducationLevel,
    AgeGroup,
    SurveyType,
    Role,
    Region,
}

impl Dimension {
    pub fn key(self, response: &SurveyResponse, catalog: &Catalog) -> String {
        let value = match self {
            Self::Country => response.country.clone(),
            Self::EducationLevel => response.education_level.clone(),
            Self::AgeGroup => response.age_group.clone(),
            Self::SurveyType => Some(response.survey_type().label().to_string()),
            Self::Role => Some(catalog.resolve_role(response)),
            Self::Region => response.region.clone(),
        };
        value
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_BUCKET.to_string())
    }
}

pub fn group_by<'a>(
    responses: &'a [SurveyResponse],
    dimension: Dimension,
    catalog: &Catalog,
) -> IndexMap<String, Vec<&'a SurveyResponse>> {
    let mut groups: IndexMap<String, Vec<&SurveyResponse>> = IndexMap::new();
    for response in responses {
        groups
            .entry(dimension.key(response, catalog))
            .or_default()
            .push(response);
    }
    groups
}

/// Response counts and share of the total per group, most common first.
pub fn distribution(
    responses: &[SurveyResponse],
    dimension: Dimension,
    catalog: &Catalog,
) -> Vec<ReportRecord> {
    let total = responses.len();
    let mut records: Vec<ReportRecord> = group_by(responses, dimension, catalog)
        .into_iter()
        .map(|(name, members)| {
            let count = members.len();
            let mut record = ReportRecord::new(name, count as f64);
            record.count = Some(count);
            record.percentage = Some(round2(count as f64 / total as f64 * 100.0));
            record
        })
        .collect();

    records.sort_by(|a, b| b.count.cmp(&a.count));
    records
}
