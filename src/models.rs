use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum SurveyType {
    Church,
    Institution,
    NonFormal,
}

impl SurveyType {
    pub const ALL: [SurveyType; 3] = [Self::Church, Self::Institution, Self::NonFormal];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Church => "church",
            Self::Institution => "institution",
            Self::NonFormal => "non_formal",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Church => "Church",
            Self::Institution => "Institution",
            Self::NonFormal => "Non-Formal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "church" => Some(Self::Church),
            "institution" => Some(Self::Institution),
            "non_formal" | "nonformal" => Some(Self::NonFormal),
            _ => None,
        }
    }
}

impl fmt::Display for SurveyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields that only exist for one kind of survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "survey_type", rename_all = "snake_case")]
pub enum SurveyDetails {
    Church {
        denomination: Option<String>,
        congregation_size: Option<i32>,
    },
    Institution {
        institution_type: Option<String>,
        actea_accredited: Option<bool>,
        student_count: Option<i32>,
    },
    NonFormal {
        program_format: Option<String>,
        participant_count: Option<i32>,
    },
}

impl SurveyDetails {
    pub fn empty(survey_type: SurveyType) -> Self {
        match survey_type {
            SurveyType::Church => Self::Church {
                denomination: None,
                congregation_size: None,
            },
            SurveyType::Institution => Self::Institution {
                institution_type: None,
                actea_accredited: None,
                student_count: None,
            },
            SurveyType::NonFormal => Self::NonFormal {
                program_format: None,
                participant_count: None,
            },
        }
    }
}

/// One respondent's answers to one survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub id: String,
    pub respondent_id: String,
    pub name: String,
    pub organization: Option<String>,
    pub organization_type: Option<String>,
    pub role: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub age: Option<i32>,
    pub age_group: Option<String>,
    pub education_level: Option<String>,
    pub years_experience: Option<i32>,
    pub training_effectiveness: Option<String>,
    pub program_satisfaction: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub submitted_at: Option<NaiveDate>,
    pub ministry_training_scores: BTreeMap<String, Option<f64>>,
    pub details: SurveyDetails,
}

impl SurveyResponse {
    pub fn survey_type(&self) -> SurveyType {
        match self.details {
            SurveyDetails::Church { .. } => SurveyType::Church,
            SurveyDetails::Institution { .. } => SurveyType::Institution,
            SurveyDetails::NonFormal { .. } => SurveyType::NonFormal,
        }
    }

    pub fn actea_accredited(&self) -> Option<bool> {
        match self.details {
            SurveyDetails::Institution {
                actea_accredited, ..
            } => actea_accredited,
            _ => None,
        }
    }

    /// Score for a skill area, if one was recorded.
    pub fn score(&self, skill_area: &str) -> Option<f64> {
        self.ministry_training_scores
            .get(skill_area)
            .copied()
            .flatten()
    }
}

/// The normalized row every report converges on before rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfaction_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_effectiveness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_age: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_experience: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_education_level: Option<String>,
}

impl ReportRecord {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: round2(value),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingGap {
    pub skill_area: String,
    pub average: f64,
    pub gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionBank {
    #[serde(default)]
    pub church: Vec<Question>,
    #[serde(default)]
    pub institution: Vec<Question>,
    #[serde(default)]
    pub non_formal: Vec<Question>,
}

impl QuestionBank {
    pub fn for_survey(&self, survey_type: SurveyType) -> &[Question] {
        match survey_type {
            SurveyType::Church => &self.church,
            SurveyType::Institution => &self.institution,
            SurveyType::NonFormal => &self.non_formal,
        }
    }
}

/// Rounds to two decimal places, the precision every report value carries.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
