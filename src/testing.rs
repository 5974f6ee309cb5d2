use std::collections::BTreeMap;

use crate::models::{SurveyDetails, SurveyResponse, SurveyType};

pub fn response(id: &str, respondent_id: &str) -> SurveyResponse {
    SurveyResponse {
        id: id.to_string(),
        respondent_id: respondent_id.to_string(),
        name: format!("Respondent {respondent_id}"),
        organization: None,
        organization_type: None,
        role: None,
        country: None,
        city: None,
        region: None,
        age: None,
        age_group: None,
        education_level: None,
        years_experience: None,
        training_effectiveness: None,
        program_satisfaction: None,
        latitude: None,
        longitude: None,
        submitted_at: None,
        ministry_training_scores: BTreeMap::new(),
        details: SurveyDetails::empty(SurveyType::Church),
    }
}

pub fn scored(id: &str, role: &str, region: &str, scores: &[(&str, f64)]) -> SurveyResponse {
    let mut r = response(id, id);
    r.role = Some(role.to_string());
    r.region = Some(region.to_string());
    r.ministry_training_scores = scores
        .iter()
        .map(|(skill, score)| (skill.to_string(), Some(*score)))
        .collect();
    r
}
