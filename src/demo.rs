use std::collections::BTreeMap;

use chrono::NaiveDate;
use rand::Rng;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::{DataError, Result};
use crate::models::{round2, SurveyDetails, SurveyResponse, SurveyType};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoUser {
    pub id: &'static str,
    pub name: &'static str,
    pub email: &'static str,
    pub role: &'static str,
    pub organization: &'static str,
    pub country: &'static str,
    pub region: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoSurvey {
    pub id: &'static str,
    pub title: &'static str,
    pub survey_type: SurveyType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoSubmission {
    pub survey_id: &'static str,
    pub title: &'static str,
    pub survey_type: SurveyType,
    pub completed_on: NaiveDate,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSurveyData {
    pub user: DemoUser,
    pub submissions: Vec<DemoSubmission>,
}

static USERS: [DemoUser; 6] = [
    DemoUser {
        id: "user-001",
        name: "Daniel Mwangi",
        email: "daniel.mwangi@example.org",
        role: "pastor",
        organization: "Nairobi Community Church",
        country: "Kenya",
        region: "East Africa",
    },
    DemoUser {
        id: "user-002",
        name: "Esther Osei",
        email: "esther.osei@example.org",
        role: "faculty",
        organization: "West Africa Theological Seminary",
        country: "Ghana",
        region: "West Africa",
    },
    DemoUser {
        id: "user-003",
        name: "Joseph Banda",
        email: "joseph.banda@example.org",
        role: "ministry_leader",
        organization: "Lilongwe Leadership Network",
        country: "Malawi",
        region: "Southern Africa",
    },
    DemoUser {
        id: "user-004",
        name: "Ruth Tesfaye",
        email: "ruth.tesfaye@example.org",
        role: "pastor",
        organization: "Addis Grace Fellowship",
        country: "Ethiopia",
        region: "East Africa",
    },
    DemoUser {
        id: "user-005",
        name: "Samuel Adeyemi",
        email: "samuel.adeyemi@example.org",
        role: "faculty",
        organization: "Lagos Bible College",
        country: "Nigeria",
        region: "West Africa",
    },
    DemoUser {
        id: "user-006",
        name: "Naledi Khumalo",
        email: "naledi.khumalo@example.org",
        role: "ministry_leader",
        organization: "Durban Discipleship Program",
        country: "South Africa",
        region: "Southern Africa",
    },
];

static SURVEYS: [DemoSurvey; 3] = [
    DemoSurvey {
        id: "survey-church-2024",
        title: "Church Leadership Survey",
        survey_type: SurveyType::Church,
    },
    DemoSurvey {
        id: "survey-institution-2024",
        title: "Theological Institution Survey",
        survey_type: SurveyType::Institution,
    },
    DemoSurvey {
        id: "survey-non-formal-2024",
        title: "Non-Formal Training Survey",
        survey_type: SurveyType::NonFormal,
    },
];

const RECENT_DATES: [(i32, u32, u32); 5] = [
    (2024, 1, 15),
    (2024, 2, 3),
    (2024, 2, 20),
    (2024, 3, 8),
    (2024, 3, 27),
];

pub fn users() -> &'static [DemoUser] {
    &USERS
}

pub fn surveys() -> &'static [DemoSurvey] {
    &SURVEYS
}

pub fn user(user_id: &str) -> Result<&'static DemoUser> {
    USERS
        .iter()
        .find(|u| u.id == user_id)
        .ok_or_else(|| DataError::UserNotFound(user_id.to_string()))
}

pub fn users_by_role(role: &str) -> Vec<&'static DemoUser> {
    let role = role.trim();
    USERS
        .iter()
        .filter(|u| u.role.eq_ignore_ascii_case(role))
        .collect()
}

/// Surveys a user has taken. Pastors answer the church survey, faculty the
/// institution survey, ministry leaders the non-formal survey. Roughly a
/// third of the others, chosen by id, also answered the church survey.
pub fn surveys_by_user(user_id: &str) -> Result<Vec<&'static DemoSurvey>> {
    let user = user(user_id)?;
    let primary = match user.role {
        "faculty" => SurveyType::Institution,
        "ministry_leader" => SurveyType::NonFormal,
        _ => SurveyType::Church,
    };
    let extra_church = primary != SurveyType::Church && seed(user.id) % 3 == 0;

    Ok(SURVEYS
        .iter()
        .filter(|s| {
            s.survey_type == primary || (extra_church && s.survey_type == SurveyType::Church)
        })
        .collect())
}

pub fn user_survey_data<R: Rng>(user_id: &str, rng: &mut R) -> Result<UserSurveyData> {
    let user = user(user_id)?;
    let submissions = surveys_by_user(user_id)?
        .into_iter()
        .map(|survey| DemoSubmission {
            survey_id: survey.id,
            title: survey.title,
            survey_type: survey.survey_type,
            completed_on: random_recent_date(rng),
            score: submission_score(user.id, survey.id),
        })
        .collect();

    Ok(UserSurveyData {
        user: user.clone(),
        submissions,
    })
}

pub fn random_recent_date<R: Rng>(rng: &mut R) -> NaiveDate {
    let (year, month, day) = RECENT_DATES[rng.gen_range(0..RECENT_DATES.len())];
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// One synthetic response per user and survey, for seeding a database.
pub fn sample_responses<R: Rng>(catalog: &Catalog, rng: &mut R) -> Vec<SurveyResponse> {
    let mut responses = Vec::new();
    for user in &USERS {
        let Ok(taken) = surveys_by_user(user.id) else {
            continue;
        };
        for survey in taken {
            let scores: BTreeMap<String, Option<f64>> = catalog
                .skill_areas
                .iter()
                .map(|skill| (skill.clone(), Some((1 + seed_pair(user.id, skill) % 5) as f64)))
                .collect();
            responses.push(SurveyResponse {
                id: format!("{}-{}", survey.id, user.id),
                respondent_id: user.id.to_string(),
                name: user.name.to_string(),
                organization: Some(user.organization.to_string()),
                organization_type: Some(survey.survey_type.as_str().to_string()),
                role: Some(user.role.to_string()),
                country: Some(user.country.to_string()),
                city: None,
                region: Some(user.region.to_string()),
                age: Some(28 + (seed(user.id) % 30) as i32),
                age_group: None,
                education_level: None,
                years_experience: Some((seed(user.id) % 20) as i32),
                training_effectiveness: None,
                program_satisfaction: None,
                latitude: None,
                longitude: None,
                submitted_at: Some(random_recent_date(rng)),
                ministry_training_scores: scores,
                details: SurveyDetails::empty(survey.survey_type),
            });
        }
    }
    responses
}

fn submission_score(user_id: &str, survey_id: &str) -> f64 {
    round2(2.5 + (seed_pair(user_id, survey_id) % 26) as f64 / 10.0)
}

fn seed(value: &str) -> u64 {
    value
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
}

fn seed_pair(a: &str, b: &str) -> u64 {
    seed(a).wrapping_mul(131).wrapping_add(seed(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn unknown_user_is_an_error() {
        let err = user("user-999").unwrap_err();
        assert_eq!(err.to_string(), "User not found: user-999");
        let mut rng = StdRng::seed_from_u64(1);
        assert!(user_survey_data("user-999", &mut rng).is_err());
    }

    #[test]
    fn users_by_role_ignores_case() {
        let pastors = users_by_role("Pastor");
        assert_eq!(pastors.len(), 2);
        assert!(pastors.iter().all(|u| u.role == "pastor"));
        assert!(users_by_role("bishop").is_empty());
    }

    #[test]
    fn lookups_are_deterministic() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        assert_eq!(
            user_survey_data("user-002", &mut a).unwrap(),
            user_survey_data("user-002", &mut b).unwrap()
        );
    }

    #[test]
    fn primary_survey_follows_role() {
        let surveys = surveys_by_user("user-002").unwrap();
        assert!(surveys.iter().any(|s| s.survey_type == SurveyType::Institution));
        let surveys = surveys_by_user("user-001").unwrap();
        assert_eq!(surveys.len(), 1);
        assert_eq!(surveys[0].survey_type, SurveyType::Church);
    }

    #[test]
    fn recent_dates_come_from_the_fixed_list() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let date = random_recent_date(&mut rng);
            let tuple = (
                chrono::Datelike::year(&date),
                chrono::Datelike::month(&date),
                chrono::Datelike::day(&date),
            );
            assert!(RECENT_DATES.contains(&tuple));
        }
    }

    #[test]
    fn submission_scores_stay_on_scale() {
        for user in users() {
            for survey in surveys() {
                let score = submission_score(user.id, survey.id);
                assert!((2.5..=5.0).contains(&score));
            }
        }
    }

    #[test]
    fn sample_responses_score_every_skill() {
        let catalog = Catalog::default();
        let mut rng = StdRng::seed_from_u64(3);
        let responses = sample_responses(&catalog, &mut rng);
        assert!(responses.len() >= USERS.len());
        for response in &responses {
            assert_eq!(response.ministry_training_scores.len(), catalog.skill_areas.len());
            assert!(response
                .ministry_training_scores
                .values()
                .all(|s| s.is_some_and(|v| (1.0..=5.0).contains(&v))));
        }
    }
}
