use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{DataError, Result};
use crate::models::{QuestionBank, SurveyDetails, SurveyResponse, SurveyType};

pub const QUESTIONS_FIXTURE: &str = "survey-questions.json";

pub fn fixture_name(survey_type: SurveyType) -> &'static str {
    match survey_type {
        SurveyType::Church => "church-survey-responses.json",
        SurveyType::Institution => "institution-survey-responses.json",
        SurveyType::NonFormal => "non-formal-survey-responses.json",
    }
}

/// Flat on-disk shape of a response; type-specific fields are folded into
/// [`SurveyDetails`] according to the fixture the record came from.
#[derive(Debug, Deserialize)]
struct FixtureRecord {
    id: String,
    #[serde(default)]
    respondent_id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    organization_type: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    age: Option<i32>,
    #[serde(default)]
    age_group: Option<String>,
    #[serde(default)]
    education_level: Option<String>,
    #[serde(default)]
    years_experience: Option<i32>,
    #[serde(default)]
    training_effectiveness: Option<String>,
    #[serde(default)]
    program_satisfaction: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    submitted_at: Option<NaiveDate>,
    #[serde(default)]
    ministry_training_scores: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    denomination: Option<String>,
    #[serde(default)]
    congregation_size: Option<i32>,
    #[serde(default)]
    institution_type: Option<String>,
    #[serde(default)]
    actea_accredited: Option<bool>,
    #[serde(default)]
    student_count: Option<i32>,
    #[serde(default)]
    program_format: Option<String>,
    #[serde(default)]
    participant_count: Option<i32>,
}

impl FixtureRecord {
    fn into_response(self, survey_type: SurveyType) -> SurveyResponse {
        let details = match survey_type {
            SurveyType::Church => SurveyDetails::Church {
                denomination: self.denomination,
                congregation_size: self.congregation_size,
            },
            SurveyType::Institution => SurveyDetails::Institution {
                institution_type: self.institution_type,
                actea_accredited: self.actea_accredited,
                student_count: self.student_count,
            },
            SurveyType::NonFormal => SurveyDetails::NonFormal {
                program_format: self.program_format,
                participant_count: self.participant_count,
            },
        };

        SurveyResponse {
            respondent_id: self.respondent_id.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            name: self.name,
            organization: self.organization,
            organization_type: self.organization_type,
            role: self.role,
            country: self.country,
            city: self.city,
            region: self.region,
            age: self.age,
            age_group: self.age_group,
            education_level: self.education_level,
            years_experience: self.years_experience,
            training_effectiveness: self.training_effectiveness,
            program_satisfaction: self.program_satisfaction,
            latitude: self.latitude,
            longitude: self.longitude,
            submitted_at: self.submitted_at,
            ministry_training_scores: self.ministry_training_scores,
            details,
        }
    }
}

/// All three response fixtures.
#[derive(Debug, Clone, Default)]
pub struct FixtureSet {
    pub church: Vec<SurveyResponse>,
    pub institution: Vec<SurveyResponse>,
    pub non_formal: Vec<SurveyResponse>,
}

impl FixtureSet {
    /// Responses of the requested types, in church, institution, non-formal
    /// order. An empty selection means every type.
    pub fn select(self, survey_types: &[SurveyType]) -> Vec<SurveyResponse> {
        let wanted = |t: SurveyType| survey_types.is_empty() || survey_types.contains(&t);
        let mut out = Vec::new();
        if wanted(SurveyType::Church) {
            out.extend(self.church);
        }
        if wanted(SurveyType::Institution) {
            out.extend(self.institution);
        }
        if wanted(SurveyType::NonFormal) {
            out.extend(self.non_formal);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct FixtureStore {
    dir: PathBuf,
}

impl FixtureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn load(
        &self,
        survey_type: SurveyType,
        cancel: &CancellationToken,
    ) -> Result<Vec<SurveyResponse>> {
        let records: Vec<FixtureRecord> =
            cancellable(cancel, self.read_json(fixture_name(survey_type))).await?;
        debug!(%survey_type, count = records.len(), "loaded fixture");
        Ok(records
            .into_iter()
            .map(|record| record.into_response(survey_type))
            .collect())
    }

    pub async fn load_all(&self, cancel: &CancellationToken) -> Result<FixtureSet> {
        let (church, institution, non_formal) = tokio::try_join!(
            self.load(SurveyType::Church, cancel),
            self.load(SurveyType::Institution, cancel),
            self.load(SurveyType::NonFormal, cancel),
        )?;
        Ok(FixtureSet {
            church,
            institution,
            non_formal,
        })
    }

    pub async fn load_questions(&self, cancel: &CancellationToken) -> Result<QuestionBank> {
        cancellable(cancel, self.read_json(QUESTIONS_FIXTURE)).await
    }

    async fn read_json<T: DeserializeOwned>(&self, fixture: &str) -> Result<T> {
        let path = self.dir.join(fixture);
        let bytes = tokio::fs::read(&path).await.map_err(|source| {
            error!(fixture, path = %path.display(), error = %source, "fixture read failed");
            DataError::FixtureRead {
                fixture: fixture.to_string(),
                source,
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|source| {
            error!(fixture, error = %source, "fixture parse failed");
            DataError::FixtureParse {
                fixture: fixture.to_string(),
                source,
            }
        })
    }
}

/// Runs `load` unless `cancel` fires first.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    load: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DataError::Cancelled),
        result = load => result,
    }
}

pub fn find_response<'a>(responses: &'a [SurveyResponse], id: &str) -> Result<&'a SurveyResponse> {
    responses
        .iter()
        .find(|response| response.id == id)
        .ok_or_else(|| DataError::ResponseNotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_fixtures(dir: &Path) {
        fs::write(
            dir.join(fixture_name(SurveyType::Church)),
            r#"[{"id":"c1","respondent_id":"p1","name":"Grace","organization_type":"church",
                "denomination":"Baptist","ministry_training_scores":{"preaching":4,"counseling":null}}]"#,
        )
        .unwrap();
        fs::write(
            dir.join(fixture_name(SurveyType::Institution)),
            r#"[{"id":"i1","name":"Samuel","actea_accredited":true}]"#,
        )
        .unwrap();
        fs::write(dir.join(fixture_name(SurveyType::NonFormal)), "[]").unwrap();
    }

    #[tokio::test]
    async fn loads_all_three_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let store = FixtureStore::new(dir.path());

        let set = store.load_all(&CancellationToken::new()).await.unwrap();
        assert_eq!(set.church.len(), 1);
        assert_eq!(set.institution.len(), 1);
        assert!(set.non_formal.is_empty());

        let church = &set.church[0];
        assert_eq!(church.survey_type(), SurveyType::Church);
        assert_eq!(church.score("preaching"), Some(4.0));
        assert_eq!(church.score("counseling"), None);

        let institution = &set.institution[0];
        assert_eq!(institution.respondent_id, "i1");
        assert_eq!(institution.actea_accredited(), Some(true));
    }

    #[tokio::test]
    async fn missing_fixture_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FixtureStore::new(dir.path());
        let err = store
            .load(SurveyType::NonFormal, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("non-formal-survey-responses.json"));
    }

    #[tokio::test]
    async fn one_bad_fixture_fails_the_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        fs::write(dir.path().join(fixture_name(SurveyType::NonFormal)), "{not json").unwrap();
        let store = FixtureStore::new(dir.path());

        let err = store.load_all(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DataError::FixtureParse { ref fixture, .. } if fixture == "non-formal-survey-responses.json"));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let store = FixtureStore::new(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = store.load_all(&cancel).await.unwrap_err();
        assert!(matches!(err, DataError::Cancelled));
    }

    #[tokio::test]
    async fn questions_load_per_survey_type() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(QUESTIONS_FIXTURE),
            r#"{"church":[{"id":"q1","text":"How long have you served?"}]}"#,
        )
        .unwrap();
        let store = FixtureStore::new(dir.path());
        let bank = store.load_questions(&CancellationToken::new()).await.unwrap();
        assert_eq!(bank.for_survey(SurveyType::Church).len(), 1);
        assert!(bank.for_survey(SurveyType::Institution).is_empty());
    }

    #[test]
    fn unknown_response_id_is_reported() {
        let responses = vec![crate::testing::response("r1", "p1")];
        assert!(find_response(&responses, "r1").is_ok());
        let err = find_response(&responses, "r9").unwrap_err();
        assert_eq!(err.to_string(), "Selected response not found: r9");
    }
}
