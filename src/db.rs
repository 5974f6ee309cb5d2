use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::aggregate::{SCORE_CEILING, SCORE_FLOOR};
use crate::builder::ReportConfig;
use crate::catalog::Catalog;
use crate::demo;
use crate::form::FormData;
use crate::models::{SurveyDetails, SurveyResponse, SurveyType};

/// Column prefix marking a training score in imported CSV files.
pub const SCORE_COLUMN_PREFIX: &str = "score_";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed<R: Rng>(pool: &PgPool, catalog: &Catalog, rng: &mut R) -> anyhow::Result<usize> {
    let responses = demo::sample_responses(catalog, rng);
    for response in &responses {
        upsert_response(pool, response).await?;
    }
    info!(count = responses.len(), "seeded demo responses");
    Ok(responses.len())
}

pub async fn upsert_response(pool: &PgPool, response: &SurveyResponse) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO survey_insights.responses
        (id, respondent_id, survey_type, name, organization, organization_type, role,
         country, city, region, age, age_group, education_level, years_experience,
         training_effectiveness, program_satisfaction, latitude, longitude, submitted_at,
         scores, details)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21)
        ON CONFLICT (id) DO UPDATE
        SET respondent_id = EXCLUDED.respondent_id,
            survey_type = EXCLUDED.survey_type,
            name = EXCLUDED.name,
            organization = EXCLUDED.organization,
            organization_type = EXCLUDED.organization_type,
            role = EXCLUDED.role,
            country = EXCLUDED.country,
            city = EXCLUDED.city,
            region = EXCLUDED.region,
            age = EXCLUDED.age,
            age_group = EXCLUDED.age_group,
            education_level = EXCLUDED.education_level,
            years_experience = EXCLUDED.years_experience,
            training_effectiveness = EXCLUDED.training_effectiveness,
            program_satisfaction = EXCLUDED.program_satisfaction,
            latitude = EXCLUDED.latitude,
            longitude = EXCLUDED.longitude,
            submitted_at = EXCLUDED.submitted_at,
            scores = EXCLUDED.scores,
            details = EXCLUDED.details
        "#,
    )
    .bind(&response.id)
    .bind(&response.respondent_id)
    .bind(response.survey_type().as_str())
    .bind(&response.name)
    .bind(&response.organization)
    .bind(&response.organization_type)
    .bind(&response.role)
    .bind(&response.country)
    .bind(&response.city)
    .bind(&response.region)
    .bind(response.age)
    .bind(&response.age_group)
    .bind(&response.education_level)
    .bind(response.years_experience)
    .bind(&response.training_effectiveness)
    .bind(&response.program_satisfaction)
    .bind(response.latitude)
    .bind(response.longitude)
    .bind(response.submitted_at)
    .bind(Json(&response.ministry_training_scores))
    .bind(Json(&response.details))
    .execute(pool)
    .await
    .with_context(|| format!("failed to store response {}", response.id))?;

    Ok(result.rows_affected() > 0)
}

/// Stored responses of the given types, or of every type when empty.
pub async fn fetch_responses(
    pool: &PgPool,
    survey_types: &[SurveyType],
) -> anyhow::Result<Vec<SurveyResponse>> {
    let mut query = String::from(
        "SELECT id, respondent_id, name, organization, organization_type, role, country, city, \
         region, age, age_group, education_level, years_experience, training_effectiveness, \
         program_satisfaction, latitude, longitude, submitted_at, scores, details \
         FROM survey_insights.responses",
    );

    if !survey_types.is_empty() {
        query.push_str(" WHERE survey_type = ANY($1)");
    }
    query.push_str(" ORDER BY created_at, id");

    let mut rows = sqlx::query(&query);
    if !survey_types.is_empty() {
        let types: Vec<String> = survey_types.iter().map(|t| t.as_str().to_string()).collect();
        rows = rows.bind(types);
    }

    let records = rows.fetch_all(pool).await?;
    let mut responses = Vec::with_capacity(records.len());

    for row in records {
        let scores: Json<BTreeMap<String, Option<f64>>> = row.try_get("scores")?;
        let details: Json<SurveyDetails> = row.try_get("details")?;
        responses.push(SurveyResponse {
            id: row.get("id"),
            respondent_id: row.get("respondent_id"),
            name: row.get("name"),
            organization: row.get("organization"),
            organization_type: row.get("organization_type"),
            role: row.get("role"),
            country: row.get("country"),
            city: row.get("city"),
            region: row.get("region"),
            age: row.get("age"),
            age_group: row.get("age_group"),
            education_level: row.get("education_level"),
            years_experience: row.get("years_experience"),
            training_effectiveness: row.get("training_effectiveness"),
            program_satisfaction: row.get("program_satisfaction"),
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            submitted_at: row.get("submitted_at"),
            ministry_training_scores: scores.0,
            details: details.0,
        });
    }

    debug!(count = responses.len(), "fetched responses");
    Ok(responses)
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    survey_type: SurveyType,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let headers = reader.headers()?.clone();
    let mut imported = 0usize;

    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let response = response_from_csv(&headers, &record, survey_type)
            .with_context(|| format!("invalid row {} in {}", line + 2, csv_path.display()))?;
        if upsert_response(pool, &response).await? {
            imported += 1;
        }
    }

    Ok(imported)
}

/// Builds a response from one CSV row. Known columns map to fields by
/// header name, `score_<skill>` columns become training scores, and empty
/// cells are treated as missing.
pub fn response_from_csv(
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
    survey_type: SurveyType,
) -> anyhow::Result<SurveyResponse> {
    let mut cells: BTreeMap<&str, &str> = BTreeMap::new();
    let mut scores = BTreeMap::new();

    for (header, value) in headers.iter().zip(record.iter()) {
        let header = header.trim();
        let value = value.trim();
        if let Some(skill) = header.strip_prefix(SCORE_COLUMN_PREFIX) {
            let score = if value.is_empty() {
                None
            } else {
                Some(parse_score(skill, value)?)
            };
            scores.insert(skill.to_string(), score);
        } else if !value.is_empty() {
            cells.insert(header, value);
        }
    }

    let text = |key: &str| cells.get(key).map(|v| v.to_string());
    let int = |key: &str| -> anyhow::Result<Option<i32>> {
        cells
            .get(key)
            .map(|v| v.parse::<i32>().with_context(|| format!("{key} is not a whole number: {v}")))
            .transpose()
    };
    let float = |key: &str| -> anyhow::Result<Option<f64>> {
        cells
            .get(key)
            .map(|v| v.parse::<f64>().with_context(|| format!("{key} is not a number: {v}")))
            .transpose()
    };

    let id = text("id").context("missing id column")?;
    let details = match survey_type {
        SurveyType::Church => SurveyDetails::Church {
            denomination: text("denomination"),
            congregation_size: int("congregation_size")?,
        },
        SurveyType::Institution => SurveyDetails::Institution {
            institution_type: text("institution_type"),
            actea_accredited: cells
                .get("actea_accredited")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "1")),
            student_count: int("student_count")?,
        },
        SurveyType::NonFormal => SurveyDetails::NonFormal {
            program_format: text("program_format"),
            participant_count: int("participant_count")?,
        },
    };

    Ok(SurveyResponse {
        respondent_id: text("respondent_id").unwrap_or_else(|| id.clone()),
        name: text("name").unwrap_or_default(),
        organization: text("organization"),
        organization_type: text("organization_type"),
        role: text("role"),
        country: text("country"),
        city: text("city"),
        region: text("region"),
        age: int("age")?,
        age_group: text("age_group"),
        education_level: text("education_level"),
        years_experience: int("years_experience")?,
        training_effectiveness: text("training_effectiveness"),
        program_satisfaction: text("program_satisfaction"),
        latitude: float("latitude")?,
        longitude: float("longitude")?,
        submitted_at: cells
            .get("submitted_at")
            .map(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d"))
            .transpose()
            .context("submitted_at must be YYYY-MM-DD")?,
        ministry_training_scores: scores,
        details,
        id,
    })
}

fn parse_score(skill: &str, value: &str) -> anyhow::Result<f64> {
    let score = value
        .parse::<f64>()
        .with_context(|| format!("score for {skill} is not a number: {value}"))?;
    anyhow::ensure!(
        score.is_finite() && (SCORE_FLOOR..=SCORE_CEILING).contains(&score),
        "score for {skill} must be between {SCORE_FLOOR} and {SCORE_CEILING}: {value}"
    );
    Ok(score)
}

#[derive(Debug, Clone)]
pub struct UserDetailsStatus {
    pub saved_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

pub async fn save_user_details(pool: &PgPool, user_id: &str, form: &FormData) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO survey_insights.user_details (user_id, form_data, saved_at)
        VALUES ($1, $2, now())
        ON CONFLICT (user_id) DO UPDATE
        SET form_data = EXCLUDED.form_data, saved_at = now()
        "#,
    )
    .bind(user_id)
    .bind(Json(form))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn submit_user_details(
    pool: &PgPool,
    user_id: &str,
    form: &FormData,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO survey_insights.user_details (user_id, form_data, saved_at, submitted_at)
        VALUES ($1, $2, now(), now())
        ON CONFLICT (user_id) DO UPDATE
        SET form_data = EXCLUDED.form_data, saved_at = now(), submitted_at = now()
        "#,
    )
    .bind(user_id)
    .bind(Json(form))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn user_details_status(
    pool: &PgPool,
    user_id: &str,
) -> anyhow::Result<Option<UserDetailsStatus>> {
    let row = sqlx::query(
        "SELECT saved_at, submitted_at FROM survey_insights.user_details WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| UserDetailsStatus {
        saved_at: row.get("saved_at"),
        submitted_at: row.get("submitted_at"),
    }))
}

/// Adds a user to a survey. Returns false when they had already joined.
pub async fn join_survey(pool: &PgPool, user_id: &str, survey_id: &str) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO survey_insights.survey_participants (survey_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (survey_id, user_id) DO NOTHING
        "#,
    )
    .bind(survey_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn save_template(pool: &PgPool, name: &str, config: &ReportConfig) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO survey_insights.report_templates (name, config, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (name) DO UPDATE
        SET config = EXCLUDED.config, updated_at = now()
        "#,
    )
    .bind(name)
    .bind(Json(config))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_templates(pool: &PgPool) -> anyhow::Result<Vec<(String, DateTime<Utc>)>> {
    let rows = sqlx::query(
        "SELECT name, updated_at FROM survey_insights.report_templates ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("name"), row.get("updated_at")))
        .collect())
}

pub async fn load_template(pool: &PgPool, name: &str) -> anyhow::Result<ReportConfig> {
    let row = sqlx::query("SELECT config FROM survey_insights.report_templates WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no report template named {name}"))?;
    let config: Json<ReportConfig> = row.try_get("config")?;
    Ok(config.0)
}
