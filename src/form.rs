use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use validator::{Validate, ValidationError, ValidationErrors};

const DRAFT_FILE: &str = "user-form-data.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PersonalDetails {
    #[validate(custom(function = "not_blank"))]
    pub first_name: String,
    #[validate(custom(function = "not_blank"))]
    pub last_name: String,
    #[validate(email(message = "is not a valid address"))]
    pub email: String,
    #[validate(custom(function = "phone_characters"))]
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "coordinates_in_pairs"))]
pub struct OrganizationalDetails {
    #[validate(custom(function = "not_blank"))]
    pub country: String,
    pub region: String,
    pub city: String,
    #[validate(custom(function = "not_blank"))]
    pub organization: String,
    pub organization_type: String,
    pub role: String,
    #[validate(range(min = -90.0, max = 90.0, message = "must be between -90 and 90"))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0, message = "must be between -180 and 180"))]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormData {
    pub personal: PersonalDetails,
    pub organizational: OrganizationalDetails,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStep {
    #[default]
    Personal,
    Organizational,
    Review,
}

impl FormStep {
    pub const fn number(self) -> usize {
        match self {
            Self::Personal => 1,
            Self::Organizational => 2,
            Self::Review => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FormError {
    #[error("please fix: {}", join(.0))]
    Invalid(Vec<FieldError>),

    #[error("the form can only be submitted from the review step")]
    NotAtReview,
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn validate_personal(personal: &PersonalDetails) -> Vec<FieldError> {
    field_errors(personal.validate(), &PERSONAL_FIELDS)
}

pub fn validate_organizational(org: &OrganizationalDetails) -> Vec<FieldError> {
    field_errors(org.validate(), &ORGANIZATIONAL_FIELDS)
}

const PERSONAL_FIELDS: [&str; 4] = ["first_name", "last_name", "email", "phone"];
const ORGANIZATIONAL_FIELDS: [&str; 5] =
    ["country", "organization", "latitude", "longitude", COORDINATES_FIELD];

const COORDINATES_FIELD: &str = "coordinates";

/// Flattens validator output in page order. Struct-level errors are
/// reported under `coordinates`.
fn field_errors(result: Result<(), ValidationErrors>, order: &[&str]) -> Vec<FieldError> {
    let Err(errors) = result else {
        return Vec::new();
    };

    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, list)| {
            let field = if field == "__all__" {
                COORDINATES_FIELD.to_string()
            } else {
                field.to_string()
            };
            list.iter().map(move |e| FieldError {
                field: field.clone(),
                message: e
                    .message
                    .as_ref()
                    .map_or_else(|| e.code.to_string(), ToString::to_string),
            })
        })
        .collect();

    out.sort_by_key(|e| {
        order
            .iter()
            .position(|known| *known == e.field)
            .unwrap_or(order.len())
    });
    out
}

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(error("required", "is required"))
    } else {
        Ok(())
    }
}

fn phone_characters(value: &str) -> Result<(), ValidationError> {
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')');
    if value.trim().chars().all(allowed) {
        Ok(())
    } else {
        Err(error(
            "phone",
            "may only contain digits, spaces, and + - ( )",
        ))
    }
}

fn coordinates_in_pairs(org: &OrganizationalDetails) -> Result<(), ValidationError> {
    if org.latitude.is_some() == org.longitude.is_some() {
        Ok(())
    } else {
        Err(error(
            "coordinates",
            "latitude and longitude must be given together",
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormWizard {
    step: FormStep,
    data: FormData,
}

impl FormWizard {
    pub fn new(data: FormData) -> Self {
        Self {
            step: FormStep::Personal,
            data,
        }
    }

    pub fn step(&self) -> FormStep {
        self.step
    }

    pub fn data(&self) -> &FormData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut FormData {
        &mut self.data
    }

    /// Validates the current page and moves forward. Review is the last page.
    pub fn next(&mut self) -> Result<FormStep, FormError> {
        let errors = match self.step {
            FormStep::Personal => validate_personal(&self.data.personal),
            FormStep::Organizational => validate_organizational(&self.data.organizational),
            FormStep::Review => Vec::new(),
        };
        if !errors.is_empty() {
            return Err(FormError::Invalid(errors));
        }
        self.step = match self.step {
            FormStep::Personal => FormStep::Organizational,
            FormStep::Organizational | FormStep::Review => FormStep::Review,
        };
        debug!(step = self.step.number(), "form advanced");
        Ok(self.step)
    }

    pub fn back(&mut self) -> FormStep {
        self.step = match self.step {
            FormStep::Personal | FormStep::Organizational => FormStep::Personal,
            FormStep::Review => FormStep::Organizational,
        };
        self.step
    }

    /// Final validation of every page; only allowed from the review step.
    pub fn submit(&self) -> Result<&FormData, FormError> {
        if self.step != FormStep::Review {
            return Err(FormError::NotAtReview);
        }
        validate(&self.data)?;
        Ok(&self.data)
    }

    /// Runs every page in order, stopping at the first invalid one.
    pub fn advance_to_review(&mut self) -> Result<(), FormError> {
        while self.step != FormStep::Review {
            self.next()?;
        }
        Ok(())
    }
}

pub fn validate(data: &FormData) -> Result<(), FormError> {
    let mut errors = validate_personal(&data.personal);
    errors.extend(validate_organizational(&data.organizational));
    if errors.is_empty() {
        Ok(())
    } else {
        Err(FormError::Invalid(errors))
    }
}

pub fn draft_path(drafts_dir: &Path) -> PathBuf {
    drafts_dir.join(DRAFT_FILE)
}

/// Keeps a local copy of the form so work survives an unreachable server.
pub fn save_draft(drafts_dir: &Path, data: &FormData) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(drafts_dir)
        .with_context(|| format!("failed to create {}", drafts_dir.display()))?;
    let path = draft_path(drafts_dir);
    std::fs::write(&path, serde_json::to_vec_pretty(data)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub fn load_draft(path: &Path) -> anyhow::Result<FormData> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("invalid form data in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn complete() -> FormData {
        FormData {
            personal: PersonalDetails {
                first_name: "Grace".to_string(),
                last_name: "Achieng".to_string(),
                email: "grace@example.org".to_string(),
                phone: "+254 700 000000".to_string(),
            },
            organizational: OrganizationalDetails {
                country: "Kenya".to_string(),
                organization: "Kisumu Bible Fellowship".to_string(),
                latitude: Some(-0.0917),
                longitude: Some(34.768),
                ..OrganizationalDetails::default()
            },
        }
    }

    #[test]
    fn wizard_walks_three_steps() {
        let mut wizard = FormWizard::new(complete());
        assert_eq!(wizard.next().unwrap(), FormStep::Organizational);
        assert_eq!(wizard.next().unwrap(), FormStep::Review);
        assert_eq!(wizard.submit().unwrap(), &complete());
        assert_eq!(wizard.back(), FormStep::Organizational);
    }

    #[test]
    fn invalid_page_blocks_progress() {
        let mut data = complete();
        data.personal.email = "grace.example.org".to_string();
        data.personal.last_name.clear();
        let mut wizard = FormWizard::new(data);

        let err = wizard.next().unwrap_err();
        assert_eq!(wizard.step(), FormStep::Personal);
        match err {
            FormError::Invalid(errors) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["last_name", "email"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn submit_requires_review_step() {
        let wizard = FormWizard::new(complete());
        assert_eq!(wizard.submit(), Err(FormError::NotAtReview));
    }

    #[test]
    fn coordinates_must_come_in_pairs() {
        let mut data = complete();
        data.organizational.longitude = None;
        let errors = validate_organizational(&data.organizational);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "coordinates");
        assert_eq!(
            errors[0].message,
            "latitude and longitude must be given together"
        );
    }

    #[test]
    fn personal_page_rules() {
        let mut personal = complete().personal;
        assert!(validate_personal(&personal).is_empty());

        personal.first_name = "   ".to_string();
        personal.email.clear();
        personal.phone = "call me".to_string();
        let errors = validate_personal(&personal);
        let summary: Vec<(&str, &str)> = errors
            .iter()
            .map(|e| (e.field.as_str(), e.message.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("first_name", "is required"),
                ("email", "is not a valid address"),
                ("phone", "may only contain digits, spaces, and + - ( )"),
            ]
        );
    }

    #[test]
    fn coordinates_outside_the_globe_are_rejected() {
        let mut org = complete().organizational;
        org.latitude = Some(91.0);
        org.longitude = Some(-181.0);
        let fields: Vec<String> = validate_organizational(&org)
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["latitude", "longitude"]);
    }

    #[test]
    fn advance_to_review_stops_at_first_bad_page() {
        let mut data = complete();
        data.organizational.country.clear();
        let mut wizard = FormWizard::new(data);
        let err = wizard.advance_to_review().unwrap_err();
        assert_eq!(wizard.step(), FormStep::Organizational);
        assert_eq!(err.to_string(), "please fix: country: is required");
    }

    #[test]
    fn draft_survives_a_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_draft(dir.path(), &complete()).unwrap();
        assert_eq!(load_draft(&path).unwrap(), complete());
    }
}
