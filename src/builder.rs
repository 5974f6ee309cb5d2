use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregate::{
    average_scores_of, calculate_average_training_scores, distribution, group_by, mean_of_means,
    skill_average_records, training_gaps, Dimension, SCORE_CEILING,
};
use crate::catalog::Catalog;
use crate::comparison::{generate_role_based_report_data, RoleComparisonConfig};
use crate::db;
use crate::error::{DataError, Result};
use crate::filters::{apply_individual_filters, individual_comparison_records, IndividualFilters};
use crate::fixtures::FixtureStore;
use crate::geography::{within_circles, GeographicCircle};
use crate::models::{ReportRecord, SurveyResponse, SurveyType, TrainingGap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Pie,
    Radar,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    AverageTrainingScore,
    TrainingGap,
    ResponseCount,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeographyScope {
    pub circles: Vec<GeographicCircle>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataScope {
    pub survey_types: Vec<SurveyType>,
    pub countries: Vec<String>,
    pub geography: GeographyScope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportDraft {
    pub title: String,
    pub data_scope: DataScope,
    pub metrics: Vec<Metric>,
    pub dimensions: Vec<Dimension>,
    pub role_comparison: RoleComparisonConfig,
    pub individual_filters: IndividualFilters,
    pub chart_type: ChartType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReportDraft", into = "ReportDraft")]
pub struct ReportConfig {
    draft: ReportDraft,
}

impl TryFrom<ReportDraft> for ReportConfig {
    type Error = DataError;

    fn try_from(draft: ReportDraft) -> Result<Self> {
        if draft.metrics.is_empty() && draft.dimensions.is_empty() {
            return Err(DataError::InvalidConfig(
                "select at least one metric or dimension".into(),
            ));
        }
        draft.role_comparison.validate()?;
        for circle in &draft.data_scope.geography.circles {
            circle
                .validate()
                .map_err(|e| DataError::InvalidConfig(format!("circle {}: {e}", circle.name)))?;
        }
        Ok(Self { draft })
    }
}

impl From<ReportConfig> for ReportDraft {
    fn from(config: ReportConfig) -> Self {
        config.draft
    }
}

impl ReportConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid report configuration")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn title(&self) -> &str {
        if self.draft.title.trim().is_empty() {
            "Survey Report"
        } else {
            &self.draft.title
        }
    }

    pub fn data_scope(&self) -> &DataScope {
        &self.draft.data_scope
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.draft.metrics
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.draft.dimensions
    }

    pub fn role_comparison(&self) -> &RoleComparisonConfig {
        &self.draft.role_comparison
    }

    pub fn individual_filters(&self) -> &IndividualFilters {
        &self.draft.individual_filters
    }

    pub fn chart_type(&self) -> ChartType {
        self.draft.chart_type
    }

    pub fn into_draft(self) -> ReportDraft {
        self.draft
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    #[default]
    Test,
    Normal,
}

#[derive(Debug, Clone)]
pub enum DataSource {
    Fixtures(FixtureStore),
    Database(PgPool),
}

impl DataSource {
    pub async fn load(
        &self,
        survey_types: &[SurveyType],
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<SurveyResponse>> {
        match self {
            Self::Fixtures(store) => Ok(store.load_all(cancel).await?.select(survey_types)),
            Self::Database(pool) => tokio::select! {
                biased;
                () = cancel.cancelled() => Err(DataError::Cancelled.into()),
                result = db::fetch_responses(pool, survey_types) => result,
            },
        }
    }
}

/// Owns the active data mode. Switching modes cancels every load started
/// under the previous mode, so a late result can never be applied.
#[derive(Debug)]
pub struct ReportSession {
    fixtures: FixtureStore,
    pool: Option<PgPool>,
    mode: DataMode,
    cancel: CancellationToken,
}

impl ReportSession {
    pub fn new(fixtures: FixtureStore, pool: Option<PgPool>, mode: DataMode) -> Self {
        Self {
            fixtures,
            pool,
            mode,
            cancel: CancellationToken::new(),
        }
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn switch_mode(&mut self, mode: DataMode) {
        if mode == self.mode {
            return;
        }
        debug!(from = ?self.mode, to = ?mode, "switching data mode");
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.mode = mode;
    }

    /// Starts a load under the current mode. The returned future owns
    /// everything it needs and fails with `Cancelled` if the mode changes
    /// before it finishes.
    pub fn load(
        &self,
        survey_types: &[SurveyType],
    ) -> impl Future<Output = anyhow::Result<Vec<SurveyResponse>>> + 'static {
        let source = match self.mode {
            DataMode::Test => Ok(DataSource::Fixtures(self.fixtures.clone())),
            DataMode::Normal => self
                .pool
                .clone()
                .map(DataSource::Database)
                .context("normal mode needs a database connection (set DATABASE_URL)"),
        };
        let cancel = self.cancel.clone();
        let survey_types = survey_types.to_vec();

        async move { source?.load(&survey_types, &cancel).await }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedReport {
    pub title: String,
    pub chart_type: ChartType,
    pub generated_on: NaiveDate,
    pub response_count: usize,
    pub records: Vec<ReportRecord>,
    pub training_gaps: Vec<TrainingGap>,
}

/// Responses left after the data scope panel: survey types, countries,
/// then visible geographic circles.
pub fn apply_data_scope(responses: &[SurveyResponse], scope: &DataScope) -> Vec<SurveyResponse> {
    let scoped: Vec<SurveyResponse> = responses
        .iter()
        .filter(|r| scope.survey_types.is_empty() || scope.survey_types.contains(&r.survey_type()))
        .filter(|r| {
            scope.countries.is_empty()
                || r.country
                    .as_ref()
                    .is_some_and(|country| scope.countries.contains(country))
        })
        .cloned()
        .collect();
    within_circles(&scoped, &scope.geography.circles)
}

pub fn generate_report(
    config: &ReportConfig,
    responses: &[SurveyResponse],
    catalog: &Catalog,
    generated_on: NaiveDate,
) -> Result<GeneratedReport> {
    let scoped = apply_data_scope(responses, config.data_scope());
    let filtered = if config.individual_filters().is_empty() {
        scoped
    } else {
        apply_individual_filters(&scoped, config.individual_filters(), catalog)
    };

    let metric = config
        .metrics()
        .first()
        .copied()
        .unwrap_or(Metric::ResponseCount);

    let records = if config.role_comparison().enabled() {
        generate_role_based_report_data(&filtered, config.role_comparison(), catalog)?
    } else if config.individual_filters().compare_across_individuals {
        individual_comparison_records(&filtered, catalog)
    } else if let Some(dimension) = config.dimensions().first() {
        dimension_records(&filtered, *dimension, metric, catalog)
    } else {
        metric_records(&filtered, metric, catalog)
    };

    info!(
        title = config.title(),
        responses = filtered.len(),
        records = records.len(),
        "report generated"
    );

    Ok(GeneratedReport {
        title: config.title().to_string(),
        chart_type: config.chart_type(),
        generated_on,
        response_count: filtered.len(),
        training_gaps: training_gaps(&calculate_average_training_scores(&filtered, catalog)),
        records,
    })
}

fn metric_records(
    responses: &[SurveyResponse],
    metric: Metric,
    catalog: &Catalog,
) -> Vec<ReportRecord> {
    match metric {
        Metric::AverageTrainingScore => {
            skill_average_records(&calculate_average_training_scores(responses, catalog))
        }
        Metric::TrainingGap => training_gaps(&calculate_average_training_scores(responses, catalog))
            .into_iter()
            .map(|gap| ReportRecord::new(gap.skill_area, gap.gap))
            .collect(),
        Metric::ResponseCount => {
            let mut record = ReportRecord::new("Responses", responses.len() as f64);
            record.count = Some(responses.len());
            vec![record]
        }
    }
}

fn dimension_records(
    responses: &[SurveyResponse],
    dimension: Dimension,
    metric: Metric,
    catalog: &Catalog,
) -> Vec<ReportRecord> {
    if metric == Metric::ResponseCount {
        return distribution(responses, dimension, catalog);
    }

    group_by(responses, dimension, catalog)
        .into_iter()
        .filter_map(|(name, members)| {
            let score = mean_of_means(&average_scores_of(members.iter().copied(), catalog))?;
            let value = match metric {
                Metric::TrainingGap => SCORE_CEILING - score,
                _ => score,
            };
            let mut record = ReportRecord::new(name, value);
            record.count = Some(members.len());
            Some(record)
        })
        .collect()
}

pub fn export_report(report: &GeneratedReport, dir: &Path) -> anyhow::Result<PathBuf> {
    let path = dir.join(format!("report_{}.json", report.generated_on.format("%Y-%m-%d")));
    let json = serde_json::to_vec_pretty(report)?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::{ComparisonMode, DemographicToggles};
    use crate::geography::Coordinates;
    use crate::testing::scored;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn responses() -> Vec<SurveyResponse> {
        let mut a = scored("a", "pastor", "East", &[("preaching", 4.0), ("teaching", 2.0)]);
        a.country = Some("Kenya".to_string());
        let mut b = scored("b", "trainer", "West", &[("preaching", 2.0)]);
        b.country = Some("Ghana".to_string());
        let mut c = scored("c", "pastor", "East", &[("preaching", 5.0)]);
        c.country = Some("Kenya".to_string());
        vec![a, b, c]
    }

    fn config(draft: ReportDraft) -> ReportConfig {
        ReportConfig::try_from(draft).unwrap()
    }

    #[test]
    fn config_needs_a_metric_or_dimension() {
        let err = ReportConfig::try_from(ReportDraft::default()).unwrap_err();
        assert!(err.to_string().contains("at least one metric or dimension"));

        let err = ReportConfig::from_json(r#"{"title":"Empty"}"#).unwrap_err();
        assert!(format!("{err:#}").contains("at least one metric or dimension"));
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = config(ReportDraft {
            title: "Gaps".to_string(),
            metrics: vec![Metric::TrainingGap],
            ..ReportDraft::default()
        });
        let json = serde_json::to_string(&cfg).unwrap();
        assert_eq!(ReportConfig::from_json(&json).unwrap(), cfg);
    }

    #[test]
    fn invalid_role_comparison_is_rejected() {
        let json = r#"{
            "metrics": ["average_training_score"],
            "role_comparison": {"enabled": true, "comparison_mode": "role_vs_average"}
        }"#;
        assert!(ReportConfig::from_json(json).is_err());
    }

    #[test]
    fn circles_from_json_are_checked() {
        let draft = |lat: f64, radius: f64| {
            format!(
                r##"{{
                    "metrics": ["response_count"],
                    "data_scope": {{"geography": {{"circles": [{{
                        "id": "00000000-0000-0000-0000-000000000001",
                        "name": "Nairobi",
                        "center": {{"lat": {lat}, "lng": 36.8}},
                        "radius_m": {radius},
                        "color": "#1976d2"
                    }}]}}}}
                }}"##
            )
        };

        assert!(ReportConfig::from_json(&draft(-1.3, 5000.0)).is_ok());

        let err = ReportConfig::from_json(&draft(200.0, 5000.0)).unwrap_err();
        assert!(format!("{err:#}").contains("circle Nairobi: coordinates out of range"));

        let err = ReportConfig::from_json(&draft(-1.3, 0.0)).unwrap_err();
        assert!(format!("{err:#}").contains("circle Nairobi: radius must be a positive number"));
    }

    #[test]
    fn country_dimension_with_average_metric() {
        let cfg = config(ReportDraft {
            metrics: vec![Metric::AverageTrainingScore],
            dimensions: vec![Dimension::Country],
            ..ReportDraft::default()
        });
        let report = generate_report(&cfg, &responses(), &Catalog::default(), date()).unwrap();

        let rows: Vec<(&str, f64)> = report.records.iter().map(|r| (r.name.as_str(), r.value)).collect();
        // Kenya: preaching 4.5, teaching 2.0
        assert_eq!(rows, vec![("Kenya", 3.25), ("Ghana", 2.0)]);
        assert_eq!(report.response_count, 3);
        assert_eq!(report.training_gaps[0].skill_area, "teaching");
    }

    #[test]
    fn data_scope_limits_countries() {
        let cfg = config(ReportDraft {
            metrics: vec![Metric::ResponseCount],
            data_scope: DataScope {
                countries: vec!["Ghana".to_string()],
                ..DataScope::default()
            },
            ..ReportDraft::default()
        });
        let report = generate_report(&cfg, &responses(), &Catalog::default(), date()).unwrap();
        assert_eq!(report.records[0].count, Some(1));
    }

    #[test]
    fn geography_scope_uses_visible_circles() {
        let mut located = responses();
        located[0].latitude = Some(-1.29);
        located[0].longitude = Some(36.82);
        let circle = GeographicCircle {
            id: Uuid::from_u128(1),
            name: "Nairobi".to_string(),
            center: Coordinates::new(-1.2921, 36.8219).unwrap(),
            radius_m: 10_000.0,
            visible: true,
            color: "#1976d2".to_string(),
        };
        let scope = DataScope {
            geography: GeographyScope {
                circles: vec![circle],
            },
            ..DataScope::default()
        };
        let scoped = apply_data_scope(&located, &scope);
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, "a");
    }

    #[test]
    fn role_comparison_takes_precedence() {
        let role_comparison = RoleComparisonConfig::new(
            ComparisonMode::RoleVsAverage,
            Vec::new(),
            Vec::new(),
            Some("pastor".to_string()),
            DemographicToggles::default(),
        )
        .unwrap();
        let cfg = config(ReportDraft {
            metrics: vec![Metric::AverageTrainingScore],
            dimensions: vec![Dimension::Country],
            role_comparison,
            ..ReportDraft::default()
        });
        let report = generate_report(&cfg, &responses(), &Catalog::default(), date()).unwrap();
        assert_eq!(report.records.len(), 2);
        assert!(report.records[1].variance.is_some());
    }

    #[test]
    fn gap_metric_without_dimension_lists_skills() {
        let cfg = config(ReportDraft {
            metrics: vec![Metric::TrainingGap],
            ..ReportDraft::default()
        });
        let report = generate_report(&cfg, &responses(), &Catalog::default(), date()).unwrap();
        let rows: Vec<(&str, f64)> = report.records.iter().map(|r| (r.name.as_str(), r.value)).collect();
        // preaching avg 11/3, teaching 2.0
        assert_eq!(rows, vec![("teaching", 3.0), ("preaching", 1.33)]);
    }

    #[test]
    fn export_writes_dated_json() {
        let cfg = config(ReportDraft {
            metrics: vec![Metric::ResponseCount],
            ..ReportDraft::default()
        });
        let report = generate_report(&cfg, &responses(), &Catalog::default(), date()).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let path = export_report(&report, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "report_2024-05-01.json");
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["response_count"], 3);
    }

    #[tokio::test]
    async fn switching_mode_cancels_inflight_loads() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ReportSession::new(FixtureStore::new(dir.path()), None, DataMode::Test);

        let stale = session.load(&[]);
        session.switch_mode(DataMode::Normal);
        let err = stale.await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DataError>(), Some(DataError::Cancelled)));

        let err = session.load(&[]).await.unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[tokio::test]
    async fn bundled_sample_reports_generate() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let session = ReportSession::new(
            FixtureStore::new(root.join("sample-data")),
            None,
            DataMode::Test,
        );
        let responses = session.load(&[]).await.unwrap();
        assert_eq!(responses.len(), 16);

        let by_role = ReportConfig::from_file(&root.join("sample-data/report-by-role.json")).unwrap();
        let report = generate_report(&by_role, &responses, &Catalog::default(), date()).unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].name, "Overall Average");
        assert_eq!(report.records[1].name, "pastor");

        let by_country =
            ReportConfig::from_file(&root.join("sample-data/report-by-country.json")).unwrap();
        let report = generate_report(&by_country, &responses, &Catalog::default(), date()).unwrap();
        let total: usize = report.records.iter().filter_map(|r| r.count).sum();
        assert_eq!(total, 16);
    }
}
