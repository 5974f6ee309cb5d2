use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use survey_insights::aggregate::{calculate_average_training_scores, training_gaps};
use survey_insights::builder::{
    export_report, generate_report, DataMode, Metric, ReportConfig, ReportDraft, ReportSession,
};
use survey_insights::comparison::{ComparisonMode, DemographicToggles, RoleComparisonConfig};
use survey_insights::config::AppConfig;
use survey_insights::filters::{
    filter_by_actea_accreditation, filter_by_age_group, filter_by_country,
    filter_by_education_level,
};
use survey_insights::fixtures::{find_response, FixtureStore};
use survey_insights::form::{self, FormWizard};
use survey_insights::logging::{init_logging, LogConfig, LogFormat};
use survey_insights::models::SurveyType;
use survey_insights::{db, demo, report};

#[derive(Parser)]
#[command(name = "survey-insights")]
#[command(about = "Survey response reports and role comparisons", long_about = None)]
struct Cli {
    /// Config file (defaults to ./survey-insights.toml when present)
    #[arg(long, env = "SURVEY_INSIGHTS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo responses into the database
    Seed,
    /// Import survey responses from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, value_enum)]
        survey_type: SurveyType,
    },
    /// Generate a report from a saved configuration
    #[command(group(
        ArgGroup::new("source")
            .args(["spec", "template"])
            .required(true)
            .multiple(false)
    ))]
    Report {
        /// Report configuration JSON file
        #[arg(long)]
        spec: Option<PathBuf>,
        /// Name of a stored report template
        #[arg(long)]
        template: Option<String>,
        #[arg(long, value_enum, default_value_t = DataMode::Test)]
        mode: DataMode,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Also write the records as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Also export report_<date>.json to the export directory
        #[arg(long)]
        export: bool,
    },
    /// List the largest training gaps
    Gaps {
        #[arg(long, value_enum)]
        survey_type: Vec<SurveyType>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        education_level: Option<String>,
        #[arg(long)]
        age_group: Option<String>,
        /// Institution responses with this ACTEA accreditation only
        #[arg(long)]
        accredited: Option<bool>,
        #[arg(long, value_enum, default_value_t = DataMode::Test)]
        mode: DataMode,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Compare roles or regions
    Compare {
        #[arg(long, value_enum, default_value_t = ComparisonMode::AcrossRoles)]
        by: ComparisonMode,
        #[arg(long = "role")]
        roles: Vec<String>,
        #[arg(long = "region")]
        regions: Vec<String>,
        #[arg(long)]
        benchmark: Option<String>,
        /// Attach average age, experience, and top education level
        #[arg(long)]
        demographics: bool,
        #[arg(long, value_enum, default_value_t = DataMode::Test)]
        mode: DataMode,
    },
    /// Show one response
    Show {
        #[arg(long)]
        response_id: String,
        #[arg(long, value_enum, default_value_t = DataMode::Test)]
        mode: DataMode,
    },
    /// List survey questions
    Questions {
        #[arg(long, value_enum)]
        survey_type: Option<SurveyType>,
    },
    /// Browse the demo directory
    Demo {
        #[command(subcommand)]
        command: DemoCommands,
    },
    /// Validate, submit, or check the user details form
    Form {
        #[command(subcommand)]
        command: FormCommands,
    },
    /// Join a survey
    Join {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        survey_id: String,
    },
    /// Store or list report templates
    Templates {
        #[command(subcommand)]
        command: TemplateCommands,
    },
}

#[derive(Subcommand)]
enum DemoCommands {
    /// Surveys taken by a demo user
    User {
        #[arg(long)]
        user_id: String,
        /// Seed for the completion dates
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Demo users holding a role
    Role {
        #[arg(long)]
        role: String,
    },
}

#[derive(Subcommand)]
enum FormCommands {
    /// Check a form draft page by page and keep a local copy
    Validate {
        #[arg(long)]
        draft: PathBuf,
    },
    /// Save a draft to the server without submitting
    Save {
        #[arg(long)]
        draft: PathBuf,
        #[arg(long)]
        user_id: String,
    },
    /// Validate and submit a draft
    Submit {
        #[arg(long)]
        draft: PathBuf,
        #[arg(long)]
        user_id: String,
    },
    /// Show whether a user's details were saved or submitted
    Status {
        #[arg(long)]
        user_id: String,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    Save {
        #[arg(long)]
        name: String,
        #[arg(long)]
        spec: PathBuf,
    },
    List,
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn session(config: &AppConfig, mode: DataMode) -> anyhow::Result<ReportSession> {
    let pool = match mode {
        DataMode::Normal => Some(connect(config).await?),
        DataMode::Test => None,
    };
    Ok(ReportSession::new(
        FixtureStore::new(&config.fixtures_dir),
        pool,
        mode,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbosity(cli.verbose).with_format(cli.log_format))?;
    let config = AppConfig::load(cli.config.as_deref())?;
    let catalog = &config.catalog;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect(&config).await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            let count = db::seed(&pool, catalog, &mut StdRng::from_entropy()).await?;
            println!("Inserted {count} demo responses.");
        }
        Commands::Import { csv, survey_type } => {
            let pool = connect(&config).await?;
            let imported = db::import_csv(&pool, &csv, survey_type).await?;
            println!("Imported {imported} responses from {}.", csv.display());
        }
        Commands::Report {
            spec,
            template,
            mode,
            out,
            csv,
            export,
        } => {
            let report_config = match (spec, template) {
                (Some(path), _) => ReportConfig::from_file(&path)?,
                (None, Some(name)) => db::load_template(&connect(&config).await?, &name).await?,
                (None, None) => anyhow::bail!("pass --spec or --template"),
            };
            let session = session(&config, mode).await?;
            let responses = session
                .load(&report_config.data_scope().survey_types)
                .await?;
            let generated =
                generate_report(&report_config, &responses, catalog, Utc::now().date_naive())?;

            std::fs::write(&out, report::build_report(&generated))?;
            println!("Report written to {}.", out.display());
            if let Some(path) = csv {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                report::write_csv(&generated.records, file)?;
                println!("Records written to {}.", path.display());
            }
            if export {
                let path = export_report(&generated, &config.export_dir)?;
                println!("Exported {}.", path.display());
            }
        }
        Commands::Gaps {
            survey_type,
            country,
            education_level,
            age_group,
            accredited,
            mode,
            limit,
        } => {
            let mut responses = session(&config, mode).await?.load(&survey_type).await?;
            if let Some(country) = country.as_deref() {
                responses = filter_by_country(&responses, country);
            }
            if let Some(level) = education_level.as_deref() {
                responses = filter_by_education_level(&responses, level);
            }
            if let Some(group) = age_group.as_deref() {
                responses = filter_by_age_group(&responses, group);
            }
            if let Some(accredited) = accredited {
                responses = filter_by_actea_accreditation(&responses, accredited);
            }

            let gaps = training_gaps(&calculate_average_training_scores(&responses, catalog));
            if gaps.is_empty() {
                println!("No training scores found for this selection.");
                return Ok(());
            }

            println!("Largest training gaps across {} responses:", responses.len());
            for gap in gaps.iter().take(limit) {
                println!(
                    "- {} average {:.2}, gap {:.2}",
                    gap.skill_area, gap.average, gap.gap
                );
            }
        }
        Commands::Compare {
            by,
            roles,
            regions,
            benchmark,
            demographics,
            mode,
        } => {
            let toggles = DemographicToggles {
                age: demographics,
                experience: demographics,
                education: demographics,
            };
            let role_comparison =
                RoleComparisonConfig::new(by, roles, regions, benchmark, toggles)?;
            let report_config = ReportConfig::try_from(ReportDraft {
                title: "Role Comparison".to_string(),
                metrics: vec![Metric::AverageTrainingScore],
                role_comparison,
                ..ReportDraft::default()
            })?;

            let responses = session(&config, mode).await?.load(&[]).await?;
            let generated =
                generate_report(&report_config, &responses, catalog, Utc::now().date_naive())?;
            if generated.records.is_empty() {
                println!("No scored responses matched this comparison.");
                return Ok(());
            }
            for record in &generated.records {
                let mut line = format!("- {} score {:.2}", record.name, record.value);
                if let Some(count) = record.count {
                    line.push_str(&format!(" across {count} responses"));
                }
                if let Some(variance) = record.variance {
                    line.push_str(&format!(" (variance {variance:+.2})"));
                }
                if let (Some(satisfaction), Some(effectiveness)) =
                    (record.satisfaction_score, record.training_effectiveness)
                {
                    line.push_str(&format!(
                        ", satisfaction {satisfaction:.2}, effectiveness {effectiveness:.2}"
                    ));
                }
                println!("{line}");
            }
        }
        Commands::Show { response_id, mode } => {
            let responses = session(&config, mode).await?.load(&[]).await?;
            let response = find_response(&responses, &response_id)?;
            println!("{}", serde_json::to_string_pretty(response)?);
        }
        Commands::Questions { survey_type } => {
            let store = FixtureStore::new(&config.fixtures_dir);
            let bank = store.load_questions(&CancellationToken::new()).await?;
            let types: Vec<SurveyType> = match survey_type {
                Some(survey_type) => vec![survey_type],
                None => SurveyType::ALL.to_vec(),
            };
            for survey_type in types {
                println!("{} survey:", survey_type.label());
                for question in bank.for_survey(survey_type) {
                    println!("- [{}] {}", question.id, question.text);
                }
            }
        }
        Commands::Demo { command } => match command {
            DemoCommands::User { user_id, seed } => {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                let data = demo::user_survey_data(&user_id, &mut rng)?;
                println!("{} ({}, {})", data.user.name, data.user.role, data.user.organization);
                for submission in &data.submissions {
                    println!(
                        "- {} completed {} score {:.2}",
                        submission.title, submission.completed_on, submission.score
                    );
                }
            }
            DemoCommands::Role { role } => {
                let users = demo::users_by_role(&role);
                if users.is_empty() {
                    println!("No demo users hold the role {role}.");
                }
                for user in users {
                    println!("- {} <{}> {}", user.name, user.email, user.region);
                }
            }
        },
        Commands::Form { command } => match command {
            FormCommands::Validate { draft } => {
                let mut wizard = FormWizard::new(form::load_draft(&draft)?);
                let saved = form::save_draft(&config.drafts_dir, wizard.data())?;
                wizard.advance_to_review()?;
                println!("Form is complete. Local copy kept at {}.", saved.display());
            }
            FormCommands::Save { draft, user_id } => {
                let data = form::load_draft(&draft)?;
                form::save_draft(&config.drafts_dir, &data)?;
                db::save_user_details(&connect(&config).await?, &user_id, &data).await?;
                println!("Saved details for {user_id}.");
            }
            FormCommands::Submit { draft, user_id } => {
                let mut wizard = FormWizard::new(form::load_draft(&draft)?);
                wizard.advance_to_review()?;
                let data = wizard.submit()?;
                db::submit_user_details(&connect(&config).await?, &user_id, data).await?;
                println!("Submitted details for {user_id}.");
            }
            FormCommands::Status { user_id } => {
                match db::user_details_status(&connect(&config).await?, &user_id).await? {
                    Some(status) => match status.submitted_at {
                        Some(at) => println!("{user_id} submitted on {at}."),
                        None => println!("{user_id} saved a draft on {}.", status.saved_at),
                    },
                    None => println!("No details stored for {user_id}."),
                }
            }
        },
        Commands::Join { user_id, survey_id } => {
            let pool = connect(&config).await?;
            if db::join_survey(&pool, &user_id, &survey_id).await? {
                println!("{user_id} joined {survey_id}.");
            } else {
                println!("{user_id} had already joined {survey_id}.");
            }
        }
        Commands::Templates { command } => {
            let pool = connect(&config).await?;
            match command {
                TemplateCommands::Save { name, spec } => {
                    let report_config = ReportConfig::from_file(&spec)?;
                    db::save_template(&pool, &name, &report_config).await?;
                    println!("Template {name} saved.");
                }
                TemplateCommands::List => {
                    let templates = db::list_templates(&pool).await?;
                    if templates.is_empty() {
                        println!("No templates stored.");
                    }
                    for (name, updated_at) in templates {
                        println!("- {name} (updated {updated_at})");
                    }
                }
            }
        }
    }

    Ok(())
}
