use std::fmt::Write;

use crate::builder::{ChartType, GeneratedReport};
use crate::models::ReportRecord;

const BAR_WIDTH: usize = 30;

pub fn build_report(report: &GeneratedReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", report.title);
    let _ = writeln!(
        output,
        "Generated on {} from {} responses ({} chart)",
        report.generated_on,
        report.response_count,
        chart_label(report.chart_type)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Results");

    if report.records.is_empty() {
        let _ = writeln!(output, "No data matched this report configuration.");
    } else {
        write_table(&mut output, &report.records);
        let _ = writeln!(output);
        write_bars(&mut output, &report.records);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Largest Training Gaps");

    if report.training_gaps.is_empty() {
        let _ = writeln!(output, "No training scores recorded for this selection.");
    } else {
        for gap in report.training_gaps.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: average {:.2}, gap {:.2}",
                gap.skill_area, gap.average, gap.gap
            );
        }
    }

    output
}

fn chart_label(chart_type: ChartType) -> &'static str {
    match chart_type {
        ChartType::Bar => "bar",
        ChartType::Line => "line",
        ChartType::Pie => "pie",
        ChartType::Radar => "radar",
        ChartType::Table => "table",
    }
}

fn write_table(output: &mut String, records: &[ReportRecord]) {
    let show_count = records.iter().any(|r| r.count.is_some());
    let show_percentage = records.iter().any(|r| r.percentage.is_some());
    let show_variance = records.iter().any(|r| r.variance.is_some());

    let mut header = String::from("| Name | Value |");
    let mut rule = String::from("| --- | ---: |");
    for (shown, title) in [
        (show_count, "Count"),
        (show_percentage, "Share"),
        (show_variance, "Variance"),
    ] {
        if shown {
            header.push_str(&format!(" {title} |"));
            rule.push_str(" ---: |");
        }
    }
    let _ = writeln!(output, "{header}");
    let _ = writeln!(output, "{rule}");

    for record in records {
        let mut line = format!("| {} | {:.2} |", record.name, record.value);
        if show_count {
            line.push_str(&format!(" {} |", optional(record.count)));
        }
        if show_percentage {
            let share = record.percentage.map(|p| format!("{p:.2}%"));
            line.push_str(&format!(" {} |", share.unwrap_or_default()));
        }
        if show_variance {
            let variance = record.variance.map(|v| format!("{v:+.2}"));
            line.push_str(&format!(" {} |", variance.unwrap_or_default()));
        }
        let _ = writeln!(output, "{line}");
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Text bars scaled against the largest value.
fn write_bars(output: &mut String, records: &[ReportRecord]) {
    let max = records.iter().map(|r| r.value).fold(0.0_f64, f64::max);
    let label_width = records.iter().map(|r| r.name.chars().count()).max().unwrap_or(0);

    let _ = writeln!(output, "```");
    for record in records {
        let filled = if max > 0.0 {
            ((record.value.max(0.0) / max) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let _ = writeln!(
            output,
            "{:<width$} {} {:.2}",
            record.name,
            "#".repeat(filled),
            record.value,
            width = label_width
        );
    }
    let _ = writeln!(output, "```");
}

pub fn write_csv(records: &[ReportRecord], writer: impl std::io::Write) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct CsvRow<'a> {
        name: &'a str,
        value: f64,
        count: Option<usize>,
        percentage: Option<f64>,
        role_average: Option<f64>,
        variance: Option<f64>,
        satisfaction_score: Option<f64>,
        training_effectiveness: Option<f64>,
        region: Option<&'a str>,
        role: Option<&'a str>,
    }

    let mut csv = csv::Writer::from_writer(writer);
    for record in records {
        csv.serialize(CsvRow {
            name: &record.name,
            value: record.value,
            count: record.count,
            percentage: record.percentage,
            role_average: record.role_average,
            variance: record.variance,
            satisfaction_score: record.satisfaction_score,
            training_effectiveness: record.training_effectiveness,
            region: record.region.as_deref(),
            role: record.role.as_deref(),
        })?;
    }
    csv.flush()?;
    Ok(())
}
