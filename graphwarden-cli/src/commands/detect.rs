//! `graphwarden detect` command handler

use std::io::Write;

use tracing::info;

use graphwarden_detection::DetectionReport;

use crate::app::{App, read_lines};
use crate::cli::DetectArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `detect` command.
pub async fn execute(app: App, args: DetectArgs, writer: &OutputWriter) -> Result<(), CliError> {
    let loaded = app.load_rules().await?;
    info!(rules = loaded, "rules loaded");

    if let Some(events) = &args.events {
        preload_events(&app, events, args.format.as_deref()).await?;
    }

    let report = match &args.rule {
        Some(rule_id) => app
            .engine()
            .run(rule_id)
            .await
            .map_err(graphwarden_detection::DetectionError::from)?,
        None => app.engine().run_all().await,
    };

    writer.render(&report)?;

    if report.has_errors() {
        return Err(CliError::Detection {
            failed: report.errors.len(),
        });
    }
    Ok(())
}

/// Persists events directly so the rules have something to match.
async fn preload_events(
    app: &App,
    path: &std::path::Path,
    hint: Option<&str>,
) -> Result<(), CliError> {
    let adapter = app.adapter();
    let lines = read_lines(path).await?;
    let mut persisted = 0usize;
    for (index, line) in lines.iter().enumerate() {
        let mapped = match app.normalizer.normalize(line.as_bytes(), hint) {
            Ok(mapped) => mapped,
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "event skipped");
                continue;
            }
        };
        adapter
            .persist(&mapped.event)
            .await
            .map_err(graphwarden_core::error::GraphwardenError::from)?;
        persisted += 1;
    }
    info!(
        path = %path.display(),
        persisted,
        skipped = lines.len() - persisted,
        "events preloaded"
    );
    Ok(())
}

impl Render for DetectionReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Detection: {} rules evaluated, {} alerts, {} errors, {} suppressed",
            self.rules_evaluated,
            self.alerts.len().to_string().bold(),
            self.errors.len(),
            self.suppressed
        )?;

        if !self.alerts.is_empty() {
            writeln!(w)?;
            writeln!(
                w,
                "{:<10} {:<20} {:<36} Entities",
                "Severity", "Rule", "Alert ID"
            )?;
            writeln!(w, "{}", "-".repeat(90))?;
            for alert in &self.alerts {
                let severity = alert.severity.label();
                let severity = if alert.severity.value() >= 7 {
                    severity.red()
                } else if alert.severity.value() >= 4 {
                    severity.yellow()
                } else {
                    severity.normal()
                };
                let entities: Vec<String> = alert
                    .entities
                    .iter()
                    .map(|entity| format!("{}:{}", entity.kind, entity.id))
                    .collect();
                writeln!(
                    w,
                    "{:<10} {:<20} {:<36} {}",
                    severity,
                    alert.rule_id,
                    alert.alert_id,
                    entities.join(", ")
                )?;
            }
        }

        if !self.errors.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", "Rule errors:".red().bold())?;
            for failure in &self.errors {
                writeln!(w, "  {} [{}] {}", failure.rule_id, failure.kind(), failure.error)?;
            }
        }
        Ok(())
    }
}
