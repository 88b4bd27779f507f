//! `graphwarden rules` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use graphwarden_detection::{Rule, RuleFilter, RuleLoader};

use crate::app::App;
use crate::cli::{RulesAction, RulesArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(app: App, args: RulesArgs, writer: &OutputWriter) -> Result<(), CliError> {
    match args.action {
        RulesAction::List { enabled, tag } => {
            execute_list(&app, RuleFilter { enabled, tag }, writer).await
        }
        RulesAction::Validate { path } => execute_validate(&path, writer).await,
    }
}

async fn execute_list(app: &App, filter: RuleFilter, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %app.config.detection.rules_path, "loading detection rules");
    app.load_rules().await?;

    let rules = app.rules.list(&filter).await;
    let report = RuleListReport {
        total: rules.len(),
        rules: rules.into_iter().map(RuleEntry::from).collect(),
    };
    writer.render(&report)?;
    Ok(())
}

async fn execute_validate(path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %path.display(), "validating detection rules");

    let (valid, errors) = match RuleLoader::load_path(path).await {
        Ok(loaded) => (
            loaded.rules.len(),
            loaded
                .rejected
                .iter()
                .map(|e| RuleIssue {
                    kind: e.kind().to_string(),
                    error: e.to_string(),
                })
                .collect(),
        ),
        Err(e) => (
            0,
            vec![RuleIssue {
                kind: e.kind().to_string(),
                error: e.to_string(),
            }],
        ),
    };

    let report = RuleValidationReport {
        path: path.display().to_string(),
        valid,
        invalid: errors.len(),
        errors,
    };
    writer.render(&report)?;

    if report.invalid > 0 {
        return Err(CliError::Rule(format!("{} invalid rule(s)", report.invalid)));
    }
    Ok(())
}

#[derive(Serialize)]
pub struct RuleListReport {
    pub total: usize,
    pub rules: Vec<RuleEntry>,
}

#[derive(Serialize)]
pub struct RuleEntry {
    pub rule_id: String,
    pub name: String,
    pub severity: u8,
    pub enabled: bool,
    pub language: String,
    pub tags: Vec<String>,
    pub mitre_techniques: Vec<String>,
}

impl From<Rule> for RuleEntry {
    fn from(rule: Rule) -> Self {
        Self {
            rule_id: rule.rule_id,
            name: rule.name,
            severity: rule.severity.value(),
            enabled: rule.enabled,
            language: rule.query.language,
            tags: rule.tags.into_iter().collect(),
            mitre_techniques: rule.mitre_techniques.into_iter().collect(),
        }
    }
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Detection Rules ({} total)", self.total.to_string().bold())?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<20} {:<32} {:<8} {:<9} {:<12} Tags",
            "ID", "Name", "Severity", "Status", "MITRE"
        )?;
        writeln!(w, "{}", "-".repeat(100))?;

        for r in &self.rules {
            let status = if r.enabled {
                "enabled".green()
            } else {
                "disabled".yellow()
            };
            writeln!(
                w,
                "{:<20} {:<32} {:<8} {:<9} {:<12} {}",
                r.rule_id,
                r.name,
                r.severity,
                status,
                r.mitre_techniques.join(","),
                r.tags.join(", ")
            )?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct RuleValidationReport {
    pub path: String,
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<RuleIssue>,
}

#[derive(Serialize)]
pub struct RuleIssue {
    pub kind: String,
    pub error: String,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.path.bold())?;
        writeln!(
            w,
            "  Rules: {} valid, {} invalid",
            self.valid.to_string().green(),
            if self.invalid > 0 {
                self.invalid.to_string().red()
            } else {
                self.invalid.to_string().normal()
            }
        )?;
        for issue in &self.errors {
            writeln!(w, "  {} {}", format!("[{}]", issue.kind).red(), issue.error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_report_shows_status() {
        let report = RuleListReport {
            total: 1,
            rules: vec![RuleEntry {
                rule_id: "RULE-BRUTE".to_owned(),
                name: "Brute force".to_owned(),
                severity: 8,
                enabled: false,
                language: "pattern".to_owned(),
                tags: vec!["authentication".to_owned()],
                mitre_techniques: vec!["T1110".to_owned()],
            }],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("RULE-BRUTE"));
        assert!(output.contains("disabled"));
        assert!(output.contains("T1110"));
    }

    #[tokio::test]
    async fn validate_reports_rejected_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{"rule_id": "RULE-A", "name": "a", "severity": 3, "query": "match: {}"},
                {"rule_id": "RULE-B", "name": "b", "severity": 3, "query": "match: {}",
                 "mitre_techniques": ["not-a-technique"]}]"#,
        )
        .unwrap();

        let writer = OutputWriter::new(crate::cli::OutputFormat::Json);
        let err = execute_validate(&path, &writer).await.unwrap_err();
        assert!(matches!(err, CliError::Rule(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
