use crate::output::{print_json, render, Format};
use anyhow::Context;
use sari_cli::live::LiveCollaborators;
use sari_core::assemble::standard_pipeline;
use sari_core::config::Settings;
use sari_core::issue::{has_critical, log_issues, IssueLevel};
use std::path::Path;

pub fn run(output: Option<&Path>, format: Format, json: bool) -> anyhow::Result<()> {
    let settings = Settings::from_env().context("failed to load settings")?;
    let collaborators = LiveCollaborators::new(&settings);
    let pipeline = standard_pipeline(&settings, &collaborators)
        .with_context(|| format!("cannot build from {}", settings.config_dir.display()))?;
    let report = pipeline.run().context("model build failed")?;

    log_issues(&report.issues);

    if json && output.is_none() {
        print_json(&serde_json::json!({
            "model": report.model.root(),
            "issues": &report.issues,
        }))?;
    } else {
        let rendered = render(report.model.root(), format)?;
        match output {
            Some(path) => {
                sari_core::io::atomic_write(path, rendered.as_bytes())
                    .with_context(|| format!("failed to write {}", path.display()))?;
                tracing::info!("Model written to {}", path.display());
            }
            None => print!("{rendered}"),
        }
    }

    let count = |level: IssueLevel| report.issues.iter().filter(|i| i.level == level).count();
    tracing::info!(
        "{} warning(s), {} error(s), {} critical",
        count(IssueLevel::Warning),
        count(IssueLevel::Error),
        count(IssueLevel::Critical)
    );
    if has_critical(&report.issues) {
        anyhow::bail!(
            "{} critical issue(s); the model must not be provisioned",
            count(IssueLevel::Critical)
        );
    }
    Ok(())
}
