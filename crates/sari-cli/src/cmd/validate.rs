use crate::output::{print_json, print_table};
use anyhow::Context;
use sari_core::config::{self, Settings, WarnLevel};

pub fn run(json: bool) -> anyhow::Result<()> {
    let settings = Settings::from_env().context("failed to load settings")?;
    let warnings = config::validate(&settings)
        .with_context(|| format!("cannot validate {}", settings.config_dir.display()))?;

    if json {
        let value = serde_json::json!({
            "config_dir": settings.config_dir,
            "regions": settings.regions().unwrap_or_default(),
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Configuration is valid. No warnings.");
    } else {
        let rows: Vec<Vec<String>> = warnings
            .iter()
            .map(|w| {
                let level = match w.level {
                    WarnLevel::Warning => "warning",
                    WarnLevel::Error => "error",
                };
                vec![level.to_string(), w.file.clone(), w.message.clone()]
            })
            .collect();
        print_table(&["LEVEL", "FILE", "MESSAGE"], &rows);
    }

    let errors = warnings
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation found {errors} error(s)");
    }
    Ok(())
}
