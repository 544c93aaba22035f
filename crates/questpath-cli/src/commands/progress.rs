//! The `questpath progress` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

pub async fn execute(
    user: String,
    subject: Option<String>,
    json: bool,
    config: Option<PathBuf>,
) -> Result<()> {
    let engine = super::build_engine(config.as_deref())?;

    let subjects = match subject {
        Some(s) => vec![s],
        None => engine.store().subjects_for(&user).await?,
    };
    if subjects.is_empty() {
        println!("No progress recorded for {user}.");
        return Ok(());
    }

    if json {
        let mut records = BTreeMap::new();
        for subject in &subjects {
            records.insert(subject.clone(), engine.progress(&user, subject).await?);
        }
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Subject",
        "Tier",
        "XP",
        "Hearts",
        "Completed",
        "Sessions (pass/fail)",
        "Streak",
        "Placement",
        "Achievements",
    ]);
    for subject in &subjects {
        let record = engine.progress(&user, subject).await?;
        let total = engine
            .curriculum()
            .get_nodes(subject)
            .map_or(0, |nodes| nodes.len());
        let achievements = if record.achievements.is_empty() {
            "-".to_string()
        } else {
            record
                .achievements
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };
        table.add_row(vec![
            Cell::new(subject),
            Cell::new(record.tier),
            Cell::new(record.experience),
            Cell::new(record.hearts),
            Cell::new(format!("{}/{total}", record.completed.len())),
            Cell::new(format!("{}/{}", record.sessions_passed, record.sessions_failed)),
            Cell::new(format!("{} day(s)", record.streak_days)),
            Cell::new(if record.calibrated { "taken" } else { "-" }),
            Cell::new(achievements),
        ]);
    }
    println!("Progress for {user}");
    println!("{table}");

    Ok(())
}
