//! The `questpath validate` command.

use std::path::PathBuf;

use anyhow::Result;

use questpath_core::catalog::catalog_stats;
use questpath_core::parser::validate_curriculum;

use super::{curriculum_path, load_curriculum};

pub fn execute(curriculum: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let path = curriculum_path(curriculum, config.as_deref())?;
    let curriculum = load_curriculum(&path)?;

    for graph in curriculum.subjects() {
        println!(
            "Subject: {} ({} nodes, {} questions)",
            graph.info().name,
            graph.nodes().len(),
            graph.question_count()
        );
    }

    let warnings = validate_curriculum(&curriculum);
    for w in &warnings {
        let prefix = w
            .node_id
            .as_ref()
            .map(|id| format!("  [{}/{id}]", w.subject))
            .unwrap_or_else(|| format!("  [{}]", w.subject));
        println!("{prefix} WARNING: {}", w.message);
    }

    let stats = catalog_stats(&curriculum);
    println!(
        "\n{} subject(s), {} section(s), {} node(s), {} question(s)",
        stats.subjects, stats.sections, stats.nodes, stats.questions
    );

    if warnings.is_empty() {
        println!("All curricula valid.");
    } else {
        println!("{} warning(s) found.", warnings.len());
    }

    Ok(())
}
