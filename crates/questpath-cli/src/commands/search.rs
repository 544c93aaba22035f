//! The `questpath search` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use questpath_core::catalog::search;

use super::{curriculum_path, load_curriculum};

pub fn execute(term: String, curriculum: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let path = curriculum_path(curriculum, config.as_deref())?;
    let curriculum = load_curriculum(&path)?;

    let hits = search(&curriculum, &term);
    if hits.is_empty() {
        println!("No nodes match '{term}'.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Subject", "Node", "Name", "Section", "Tier"]);
    for hit in &hits {
        table.add_row(vec![
            Cell::new(&hit.subject.name),
            Cell::new(&hit.node.id),
            Cell::new(&hit.node.name),
            Cell::new(hit.node.section.as_deref().unwrap_or("-")),
            Cell::new(hit.node.tier),
        ]);
    }
    println!("{table}");
    println!("{} match(es)", hits.len());

    Ok(())
}
