//! The `questpath nodes` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use questpath_core::engine::NodeView;
use questpath_core::model::NodeKind;

pub async fn execute(user: String, subject: String, config: Option<PathBuf>) -> Result<()> {
    let engine = super::build_engine(config.as_deref())?;
    let views = engine.list_nodes(&user, &subject).await?;
    let progress = engine.progress(&user, &subject).await?;

    println!(
        "{} for {user}: {} xp, tier {}, {} heart(s)",
        engine.curriculum().subject(&subject)?.info().name,
        progress.experience,
        progress.tier,
        progress.hearts
    );

    let mut table = Table::new();
    table.set_header(vec!["Node", "Name", "Tier", "Section", "Questions", "Status"]);
    for view in &views {
        let name = match view.node.kind {
            NodeKind::Milestone => format!("{} (milestone)", view.node.name),
            NodeKind::Normal => view.node.name.clone(),
        };
        table.add_row(vec![
            Cell::new(&view.node.id),
            Cell::new(name),
            Cell::new(view.node.tier),
            Cell::new(view.node.section.as_deref().unwrap_or("-")),
            Cell::new(view.question_count),
            Cell::new(status(view)),
        ]);
    }
    println!("{table}");

    Ok(())
}

fn status(view: &NodeView) -> &'static str {
    if view.completed {
        "completed"
    } else if view.unlocked {
        "unlocked"
    } else {
        "locked"
    }
}
