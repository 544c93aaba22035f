//! The `questpath placement` command.

use std::path::PathBuf;

use anyhow::Result;

use questpath_core::model::Tier;

pub async fn execute(
    user: String,
    subject: String,
    tier: Tier,
    config: Option<PathBuf>,
) -> Result<()> {
    let engine = super::build_engine(config.as_deref())?;
    let result = engine.record_placement(&user, &subject, tier).await?;

    println!(
        "{user} placed at {tier} in {subject}: {} xp, tier {}",
        result.progress.experience, result.progress.tier
    );
    for id in &result.new_achievements {
        let description = engine
            .achievements()
            .rule(id)
            .map(|r| r.description.as_str())
            .unwrap_or("");
        println!("  Achievement unlocked: {id} {description}");
    }

    Ok(())
}
