//! Node unlock resolution.
//!
//! A node is unlocked when it is a root or at least one of its prerequisites
//! has been completed, and the learner's experience covers the unlock
//! threshold of the node's tier. The resolver is a pure function of its
//! inputs and holds no state.

use crate::curriculum::Curriculum;
use crate::error::EngineResult;
use crate::model::LearningNode;
use crate::progress::{ProgressRecord, ProgressRules};

/// Decide whether `node_id` in `subject` is accessible for `progress`.
pub fn is_unlocked(
    curriculum: &Curriculum,
    rules: &ProgressRules,
    progress: &ProgressRecord,
    subject: &str,
    node_id: &str,
) -> EngineResult<bool> {
    let node = curriculum.node(subject, node_id)?;
    Ok(node_unlocked(node, rules, progress))
}

/// Unlock check for an already resolved node.
pub fn node_unlocked(
    node: &LearningNode,
    rules: &ProgressRules,
    progress: &ProgressRecord,
) -> bool {
    let reachable = node.is_root()
        || node
            .prerequisites
            .iter()
            .any(|p| progress.completed.contains(p));
    reachable && progress.experience >= rules.threshold(node.tier)
}

/// Ids of every unlocked node of a subject, in authoring order.
pub fn unlocked_nodes(
    curriculum: &Curriculum,
    rules: &ProgressRules,
    progress: &ProgressRecord,
    subject: &str,
) -> EngineResult<Vec<String>> {
    Ok(curriculum
        .get_nodes(subject)?
        .iter()
        .filter(|n| node_unlocked(n, rules, progress))
        .map(|n| n.id.clone())
        .collect())
}
