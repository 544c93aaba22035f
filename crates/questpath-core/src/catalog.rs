//! Topic catalogue: search across subjects and summary counts.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::curriculum::{Curriculum, SubjectInfo};
use crate::model::LearningNode;

/// One node matched by a search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit<'a> {
    pub subject: &'a SubjectInfo,
    pub node: &'a LearningNode,
}

/// Case-insensitive search.
///
/// A subject whose name or id matches contributes all its nodes, a matching
/// section contributes that section's nodes, and any other node matches on
/// its name or description. A blank term returns everything.
pub fn search<'a>(curriculum: &'a Curriculum, term: &str) -> Vec<SearchHit<'a>> {
    let needle = term.trim().to_lowercase();
    let matches = |text: &str| needle.is_empty() || text.to_lowercase().contains(&needle);

    let mut hits = Vec::new();
    for graph in curriculum.subjects() {
        let info = graph.info();
        let whole_subject = matches(&info.name) || matches(&info.id);
        for node in graph.nodes() {
            let hit = whole_subject
                || node.section.as_deref().is_some_and(matches)
                || matches(&node.name)
                || matches(&node.description);
            if hit {
                hits.push(SearchHit {
                    subject: info,
                    node,
                });
            }
        }
    }
    hits
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub subjects: usize,
    pub sections: usize,
    pub nodes: usize,
    pub questions: usize,
}

/// Sections are counted per subject, so two subjects sharing a section name
/// count twice.
pub fn catalog_stats(curriculum: &Curriculum) -> CatalogStats {
    let mut stats = CatalogStats::default();
    for graph in curriculum.subjects() {
        stats.subjects += 1;
        stats.nodes += graph.nodes().len();
        stats.questions += graph.question_count();
        let sections: BTreeSet<&str> = graph
            .nodes()
            .iter()
            .filter_map(|n| n.section.as_deref())
            .collect();
        stats.sections += sections.len();
    }
    stats
}
