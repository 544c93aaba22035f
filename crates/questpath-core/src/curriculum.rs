//! Per-subject curriculum graphs.
//!
//! Each subject is a DAG of [`LearningNode`]s with prerequisite edges. The
//! graph is checked for duplicates, dangling references and cycles when it is
//! built, successor sets are indexed once, and nothing is mutated afterwards.
//! Share a loaded [`Curriculum`] behind an `Arc`.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::model::{LearningNode, QuestionSpec};

/// Subject header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// The validated graph and question bank for one subject.
#[derive(Debug, Clone)]
pub struct SubjectGraph {
    info: SubjectInfo,
    nodes: Vec<LearningNode>,
    index: HashMap<String, usize>,
    successors: HashMap<String, BTreeSet<String>>,
    questions: HashMap<String, Vec<QuestionSpec>>,
    topo_order: Vec<String>,
}

impl SubjectGraph {
    /// Build and validate a subject graph.
    ///
    /// `questions` maps node ids to their question banks; nodes without an
    /// entry get an empty bank.
    pub fn new(
        info: SubjectInfo,
        nodes: Vec<LearningNode>,
        mut questions: HashMap<String, Vec<QuestionSpec>>,
    ) -> EngineResult<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(EngineError::InvalidCurriculum(format!(
                    "duplicate node '{}' in subject '{}'",
                    node.id, info.id
                )));
            }
        }

        let mut successors: HashMap<String, BTreeSet<String>> = nodes
            .iter()
            .map(|n| (n.id.clone(), BTreeSet::new()))
            .collect();
        for node in &nodes {
            for prereq in &node.prerequisites {
                let Some(succ) = successors.get_mut(prereq) else {
                    return Err(EngineError::UnknownNode {
                        subject: info.id.clone(),
                        node: prereq.clone(),
                    });
                };
                succ.insert(node.id.clone());
            }
        }

        if let Some(stray) = questions.keys().find(|id| !index.contains_key(*id)) {
            return Err(EngineError::UnknownNode {
                subject: info.id.clone(),
                node: stray.clone(),
            });
        }
        for node in &nodes {
            questions.entry(node.id.clone()).or_default();
        }

        let topo_order = topological_order(&info.id, &nodes, &successors)?;

        Ok(Self {
            info,
            nodes,
            index,
            successors,
            questions,
            topo_order,
        })
    }

    pub fn info(&self) -> &SubjectInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Nodes in authoring order.
    pub fn nodes(&self) -> &[LearningNode] {
        &self.nodes
    }

    /// Node ids ordered so that every prerequisite precedes its dependents.
    pub fn topological_order(&self) -> &[String] {
        &self.topo_order
    }

    pub fn node(&self, node_id: &str) -> EngineResult<&LearningNode> {
        self.index
            .get(node_id)
            .map(|&i| &self.nodes[i])
            .ok_or_else(|| self.unknown(node_id))
    }

    pub fn prerequisites(&self, node_id: &str) -> EngineResult<&BTreeSet<String>> {
        Ok(&self.node(node_id)?.prerequisites)
    }

    pub fn successors(&self, node_id: &str) -> EngineResult<&BTreeSet<String>> {
        self.successors
            .get(node_id)
            .ok_or_else(|| self.unknown(node_id))
    }

    pub fn questions(&self, node_id: &str) -> EngineResult<&[QuestionSpec]> {
        self.questions
            .get(node_id)
            .map(Vec::as_slice)
            .ok_or_else(|| self.unknown(node_id))
    }

    pub fn question_count(&self) -> usize {
        self.questions.values().map(Vec::len).sum()
    }

    fn unknown(&self, node_id: &str) -> EngineError {
        EngineError::UnknownNode {
            subject: self.info.id.clone(),
            node: node_id.to_string(),
        }
    }
}

/// Kahn's algorithm; any node left unvisited sits on or behind a cycle.
fn topological_order(
    subject: &str,
    nodes: &[LearningNode],
    successors: &HashMap<String, BTreeSet<String>>,
) -> EngineResult<Vec<String>> {
    let mut indegree: BTreeMap<&str, usize> = nodes
        .iter()
        .map(|n| (n.id.as_str(), n.prerequisites.len()))
        .collect();
    let mut ready: VecDeque<&str> = nodes
        .iter()
        .filter(|n| n.prerequisites.is_empty())
        .map(|n| n.id.as_str())
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(id) = ready.pop_front() {
        order.push(id.to_string());
        for succ in &successors[id] {
            if let Some(d) = indegree.get_mut(succ.as_str()) {
                *d -= 1;
                if *d == 0 {
                    ready.push_back(succ.as_str());
                }
            }
        }
    }

    if order.len() < nodes.len() {
        let stuck = indegree
            .iter()
            .find(|(_, d)| **d > 0)
            .map(|(id, _)| id.to_string())
            .unwrap_or_default();
        return Err(EngineError::CycleDetected {
            subject: subject.to_string(),
            node: stuck,
        });
    }
    Ok(order)
}

/// All subjects known to the process.
#[derive(Debug, Clone, Default)]
pub struct Curriculum {
    subjects: BTreeMap<String, SubjectGraph>,
}

impl Curriculum {
    pub fn new(graphs: Vec<SubjectGraph>) -> EngineResult<Self> {
        let mut subjects = BTreeMap::new();
        for graph in graphs {
            let id = graph.id().to_string();
            if subjects.insert(id.clone(), graph).is_some() {
                return Err(EngineError::InvalidCurriculum(format!(
                    "duplicate subject '{id}'"
                )));
            }
        }
        Ok(Self { subjects })
    }

    pub fn subject(&self, subject: &str) -> EngineResult<&SubjectGraph> {
        self.subjects
            .get(subject)
            .ok_or_else(|| EngineError::UnknownSubject(subject.to_string()))
    }

    pub fn subjects(&self) -> impl Iterator<Item = &SubjectGraph> {
        self.subjects.values()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn get_nodes(&self, subject: &str) -> EngineResult<&[LearningNode]> {
        Ok(self.subject(subject)?.nodes())
    }

    pub fn node(&self, subject: &str, node_id: &str) -> EngineResult<&LearningNode> {
        self.subject(subject)?.node(node_id)
    }

    pub fn get_prerequisites(
        &self,
        subject: &str,
        node_id: &str,
    ) -> EngineResult<&BTreeSet<String>> {
        self.subject(subject)?.prerequisites(node_id)
    }

    pub fn get_successors(&self, subject: &str, node_id: &str) -> EngineResult<&BTreeSet<String>> {
        self.subject(subject)?.successors(node_id)
    }

    pub fn questions(&self, subject: &str, node_id: &str) -> EngineResult<&[QuestionSpec]> {
        self.subject(subject)?.questions(node_id)
    }
}
