//! Transitive expansion of field usage.
//!
//! Starting from the fields a query names, pulls in everything those fields
//! depend on: the inputs of computed fields, the filters and ON conditions
//! of every join crossed on the way, and so on until nothing new appears.
//! The join dependency graph is built in the same pass.

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::model::{ActiveJoin, AggregateUngrouping, FieldDef, FieldUsage, JoinField};
use crate::semantic::error::CompositeError;

use super::join_graph::JoinGraph;
use super::namespace::Namespace;
use super::path::{joined_field_usage, joined_ungroupings, path_begins};

/// Output of [`expand_field_usage`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldUsageExpansion {
    /// Every usage transitively required, deduplicated by path, in
    /// discovery order.
    pub result: Vec<FieldUsage>,
    /// References that did not resolve against the field list.
    pub missing_fields: Vec<FieldUsage>,
    /// Joins to emit, dependencies first.
    pub active_joins: Vec<ActiveJoin>,
    /// Ungroupings carried by the computed fields that were reached.
    pub ungroupings: Vec<AggregateUngrouping>,
}

impl FieldUsageExpansion {
    /// Fail on the first reference that did not resolve.
    pub fn ensure_complete(&self) -> Result<(), CompositeError> {
        match self.missing_fields.first() {
            Some(field) => Err(CompositeError::CouldNotFindField {
                field: field.clone(),
                path: Vec::new(),
            }),
            None => Ok(()),
        }
    }
}

/// Close `usage` over the dependencies declared in `fields`.
pub fn expand_field_usage(usage: &[FieldUsage], fields: &[FieldDef]) -> FieldUsageExpansion {
    let mut expander = Expander::new(fields);
    for u in usage {
        expander.seed(u.clone());
    }
    expander.run();
    trace!(
        seeded = usage.len(),
        expanded = expander.seen.len(),
        missing = expander.missing_fields.len(),
        joins = expander.joins.len(),
        "expanded field usage"
    );
    expander.finish()
}

/// Usage of a join itself: its source filters (rooted inside the join) and
/// its ON condition (rooted at the join's parent).
pub fn join_field_usage(join: &JoinField, join_path: &[String]) -> Vec<FieldUsage> {
    let mut usage = match join.source() {
        Some(source) => joined_field_usage(join_path, &source.filter_usage()),
        None => Vec::new(),
    };
    let parent_path = &join_path[..join_path.len().saturating_sub(1)];
    usage.extend(
        joined_field_usage(parent_path, &join.field_usage)
            .into_iter()
            .map(FieldUsage::from_on_expression),
    );
    usage
}

struct Expander<'a> {
    namespace: Namespace<'a>,
    seen: Vec<FieldUsage>,
    seen_index: HashMap<Vec<String>, usize>,
    queue: VecDeque<usize>,
    /// Usage index -> usages first added because of it.
    dependents: HashMap<usize, Vec<usize>>,
    joins: JoinGraph,
    missing_fields: Vec<FieldUsage>,
    ungroupings: Vec<AggregateUngrouping>,
}

impl<'a> Expander<'a> {
    fn new(fields: &'a [FieldDef]) -> Self {
        Self {
            namespace: Namespace::build(fields),
            seen: Vec::new(),
            seen_index: HashMap::new(),
            queue: VecDeque::new(),
            dependents: HashMap::new(),
            joins: JoinGraph::new(),
            missing_fields: Vec::new(),
            ungroupings: Vec::new(),
        }
    }

    fn seed(&mut self, usage: FieldUsage) {
        match self.seen_index.get(&usage.path) {
            Some(&idx) => self.seen[idx] = usage,
            None => {
                self.insert(usage);
            }
        }
    }

    /// Record a new usage and queue it.
    fn insert(&mut self, usage: FieldUsage) -> usize {
        let idx = self.seen.len();
        self.seen_index.insert(usage.path.clone(), idx);
        self.seen.push(usage);
        self.queue.push_back(idx);
        idx
    }

    fn run(&mut self) {
        while let Some(idx) = self.queue.pop_front() {
            let reference = self.seen[idx].clone();
            if reference.path.is_empty() {
                continue;
            }
            let Some(def) = self.namespace.lookup(&reference.path) else {
                self.missing_fields.push(reference);
                continue;
            };
            if let FieldDef::Atomic(atomic) = def {
                let ref_path = reference.join_path();
                for usage in joined_field_usage(ref_path, &atomic.field_usage) {
                    match self.seen_index.get(&usage.path) {
                        None => {
                            let from_on = reference.from_on_expression || usage.from_on_expression;
                            let child = self.insert(FieldUsage {
                                from_on_expression: from_on,
                                ..usage
                            });
                            self.dependents.entry(idx).or_default().push(child);
                        }
                        Some(&existing) => {
                            if let Some(required) = usage.unique_key_requirement {
                                let slot = &mut self.seen[existing].unique_key_requirement;
                                *slot = Some(slot.map_or(required, |s| s.merge(required)));
                            }
                        }
                    }
                }
                self.ungroupings
                    .extend(joined_ungroupings(ref_path, &atomic.ungroupings));
            }
            self.track_joins(&reference.path);
        }
    }

    /// Pull in the usage of every join the path crosses, once per join.
    fn track_joins(&mut self, path: &[String]) {
        for join_len in 1..path.len() {
            let join_path = &path[..join_len];
            let Some(join_def) = self.namespace.lookup(join_path) else {
                break;
            };
            let node = self.joins.node(join_path);
            let FieldDef::Join(join) = join_def else {
                continue;
            };
            if !self.joins.check(node) {
                continue;
            }

            for usage in join_field_usage(join, join_path) {
                match self.seen_index.get(&usage.path) {
                    None => {
                        self.insert(usage.clone());
                    }
                    Some(&existing) => {
                        if usage.from_on_expression && !self.seen[existing].from_on_expression {
                            self.propagate_from_on_expression(existing);
                        }
                    }
                }

                if usage.from_on_expression && self.reaches_child_source(&usage, join_path) {
                    self.joins.set_on_references_children(node);
                }

                let internal =
                    usage.path.len() == join_len + 1 && path_begins(&usage.path, join_path);
                if !internal && usage.path.len() > 1 {
                    let dependency = self.joins.node(usage.join_path());
                    self.joins.add_dependency(node, dependency);
                }
            }

            let nested = self
                .seen
                .iter()
                .any(|u| u.from_on_expression && self.reaches_child_source(u, join_path));
            if nested {
                self.joins.set_on_references_children(node);
            }
        }
    }

    /// Whether `usage` goes through `join_path` into one of that join's
    /// own source joins.
    fn reaches_child_source(&self, usage: &FieldUsage, join_path: &[String]) -> bool {
        let depth = join_path.len() + 1;
        usage.path.len() > depth
            && path_begins(&usage.path, join_path)
            && matches!(
                self.namespace.lookup(&usage.path[..depth]),
                Some(FieldDef::Join(child)) if child.source().is_some()
            )
    }

    /// Mark a usage and everything it pulled in as coming from an ON
    /// condition.
    fn propagate_from_on_expression(&mut self, start: usize) {
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            if self.seen[idx].from_on_expression {
                continue;
            }
            self.seen[idx].from_on_expression = true;
            if let Some(children) = self.dependents.get(&idx) {
                stack.extend(children.iter().copied());
            }
        }
    }

    fn finish(self) -> FieldUsageExpansion {
        FieldUsageExpansion {
            active_joins: self.joins.active_joins(),
            result: self.seen,
            missing_fields: self.missing_fields,
            ungroupings: self.ungroupings,
        }
    }
}

/// Usage split into fields of the current source and per-join buckets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorizedFieldUsage {
    pub source_usage: Vec<FieldUsage>,
    /// Join name -> usage re-rooted inside the join, in first-seen order.
    pub join_usage: Vec<(String, Vec<FieldUsage>)>,
}

pub fn categorize_field_usage(usage: &[FieldUsage]) -> CategorizedFieldUsage {
    let mut categorized = CategorizedFieldUsage::default();
    for u in usage {
        let Some((join_name, rest)) = u.path.split_first().filter(|_| u.path.len() > 1) else {
            categorized.source_usage.push(u.clone());
            continue;
        };
        let in_join = FieldUsage {
            path: rest.to_vec(),
            ..u.clone()
        };
        match categorized
            .join_usage
            .iter_mut()
            .find(|(name, _)| name == join_name)
        {
            Some((_, bucket)) => bucket.push(in_join),
            None => categorized
                .join_usage
                .push((join_name.clone(), vec![in_join])),
        }
    }
    categorized
}
