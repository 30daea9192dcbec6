//! Composite source resolution.
//!
//! Given a source and the fields a query stage touches, pick the concrete
//! input of every composite (and the partition of every partition
//! composite) reachable from it, including through joins. Candidates are
//! tried in declaration order and the first one that satisfies everything
//! wins. When none does, the per-candidate reasons are returned so the
//! diagnostic formatter can explain the failure.

use std::collections::HashSet;

use tracing::{debug, instrument, trace};

use crate::config::{ResolverSettings, Settings};
use crate::model::{
    Annotation, FieldDef, FieldUsage, JoinTarget, PipeSegment, SourceDef, SourceKind,
};
use crate::semantic::error::{CompositeError, CompositeFailure, CompositeIssue, CompositeResult};

use super::expand::{categorize_field_usage, expand_field_usage, CategorizedFieldUsage};
use super::group_by::{check_unsatisfied, extract_nest_levels, NestLevels};
use super::namespace::{gen_root_fields, get_join_fields, lookup, merge_fields};
use super::partition::{partition_filter, select_partition};
use super::path::merge_field_usage;

/// A successfully resolved source node.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub source: SourceDef,
    /// Whether any composite or partition composite was narrowed on the
    /// way; when false the input needed no rewriting.
    pub any_composites: bool,
}

/// Entry point for resolution, carrying the configured limits.
#[derive(Debug, Clone)]
pub struct Resolver {
    max_depth: usize,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(&ResolverSettings::default())
    }
}

impl Resolver {
    pub fn new(settings: &ResolverSettings) -> Self {
        Self {
            max_depth: settings.max_depth,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.resolver)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolve the composites `segment` needs from `source`.
    ///
    /// Returns `Ok(None)` when nothing had to be narrowed, so the caller can
    /// keep using `source` as is.
    #[instrument(level = "debug", skip_all, fields(source = %source.name))]
    pub fn resolve_composite_sources(
        &self,
        source: &SourceDef,
        segment: &PipeSegment,
    ) -> CompositeResult<Option<SourceDef>> {
        let nests = extract_nest_levels(segment);
        let fields = merge_fields(&[&source.fields, segment.extend_source()]);
        let usage = merge_field_usage([source.filter_usage().as_slice(), segment.field_usage()]);
        let search = Search {
            nests: Some(&nests),
            max_depth: self.max_depth,
        };
        match search.resolve(&[], source, &fields, &usage, None, 0) {
            Ok(resolved) => {
                debug!(any_composites = resolved.any_composites, "resolved");
                Ok(resolved.any_composites.then_some(resolved.source))
            }
            Err(error) => {
                debug!(code = error.code(), "composite resolution failed");
                Err(error)
            }
        }
    }

    /// Resolve `source` for a bare usage list, without group-by checks.
    ///
    /// Fails with `NotACompositeSource` when there is nothing to resolve.
    #[instrument(level = "debug", skip_all, fields(source = %source.name))]
    pub fn resolve_composite_source(
        &self,
        source: &SourceDef,
        usage: &[FieldUsage],
    ) -> CompositeResult<SourceDef> {
        if !has_composites_anywhere(source) {
            return Err(CompositeError::NotACompositeSource { path: Vec::new() });
        }
        let usage = merge_field_usage([source.filter_usage().as_slice(), usage]);
        let search = Search {
            nests: None,
            max_depth: self.max_depth,
        };
        search
            .resolve(&[], source, &source.fields, &usage, None, 0)
            .map(|resolved| resolved.source)
    }
}

/// [`Resolver::resolve_composite_sources`] with default settings.
pub fn resolve_composite_sources(
    source: &SourceDef,
    segment: &PipeSegment,
) -> CompositeResult<Option<SourceDef>> {
    Resolver::default().resolve_composite_sources(source, segment)
}

/// Whether `source` or any source it joins is composite.
pub fn has_composites_anywhere(source: &SourceDef) -> bool {
    match &source.kind {
        SourceKind::Composite(_) | SourceKind::PartitionComposite { .. } => true,
        SourceKind::Plain(_) => source.fields.iter().any(|f| {
            f.as_join()
                .and_then(|j| j.source())
                .is_some_and(has_composites_anywhere)
        }),
    }
}

/// Usage whose target is a composite placeholder on `fields`, or does not
/// resolve there at all.
pub fn only_composite_usage(usage: &[FieldUsage], fields: &[FieldDef]) -> Vec<FieldUsage> {
    usage
        .iter()
        .filter(|u| lookup(&u.path, fields).is_none_or(FieldDef::is_composite_field))
        .cloned()
        .collect()
}

/// Outcome of trying one candidate.
enum Attempt {
    Accepted(SourceDef),
    Rejected(Vec<CompositeFailure>),
}

struct JoinError {
    error: CompositeError,
    first_usage: Option<FieldUsage>,
}

#[derive(Default)]
struct JoinOutcome {
    any_composites: bool,
    errors: Vec<JoinError>,
}

/// State shared by one top-level resolution.
struct Search<'a> {
    nests: Option<&'a NestLevels>,
    max_depth: usize,
}

impl Search<'_> {
    fn resolve(
        &self,
        path: &[String],
        source: &SourceDef,
        root_fields: &[FieldDef],
        usage: &[FieldUsage],
        candidates: Option<&[SourceDef]>,
        depth: usize,
    ) -> CompositeResult<ResolvedSource> {
        if depth > self.max_depth {
            return Err(CompositeError::ResolutionTooDeep {
                path: path.to_vec(),
                limit: self.max_depth,
            });
        }

        let scope = get_join_fields(root_fields, path).unwrap_or(root_fields);
        let usage_for_error =
            only_composite_usage(&expand_field_usage(usage, scope).result, &source.fields);

        let (mut base, any_composites) = match &source.kind {
            SourceKind::Composite(own) => {
                let sources = candidates.unwrap_or(own.as_slice());
                let base = self.resolve_candidates(
                    path,
                    source,
                    sources,
                    root_fields,
                    usage,
                    usage_for_error,
                    depth,
                )?;
                // candidate acceptance already resolved the joins
                return Ok(ResolvedSource {
                    source: base,
                    any_composites: true,
                });
            }
            SourceKind::PartitionComposite { relation, desc } => {
                let expanded = expand_field_usage(usage, scope).result;
                let categorized = categorize_field_usage(&expanded);
                match select_partition(desc, &categorized.source_usage) {
                    Ok(partition) => {
                        debug!(path = ?path, partition = %partition.id, "narrowed partition composite");
                        let mut base = source.clone();
                        base.kind = SourceKind::Plain(relation.clone());
                        base.filter_list.push(partition_filter(desc, &partition.id));
                        (base, true)
                    }
                    Err(issues) => {
                        return Err(CompositeError::NoSuitableCompositeSourceInput {
                            failures: issues
                                .into_iter()
                                .map(|issues| CompositeFailure {
                                    source: source.clone(),
                                    issues,
                                })
                                .collect(),
                            usage: expanded,
                            path: path.to_vec(),
                        });
                    }
                }
            }
            SourceKind::Plain(_) => (source.clone(), false),
        };

        let expanded = expand_field_usage(usage, get_join_fields(root_fields, path)?);
        if !expanded.missing_fields.is_empty() {
            return Err(CompositeError::NoSuitableCompositeSourceInput {
                failures: Vec::new(),
                usage: usage_for_error,
                path: path.to_vec(),
            });
        }
        let categorized = categorize_field_usage(&expanded.result);
        let outcome = self.process_joins(path, &mut base, root_fields, &categorized, depth)?;
        if let Some(first) = outcome.errors.into_iter().next() {
            return Err(first.error);
        }
        Ok(ResolvedSource {
            source: base,
            any_composites: any_composites || outcome.any_composites,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_candidates(
        &self,
        path: &[String],
        source: &SourceDef,
        sources: &[SourceDef],
        root_fields: &[FieldDef],
        usage: &[FieldUsage],
        usage_for_error: Vec<FieldUsage>,
        depth: usize,
    ) -> CompositeResult<SourceDef> {
        let non_composite: Vec<FieldDef> = source.non_composite_fields().cloned().collect();
        let mut failures = Vec::new();
        for candidate in sources {
            match self.try_candidate(
                path,
                source,
                &non_composite,
                candidate,
                root_fields,
                usage,
                depth,
            )? {
                Attempt::Accepted(base) => {
                    debug!(path = ?path, candidate = %candidate.name, "accepted composite input");
                    return Ok(base);
                }
                Attempt::Rejected(mut rejected) => {
                    trace!(
                        path = ?path,
                        candidate = %candidate.name,
                        issues = rejected.iter().map(|f| f.issues.len()).sum::<usize>(),
                        "rejected composite input"
                    );
                    failures.append(&mut rejected);
                }
            }
        }
        Err(CompositeError::NoSuitableCompositeSourceInput {
            failures,
            usage: usage_for_error,
            path: path.to_vec(),
        })
    }

    /// Run the checks for one candidate, in order, stopping at the first
    /// stage that finds problems.
    #[allow(clippy::too_many_arguments)]
    fn try_candidate(
        &self,
        path: &[String],
        source: &SourceDef,
        non_composite: &[FieldDef],
        candidate: &SourceDef,
        root_fields: &[FieldDef],
        usage: &[FieldUsage],
        depth: usize,
    ) -> CompositeResult<Attempt> {
        let reject = |issues: Vec<CompositeIssue>| {
            Ok(Attempt::Rejected(vec![CompositeFailure {
                source: candidate.clone(),
                issues,
            }]))
        };

        // 1. everything must resolve against the candidate
        let with_wheres = merge_field_usage([candidate.filter_usage().as_slice(), usage]);
        let fields_for_lookup: Vec<FieldDef> = non_composite
            .iter()
            .chain(candidate.fields.iter())
            .cloned()
            .collect();
        let expanded = expand_field_usage(&with_wheres, &fields_for_lookup);
        if !expanded.missing_fields.is_empty() {
            return reject(
                expanded
                    .missing_fields
                    .into_iter()
                    .map(|field| CompositeIssue::MissingField { field })
                    .collect(),
            );
        }

        // 2. composite fields must be public fields of the candidate
        let categorized = categorize_field_usage(&expanded.result);
        let composite_usage = only_composite_usage(&categorized.source_usage, &source.fields);
        let field_names: HashSet<&str> = candidate
            .fields
            .iter()
            .filter(|f| !f.is_private())
            .map(FieldDef::name)
            .collect();
        let missing: Vec<CompositeIssue> = composite_usage
            .iter()
            .filter(|u| u.path.first().is_some_and(|head| !field_names.contains(head.as_str())))
            .map(|u| CompositeIssue::MissingField { field: u.clone() })
            .collect();
        if !missing.is_empty() {
            return reject(missing);
        }

        // 3. nested composites resolve with the composite subset of usage
        let mut base = match &candidate.kind {
            SourceKind::Composite(_) | SourceKind::PartitionComposite { .. } => {
                let inner_root = gen_root_fields(root_fields, path, &fields_for_lookup, false)?;
                let inner_candidates = match &candidate.kind {
                    SourceKind::Composite(inner) => Some(inner.as_slice()),
                    _ => None,
                };
                match self.resolve(
                    path,
                    candidate,
                    &inner_root,
                    &composite_usage,
                    inner_candidates,
                    depth + 1,
                ) {
                    Ok(resolved) => SourceDef {
                        annotation: Annotation::compose(
                            source.annotation.as_ref(),
                            resolved.source.annotation.as_ref(),
                        ),
                        ..resolved.source
                    },
                    Err(CompositeError::NoSuitableCompositeSourceInput { failures, .. }) => {
                        return Ok(Attempt::Rejected(failures));
                    }
                    Err(error @ CompositeError::ResolutionTooDeep { .. }) => return Err(error),
                    Err(error) => {
                        trace!(code = error.code(), "nested composite failed");
                        return reject(Vec::new());
                    }
                }
            }
            SourceKind::Plain(_) => SourceDef {
                annotation: Annotation::compose(
                    source.annotation.as_ref(),
                    candidate.annotation.as_ref(),
                ),
                ..candidate.clone()
            },
        };
        base.fields = non_composite
            .iter()
            .cloned()
            .chain(std::mem::take(&mut base.fields))
            .collect();
        base.filter_list = source
            .filter_list
            .iter()
            .cloned()
            .chain(std::mem::take(&mut base.filter_list))
            .collect();

        // 4. joins
        let outcome = self.process_joins(path, &mut base, root_fields, &categorized, depth)?;
        if !outcome.errors.is_empty() {
            let mut issues = Vec::with_capacity(outcome.errors.len());
            for JoinError { error, first_usage } in outcome.errors {
                match error {
                    CompositeError::NoSuitableCompositeSourceInput { failures, path, .. } => {
                        issues.push(CompositeIssue::JoinFailed {
                            failures,
                            path,
                            first_usage,
                        })
                    }
                    other => return Err(other),
                }
            }
            return reject(issues);
        }

        // 5. required group-bys
        if let Some(nests) = self.nests {
            let fields = gen_root_fields(root_fields, path, &base.fields, false)?;
            let unsatisfied = check_unsatisfied(nests, &fields);
            if !unsatisfied.is_empty() {
                return reject(
                    unsatisfied
                        .into_iter()
                        .map(|required_group_by| CompositeIssue::MissingRequiredGroupBy {
                            required_group_by,
                        })
                        .collect(),
                );
            }
        }

        Ok(Attempt::Accepted(base))
    }

    /// Resolve every join that usage reaches into, replacing the join's
    /// target when its resolution narrowed something.
    fn process_joins(
        &self,
        path: &[String],
        base: &mut SourceDef,
        root_fields: &[FieldDef],
        categorized: &CategorizedFieldUsage,
        depth: usize,
    ) -> CompositeResult<JoinOutcome> {
        let mut outcome = JoinOutcome::default();
        for (join_name, joined_usage) in &categorized.join_usage {
            let join_path: Vec<String> = path.iter().chain([join_name]).cloned().collect();
            let first_usage = joined_usage.first().cloned();
            let structural = |error: CompositeError| JoinError {
                error,
                first_usage: first_usage.clone(),
            };

            let Some(pos) = base.fields.iter().rposition(|f| f.name() == join_name) else {
                outcome
                    .errors
                    .push(structural(CompositeError::CompositeSourceNotDefined { path: join_path }));
                continue;
            };
            let FieldDef::Join(join) = &base.fields[pos] else {
                outcome
                    .errors
                    .push(structural(CompositeError::CompositeSourceNotAJoin { path: join_path }));
                continue;
            };
            // arrays and records have nothing to narrow
            let Some(join_source) = join.source() else {
                continue;
            };

            let join_root = gen_root_fields(root_fields, path, &base.fields, true)?;
            let resolved = match self.resolve(
                &join_path,
                join_source,
                &join_root,
                joined_usage,
                None,
                depth + 1,
            ) {
                Ok(resolved) => resolved,
                Err(error) => {
                    outcome.errors.push(structural(error));
                    continue;
                }
            };
            if !resolved.any_composites {
                continue;
            }
            outcome.any_composites = true;
            if !resolved.source.is_joinable() {
                outcome.errors.push(structural(
                    CompositeError::CompositeSourceIsNotJoinable { path: join_path },
                ));
                continue;
            }
            debug!(path = ?join_path, input = %resolved.source.name, "narrowed join");
            if let FieldDef::Join(join) = &mut base.fields[pos] {
                join.target = JoinTarget::Source(resolved.source);
            }
        }
        Ok(outcome)
    }
}
