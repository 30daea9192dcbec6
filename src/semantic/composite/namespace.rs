//! Name-to-field maps for resolving dotted paths through joins, and the
//! field-list surgery the resolver does while narrowing.

use std::collections::HashMap;

use crate::model::FieldDef;
use crate::semantic::error::{CompositeError, CompositeResult};

/// A field list indexed by reference name, with one nested namespace per
/// join.
#[derive(Debug, Default)]
pub struct Namespace<'a> {
    fields: HashMap<&'a str, &'a FieldDef>,
    nested: HashMap<&'a str, Namespace<'a>>,
}

impl<'a> Namespace<'a> {
    pub fn build(fields: &'a [FieldDef]) -> Self {
        let mut namespace = Namespace::default();
        for field in fields {
            let name = field.name();
            namespace.fields.insert(name, field);
            if let FieldDef::Join(join) = field {
                namespace.nested.insert(name, Namespace::build(join.fields()));
            }
        }
        namespace
    }

    /// Resolve `path`, descending into joins for every segment but the last.
    pub fn lookup(&self, path: &[String]) -> Option<&'a FieldDef> {
        let (head, rest) = path.split_first()?;
        let def = self.fields.get(head.as_str()).copied()?;
        if rest.is_empty() {
            return Some(def);
        }
        self.nested.get(head.as_str())?.lookup(rest)
    }
}

/// Resolve `path` against a field list without building a namespace.
pub fn lookup<'a>(path: &[String], fields: &'a [FieldDef]) -> Option<&'a FieldDef> {
    let (head, rest) = path.split_first()?;
    let def = fields.iter().find(|f| f.name() == head)?;
    if rest.is_empty() {
        return Some(def);
    }
    match def {
        FieldDef::Join(join) => lookup(rest, join.fields()),
        _ => None,
    }
}

/// Merge field lists by reference name. A later field replaces an earlier
/// one of the same name in place.
pub fn merge_fields(lists: &[&[FieldDef]]) -> Vec<FieldDef> {
    let mut merged: Vec<FieldDef> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for field in lists.iter().flat_map(|list| list.iter()) {
        match index.get(field.name()) {
            Some(&i) => merged[i] = field.clone(),
            None => {
                index.insert(field.name().to_string(), merged.len());
                merged.push(field.clone());
            }
        }
    }
    merged
}

/// Rebuild the root field list with the fields at `join_path` swapped for
/// `fields` (or merged over them when `replace` is false).
pub fn gen_root_fields(
    root: &[FieldDef],
    join_path: &[String],
    fields: &[FieldDef],
    replace: bool,
) -> CompositeResult<Vec<FieldDef>> {
    gen_root_fields_at(root, join_path, 0, fields, replace)
}

fn gen_root_fields_at(
    root: &[FieldDef],
    join_path: &[String],
    depth: usize,
    fields: &[FieldDef],
    replace: bool,
) -> CompositeResult<Vec<FieldDef>> {
    let Some(head) = join_path.get(depth) else {
        return Ok(if replace {
            fields.to_vec()
        } else {
            merge_fields(&[root, fields])
        });
    };
    let mut by_name = merge_fields(&[root]);
    let error_path = join_path[..=depth].to_vec();
    let Some(slot) = by_name.iter_mut().find(|f| f.name() == head) else {
        return Err(CompositeError::CompositeSourceNotDefined { path: error_path });
    };
    let FieldDef::Join(join) = slot else {
        return Err(CompositeError::CompositeSourceNotAJoin { path: error_path });
    };
    let inner = gen_root_fields_at(join.fields(), join_path, depth + 1, fields, replace)?;
    *join.fields_mut() = inner;
    Ok(by_name)
}

/// The field list in scope at `join_path`.
pub fn get_join_fields<'a>(
    root: &'a [FieldDef],
    join_path: &[String],
) -> CompositeResult<&'a [FieldDef]> {
    if join_path.is_empty() {
        return Ok(root);
    }
    match lookup(join_path, root) {
        Some(FieldDef::Join(join)) => Ok(join.fields()),
        Some(_) => Err(CompositeError::CompositeSourceNotAJoin {
            path: join_path.to_vec(),
        }),
        None => Err(CompositeError::CompositeSourceNotDefined {
            path: join_path.to_vec(),
        }),
    }
}
