//! Common chunk extraction.
//!
//! Runtime units shared by several entries are moved into synthetic
//! `common_<id>` chunks. A unit referenced by `count` entries out of `total`
//! lands in bucket `total - count`, so lower ids hold units shared by more
//! entries. Empty buckets are dropped and the remaining ones renumbered in
//! order.
//!
//! Units an entry inherits from one of its ancestor entries are never counted
//! for it: the ancestor's chunk already provides them.

use futures::future::try_join_all;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use super::{BuildConfig, EntrySets};
use crate::block::{BlockMap, RuntimeDependencies};
use crate::error::Result;

/// Name of the common chunk with the given id.
pub fn common_name(id: usize) -> String {
    format!("common_{id}")
}

/// A runtime unit assigned to an entry or a common chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUnit {
    pub name: String,
    /// Only present as an ancestor of other units.
    pub is_parent: bool,
}

/// Entry points rewritten around common chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnionEntryPoints {
    /// Entry name to the entries and common chunks it depends on.
    pub dependencies: EntrySets,
    /// Entry or common chunk name to the units it bundles.
    pub entry: IndexMap<String, IndexMap<String, ChunkUnit>>,
}

#[derive(Debug)]
struct Tally {
    count: usize,
    parent_only: bool,
}

/// Units of `graph` that are not already provided by `inherited`.
fn own_units(
    graph: &RuntimeDependencies,
    inherited: &FxHashSet<&str>,
) -> IndexMap<String, ChunkUnit> {
    graph
        .runtime
        .keys()
        .filter(|name| !inherited.contains(name.as_str()))
        .map(|name| {
            let unit = ChunkUnit {
                name: name.clone(),
                is_parent: graph.is_parent_only(name),
            };
            (name.clone(), unit)
        })
        .collect()
}

/// Split the runtime units of every entry of `build` into per-entry units
/// and common chunks.
pub async fn get_union_entry_points(
    build: &BuildConfig,
    cache: Option<&BlockMap>,
) -> Result<UnionEntryPoints> {
    let entries = build.entries();
    let total = entries.len();

    let graphs = try_join_all(entries.values().map(|e| e.runtime_dependencies(cache))).await?;
    let ancestry = build.dependencies().await?;

    let mut parents: IndexMap<&str, Vec<String>> = IndexMap::new();
    for (name, entry) in entries {
        parents.insert(name.as_str(), entry.parents().await?.into_iter().collect());
    }

    let graphs = &graphs;
    let mut own: Vec<IndexMap<String, ChunkUnit>> = Vec::with_capacity(total);
    for (name, graph) in entries.keys().zip(graphs) {
        let inherited: FxHashSet<&str> = ancestry
            .get(name)
            .into_iter()
            .flatten()
            .filter(|ancestor| ancestor.as_str() != name.as_str())
            .filter_map(|ancestor| entries.get_index_of(ancestor))
            .flat_map(move |i| graphs[i].runtime.keys().map(String::as_str))
            .collect();
        own.push(own_units(graph, &inherited));
    }

    let mut tally: IndexMap<&str, Tally> = IndexMap::new();
    for units in &own {
        for unit in units.values() {
            let entry = tally.entry(unit.name.as_str()).or_insert(Tally {
                count: 0,
                parent_only: true,
            });
            entry.count += 1;
            entry.parent_only &= unit.is_parent;
        }
    }

    let mut buckets: Vec<IndexMap<String, ChunkUnit>> = vec![IndexMap::new(); total];
    for (name, shared) in tally.iter().filter(|(_, t)| t.count > 1) {
        let unit = ChunkUnit {
            name: name.to_string(),
            is_parent: shared.parent_only,
        };
        buckets[total - shared.count].insert(name.to_string(), unit);
    }

    let commons: Vec<IndexMap<String, ChunkUnit>> =
        buckets.into_iter().filter(|b| !b.is_empty()).collect();
    let chunk_of: FxHashMap<&str, usize> = commons
        .iter()
        .enumerate()
        .flat_map(|(id, units)| units.keys().map(move |name| (name.as_str(), id)))
        .collect();

    tracing::debug!(entries = total, commons = commons.len(), "common chunks extracted");

    let mut result = UnionEntryPoints::default();
    let mut chunks: Vec<IndexSet<usize>> = Vec::with_capacity(total);

    for (name, units) in entries.keys().zip(own) {
        let mut used = IndexSet::new();
        let mut remaining = IndexMap::new();
        for (unit_name, unit) in units {
            match chunk_of.get(unit_name.as_str()) {
                Some(&id) => {
                    used.insert(id);
                }
                None => {
                    remaining.insert(unit_name, unit);
                }
            }
        }
        used.sort();
        chunks.push(used);
        result.entry.insert(name.clone(), remaining);
    }

    for (name, used) in entries.keys().zip(chunks) {
        let mut deps = nearest_ancestors(name, &parents, &result.entry);
        deps.extend(used.into_iter().map(common_name));
        result.dependencies.insert(name.clone(), deps);
    }

    for (id, units) in commons.into_iter().enumerate() {
        result.entry.insert(common_name(id), units);
    }

    Ok(result)
}

/// Closest ancestors of `name` that bundle at least one unit. An ancestor
/// left empty by extraction is replaced by its own nearest ancestors.
fn nearest_ancestors(
    name: &str,
    parents: &IndexMap<&str, Vec<String>>,
    units: &IndexMap<String, IndexMap<String, ChunkUnit>>,
) -> IndexSet<String> {
    let mut found = IndexSet::new();
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    seen.insert(name);

    let mut queue: Vec<&str> = parents
        .get(name)
        .into_iter()
        .flatten()
        .rev()
        .map(String::as_str)
        .collect();

    while let Some(parent) = queue.pop() {
        if !seen.insert(parent) {
            continue;
        }
        match units.get(parent) {
            Some(bundled) if !bundled.is_empty() => {
                found.insert(parent.to_string());
            }
            Some(_) => queue.extend(
                parents
                    .get(parent)
                    .into_iter()
                    .flatten()
                    .rev()
                    .map(String::as_str),
            ),
            None => {}
        }
    }

    found
}
