//! Worker-pool scheduling for independent sources

use std::collections::HashMap;
use std::sync::mpsc;

use super::driver::ExecutionDriver;
use super::sources::Source;
use crate::error::{Error, Result};
use crate::report::IterationRecord;
use crate::store::root_key;

/// Run `sources` on a rayon pool of `threads` workers.
///
/// Sources sharing any root form one group and run sequentially inside a
/// single task, so no root is ever open in two threads. Records come back
/// through a channel in completion order; the report sorts them.
pub(crate) fn run_parallel(
    driver: &ExecutionDriver<'_>,
    sources: &[Source],
    threads: Option<usize>,
) -> Result<Vec<IterationRecord>> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = threads {
        builder = builder.num_threads(threads);
    }
    let pool = builder
        .build()
        .map_err(|e| Error::ConfigError(format!("cannot build worker pool: {}", e)))?;

    let groups = group_by_root(sources);
    tracing::debug!(
        "Scheduling {} sources in {} groups on {} threads",
        sources.len(),
        groups.len(),
        pool.current_num_threads()
    );

    let (tx, rx) = mpsc::channel();
    pool.scope(|scope| {
        for group in groups {
            let tx = tx.clone();
            scope.spawn(move |_| {
                for record in driver.run_sequential(&group, false) {
                    // the receiver outlives the scope
                    let _ = tx.send(record);
                }
            });
        }
    });
    drop(tx);

    Ok(rx.into_iter().collect())
}

/// Partition sources into groups connected by shared roots, each group in
/// source order
fn group_by_root(sources: &[Source]) -> Vec<Vec<Source>> {
    let mut parent: Vec<usize> = (0..sources.len()).collect();
    let mut owner: HashMap<String, usize> = HashMap::new();

    for (i, source) in sources.iter().enumerate() {
        for root in &source.args {
            let key = root_key(root);
            match owner.get(&key) {
                Some(&j) => union(&mut parent, i, j),
                None => {
                    owner.insert(key, i);
                }
            }
        }
    }

    let mut groups: Vec<Vec<Source>> = Vec::new();
    let mut slot: HashMap<usize, usize> = HashMap::new();
    for (i, source) in sources.iter().enumerate() {
        let root = find(&mut parent, i);
        let index = *slot.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[index].push(source.clone());
    }
    groups
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let a = find(parent, a);
    let b = find(parent, b);
    if a != b {
        parent[a.max(b)] = a.min(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionMode, RunOptions};
    use crate::mapping::{InputMapping, OutputMapping};
    use crate::resolver::Options;
    use crate::signature::{Arguments, FnFunction, Parameter, Signature, number_value};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn source(index: usize, args: &[&str]) -> Source {
        Source::new(index, args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_groups_follow_shared_roots() {
        let sources = vec![
            source(0, &["a"]),
            source(1, &["b"]),
            source(2, &["a"]),
            source(3, &["c", "b"]),
            source(4, &["d"]),
        ];
        let groups = group_by_root(&sources);
        let indices: Vec<Vec<usize>> = groups
            .iter()
            .map(|g| g.iter().map(|s| s.index).collect())
            .collect();
        assert_eq!(indices, vec![vec![0, 2], vec![1, 3], vec![4]]);
    }

    #[test]
    fn test_groups_ignore_root_spelling() {
        let sources = vec![source(0, &["a.json"]), source(1, &["./a.json"]), source(2, &["b.json"])];
        assert_eq!(group_by_root(&sources).len(), 2);
    }

    #[test]
    fn test_parallel_run_reports_in_source_order() {
        let roots: Vec<String> = (0..16).map(|i| format!("f{}", i % 5)).collect();
        let mut store = MemoryStore::new();
        for i in 0..5 {
            store = store.with_root(format!("f{}", i), json!({"x": i}));
        }
        let func = FnFunction::new(
            Signature::new("inc").param(Parameter::required("x")),
            |a: &Arguments| Ok(number_value(a.number("x")? + 1.0)),
        );
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new().map("x", "$0/x"),
            &OutputMapping::new(),
            Options::new(),
            RunOptions::new().with_parallel(Some(4)),
        )
        .unwrap();

        let report = driver.run(&roots).unwrap();
        assert_eq!(report.mode, ExecutionMode::Independent);
        assert_eq!(report.len(), 16);
        for (i, record) in report.records.iter().enumerate() {
            assert_eq!(record.index, i);
            assert_eq!(record.source, roots[i]);
            let expected = ((i % 5) + 1).to_string();
            assert_eq!(record.stdout.as_deref(), Some(expected.as_str()));
        }
    }
}
