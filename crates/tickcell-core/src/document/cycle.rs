//! Circular dependency detection between formula cells.
//!
//! Depth-first search over whatever dependency relation the caller supplies;
//! recalculation uses it before evaluating a formula so a cycle becomes an
//! error value instead of unbounded recursion.

use std::collections::HashSet;
use std::hash::Hash;

/// Detect a cycle reachable from `start`.
/// Returns Some(path) ending at the repeated node if one is found.
pub fn detect_cycle<T, F>(start: &T, deps: F) -> Option<Vec<T>>
where
    T: Clone + Eq + Hash,
    F: Fn(&T) -> Vec<T>,
{
    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    let mut path = Vec::new();

    if detect_cycle_dfs(start, &deps, &mut visiting, &mut done, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn detect_cycle_dfs<T, F>(
    current: &T,
    deps: &F,
    visiting: &mut HashSet<T>,
    done: &mut HashSet<T>,
    path: &mut Vec<T>,
) -> bool
where
    T: Clone + Eq + Hash,
    F: Fn(&T) -> Vec<T>,
{
    if visiting.contains(current) {
        path.push(current.clone());
        return true;
    }
    if done.contains(current) {
        return false;
    }

    visiting.insert(current.clone());
    path.push(current.clone());

    for dep in deps(current) {
        if detect_cycle_dfs(&dep, deps, visiting, done, path) {
            return true;
        }
    }

    path.pop();
    visiting.remove(current);
    done.insert(current.clone());
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn graph(edges: &[(u32, u32)]) -> HashMap<u32, Vec<u32>> {
        let mut g: HashMap<u32, Vec<u32>> = HashMap::new();
        for (from, to) in edges {
            g.entry(*from).or_default().push(*to);
        }
        g
    }

    #[test]
    fn test_no_cycle() {
        let g = graph(&[(1, 2), (2, 3), (1, 3)]);
        assert_eq!(detect_cycle(&1, |n| g.get(n).cloned().unwrap_or_default()), None);
    }

    #[test]
    fn test_cycle_path() {
        let g = graph(&[(1, 2), (2, 3), (3, 1)]);
        assert_eq!(
            detect_cycle(&1, |n| g.get(n).cloned().unwrap_or_default()),
            Some(vec![1, 2, 3, 1])
        );
    }

    #[test]
    fn test_self_reference() {
        let g = graph(&[(7, 7)]);
        assert_eq!(
            detect_cycle(&7, |n| g.get(n).cloned().unwrap_or_default()),
            Some(vec![7, 7])
        );
    }
}
