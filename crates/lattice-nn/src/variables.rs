// VarTree — Nested variable structure owned by a module
//
// A VarTree maps string keys to either arrays or nested trees, mirroring how
// modules nest. Paths use "/" as the separator:
//
//   submodules/v0/w      weight of the first child of a Sequential
//   submodules/v1/b      bias of the second child
//
// The `submodules/v<i>` layout is the contract between Sequential and
// anything that stores or loads parameters; keep it verbatim.
//
// A tree is "empty" when it holds no arrays at any depth. Parameterless
// modules own empty trees, which is what lets a Sequential tolerate a
// missing `submodules/v<i>` for them.

use std::collections::BTreeMap;
use std::fmt;

use lattice_core::adapter::DeviceAdapter;
use lattice_core::array::Array;
use lattice_core::device::Device;
use lattice_core::error::{Error, Result};
use lattice_core::runtime::Runtime;

/// Key under which a container stores its children's trees.
pub const SUBMODULES_KEY: &str = "submodules";

/// Path separator for [`VarTree::get_path`] and [`VarTree::insert_path`].
pub const PATH_SEPARATOR: char = '/';

/// Key of child `index` under [`SUBMODULES_KEY`]: `v0`, `v1`, ...
pub fn submodule_key(index: usize) -> String {
    format!("v{index}")
}

/// A leaf array or a nested tree.
pub enum Variable<R: Runtime> {
    Array(Array<R>),
    Tree(VarTree<R>),
}

impl<R: Runtime> Clone for Variable<R> {
    fn clone(&self) -> Self {
        match self {
            Variable::Array(a) => Variable::Array(a.clone()),
            Variable::Tree(t) => Variable::Tree(t.clone()),
        }
    }
}

impl<R: Runtime> fmt::Debug for Variable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Array(a) => fmt::Debug::fmt(a, f),
            Variable::Tree(t) => fmt::Debug::fmt(t, f),
        }
    }
}

impl<R: Runtime> From<Array<R>> for Variable<R> {
    fn from(a: Array<R>) -> Self {
        Variable::Array(a)
    }
}

impl<R: Runtime> From<VarTree<R>> for Variable<R> {
    fn from(t: VarTree<R>) -> Self {
        Variable::Tree(t)
    }
}

impl<R: Runtime> Variable<R> {
    pub fn as_array(&self) -> Option<&Array<R>> {
        match self {
            Variable::Array(a) => Some(a),
            Variable::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&VarTree<R>> {
        match self {
            Variable::Tree(t) => Some(t),
            Variable::Array(_) => None,
        }
    }
}

/// How a container's tree answers for child `i`.
///
/// Produced by [`VarTree::resolve_submodule`]; callers match on it instead of
/// treating a missing key as an error to be caught.
#[derive(Debug)]
pub enum SubmoduleVars<'a, R: Runtime> {
    /// `submodules/v<i>` exists.
    Found(&'a VarTree<R>),
    /// The key is absent, but the child owns no variables anyway.
    MissingButEmpty,
    /// The key is absent and the child owns variables: a malformed tree.
    MissingAndRequired,
}

/// Nested mapping from names to arrays.
pub struct VarTree<R: Runtime> {
    entries: BTreeMap<String, Variable<R>>,
}

impl<R: Runtime> Clone for VarTree<R> {
    fn clone(&self) -> Self {
        VarTree {
            entries: self.entries.clone(),
        }
    }
}

impl<R: Runtime> Default for VarTree<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Runtime> fmt::Debug for VarTree<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<R: Runtime> FromIterator<(String, Variable<R>)> for VarTree<R> {
    fn from_iter<I: IntoIterator<Item = (String, Variable<R>)>>(iter: I) -> Self {
        VarTree {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<R: Runtime> VarTree<R> {
    pub fn new() -> Self {
        VarTree {
            entries: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Variable<R>>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Variable<R>>) -> Option<Variable<R>> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Variable<R>> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Variable<R>> {
        self.entries.get(key)
    }

    pub fn get_array(&self, key: &str) -> Option<&Array<R>> {
        self.get(key).and_then(Variable::as_array)
    }

    pub fn get_tree(&self, key: &str) -> Option<&VarTree<R>> {
        self.get(key).and_then(Variable::as_tree)
    }

    /// Number of direct entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no array is stored at any depth.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|v| match v {
            Variable::Array(_) => false,
            Variable::Tree(t) => t.is_empty(),
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Look up a `/`-separated path.
    pub fn get_path(&self, path: &str) -> Option<&Variable<R>> {
        let mut segments = path.split(PATH_SEPARATOR);
        let first = segments.next()?;
        let mut current = self.entries.get(first)?;
        for segment in segments {
            current = current.as_tree()?.entries.get(segment)?;
        }
        Some(current)
    }

    /// Insert at a `/`-separated path, creating intermediate trees.
    ///
    /// Fails if an intermediate segment already holds an array.
    pub fn insert_path(&mut self, path: &str, value: impl Into<Variable<R>>) -> Result<()> {
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::msg(format!("invalid variable path '{path}'")));
        }
        let (leaf, parents) = segments
            .split_last()
            .ok_or_else(|| Error::msg("empty variable path"))?;
        let mut tree = self;
        for segment in parents {
            let entry = tree
                .entries
                .entry(segment.to_string())
                .or_insert_with(|| Variable::Tree(VarTree::new()));
            tree = match entry {
                Variable::Tree(t) => t,
                Variable::Array(_) => {
                    return Err(Error::msg(format!(
                        "variable path '{path}' passes through array '{segment}'"
                    )))
                }
            };
        }
        tree.entries.insert(leaf.to_string(), value.into());
        Ok(())
    }

    /// The subtree of child `index`: `submodules/v<index>`.
    pub fn submodule(&self, index: usize) -> Option<&VarTree<R>> {
        self.get_tree(SUBMODULES_KEY)?
            .get_tree(&submodule_key(index))
    }

    /// Decide what child `index` should be called with, given the child's
    /// own tree.
    pub fn resolve_submodule<'a>(
        &'a self,
        index: usize,
        child: &VarTree<R>,
    ) -> SubmoduleVars<'a, R> {
        match self.submodule(index) {
            Some(tree) => SubmoduleVars::Found(tree),
            None if child.is_empty() => SubmoduleVars::MissingButEmpty,
            None => SubmoduleVars::MissingAndRequired,
        }
    }

    /// All arrays with their full paths, in key order.
    pub fn leaves(&self) -> Vec<(String, &Array<R>)> {
        let mut out = Vec::new();
        self.collect_leaves("", &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Array<R>)>) {
        for (key, value) in &self.entries {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}{PATH_SEPARATOR}{key}")
            };
            match value {
                Variable::Array(a) => out.push((path, a)),
                Variable::Tree(t) => t.collect_leaves(&path, out),
            }
        }
    }

    /// Total number of scalar elements across all arrays.
    pub fn num_elements(&self) -> usize {
        self.leaves().iter().map(|(_, a)| a.elem_count()).sum()
    }

    /// Apply `f` to every array, keeping the structure.
    pub fn try_map(&self, f: &mut impl FnMut(&Array<R>) -> Result<Array<R>>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (key, value) in &self.entries {
            let mapped = match value {
                Variable::Array(a) => Variable::Array(f(a)?),
                Variable::Tree(t) => Variable::Tree(t.try_map(f)?),
            };
            entries.insert(key.clone(), mapped);
        }
        Ok(VarTree { entries })
    }

    /// A copy of the tree with every array placed on `device`.
    ///
    /// Arrays already on `device` are shared, not copied.
    pub fn to_device(&self, adapter: &DeviceAdapter<R>, device: &Device) -> Result<Self> {
        self.try_map(&mut |a| adapter.place_on_device(a.clone(), Some(device)))
    }
}
