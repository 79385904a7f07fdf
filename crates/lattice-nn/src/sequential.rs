// Sequential — A chain of modules applied one after another
//
// The output of each child becomes the sole input to the next.
//
//   let model = Sequential::builder()
//       .add(linear1)
//       .add(ReLU::new())
//       .add(linear2)
//       .build()?;
//
//   let output = model.call(&input)?;
//
// VARIABLES:
//
// A Sequential's tree nests its children's trees under `submodules/v<i>`,
// where i is the child's position. Children whose tree is empty are left
// out of the default tree, and a supplied tree may omit them too: for each
// child the lookup resolves to a SubmoduleVars, and only a missing entry for
// a child that owns variables is an error.

use lattice_core::array::Array;
use lattice_core::device::Device;
use lattice_core::error::{Error, Result};
use lattice_core::runtime::Runtime;

use crate::module::{Module, ModuleBase};
use crate::variables::{submodule_key, SubmoduleVars, VarTree, Variable, SUBMODULES_KEY};

/// A container that chains modules sequentially.
///
/// Sequential itself implements Module, so it can be nested.
pub struct Sequential<R: Runtime> {
    submodules: Vec<Box<dyn Module<R>>>,
    base: ModuleBase<R>,
}

impl<R: Runtime> Sequential<R> {
    /// Build a Sequential over `modules`.
    ///
    /// When `variables` is supplied, child `i` takes `submodules/v<i>` from it.
    /// Without one, the container's tree is assembled from the children's.
    pub fn new(
        mut modules: Vec<Box<dyn Module<R>>>,
        device: Option<Device>,
        variables: Option<VarTree<R>>,
    ) -> Result<Self> {
        if let Some(v) = &variables {
            for (index, module) in modules.iter_mut().enumerate() {
                match v.resolve_submodule(index, module.variables()) {
                    SubmoduleVars::Found(tree) => module.set_variables(tree.clone()),
                    SubmoduleVars::MissingButEmpty => {}
                    SubmoduleVars::MissingAndRequired => {
                        return Err(Error::MissingSubmoduleVariables { index })
                    }
                }
            }
        }
        let base = ModuleBase::new(device, variables, |_| Ok(collect_variables(&modules)))?;
        Ok(Sequential {
            submodules: modules,
            base,
        })
    }

    pub fn builder() -> SequentialBuilder<R> {
        SequentialBuilder::default()
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.submodules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submodules.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn Module<R>> {
        self.submodules.get(index).map(|m| m.as_ref())
    }
}

/// The default tree: each non-empty child tree under `submodules/v<i>`.
fn collect_variables<R: Runtime>(modules: &[Box<dyn Module<R>>]) -> VarTree<R> {
    let children: VarTree<R> = modules
        .iter()
        .enumerate()
        .filter(|(_, m)| !m.variables().is_empty())
        .map(|(i, m)| (submodule_key(i), Variable::Tree(m.variables().clone())))
        .collect();
    if children.is_empty() {
        VarTree::new()
    } else {
        VarTree::new().with(SUBMODULES_KEY, children)
    }
}

impl<R: Runtime> Module<R> for Sequential<R> {
    fn forward(&self, x: &Array<R>, v: &VarTree<R>) -> Result<Array<R>> {
        let mut out = x.clone();
        for (index, module) in self.submodules.iter().enumerate() {
            out = match v.resolve_submodule(index, module.variables()) {
                SubmoduleVars::Found(tree) => module.call_with(&out, tree)?,
                SubmoduleVars::MissingButEmpty => module.call(&out)?,
                SubmoduleVars::MissingAndRequired => {
                    return Err(Error::MissingSubmoduleVariables { index })
                }
            };
        }
        Ok(out)
    }

    fn variables(&self) -> &VarTree<R> {
        self.base.variables()
    }

    fn set_variables(&mut self, v: VarTree<R>) {
        self.base.set_variables(v)
    }

    fn device(&self) -> Option<&Device> {
        self.base.device()
    }
}

/// Chaining construction for [`Sequential`].
pub struct SequentialBuilder<R: Runtime> {
    modules: Vec<Box<dyn Module<R>>>,
    device: Option<Device>,
    variables: Option<VarTree<R>>,
}

impl<R: Runtime> Default for SequentialBuilder<R> {
    fn default() -> Self {
        SequentialBuilder {
            modules: Vec::new(),
            device: None,
            variables: None,
        }
    }
}

impl<R: Runtime> SequentialBuilder<R> {
    /// Append a child. Returns self for chaining.
    #[allow(clippy::should_implement_trait)]
    pub fn add<M: Module<R> + 'static>(mut self, module: M) -> Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn device(mut self, device: impl Into<Device>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn variables(mut self, variables: VarTree<R>) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn build(self) -> Result<Sequential<R>> {
        Sequential::new(self.modules, self.device, self.variables)
    }
}
