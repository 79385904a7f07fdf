// Integration tests for modules and the Sequential container
//
// Variable routing through `submodules/v<i>`, chaining order, tolerance of
// parameterless children and the error for malformed trees, all on
// HostRuntime.

use std::sync::{Arc, Mutex};

use lattice::nn::{ModuleBase, SubmoduleVars, Variable};
use lattice::prelude::*;
use lattice::Error;

type Host = HostRuntime;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(
        got.len(),
        expected.len(),
        "length mismatch: {} vs {}",
        got.len(),
        expected.len()
    );
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

fn adapter() -> DeviceAdapter<Host> {
    DeviceAdapter::with_defaults(Arc::new(HostRuntime::new())).unwrap()
}

fn array(data: &[f64], shape: impl Into<Shape>, adapter: &DeviceAdapter<Host>) -> Array<Host> {
    Array::from_f64_slice(data, shape, DType::F64, adapter.default_native_device()).unwrap()
}

/// Multiplies by variable `s` and records the value of `s` it was given.
struct Recorder {
    name: &'static str,
    base: ModuleBase<Host>,
    log: Log,
}

type Log = Arc<Mutex<Vec<(&'static str, f64)>>>;

impl Recorder {
    fn new(name: &'static str, s: f64, adapter: &DeviceAdapter<Host>, log: &Log) -> Self {
        let base = ModuleBase::new(None, None, |_| Ok(tree_with_s(s, adapter))).unwrap();
        Recorder {
            name,
            base,
            log: Arc::clone(log),
        }
    }
}

impl Module<Host> for Recorder {
    fn forward(&self, x: &Array<Host>, v: &VarTree<Host>) -> lattice::Result<Array<Host>> {
        let s = v
            .get_array("s")
            .ok_or_else(|| Error::msg("missing 's'"))?;
        self.log
            .lock()
            .unwrap()
            .push((self.name, s.to_f64_vec()?[0]));
        x.mul(s)
    }
    fn variables(&self) -> &VarTree<Host> {
        self.base.variables()
    }
    fn set_variables(&mut self, v: VarTree<Host>) {
        self.base.set_variables(v)
    }
}

fn tree_with_s(s: f64, adapter: &DeviceAdapter<Host>) -> VarTree<Host> {
    VarTree::new().with("s", array(&[s], 1, adapter))
}

fn submodules(children: Vec<(usize, VarTree<Host>)>) -> VarTree<Host> {
    let inner: VarTree<Host> = children
        .into_iter()
        .map(|(i, t)| (lattice::nn::submodule_key(i), Variable::Tree(t)))
        .collect();
    VarTree::new().with(lattice::nn::SUBMODULES_KEY, inner)
}

// Composition

#[test]
fn test_parameterless_chain_matches_manual_composition() -> lattice::Result<()> {
    let adapter = adapter();
    let model: Sequential<Host> = Sequential::builder()
        .add(Tanh::new())
        .add(ReLU::new())
        .add(Sigmoid::new())
        .build()?;
    assert!(model.variables().is_empty());

    let x = array(&[-2.0, -0.5, 0.0, 0.5, 2.0, 3.0], (2, 3), &adapter);
    let got = model.call(&x)?.to_f64_vec()?;
    let expected = x.tanh()?.relu()?.sigmoid()?.to_f64_vec()?;
    assert_vec_approx(&got, &expected, 1e-12);
    Ok(())
}

#[test]
fn test_mlp_matches_manual_computation() -> lattice::Result<()> {
    let adapter = adapter();
    let l1 = Linear::new(&adapter, 3, 4, true, DType::F64, None)?;
    let l2 = Linear::new(&adapter, 4, 2, true, DType::F64, None)?;
    let (w1, b1) = (l1.weight().unwrap().clone(), l1.bias().unwrap().clone());
    let (w2, b2) = (l2.weight().unwrap().clone(), l2.bias().unwrap().clone());

    let model = Sequential::builder().add(l1).add(ReLU::new()).add(l2).build()?;
    let x = array(&[0.5, -1.0, 2.0, 1.5, 0.25, -0.75], (2, 3), &adapter);
    let got = model.call(&x)?;
    assert_eq!(got.dims(), &[2, 2]);

    let h = x.matmul(&w1.t()?)?.add(&b1)?.relu()?;
    let expected = h.matmul(&w2.t()?)?.add(&b2)?;
    assert_vec_approx(&got.to_f64_vec()?, &expected.to_f64_vec()?, 1e-12);
    Ok(())
}

#[test]
fn test_traced_input_propagates_shapes() -> lattice::Result<()> {
    let adapter = adapter();
    let model = Sequential::builder()
        .add(Linear::new(&adapter, 8, 16, true, DType::F32, None)?)
        .add(Tanh::new())
        .add(Linear::new(&adapter, 16, 3, false, DType::F32, None)?)
        .build()?;
    let y = model.call(&Array::traced((5, 8), DType::F32))?;
    assert!(y.is_traced());
    assert_eq!(y.dims(), &[5, 3]);
    assert!(matches!(y.to_f64_vec(), Err(Error::TracedValue { .. })));
    Ok(())
}

#[test]
fn test_nested_sequential() -> lattice::Result<()> {
    let adapter = adapter();
    let inner = Sequential::builder()
        .add(Linear::new(&adapter, 2, 2, true, DType::F64, None)?)
        .add(ReLU::new())
        .build()?;
    let outer = Sequential::builder()
        .add(ReLU::new())
        .add(inner)
        .build()?;
    assert!(outer
        .variables()
        .get_path("submodules/v1/submodules/v0/w")
        .is_some());
    assert_eq!(outer.num_parameters(), 6);
    let y = outer.call(&array(&[1.0, -1.0], (1, 2), &adapter))?;
    assert!(y.to_f64_vec()?.iter().all(|&v| v >= 0.0));
    Ok(())
}

// Variable routing

#[test]
fn test_complete_tree_routes_each_child_in_order() -> lattice::Result<()> {
    let adapter = adapter();
    let log = Arc::new(Mutex::new(Vec::new()));
    let tree = submodules(vec![(0, tree_with_s(2.0, &adapter)), (1, tree_with_s(5.0, &adapter))]);

    let model = Sequential::builder()
        .add(Recorder::new("first", 100.0, &adapter, &log))
        .add(Recorder::new("second", 100.0, &adapter, &log))
        .variables(tree)
        .build()?;

    // construction replaced each child's tree with its slice
    let child1 = model.get(1).unwrap();
    assert_eq!(child1.variables().get_array("s").unwrap().to_f64_vec()?, vec![5.0]);

    let y = model.call(&array(&[3.0], 1, &adapter))?;
    assert_eq!(y.to_f64_vec()?, vec![3.0 * 2.0 * 5.0]);
    assert_eq!(*log.lock().unwrap(), vec![("first", 2.0), ("second", 5.0)]);
    Ok(())
}

#[test]
fn test_call_with_external_tree() -> lattice::Result<()> {
    let adapter = adapter();
    let log = Arc::new(Mutex::new(Vec::new()));
    let model = Sequential::builder()
        .add(Recorder::new("only", 2.0, &adapter, &log))
        .add(ReLU::new())
        .build()?;

    let x = array(&[1.0], 1, &adapter);
    assert_eq!(model.call(&x)?.to_f64_vec()?, vec![2.0]);

    let other = submodules(vec![(0, tree_with_s(7.0, &adapter))]);
    assert_eq!(model.call_with(&x, &other)?.to_f64_vec()?, vec![7.0]);
    // the model's own tree is untouched
    assert_eq!(model.call(&x)?.to_f64_vec()?, vec![2.0]);
    Ok(())
}

#[test]
fn test_missing_entry_for_parameterless_child_is_tolerated() -> lattice::Result<()> {
    let adapter = adapter();
    let log = Arc::new(Mutex::new(Vec::new()));
    // child 1 (ReLU) has no entry; children 0 and 2 do
    let tree = submodules(vec![(0, tree_with_s(-1.0, &adapter)), (2, tree_with_s(3.0, &adapter))]);
    let model = Sequential::builder()
        .add(Recorder::new("a", 1.0, &adapter, &log))
        .add(ReLU::new())
        .add(Recorder::new("b", 1.0, &adapter, &log))
        .variables(tree)
        .build()?;

    let y = model.call(&array(&[2.0, -4.0], 2, &adapter))?;
    assert_eq!(y.to_f64_vec()?, vec![0.0, 12.0]);
    Ok(())
}

#[test]
fn test_missing_entry_for_parameterized_child_fails_construction() {
    let adapter = adapter();
    let log = Arc::new(Mutex::new(Vec::new()));
    let tree = submodules(vec![(0, tree_with_s(1.0, &adapter))]);
    let result = Sequential::builder()
        .add(Recorder::new("a", 1.0, &adapter, &log))
        .add(Recorder::new("b", 1.0, &adapter, &log))
        .variables(tree)
        .build();

    let err = match result {
        Ok(_) => panic!("construction should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, Error::MissingSubmoduleVariables { index: 1 }));
    let msg = err.to_string();
    assert!(msg.contains("submodules/v1"), "unexpected message: {msg}");
}

#[test]
fn test_missing_entry_at_forward_fails() -> lattice::Result<()> {
    let adapter = adapter();
    let log = Arc::new(Mutex::new(Vec::new()));
    let model = Sequential::builder()
        .add(Recorder::new("a", 1.0, &adapter, &log))
        .build()?;
    let result = model.call_with(&array(&[1.0], 1, &adapter), &VarTree::new());
    assert!(matches!(
        result,
        Err(Error::MissingSubmoduleVariables { index: 0 })
    ));
    assert!(log.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_resolution_values() {
    let adapter = adapter();
    let tree = submodules(vec![(0, tree_with_s(1.0, &adapter))]);
    let child = tree_with_s(1.0, &adapter);
    assert!(matches!(tree.resolve_submodule(0, &child), SubmoduleVars::Found(_)));
    assert!(matches!(
        tree.resolve_submodule(3, &VarTree::new()),
        SubmoduleVars::MissingButEmpty
    ));
    assert!(matches!(
        tree.resolve_submodule(3, &child),
        SubmoduleVars::MissingAndRequired
    ));
}

// Placement and summary

#[test]
fn test_linear_placed_on_its_device() -> lattice::Result<()> {
    let rt = Arc::new(HostRuntime::builder().platform("gpu", 2).build());
    let adapter = DeviceAdapter::with_defaults(rt)?;

    let built_there = Linear::new(&adapter, 3, 2, true, DType::F32, Some(Device::new("gpu:1")))?;
    for (_, p) in built_there.named_parameters() {
        assert_eq!(adapter.resolve_device(&p), Some(Device::new("gpu:1")));
    }

    let mut moved = Linear::from_variables(
        VarTree::new().with("w", array_on(&adapter, (2, 3))?),
        Some(Device::new("gpu:0")),
    )?;
    moved.place(&adapter)?;
    let w = moved.weight().unwrap();
    assert_eq!(adapter.resolve_device(w), Some(Device::new("gpu:0")));
    Ok(())
}

fn array_on(adapter: &DeviceAdapter<Host>, shape: (usize, usize)) -> lattice::Result<Array<Host>> {
    Array::zeros(shape, DType::F32, adapter.default_native_device())
}

#[test]
fn test_model_summary() -> lattice::Result<()> {
    let adapter = adapter();
    let model = Sequential::builder()
        .add(Linear::new(&adapter, 4, 3, true, DType::F32, None)?)
        .add(ReLU::new())
        .add(Linear::new(&adapter, 3, 1, false, DType::F64, None)?)
        .build()?;

    let summary = ModelSummary::from_module(&model, &adapter);
    assert_eq!(summary.total_params, 12 + 3 + 3);
    assert_eq!(summary.num_tensors, 3);
    assert_eq!(summary.estimated_bytes, (12 + 3) * 4 + 3 * 8);
    assert_eq!(summary.devices(), vec!["cpu"]);
    assert_eq!(summary.params[0].name, "submodules/v0/b");
    assert_eq!(summary.params[2].dims, vec![1, 3]);

    let table = summary.to_string();
    assert!(table.contains("Model Summary"));
    assert!(table.contains("submodules/v2/w"));
    Ok(())
}
