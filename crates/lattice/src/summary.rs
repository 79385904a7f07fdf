// ModelSummary — Parameter listing for a module
//
// One row per parameter with the device it currently lives on, as the
// adapter resolves it. Traced parameters have no device and show as
// "traced".

use std::fmt;

use lattice_core::adapter::DeviceAdapter;
use lattice_core::dtype::DType;
use lattice_core::runtime::Runtime;
use lattice_nn::module::Module;

const TRACED_LABEL: &str = "traced";

/// One parameter of a summarized module.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub dims: Vec<usize>,
    pub numel: usize,
    pub dtype: DType,
    /// Device identifier, or `None` for a traced placeholder.
    pub device: Option<String>,
}

/// Summary statistics for a model.
#[derive(Debug, Clone)]
pub struct ModelSummary {
    /// Total number of scalar parameters.
    pub total_params: usize,
    /// Number of parameter arrays.
    pub num_tensors: usize,
    pub params: Vec<ParamInfo>,
    /// Bytes at each parameter's own dtype.
    pub estimated_bytes: usize,
}

impl ModelSummary {
    pub fn from_module<R: Runtime, M: Module<R> + ?Sized>(module: &M, adapter: &DeviceAdapter<R>) -> Self {
        let params: Vec<ParamInfo> = module
            .named_parameters()
            .into_iter()
            .map(|(name, a)| ParamInfo {
                device: adapter.resolve_device(&a).map(|d| d.to_string()),
                dims: a.dims().to_vec(),
                numel: a.elem_count(),
                dtype: a.dtype(),
                name,
            })
            .collect();

        ModelSummary {
            total_params: params.iter().map(|p| p.numel).sum(),
            num_tensors: params.len(),
            estimated_bytes: params.iter().map(|p| p.numel * p.dtype.size_in_bytes()).sum(),
            params,
        }
    }

    /// Distinct devices holding parameters, in first-seen order.
    pub fn devices(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for p in &self.params {
            let d = p.device.as_deref().unwrap_or(TRACED_LABEL);
            if !seen.contains(&d) {
                seen.push(d);
            }
        }
        seen
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "─".repeat(70);
        writeln!(f, "┌{rule}┐")?;
        writeln!(f, "│{:^70}│", "Model Summary")?;
        writeln!(f, "├{rule}┤")?;
        for p in &self.params {
            writeln!(
                f,
                "│ {:<26} {:>12} {:>8} {:>5} {:>12} │",
                truncate_str(&p.name, 26),
                format!("{:?}", p.dims),
                p.numel,
                p.dtype.to_string(),
                p.device.as_deref().unwrap_or(TRACED_LABEL),
            )?;
        }
        writeln!(f, "├{rule}┤")?;
        writeln!(
            f,
            "│ {:<68} │",
            format!(
                "Total params: {}  Tensors: {}  Mem: {}",
                format_params(self.total_params),
                self.num_tensors,
                format_bytes(self.estimated_bytes)
            )
        )?;
        writeln!(f, "└{rule}┘")
    }
}

fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

fn format_params(n: usize) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1e9)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1e6)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1e3)
    } else {
        format!("{}", n)
    }
}

pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
