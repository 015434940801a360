//! Companion operator description.
//!
//! Next to `<op>.cpp` every operator directory carries `<op>.toml`, which the registration
//! layer consumes:
//!
//! ```toml
//! name = "add"
//! inputs = ["a", "b"]
//! outputs = ["out"]
//! forward = "add_forward"
//! backward = "add_backward"
//!
//! [attributes]
//! inplace = false
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::binder::FunctionTable;
use crate::error::{CompanionParseSnafu, IoSnafu, Result, UnknownFunctionSnafu};

/// Operator description read from `<op>.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorDef {
    /// Operator name. Defaults to the operator directory name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,

    /// Kernel run by the forward pass.
    pub forward: String,

    /// Kernel run by the backward pass, if the operator is differentiable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backward: Option<String>,

    /// Free-form attributes passed through to the registration layer.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, toml::Value>,
}

impl OperatorDef {
    /// Read and parse `path`, naming the operator `default_name` when the file doesn't.
    pub fn load(path: &Path, default_name: &str) -> Result<Self> {
        let text = fs::read_to_string(path).context(IoSnafu { path })?;
        let mut def: Self = toml::from_str(&text).context(CompanionParseSnafu { path })?;
        if def.name.is_empty() {
            def.name = default_name.to_string();
        }
        Ok(def)
    }

    /// Kernel names the description refers to.
    pub fn functions(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(self.forward.as_str()).chain(self.backward.as_deref())
    }

    /// Check that every referenced kernel was bound.
    pub fn check(&self, table: &FunctionTable) -> Result<()> {
        for name in self.functions() {
            ensure!(
                table.contains(name),
                UnknownFunctionSnafu {
                    operator: &self.name,
                    name,
                    available: table.names().collect::<Vec<_>>().join(", ")
                }
            );
        }
        Ok(())
    }
}
