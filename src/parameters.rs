//! Named, typed and described tuning parameters of the solver.
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigError;
use crate::lm::{JacobianMode, LevenbergMarquardt};

/// Type tag of a [`ParameterValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Float,
    Integer,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKind::Float => write!(f, "float"),
            ParameterKind::Integer => write!(f, "integer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Float(f64),
    Integer(i64),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::Integer(_) => ParameterKind::Integer,
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Integer(value)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(value) => write!(f, "{:e}", value),
            ParameterValue::Integer(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub value: ParameterValue,
    pub description: String,
}

/// Mapping from parameter name to value and description.
///
/// The store created by [`Parameters::with_defaults`] holds
///
/// | key | type | default |
/// |---|---|---|
/// | `factor` | float | `100` |
/// | `maxfev` | integer | `400` |
/// | `ftol` | float | `$\sqrt{\epsilon}$` |
/// | `xtol` | float | `$\sqrt{\epsilon}$` |
/// | `gtol` | float | `0` |
/// | `epsilon` | float | `0` |
///
/// The values are copied into the engine configuration when a solve starts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters {
    entries: BTreeMap<String, Parameter>,
}

impl Parameters {
    pub fn with_defaults() -> Self {
        let tol = f64::EPSILON.sqrt();
        let mut parameters = Self::default();
        parameters.define("factor", 100.0, "initial step bound factor");
        parameters.define("maxfev", 400i64, "maximum number of function evaluations");
        parameters.define("ftol", tol, "relative reduction tolerance of the sum of squares");
        parameters.define("xtol", tol, "relative error tolerance of the solution");
        parameters.define(
            "gtol",
            0.0,
            "orthogonality tolerance between residuals and Jacobian columns",
        );
        parameters.define("epsilon", 0.0, "precision floor of the finite-difference step");
        parameters
    }

    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.entries.get(key)
    }

    /// Add an entry or replace an existing one of the same type.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParameterValue>,
        description: impl Into<String>,
    ) -> Result<(), ConfigError> {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.get(&key) {
            if entry.value.kind() != value.kind() {
                return Err(ConfigError::TypeMismatch {
                    expected: entry.value.kind(),
                    found: value.kind(),
                    key,
                });
            }
        }
        self.define(key, value, description);
        Ok(())
    }

    fn define(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParameterValue>,
        description: impl Into<String>,
    ) {
        self.entries.insert(
            key.into(),
            Parameter {
                value: value.into(),
                description: description.into(),
            },
        );
    }

    /// Change the value of an existing entry, keeping its type.
    pub fn set(&mut self, key: &str, value: impl Into<ParameterValue>) -> Result<(), ConfigError> {
        let value = value.into();
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| ConfigError::UnknownParameter(key.to_owned()))?;
        if entry.value.kind() != value.kind() {
            return Err(ConfigError::TypeMismatch {
                key: key.to_owned(),
                expected: entry.value.kind(),
                found: value.kind(),
            });
        }
        entry.value = value;
        Ok(())
    }

    /// Value of a float entry.
    ///
    /// # Panics
    ///
    /// If `key` is missing or not a float.
    pub fn float(&self, key: &str) -> f64 {
        match self.get(key).map(|entry| entry.value) {
            Some(ParameterValue::Float(value)) => value,
            other => panic!("parameter `{}` is not a float: {:?}", key, other),
        }
    }

    /// Value of an integer entry.
    ///
    /// # Panics
    ///
    /// If `key` is missing or not an integer.
    pub fn integer(&self, key: &str) -> i64 {
        match self.get(key).map(|entry| entry.value) {
            Some(ParameterValue::Integer(value)) => value,
            other => panic!("parameter `{}` is not an integer: {:?}", key, other),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Engine configuration described by the store.
    ///
    /// A negative `maxfev` becomes zero, which the engine rejects.
    pub(crate) fn engine_config(&self, jacobian_mode: JacobianMode) -> LevenbergMarquardt {
        LevenbergMarquardt::new()
            .with_stepbound(self.float("factor"))
            .with_patience(usize::try_from(self.integer("maxfev")).unwrap_or(0))
            .with_ftol(self.float("ftol"))
            .with_xtol(self.float("xtol"))
            .with_gtol(self.float("gtol"))
            .with_epsfcn(self.float("epsilon"))
            .with_jacobian_mode(jacobian_mode)
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} {:>14}  description", "key", "value")?;
        for (key, entry) in self.iter() {
            writeln!(
                f,
                "{:<10} {:>14}  {}",
                key,
                entry.value.to_string(),
                entry.description
            )?;
        }
        Ok(())
    }
}
