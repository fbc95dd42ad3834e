//! Suites, Parameters and Job Discovery
//!
//! A suite is a type whose methods are benchmarks. Discovery expands every
//! benchmark over the Cartesian product of the suite's parameters:
//!
//! ```text
//! benchmarks: [sort, sort_unstable]      params: n = [10, 1000], kind = [a, b]
//!
//!   sort@n=10,kind=a     sort@n=10,kind=b     sort@n=1000,kind=a   sort@n=1000,kind=b
//!   sort_unstable@n=10,kind=a   ...
//! ```
//!
//! Order is declaration order of benchmarks, then combinations with the
//! first parameter varying slowest.

use crate::bencher::Bencher;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use wrapbench_ipc::BenchmarkConfig;

/// A single parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Boolean
    Bool(bool),
    /// String
    Str(String),
}

impl ParamValue {
    /// Integer value, if this is an `Int`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value as f64, if this is an `Int` or `Float`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean value, if this is a `Bool`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String value, if this is a `Str`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}

macro_rules! param_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for ParamValue {
            fn from(v: $t) -> Self {
                ParamValue::Int(v as i64)
            }
        })*
    };
}

param_from_int!(i8, i16, i32, i64, u8, u16, u32, usize);

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v as f64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

/// A named parameter and the values to sweep
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    /// Parameter name
    pub name: String,
    /// Values, in sweep order
    pub values: Vec<ParamValue>,
}

impl ParamDef {
    /// Define a parameter
    pub fn new<V: Into<ParamValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// One combination of parameter values, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    entries: Vec<(String, ParamValue)>,
}

impl ParamSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.entries.push((name.into(), value.into()));
        self
    }

    /// Value of `name`
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Integer value of `name`
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_i64)
    }

    /// Numeric value of `name`
    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    /// Boolean value of `name`
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    /// String value of `name`
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// `(name, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No parameters
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `name=value,name=value`
impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Per-benchmark settings that take precedence over the run configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BenchmarkOverrides {
    /// Warmup time in nanoseconds
    pub warmup_ns: Option<u64>,
    /// Measurement time in nanoseconds
    pub measurement_ns: Option<u64>,
    /// Fixed sample count
    pub samples: Option<u64>,
    /// Minimum measured invocations
    pub min_iterations: Option<u64>,
    /// Maximum measured invocations
    pub max_iterations: Option<u64>,
}

impl BenchmarkOverrides {
    /// Layer these overrides over `base`
    pub fn apply(&self, base: &BenchmarkConfig) -> BenchmarkConfig {
        BenchmarkConfig {
            warmup_time_ns: self.warmup_ns.unwrap_or(base.warmup_time_ns),
            measurement_time_ns: self.measurement_ns.unwrap_or(base.measurement_time_ns),
            samples: self.samples.or(base.samples),
            min_iterations: self.min_iterations.or(base.min_iterations),
            max_iterations: self.max_iterations.or(base.max_iterations),
            ..base.clone()
        }
    }

    /// No override set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One benchmark entry point on suite `T`
pub struct BenchmarkDef<T> {
    /// Method name
    pub name: &'static str,
    /// Group (category)
    pub group: Option<&'static str>,
    /// Free-form description
    pub description: Option<&'static str>,
    /// Tags
    pub tags: &'static [&'static str],
    /// Reference point for ratios within its group
    pub baseline: bool,
    /// Per-benchmark settings
    pub overrides: BenchmarkOverrides,
    /// Calls the method under test
    pub runner: fn(&mut T, &mut Bencher),
}

impl<T> Clone for BenchmarkDef<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            group: self.group,
            description: self.description,
            tags: self.tags,
            baseline: self.baseline,
            overrides: self.overrides,
            runner: self.runner,
        }
    }
}

impl<T> fmt::Debug for BenchmarkDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkDef")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("tags", &self.tags)
            .field("baseline", &self.baseline)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl<T> BenchmarkDef<T> {
    /// Benchmark `name`, measured by `runner`
    pub fn new(name: &'static str, runner: fn(&mut T, &mut Bencher)) -> Self {
        Self {
            name,
            group: None,
            description: None,
            tags: &[],
            baseline: false,
            overrides: BenchmarkOverrides::default(),
            runner,
        }
    }

    /// Set the group
    pub fn group(mut self, group: &'static str) -> Self {
        self.group = Some(group);
        self
    }

    /// Set the description
    pub fn description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    /// Set the tags
    pub fn tags(mut self, tags: &'static [&'static str]) -> Self {
        self.tags = tags;
        self
    }

    /// Mark as the group's baseline
    pub fn baseline(mut self) -> Self {
        self.baseline = true;
        self
    }

    /// Override warmup time
    pub fn warmup(mut self, warmup: Duration) -> Self {
        self.overrides.warmup_ns = Some(warmup.as_nanos() as u64);
        self
    }

    /// Override measurement time
    pub fn measurement(mut self, measurement: Duration) -> Self {
        self.overrides.measurement_ns = Some(measurement.as_nanos() as u64);
        self
    }

    /// Fixed sample count
    pub fn samples(mut self, samples: u64) -> Self {
        self.overrides.samples = Some(samples);
        self
    }

    /// Minimum measured invocations
    pub fn min_iterations(mut self, n: u64) -> Self {
        self.overrides.min_iterations = Some(n);
        self
    }

    /// Maximum measured invocations
    pub fn max_iterations(mut self, n: u64) -> Self {
        self.overrides.max_iterations = Some(n);
        self
    }
}

/// A type whose methods are benchmarks.
///
/// Usually implemented with `#[wrapbench::suite]`.
pub trait BenchmarkSuite: Sized + 'static {
    /// Display name; defaults to the unqualified type name
    fn name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Parameters to sweep
    fn params() -> Vec<ParamDef> {
        Vec::new()
    }

    /// Build an instance for one parameter combination (untimed)
    fn create(params: &ParamSet) -> Self;

    /// Release resources after a job (untimed)
    fn teardown(&mut self) {}

    /// Benchmark entry points, in declaration order
    fn benchmarks() -> Vec<BenchmarkDef<Self>>;
}

/// Last path segment of a type name, generics included
pub fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

/// A benchmark bound to one parameter combination
pub struct Job<T> {
    /// Position in discovery order
    pub index: usize,
    /// `method` or `method@name=value,...`
    pub id: String,
    /// `Suite::id`
    pub full_id: String,
    /// Entry point
    pub def: BenchmarkDef<T>,
    /// Parameter combination
    pub params: ParamSet,
}

impl<T> Clone for Job<T> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            id: self.id.clone(),
            full_id: self.full_id.clone(),
            def: self.def.clone(),
            params: self.params.clone(),
        }
    }
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("index", &self.index)
            .field("full_id", &self.full_id)
            .finish_non_exhaustive()
    }
}

impl<T> Job<T> {
    /// Effective configuration: `base` with this benchmark's overrides
    pub fn config(&self, base: &BenchmarkConfig) -> BenchmarkConfig {
        self.def.overrides.apply(base)
    }
}

/// Errors found while expanding a suite into jobs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Two jobs share an id
    #[error("duplicate job id '{id}' in suite '{suite}'")]
    DuplicateJob {
        /// Suite name
        suite: String,
        /// Offending id
        id: String,
    },

    /// A parameter has no values
    #[error("parameter '{name}' has no values")]
    EmptyParam {
        /// Parameter name
        name: String,
    },

    /// A parameter name is declared twice
    #[error("parameter '{name}' is declared more than once")]
    DuplicateParam {
        /// Parameter name
        name: String,
    },
}

/// Cartesian product of `params`, first parameter slowest.
///
/// No parameters yields a single empty set.
pub fn param_combinations(params: &[ParamDef]) -> Result<Vec<ParamSet>, DiscoveryError> {
    let mut seen = HashSet::new();
    for param in params {
        if param.values.is_empty() {
            return Err(DiscoveryError::EmptyParam {
                name: param.name.clone(),
            });
        }
        if !seen.insert(param.name.as_str()) {
            return Err(DiscoveryError::DuplicateParam {
                name: param.name.clone(),
            });
        }
    }

    let mut combos = vec![ParamSet::new()];
    for param in params {
        combos = combos
            .into_iter()
            .flat_map(|set| {
                param
                    .values
                    .iter()
                    .map(move |value| set.clone().with(param.name.clone(), value.clone()))
            })
            .collect();
    }
    Ok(combos)
}

/// Expand suite `T` into its jobs
pub fn discover<T: BenchmarkSuite>() -> Result<Vec<Job<T>>, DiscoveryError> {
    let suite = T::name();
    let combos = param_combinations(&T::params())?;
    let mut seen = HashSet::new();
    let mut jobs = Vec::new();

    for def in T::benchmarks() {
        for params in &combos {
            let id = if params.is_empty() {
                def.name.to_string()
            } else {
                format!("{}@{}", def.name, params)
            };
            if !seen.insert(id.clone()) {
                return Err(DiscoveryError::DuplicateJob {
                    suite: suite.to_string(),
                    id,
                });
            }
            jobs.push(Job {
                index: jobs.len(),
                full_id: format!("{suite}::{id}"),
                id,
                def: def.clone(),
                params: params.clone(),
            });
        }
    }

    tracing::debug!(suite, jobs = jobs.len(), "discovered jobs");
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sweep {
        n: i64,
    }

    impl BenchmarkSuite for Sweep {
        fn params() -> Vec<ParamDef> {
            vec![ParamDef::new("n", [10, 1000]), ParamDef::new("kind", ["a", "b"])]
        }

        fn create(params: &ParamSet) -> Self {
            Sweep {
                n: params.int("n").unwrap_or(0),
            }
        }

        fn benchmarks() -> Vec<BenchmarkDef<Self>> {
            vec![
                BenchmarkDef::new("sum", |s: &mut Self, b| b.iter(|| (0..s.n).sum::<i64>())).baseline(),
                BenchmarkDef::new("product", |s: &mut Self, b| b.iter(|| (1..s.n).product::<i64>()))
                    .group("math")
                    .samples(5),
            ]
        }
    }

    struct Twice;

    impl BenchmarkSuite for Twice {
        fn create(_: &ParamSet) -> Self {
            Twice
        }

        fn benchmarks() -> Vec<BenchmarkDef<Self>> {
            vec![
                BenchmarkDef::new("same", |_, b| b.iter(|| 1)),
                BenchmarkDef::new("same", |_, b| b.iter(|| 2)),
            ]
        }
    }

    #[test]
    fn test_default_suite_name() {
        assert_eq!(Sweep::name(), "Sweep");
        assert_eq!(short_type_name("a::b::Vec<a::T>"), "Vec<a::T>");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn test_discovery_order_and_ids() {
        let jobs = discover::<Sweep>().unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();

        assert_eq!(
            ids,
            vec![
                "sum@n=10,kind=a",
                "sum@n=10,kind=b",
                "sum@n=1000,kind=a",
                "sum@n=1000,kind=b",
                "product@n=10,kind=a",
                "product@n=10,kind=b",
                "product@n=1000,kind=a",
                "product@n=1000,kind=b",
            ]
        );
        assert_eq!(jobs[5].full_id, "Sweep::product@n=10,kind=b");
        assert!(jobs.iter().enumerate().all(|(i, j)| j.index == i));
    }

    #[test]
    fn test_no_params_yields_plain_ids() {
        let combos = param_combinations(&[]).unwrap();
        assert_eq!(combos, vec![ParamSet::new()]);
        assert_eq!(combos[0].to_string(), "");
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let err = discover::<Twice>().unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::DuplicateJob {
                suite: "Twice".to_string(),
                id: "same".to_string()
            }
        );
    }

    #[test]
    fn test_empty_and_duplicate_params_rejected() {
        let empty = ParamDef::new::<i64>("n", []);
        assert!(matches!(
            param_combinations(&[empty]),
            Err(DiscoveryError::EmptyParam { .. })
        ));

        let twice = [ParamDef::new("n", [1]), ParamDef::new("n", [2])];
        assert!(matches!(
            param_combinations(&twice),
            Err(DiscoveryError::DuplicateParam { .. })
        ));
    }

    #[test]
    fn test_param_set_accessors() {
        let set = ParamSet::new()
            .with("n", 64)
            .with("ratio", 0.5)
            .with("sorted", true)
            .with("kind", "ascii");

        assert_eq!(set.int("n"), Some(64));
        assert_eq!(set.float("n"), Some(64.0));
        assert_eq!(set.float("ratio"), Some(0.5));
        assert_eq!(set.bool("sorted"), Some(true));
        assert_eq!(set.str("kind"), Some("ascii"));
        assert_eq!(set.int("kind"), None);
        assert_eq!(set.to_string(), "n=64,ratio=0.5,sorted=true,kind=ascii");
    }

    #[test]
    fn test_overrides_take_precedence() {
        let jobs = discover::<Sweep>().unwrap();
        let base = BenchmarkConfig {
            samples: None,
            min_iterations: Some(3),
            ..Default::default()
        };

        let product = jobs[4].config(&base);
        assert_eq!(product.samples, Some(5));
        assert_eq!(product.min_iterations, Some(3));
        assert_eq!(product.warmup_time_ns, base.warmup_time_ns);

        let sum = jobs[0].config(&base);
        assert_eq!(sum, base);
        assert!(jobs[0].def.overrides.is_empty());
        assert!(jobs[0].def.baseline);
        assert_eq!(jobs[4].def.group, Some("math"));
    }
}
