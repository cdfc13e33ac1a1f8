//! Analyzer capability: turns a project configuration into per-unit symbol
//! facts that independent workers can resolve in parallel.

pub mod java;

pub use java::JavaAnalyzer;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{IndexError, IndexResult};
use crate::project::ProjectConfig;
use crate::types::SymbolFact;

/// Facts extracted from one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisUnit {
    pub unit_id: String,
    pub declarations: Vec<SymbolFact>,
    pub references: Vec<SymbolFact>,
}

impl AnalysisUnit {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            ..Self::default()
        }
    }

    pub fn with_declaration(mut self, fact: SymbolFact) -> Self {
        self.declarations.push(fact);
        self
    }

    pub fn with_reference(mut self, fact: SymbolFact) -> Self {
        self.references.push(fact);
        self
    }

    /// Declarations first, then references.
    pub fn facts(&self) -> impl Iterator<Item = &SymbolFact> {
        self.declarations.iter().chain(self.references.iter())
    }

    pub fn fact_count(&self) -> usize {
        self.declarations.len() + self.references.len()
    }
}

type UnitJob = Box<dyn FnOnce() -> IndexResult<AnalysisUnit> + Send>;

/// A unit whose analysis has not run yet.
pub struct PendingUnit {
    unit_id: String,
    job: UnitJob,
}

impl PendingUnit {
    pub fn new<F>(unit_id: impl Into<String>, job: F) -> Self
    where
        F: FnOnce() -> IndexResult<AnalysisUnit> + Send + 'static,
    {
        Self {
            unit_id: unit_id.into(),
            job: Box::new(job),
        }
    }

    /// A unit that was analyzed up front.
    pub fn ready(unit: AnalysisUnit) -> Self {
        let unit_id = unit.unit_id.clone();
        Self::new(unit_id, move || Ok(unit))
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    /// Run the analysis of this unit on the current thread.
    pub fn resolve(self) -> IndexResult<AnalysisUnit> {
        (self.job)()
    }
}

impl fmt::Debug for PendingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingUnit")
            .field("unit_id", &self.unit_id)
            .finish_non_exhaustive()
    }
}

/// Lazy sequence of units, one per compilation file.
pub type UnitStream = Box<dyn Iterator<Item = PendingUnit> + Send>;

/// Produces the facts of a project. Units must not share mutable state.
pub trait SymbolAnalyzer: Send + Sync {
    fn analyze(&self, config: &ProjectConfig) -> IndexResult<UnitStream>;
}

/// Analyzer serving pre-extracted facts, keyed by the project's unit id.
#[derive(Debug, Default)]
pub struct StaticAnalyzer {
    units: HashMap<String, Vec<AnalysisUnit>>,
    failures: HashMap<String, String>,
    delay: Option<Duration>,
    runs: Arc<AtomicUsize>,
}

impl StaticAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `unit` as part of the project whose config unit is `project`.
    pub fn with_unit(mut self, project: impl Into<String>, unit: AnalysisUnit) -> Self {
        self.units.entry(project.into()).or_default().push(unit);
        self
    }

    /// Make the unit `unit_id` fail with `reason`.
    pub fn with_failure(mut self, unit_id: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failures.insert(unit_id.into(), reason.into());
        self
    }

    /// Sleep this long in every unit before returning its facts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `analyze` was called.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl SymbolAnalyzer for StaticAnalyzer {
    fn analyze(&self, config: &ProjectConfig) -> IndexResult<UnitStream> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let units = self.units.get(&config.unit).cloned().unwrap_or_default();
        let failures = self.failures.clone();
        let delay = self.delay;

        let stream = units.into_iter().map(move |unit| {
            let failure = failures.get(&unit.unit_id).cloned();
            PendingUnit::new(unit.unit_id.clone(), move || {
                if let Some(delay) = delay {
                    std::thread::sleep(delay);
                }
                match failure {
                    Some(reason) => Err(IndexError::Analysis {
                        unit: unit.unit_id,
                        reason,
                    }),
                    None => Ok(unit),
                }
            })
        });
        Ok(Box::new(stream))
    }
}
