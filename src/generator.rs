//! The fixture pipeline.
//!
//! `create` runs, strictly in order: query object lookups, identifier
//! assignment, prioritization, then for each level resolve and materialize,
//! merging hydrated records back into the caller's original positions.

use crate::adapter::StorageAdapter;
use crate::config::{ConnectionConfig, GenerateOptions, GeneratorConfig};
use crate::error::Result;
use crate::materialize::materialize_level;
use crate::prioritize::{prioritize, Level, LevelSummary};
use crate::query::resolve_query_objects;
use crate::resolve::{resolve_level, Accumulator};
use crate::spec::{Fixtures, Spec};
use crate::spec_id::{assign_spec_ids, SpecIdGenerator};
use ahash::AHashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

/// An adapter ready for use, or the configuration to build one
#[derive(Clone)]
pub enum AdapterSource {
    Adapter(Arc<dyn StorageAdapter>),
    Config(ConnectionConfig),
}

impl From<Arc<dyn StorageAdapter>> for AdapterSource {
    fn from(adapter: Arc<dyn StorageAdapter>) -> Self {
        AdapterSource::Adapter(adapter)
    }
}

impl From<ConnectionConfig> for AdapterSource {
    fn from(config: ConnectionConfig) -> Self {
        AdapterSource::Config(config)
    }
}

/// Result of a run with its schedule and warnings
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateReport {
    pub fixtures: Fixtures,
    pub levels: Vec<LevelSummary>,
    pub warnings: Vec<String>,
}

/// Creates fixtures through one storage adapter.
pub struct FixtureGenerator {
    source: AdapterSource,
    adapter: Mutex<Option<Arc<dyn StorageAdapter>>>,
    options: GenerateOptions,
    ids: SpecIdGenerator,
}

impl FixtureGenerator {
    pub fn new(source: impl Into<AdapterSource>) -> Self {
        Self {
            source: source.into(),
            adapter: Mutex::new(None),
            options: GenerateOptions::default(),
            ids: SpecIdGenerator::new(),
        }
    }

    /// Generator over an already constructed adapter
    pub fn with_adapter(adapter: impl StorageAdapter + 'static) -> Self {
        let adapter: Arc<dyn StorageAdapter> = Arc::new(adapter);
        Self::new(adapter)
    }

    /// Generator connecting lazily from configuration
    pub fn from_config(config: GeneratorConfig) -> Self {
        Self::new(config.connection).with_options(config.options)
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &GenerateOptions {
        &self.options
    }

    /// The adapter, connecting first if needed.
    pub fn adapter(&self) -> Result<Arc<dyn StorageAdapter>> {
        let mut slot = self.adapter.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(adapter) = slot.as_ref() {
            return Ok(Arc::clone(adapter));
        }

        let adapter = match &self.source {
            AdapterSource::Adapter(adapter) => Arc::clone(adapter),
            AdapterSource::Config(config) => config.connect()?,
        };
        *slot = Some(Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Create the spec's records and return them hydrated, shaped like the spec.
    pub fn create(&self, spec: &Spec) -> Result<Fixtures> {
        self.create_with_report(spec).map(|report| report.fixtures)
    }

    /// Like [`create`](Self::create), also returning the schedule and warnings.
    pub fn create_with_report(&self, spec: &Spec) -> Result<GenerateReport> {
        if spec.is_empty() {
            return Ok(GenerateReport {
                fixtures: spec
                    .tables
                    .keys()
                    .map(|table| (table.clone(), Vec::new()))
                    .collect(),
                ..GenerateReport::default()
            });
        }

        let start = Instant::now();
        let adapter = self.adapter()?;
        let mut spec = spec.clone();

        let lookups = resolve_query_objects(&mut spec, adapter.as_ref())?;
        let assigned = assign_spec_ids(&spec, &self.ids)?;
        let mut acc = Accumulator::new(&assigned);
        let levels = prioritize(assigned)?;

        info!(
            client = adapter.name(),
            tables = spec.tables.len(),
            records = spec.len(),
            lookups,
            levels = levels.len(),
            "fixture generation started"
        );

        let mut report = GenerateReport::default();
        for (number, mut level) in levels.into_iter().enumerate() {
            debug!(
                level = number,
                tables = ?level.table_names(),
                records = level.len(),
                "materializing level"
            );
            report.levels.push(level.summary());

            let unresolved = resolve_level(&mut level, &acc);
            report.warnings.extend(
                unresolved
                    .iter()
                    .map(|need| format!("unresolved reference {}", need)),
            );

            let output = materialize_level(adapter.as_ref(), level, &self.options)?;
            report.warnings.extend(output.warnings);
            for (table, records) in output.tables {
                acc.merge(&table, records);
            }
        }

        report.fixtures = acc.into_fixtures();
        info!(
            levels = report.levels.len(),
            warnings = report.warnings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fixture generation finished"
        );
        Ok(report)
    }

    /// Schedule a spec without touching the adapter.
    pub fn plan(&self, spec: &Spec) -> Result<Vec<Level>> {
        plan(spec, &self.ids)
    }

    /// Close the adapter. A config-sourced generator reconnects on next use.
    pub fn destroy(&self) -> Result<()> {
        let adapter = self
            .adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match adapter {
            Some(adapter) => {
                debug!(client = adapter.name(), "closing adapter");
                adapter.close()
            }
            None => Ok(()),
        }
    }
}

/// Assign identifiers and compute the dependency levels of a spec.
///
/// Query objects are left in place; they never add dependencies.
pub fn plan(spec: &Spec, ids: &SpecIdGenerator) -> Result<Vec<Level>> {
    prioritize(assign_spec_ids(spec, ids)?)
}

/// Name of the generator used when callers do not pick one
pub const DEFAULT_GENERATOR: &str = "default";

/// Named generators shared across a test suite.
#[derive(Default)]
pub struct GeneratorRegistry {
    generators: Mutex<AHashMap<String, Arc<FixtureGenerator>>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing generator under `name`, or a new one from `make`
    pub fn get_or_create<F>(&self, name: &str, make: F) -> Arc<FixtureGenerator>
    where
        F: FnOnce() -> FixtureGenerator,
    {
        let mut generators = self.generators.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            generators
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(make())),
        )
    }

    /// Generator registered under [`DEFAULT_GENERATOR`], created by `make` on first use
    pub fn get_or_create_default<F>(&self, make: F) -> Arc<FixtureGenerator>
    where
        F: FnOnce() -> FixtureGenerator,
    {
        self.get_or_create(DEFAULT_GENERATOR, make)
    }

    pub fn get(&self, name: &str) -> Option<Arc<FixtureGenerator>> {
        self.generators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<FixtureGenerator>> {
        self.generators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Destroy and forget every generator, returning the first failure.
    pub fn destroy_all(&self) -> Result<()> {
        let generators: Vec<_> = self
            .generators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, generator)| generator)
            .collect();

        let mut first_error = None;
        for generator in generators {
            if let Err(e) = generator.destroy() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
