//! Snippet compilation and the content-addressed unit cache.
//!
//! A snippet is normalized, its free identifiers are bound against the data
//! region's headers, and the result is compiled once per fingerprint. Units are
//! shared through [`UnitCache`]; a cache hit never recompiles.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rhai::{AST, Array, Dynamic, Engine, Map, Scope};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::bind::{
    Binding, BindingContext, BindingTarget, free_identifiers, normalize_snippet, resolve_bindings,
};
use super::cell_ref::RangeOrigin;
use super::eval::{EngineLimits, create_snippet_engine};
use super::marshal::normalize_result_with_headers;
use super::value::Value;
use crate::error::{CompileError, RuntimeError};

/// SHA-256 of a normalized snippet plus its binding context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(normalized: &str, context: &BindingContext) -> Fingerprint {
        let mut hasher = Sha256::new();
        update_str(&mut hasher, normalized);
        hasher.update((context.headers.len() as u64).to_le_bytes());
        for header in &context.headers {
            update_str(&mut hasher, header);
        }
        match &context.origin {
            None => hasher.update([0u8]),
            Some(origin) => {
                hasher.update([1u8]);
                update_str(&mut hasher, &origin.sheet);
                hasher.update((origin.row as u64).to_le_bytes());
                hasher.update((origin.col as u64).to_le_bytes());
            }
        }
        Fingerprint(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 8 bytes as hex, for logs.
    pub fn short(&self) -> String {
        self.0[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

// Length prefix so ("ab", "c") and ("a", "bc") never collide.
fn update_str(hasher: &mut Sha256, text: &str) {
    hasher.update((text.len() as u64).to_le_bytes());
    hasher.update(text.as_bytes());
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A compiled snippet, ready to be invoked against a data region.
#[derive(Debug)]
pub struct CompiledUnit {
    pub fingerprint: Fingerprint,
    /// Normalized snippet source: what the wrapper formula stores.
    pub source: String,
    pub bindings: Vec<Binding>,
    pub compiled_at: DateTime<Utc>,
    ast: AST,
}

impl CompiledUnit {
    pub fn ast(&self) -> &AST {
        &self.ast
    }

    /// Evaluate the unit with each binding pushed into a fresh scope.
    pub fn invoke(&self, engine: &Engine, data: &TableData) -> Result<Dynamic, RuntimeError> {
        let mut scope = Scope::new();
        for binding in &self.bindings {
            scope.push_dynamic(binding.name.clone(), data.bind(&binding.target)?);
        }
        Ok(engine.eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)?)
    }
}

/// Cell values of a data region: a header row and the rows below it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub origin: Option<RangeOrigin>,
}

impl TableData {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Value>>, origin: Option<RangeOrigin>) -> Self {
        TableData {
            headers,
            rows,
            origin,
        }
    }

    /// Split a block of cells whose first row holds the headers.
    pub fn from_block(mut block: Vec<Vec<Value>>, origin: Option<RangeOrigin>) -> Self {
        if block.is_empty() {
            return TableData::new(Vec::new(), Vec::new(), origin);
        }
        let headers = block
            .remove(0)
            .iter()
            .map(|v| v.to_string().trim().to_string())
            .collect();
        TableData::new(headers, block, origin)
    }

    pub fn context(&self) -> BindingContext {
        BindingContext::new(self.headers.clone(), self.origin.clone())
    }

    /// Values of one column below the header row. Short rows read as empty.
    pub fn column(&self, index: usize) -> Array {
        self.rows
            .iter()
            .map(|row| row.get(index).map_or(Dynamic::UNIT, Value::to_dynamic))
            .collect()
    }

    /// Every row as an object map keyed by header.
    pub fn row_maps(&self) -> Array {
        self.rows
            .iter()
            .map(|row| {
                let mut map = Map::new();
                for (i, header) in self.headers.iter().enumerate() {
                    let value = row.get(i).map_or(Dynamic::UNIT, Value::to_dynamic);
                    map.insert(header.as_str().into(), value);
                }
                Dynamic::from_map(map)
            })
            .collect()
    }

    fn bind(&self, target: &BindingTarget) -> Result<Dynamic, RuntimeError> {
        let origin = || {
            self.origin
                .as_ref()
                .ok_or_else(|| RuntimeError::Invocation("data region has no origin".into()))
        };
        Ok(match target {
            BindingTarget::Column(index) if *index < self.headers.len() => {
                Dynamic::from_array(self.column(*index))
            }
            BindingTarget::Column(index) => {
                return Err(RuntimeError::Invocation(format!(
                    "column {index} is outside the data region"
                )));
            }
            BindingTarget::OriginRow => Dynamic::from(origin()?.row as i64),
            BindingTarget::OriginCol => Dynamic::from(origin()?.col as i64),
            BindingTarget::SheetName => Dynamic::from(origin()?.sheet.clone()),
            BindingTarget::Rows => Dynamic::from_array(self.row_maps()),
            BindingTarget::Headers => Dynamic::from_array(
                self.headers.iter().cloned().map(Dynamic::from).collect(),
            ),
        })
    }
}

struct CacheEntry {
    unit: Arc<CompiledUnit>,
    last_used: AtomicU64,
}

/// Snapshot of cache activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub compilations: usize,
    pub hits: usize,
    pub len: usize,
}

/// Compiled units keyed by fingerprint.
///
/// A compilation runs while holding the entry's shard lock, so concurrent
/// requests for one fingerprint collapse onto a single compilation. No lock is
/// held while a unit is invoked.
pub struct UnitCache {
    entries: DashMap<Fingerprint, CacheEntry>,
    capacity: Option<usize>,
    clock: AtomicU64,
    compilations: AtomicUsize,
    hits: AtomicUsize,
}

impl Default for UnitCache {
    fn default() -> Self {
        UnitCache::new(None)
    }
}

impl UnitCache {
    /// `capacity` of `None` grows without bound; `Some(n)` evicts the least
    /// recently used unit beyond `n`.
    pub fn new(capacity: Option<usize>) -> Self {
        UnitCache {
            entries: DashMap::new(),
            capacity,
            clock: AtomicU64::new(0),
            compilations: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<CompiledUnit>> {
        let entry = self.entries.get(fingerprint)?;
        entry.last_used.store(self.tick(), Ordering::Relaxed);
        Some(entry.unit.clone())
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Return the cached unit, or run `compile` and cache its result.
    /// Failed compilations are not cached.
    pub fn get_or_compile<F>(
        &self,
        fingerprint: Fingerprint,
        compile: F,
    ) -> Result<Arc<CompiledUnit>, CompileError>
    where
        F: FnOnce() -> Result<CompiledUnit, CompileError>,
    {
        let tick = self.tick();
        let unit = match self.entries.entry(fingerprint) {
            Entry::Occupied(entry) => {
                entry.get().last_used.store(tick, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %fingerprint.short(), "unit cache hit");
                return Ok(entry.get().unit.clone());
            }
            Entry::Vacant(entry) => {
                let unit = Arc::new(compile()?);
                self.compilations.fetch_add(1, Ordering::Relaxed);
                entry.insert(CacheEntry {
                    unit: unit.clone(),
                    last_used: AtomicU64::new(tick),
                });
                unit
            }
        };
        self.evict_over_capacity(&fingerprint);
        Ok(unit)
    }

    fn evict_over_capacity(&self, keep: &Fingerprint) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while self.entries.len() > capacity {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().last_used.load(Ordering::Relaxed))
                .map(|entry| *entry.key());
            let Some(oldest) = oldest else {
                break;
            };
            self.entries.remove(&oldest);
            debug!(fingerprint = %oldest.short(), "evicted unit");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            compilations: self.compilations.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            len: self.entries.len(),
        }
    }
}

/// Compiles snippets through a shared [`UnitCache`] and invokes the results.
pub struct DynamicCompiler {
    engine: Engine,
    cache: Arc<UnitCache>,
}

impl DynamicCompiler {
    pub fn new(cache: Arc<UnitCache>, limits: EngineLimits) -> Self {
        DynamicCompiler::with_engine(create_snippet_engine(limits), cache)
    }

    pub fn with_engine(engine: Engine, cache: Arc<UnitCache>) -> Self {
        DynamicCompiler { engine, cache }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<UnitCache> {
        &self.cache
    }

    /// Fingerprint a snippet would be cached under, without compiling it.
    pub fn fingerprint(&self, snippet: &str, context: &BindingContext) -> Fingerprint {
        Fingerprint::of(&normalize_snippet(snippet), context)
    }

    pub fn compile(
        &self,
        snippet: &str,
        context: &BindingContext,
    ) -> Result<Arc<CompiledUnit>, CompileError> {
        let normalized = normalize_snippet(snippet);
        let fingerprint = Fingerprint::of(&normalized, context);

        self.cache.get_or_compile(fingerprint, || {
            let identifiers = free_identifiers(&normalized);
            let bindings = resolve_bindings(&identifiers, context)?;

            // Values are pushed at invocation time; compile only needs the names
            // so strict-variables mode can vet the rest.
            let mut scope = Scope::new();
            for binding in &bindings {
                scope.push_dynamic(binding.name.clone(), Dynamic::UNIT);
            }
            let ast = self.engine.compile_with_scope(&scope, &normalized)?;

            info!(
                fingerprint = %fingerprint.short(),
                bindings = bindings.len(),
                "compiled snippet"
            );
            Ok(CompiledUnit {
                fingerprint,
                source: normalized.clone(),
                bindings,
                compiled_at: Utc::now(),
                ast,
            })
        })
    }

    /// Invoke a unit and marshal its output into a host value.
    pub fn invoke(&self, unit: &CompiledUnit, data: &TableData) -> Result<Value, RuntimeError> {
        let raw = unit.invoke(&self.engine, data)?;
        Ok(normalize_result_with_headers(raw, &data.headers))
    }

    /// Compile against the data's own context, then invoke.
    pub fn run(&self, snippet: &str, data: &TableData) -> Result<Value, RuntimeError> {
        let unit = self.compile(snippet, &data.context())?;
        self.invoke(&unit, data)
    }
}
