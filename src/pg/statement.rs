//! Prepared statement management and caching.
//!
//! This module provides:
//! - `PreparedStatement`: a server-side prepared statement and its result layout
//! - `StatementCache`: O(1) LRU cache of prepared statements keyed by SQL text

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::protocol::{FieldDescription, Format};
use super::types::{Oid, WireType};

/// Shared column descriptions, cloned into every row cursor.
pub type SharedColumns = Arc<Vec<FieldDescription>>;

// ============================================================================
// Prepared Statement
// ============================================================================

/// A prepared statement that has been parsed by PostgreSQL.
///
/// Prepared statements are created via the Parse message and can be
/// executed multiple times with different parameters via Bind + Execute.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    /// Server-side name for this statement (e.g., "__rawpg_1")
    pub name: String,
    /// The SQL query text
    pub query: String,
    /// Parameter type OIDs (from ParameterDescription)
    pub param_types: Vec<Oid>,
    /// Result column descriptions (from RowDescription) with the format
    /// each column will be requested in.
    pub columns: SharedColumns,
}

impl PreparedStatement {
    pub fn new(name: String, query: String) -> Self {
        Self {
            name,
            query,
            param_types: Vec::new(),
            columns: Arc::new(Vec::new()),
        }
    }

    /// Set the parameter types after receiving ParameterDescription.
    pub fn set_param_types(&mut self, types: Vec<Oid>) {
        self.param_types = types;
    }

    /// Set the column descriptions after receiving RowDescription.
    ///
    /// Columns whose type has a binary codec are requested in binary format,
    /// everything else in text.
    pub fn set_columns(&mut self, mut columns: Vec<FieldDescription>) {
        for col in &mut columns {
            col.format = if WireType::from_oid(col.type_oid).is_some() {
                Format::Binary
            } else {
                Format::Text
            };
        }
        self.columns = Arc::new(columns);
    }

    /// Check if this statement returns rows.
    pub fn returns_rows(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Number of parameters the server expects.
    #[inline]
    pub fn param_count(&self) -> usize {
        self.param_types.len()
    }

    /// Result format code per column, in column order.
    pub fn result_formats(&self) -> impl Iterator<Item = Format> + '_ {
        self.columns.iter().map(|c| c.format)
    }
}

// ============================================================================
// Statement Cache (O(1) LRU)
// ============================================================================

/// O(1) LRU cache for prepared statements.
///
/// Each connection maintains its own statement cache to avoid re-parsing
/// frequently executed queries. Statements are stored as
/// `Arc<PreparedStatement>` so a cache hit only bumps a reference count.
pub struct StatementCache {
    /// The LRU cache: query text → Arc<PreparedStatement>
    cache: LruCache<String, Arc<PreparedStatement>>,
    /// Counter for generating unique statement names
    next_id: u32,
}

impl StatementCache {
    /// Create a new statement cache with the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(cap),
            next_id: 0,
        }
    }

    /// Get a cached prepared statement by query text.
    ///
    /// Does NOT update LRU order (use `get_and_touch` for that).
    pub fn get(&self, query: &str) -> Option<Arc<PreparedStatement>> {
        self.cache.peek(query).map(Arc::clone)
    }

    /// Get a statement and mark it as recently used.
    pub fn get_and_touch(&mut self, query: &str) -> Option<Arc<PreparedStatement>> {
        self.cache.get(query).map(Arc::clone)
    }

    #[inline]
    pub fn contains(&self, query: &str) -> bool {
        self.cache.contains(query)
    }

    /// Insert a prepared statement into the cache.
    ///
    /// Returns the server-side name of a statement this displaced, either
    /// the least recently used one at capacity or an older entry for the
    /// same query, so it can be closed.
    pub fn insert(&mut self, query: String, statement: Arc<PreparedStatement>) -> Option<String> {
        let name = statement.name.clone();
        self.cache
            .push(query, statement)
            .map(|(_, old)| old.name.clone())
            .filter(|old| *old != name)
    }

    /// Generate a unique statement name for this connection.
    pub fn next_statement_name(&mut self) -> String {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        format!("__rawpg_{}", id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::new(100)
    }
}
