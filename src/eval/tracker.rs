//! Result cache and dependency tracking.
//!
//! The tracker remembers every value read during evaluation, the cells
//! currently being evaluated (to detect cycles) and which formulas read
//! which cells (to invalidate dependents when a cell is cleared).

use super::value::{CellValue, SheetArea};
use crate::common::error::{XlsError, XlsResult};
use log::trace;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CellKey {
    pub sheet: usize,
    pub row: u32,
    pub col: u16,
}

impl CellKey {
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }
}

#[derive(Debug, Default)]
pub(crate) struct EvaluationTracker {
    cache: HashMap<CellKey, CellValue>,
    stack: Vec<CellKey>,
    on_stack: HashSet<CellKey>,
    dependents: HashMap<CellKey, HashSet<CellKey>>,
    area_dependents: HashMap<SheetArea, HashSet<CellKey>>,
}

impl EvaluationTracker {
    pub fn cached(&self, key: &CellKey) -> Option<&CellValue> {
        self.cache.get(key)
    }

    /// Enter the evaluation of a formula cell.
    pub fn start(&mut self, key: CellKey) -> XlsResult<()> {
        if !self.on_stack.insert(key) {
            return Err(XlsError::CircularReference {
                sheet: key.sheet,
                row: key.row,
                col: key.col,
            });
        }
        self.stack.push(key);
        Ok(())
    }

    /// Leave a formula cell and remember its result.
    pub fn finish(&mut self, key: CellKey, value: CellValue) {
        self.leave(key);
        self.cache.insert(key, value);
    }

    /// Leave a formula cell whose evaluation failed.
    pub fn abort(&mut self, key: CellKey) {
        self.leave(key);
    }

    fn leave(&mut self, key: CellKey) {
        if self.stack.last() == Some(&key) {
            self.stack.pop();
        }
        self.on_stack.remove(&key);
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Remember a plain cell value so later reads see the same value.
    pub fn cache_plain(&mut self, key: CellKey, value: CellValue) {
        self.cache.insert(key, value);
    }

    /// The formula being evaluated read `input`.
    pub fn record_dependency(&mut self, input: CellKey) {
        if let Some(&current) = self.stack.last() {
            self.dependents.entry(input).or_default().insert(current);
        }
    }

    /// The formula being evaluated read every cell of `area`.
    pub fn record_area_dependency(&mut self, area: SheetArea) {
        if let Some(&current) = self.stack.last() {
            self.area_dependents.entry(area).or_default().insert(current);
        }
    }

    pub fn clear_all(&mut self) {
        self.cache.clear();
        self.dependents.clear();
        self.area_dependents.clear();
    }

    /// Drop the cached value of `key` and of every formula that depends on
    /// it, directly or through other formulas.
    pub fn invalidate(&mut self, key: CellKey) {
        let mut pending = vec![key];
        let mut seen = HashSet::new();
        while let Some(next) = pending.pop() {
            if !seen.insert(next) {
                continue;
            }
            if self.cache.remove(&next).is_some() {
                trace!("invalidated {:?}", next);
            }
            if let Some(deps) = self.dependents.get(&next) {
                pending.extend(deps.iter().copied());
            }
            for (area, readers) in &self.area_dependents {
                if area.contains(next.sheet, next.row, next.col) {
                    pending.extend(readers.iter().copied());
                }
            }
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Distinct areas read by cached formulas.
    #[cfg(test)]
    pub fn area_count(&self) -> usize {
        self.area_dependents.len()
    }
}
