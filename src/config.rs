//! Configuration types for reading workbooks and evaluating formulas.
//!
//! Both option structs follow the same pattern: `Default` gives the behavior
//! most callers want, and `with_*` builders adjust single knobs.

use serde::{Deserialize, Serialize};

/// Options controlling how a BIFF8 workbook stream is decoded.
///
/// # Examples
///
/// ```rust
/// use litchi_xls::ReadOptions;
///
/// // Create with defaults
/// let options = ReadOptions::default();
/// assert!(options.keep_unparsed_formulas);
///
/// // Or customize
/// let strict = ReadOptions::new()
///     .with_keep_unparsed_formulas(false)
///     .with_synthesize_missing_rows(false);
/// assert!(!strict.keep_unparsed_formulas);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Keep formula token streams that cannot be decoded as opaque bytes
    /// instead of failing the load. Such formulas evaluate to `#VALUE!`.
    pub keep_unparsed_formulas: bool,
    /// Create a default ROW record for every row that holds cells but has
    /// no ROW record of its own.
    pub synthesize_missing_rows: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            keep_unparsed_formulas: true,
            synthesize_missing_rows: true,
        }
    }
}

impl ReadOptions {
    /// Create a new `ReadOptions` with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether undecodable formulas are kept instead of rejected.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use litchi_xls::ReadOptions;
    ///
    /// let options = ReadOptions::new().with_keep_unparsed_formulas(false);
    /// assert!(!options.keep_unparsed_formulas);
    /// ```
    #[inline]
    pub fn with_keep_unparsed_formulas(mut self, keep: bool) -> Self {
        self.keep_unparsed_formulas = keep;
        self
    }

    /// Set whether missing ROW records are synthesized.
    #[inline]
    pub fn with_synthesize_missing_rows(mut self, synthesize: bool) -> Self {
        self.synthesize_missing_rows = synthesize;
        self
    }
}

/// Options controlling a [`crate::eval::FormulaEvaluator`].
///
/// # Examples
///
/// ```rust
/// use litchi_xls::EvaluationOptions;
///
/// let options = EvaluationOptions::new().with_max_depth(64).with_cache_results(false);
/// assert_eq!(options.max_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOptions {
    /// Maximum length of a chain of uncached formula cells evaluated
    /// within one request. Chains are walked on the heap, so raising the
    /// limit costs memory, not call stack.
    pub max_depth: usize,
    /// Keep formula results between requests until explicitly cleared.
    pub cache_results: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            max_depth: 1024,
            cache_results: true,
        }
    }
}

impl EvaluationOptions {
    /// Create a new `EvaluationOptions` with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum formula nesting depth.
    #[inline]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set whether results are cached between requests.
    ///
    /// With caching disabled every `evaluate` call recomputes the whole
    /// dependency chain and therefore always observes the current cell values.
    #[inline]
    pub fn with_cache_results(mut self, cache: bool) -> Self {
        self.cache_results = cache;
        self
    }
}
