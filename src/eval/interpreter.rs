//! Token-stack execution of a single formula.

use super::coerce::{single_value, to_bool, to_number};
use super::functions;
use super::operators::{BinaryOp, UnaryOp, eval_binary, eval_unary};
use super::tracker::{CellKey, EvaluationTracker};
use super::value::{ArrayValue, CellValue, SheetArea, Value, error_from_code};
use super::{EvalContext, EvaluationCell, EvaluationWorkbook};
use crate::common::error::{XlsError, XlsResult};
use crate::config::EvaluationOptions;
use crate::formula::functions::{FUNCTION_INDEX_EXTERNAL, FUNCTION_INDEX_IF, FUNCTION_INDEX_SUM};
use crate::formula::{AreaReference, AttrPtg, CellReference, ErrorCode, Ptg, function_by_index};
use log::{trace, warn};
use std::collections::HashSet;

pub(crate) struct Interpreter<'a> {
    book: &'a dyn EvaluationWorkbook,
    tracker: &'a mut EvaluationTracker,
    options: &'a EvaluationOptions,
    /// Formula cell whose tokens are running.
    current: CellKey,
    name_depth: usize,
}

/// A formula cell on the input walk and how far its inputs were visited.
struct Pending {
    key: CellKey,
    tokens: Option<Vec<Ptg>>,
    inputs: Vec<CellKey>,
    next: usize,
}

/// How a run of tokens ended early.
enum Abort {
    /// Broken token stream: the formula evaluates to `#VALUE!`.
    Malformed(&'static str),
}

impl<'a> Interpreter<'a> {
    pub fn new(
        book: &'a dyn EvaluationWorkbook,
        tracker: &'a mut EvaluationTracker,
        options: &'a EvaluationOptions,
        current: CellKey,
    ) -> Self {
        Self {
            book,
            tracker,
            options,
            current,
            name_depth: 0,
        }
    }

    /// Value of a cell, computing formulas through the cache.
    pub fn evaluate_cell(&mut self, sheet: usize, row: u32, col: u16) -> XlsResult<CellValue> {
        let key = CellKey::new(sheet, row, col);
        self.tracker.record_dependency(key);
        if let Some(value) = self.tracker.cached(&key) {
            return Ok(value.clone());
        }
        let value = match self.book.cell(sheet, row, col) {
            Some(EvaluationCell::Formula(tokens)) => {
                if self.tracker.depth() == 0 {
                    if let Some(tokens) = &tokens {
                        self.evaluate_inputs_first(key, tokens)?;
                    }
                }
                return self.evaluate_formula(key, tokens);
            },
            Some(EvaluationCell::Number(n)) => CellValue::Number(n),
            Some(EvaluationCell::Text(s)) => CellValue::Text(s),
            Some(EvaluationCell::Bool(b)) => CellValue::Bool(b),
            Some(EvaluationCell::Error(code)) => CellValue::Error(error_from_code(code)),
            Some(EvaluationCell::Blank) | None => CellValue::Blank,
        };
        self.tracker.cache_plain(key, value.clone());
        Ok(value)
    }

    fn evaluate_formula(&mut self, key: CellKey, tokens: Option<Vec<Ptg>>) -> XlsResult<CellValue> {
        if self.tracker.depth() >= self.options.max_depth {
            return Err(XlsError::EvaluationDepthExceeded {
                limit: self.options.max_depth,
            });
        }
        self.tracker.start(key)?;
        trace!("evaluating {}!R{}C{}", key.sheet, key.row, key.col);
        let caller = std::mem::replace(&mut self.current, key);
        let result = match tokens {
            Some(tokens) => self.run(&tokens).and_then(|v| self.finish_value(v)),
            None => Ok(CellValue::Error(ErrorCode::Value)),
        };
        self.current = caller;
        match result {
            Ok(value) => {
                self.tracker.finish(key, value.clone());
                Ok(value)
            },
            Err(e) => {
                self.tracker.abort(key);
                Err(e)
            },
        }
    }

    /// Evaluate the uncached formula cells that `root` reads, directly or
    /// through other formulas, deepest first. The walk keeps its own stack,
    /// so by the time `root` runs every input it references is cached and
    /// the recursive evaluation stays shallow however long the chain is.
    ///
    /// References are followed whether or not a lazy IF or CHOOSE would
    /// take them: a reference back to a formula on the walk is a cycle and
    /// a walk longer than `max_depth` formulas exceeds the limit.
    fn evaluate_inputs_first(&mut self, root: CellKey, tokens: &[Ptg]) -> XlsResult<()> {
        let book = self.book;
        let mut path = vec![Pending {
            key: root,
            tokens: None,
            inputs: self.formula_inputs(root, tokens),
            next: 0,
        }];
        let mut on_path = HashSet::from([root]);
        let mut done = HashSet::new();

        while let Some(top) = path.last_mut() {
            if let Some(&input) = top.inputs.get(top.next) {
                top.next += 1;
                if done.contains(&input) || self.tracker.cached(&input).is_some() {
                    continue;
                }
                if on_path.contains(&input) {
                    return Err(XlsError::CircularReference {
                        sheet: input.sheet,
                        row: input.row,
                        col: input.col,
                    });
                }
                let Some(EvaluationCell::Formula(Some(tokens))) = book.cell(input.sheet, input.row, input.col)
                else {
                    done.insert(input);
                    continue;
                };
                if path.len() >= self.options.max_depth {
                    return Err(XlsError::EvaluationDepthExceeded {
                        limit: self.options.max_depth,
                    });
                }
                let inputs = self.formula_inputs(input, &tokens);
                on_path.insert(input);
                path.push(Pending {
                    key: input,
                    tokens: Some(tokens),
                    inputs,
                    next: 0,
                });
                continue;
            }

            let Some(finished) = path.pop() else {
                break;
            };
            on_path.remove(&finished.key);
            done.insert(finished.key);
            if finished.tokens.is_some() {
                self.evaluate_formula(finished.key, finished.tokens)?;
            }
        }
        if done.len() > 1 {
            trace!("evaluated {} inputs of {}!R{}C{} first", done.len() - 1, root.sheet, root.row, root.col);
        }
        Ok(())
    }

    /// Cells a formula at `at` references, including those of the defined
    /// names it uses. Areas contribute their existing cells.
    fn formula_inputs(&self, at: CellKey, tokens: &[Ptg]) -> Vec<CellKey> {
        let mut inputs = Vec::new();
        let mut names = HashSet::new();
        let mut lists = vec![tokens.to_vec()];
        while let Some(tokens) = lists.pop() {
            for token in &tokens {
                let (sheet, area) = match token {
                    Ptg::Ref { cell, .. } => (Some(at.sheet), AreaReference::new(*cell, *cell)),
                    Ptg::RefN { cell, .. } => {
                        let (row, col) = position_u16(at);
                        let cell = cell.resolve_relative_to(row, col);
                        (Some(at.sheet), AreaReference::new(cell, cell))
                    },
                    Ptg::Area { area, .. } => (Some(at.sheet), *area),
                    Ptg::AreaN { area, .. } => {
                        let (row, col) = position_u16(at);
                        (Some(at.sheet), area.resolve_relative_to(row, col))
                    },
                    Ptg::Ref3d { extern_sheet, cell, .. } => (
                        self.book.sheet_index_from_extern_sheet(*extern_sheet),
                        AreaReference::new(*cell, *cell),
                    ),
                    Ptg::Area3d { extern_sheet, area, .. } => {
                        (self.book.sheet_index_from_extern_sheet(*extern_sheet), *area)
                    },
                    Ptg::Name { index, .. } => {
                        if names.insert(*index) {
                            lists.extend(self.book.name_tokens(*index));
                        }
                        continue;
                    },
                    _ => continue,
                };
                let Some(sheet) = sheet else {
                    continue;
                };
                let rows = u32::from(area.first.row())..=u32::from(area.last.row());
                let cols = area.first.col()..=area.last.col();
                inputs.extend(
                    self.book
                        .cells_in_area(sheet, rows, cols)
                        .into_iter()
                        .map(|(row, col)| CellKey::new(sheet, row, col)),
                );
            }
        }
        inputs
    }

    /// Final value of a formula: references are dereferenced and a blank
    /// result reads as 0.
    fn finish_value(&mut self, value: Value) -> XlsResult<CellValue> {
        Ok(match single_value(value, self)? {
            Value::Blank | Value::Missing => CellValue::Number(0.0),
            other => other.into_cell_value(),
        })
    }

    /// Execute tokens and return what is left on the stack, references
    /// included.
    fn run(&mut self, tokens: &[Ptg]) -> XlsResult<Value> {
        let mut stack = Vec::new();
        match self.run_tokens(tokens, &mut stack)? {
            Ok(()) => {},
            Err(Abort::Malformed(reason)) => {
                warn!(
                    "malformed formula at {}!R{}C{}: {}",
                    self.current.sheet, self.current.row, self.current.col, reason
                );
                return Ok(Value::Error(ErrorCode::Value));
            },
        }
        if stack.len() > 1 {
            warn!("{} values left on the evaluation stack", stack.len());
        }
        Ok(stack.pop().unwrap_or(Value::Error(ErrorCode::Value)))
    }

    fn run_tokens(&mut self, tokens: &[Ptg], stack: &mut Vec<Value>) -> XlsResult<Result<(), Abort>> {
        macro_rules! pop {
            () => {
                match stack.pop() {
                    Some(v) => v,
                    None => return Ok(Err(Abort::Malformed("operand stack underflow"))),
                }
            };
        }

        let mut i = 0;
        while i < tokens.len() {
            let value = match &tokens[i] {
                Ptg::Attr(attr) => {
                    match self.attr(attr, tokens, i, stack)? {
                        Ok(next) => i = next,
                        Err(abort) => return Ok(Err(abort)),
                    }
                    continue;
                },
                Ptg::Add => self.binary(BinaryOp::Add, pop!(), pop!())?,
                Ptg::Sub => self.binary(BinaryOp::Sub, pop!(), pop!())?,
                Ptg::Mul => self.binary(BinaryOp::Mul, pop!(), pop!())?,
                Ptg::Div => self.binary(BinaryOp::Div, pop!(), pop!())?,
                Ptg::Power => self.binary(BinaryOp::Power, pop!(), pop!())?,
                Ptg::Concat => self.binary(BinaryOp::Concat, pop!(), pop!())?,
                Ptg::Lt => self.binary(BinaryOp::Lt, pop!(), pop!())?,
                Ptg::Le => self.binary(BinaryOp::Le, pop!(), pop!())?,
                Ptg::Eq => self.binary(BinaryOp::Eq, pop!(), pop!())?,
                Ptg::Ge => self.binary(BinaryOp::Ge, pop!(), pop!())?,
                Ptg::Gt => self.binary(BinaryOp::Gt, pop!(), pop!())?,
                Ptg::Ne => self.binary(BinaryOp::Ne, pop!(), pop!())?,
                Ptg::UnaryPlus => self.unary(UnaryOp::Plus, pop!())?,
                Ptg::UnaryMinus => self.unary(UnaryOp::Minus, pop!())?,
                Ptg::Percent => self.unary(UnaryOp::Percent, pop!())?,
                Ptg::Intersect => {
                    let right = pop!();
                    let left = pop!();
                    intersect(&left, &right)
                },
                Ptg::Range => {
                    let right = pop!();
                    let left = pop!();
                    bounding_area(&left, &right)
                },
                Ptg::Union => {
                    let _ = pop!();
                    let _ = pop!();
                    Value::Error(ErrorCode::Value)
                },
                Ptg::Paren
                | Ptg::MemArea { .. }
                | Ptg::MemErr { .. }
                | Ptg::MemNoMem { .. }
                | Ptg::MemFunc { .. } => {
                    i += 1;
                    continue;
                },
                Ptg::MissingArg => Value::Missing,
                Ptg::Str(s) => Value::Text(s.text().to_string()),
                Ptg::Err(code) => Value::Error(error_from_code(*code)),
                Ptg::Bool(b) => Value::Bool(*b),
                Ptg::Int(n) => Value::Number(f64::from(*n)),
                Ptg::Num(n) => Value::Number(*n),
                Ptg::Array { value, .. } => Value::Array(ArrayValue::from_constant(value)),
                Ptg::Func { index, .. } => {
                    let Some(meta) = function_by_index(*index) else {
                        return Ok(Err(Abort::Malformed("unknown fixed-argument function")));
                    };
                    let count = usize::from(meta.min_args);
                    if stack.len() < count {
                        return Ok(Err(Abort::Malformed("operand stack underflow")));
                    }
                    let args = stack.split_off(stack.len() - count);
                    functions::invoke(*index, &args, self)?
                },
                Ptg::FuncVar { arg_count, index, .. } => {
                    let count = usize::from(arg_count & 0x7F);
                    if stack.len() < count {
                        return Ok(Err(Abort::Malformed("operand stack underflow")));
                    }
                    let args = stack.split_off(stack.len() - count);
                    let index = index & 0x7FFF;
                    if index == FUNCTION_INDEX_EXTERNAL {
                        Value::Error(ErrorCode::Name)
                    } else {
                        functions::invoke(index, &args, self)?
                    }
                },
                Ptg::Name { index, .. } => self.defined_name(*index)?,
                Ptg::NameX {
                    extern_sheet,
                    name_index,
                    ..
                } => {
                    trace!(
                        "external name {:?} is not evaluated",
                        self.book.name_x_text(*extern_sheet, *name_index)
                    );
                    Value::Error(ErrorCode::Name)
                },
                Ptg::Ref { cell, .. } => self.reference(self.current.sheet, cell),
                Ptg::Area { area, .. } => self.area(self.current.sheet, area),
                Ptg::RefN { cell, .. } => {
                    let (row, col) = self.current_position_u16();
                    self.reference(self.current.sheet, &cell.resolve_relative_to(row, col))
                },
                Ptg::AreaN { area, .. } => {
                    let (row, col) = self.current_position_u16();
                    self.area(self.current.sheet, &area.resolve_relative_to(row, col))
                },
                Ptg::Ref3d { extern_sheet, cell, .. } => {
                    match self.book.sheet_index_from_extern_sheet(*extern_sheet) {
                        Some(sheet) => self.reference(sheet, cell),
                        None => Value::Error(ErrorCode::Ref),
                    }
                },
                Ptg::Area3d { extern_sheet, area, .. } => {
                    match self.book.sheet_index_from_extern_sheet(*extern_sheet) {
                        Some(sheet) => self.area(sheet, area),
                        None => Value::Error(ErrorCode::Ref),
                    }
                },
                Ptg::RefErr { .. } | Ptg::AreaErr { .. } | Ptg::RefErr3d { .. } | Ptg::AreaErr3d { .. } => {
                    Value::Error(ErrorCode::Ref)
                },
                Ptg::Exp { .. } | Ptg::Tbl { .. } => {
                    return Ok(Err(Abort::Malformed("unresolved shared formula or table pointer")));
                },
            };
            stack.push(value);
            i += 1;
        }
        Ok(Ok(()))
    }

    /// Execute a tAttr token at `tokens[i]` and return the index of the next
    /// token to run.
    fn attr(
        &mut self,
        attr: &AttrPtg,
        tokens: &[Ptg],
        i: usize,
        stack: &mut Vec<Value>,
    ) -> XlsResult<Result<usize, Abort>> {
        let skip = |bytes: usize| -> Result<usize, Abort> {
            tokens_spanning(tokens, i, bytes)
                .map(|count| i + count)
                .ok_or(Abort::Malformed("bad skip distance"))
        };

        if attr.is_if() {
            let Some(condition) = stack.pop() else {
                return Ok(Err(Abort::Malformed("operand stack underflow")));
            };
            let condition = single_value(condition, self)?;
            let condition = match to_bool(&condition) {
                Ok(b) => b,
                Err(code) => {
                    // Skip both branches and the IF itself.
                    stack.push(Value::Error(code));
                    let skip_attr = match skip(usize::from(attr.data)) {
                        Ok(at) => at,
                        Err(abort) => return Ok(Err(abort)),
                    };
                    let Some(Ptg::Attr(after_true)) = tokens.get(skip_attr) else {
                        return Ok(Err(Abort::Malformed("IF without tAttrSkip")));
                    };
                    let end = tokens_spanning(tokens, skip_attr, usize::from(after_true.data) + 1);
                    return Ok(end.map(|count| skip_attr + count + 1).ok_or(Abort::Malformed("bad skip distance")));
                },
            };
            if condition {
                return Ok(Ok(i + 1));
            }
            let last_skipped = match skip(usize::from(attr.data)) {
                Ok(at) => at,
                Err(abort) => return Ok(Err(abort)),
            };
            // IF(c, t) has no false branch: the IF token follows directly.
            if let Some(Ptg::FuncVar { index, .. }) = tokens.get(last_skipped + 1) {
                if index & 0x7FFF == FUNCTION_INDEX_IF {
                    stack.push(Value::Bool(false));
                    return Ok(Ok(last_skipped + 2));
                }
            }
            return Ok(Ok(last_skipped + 1));
        }

        if attr.is_skip() {
            if let Some(top @ Value::Missing) = stack.last_mut() {
                *top = Value::Blank;
            }
            return Ok(skip(usize::from(attr.data) + 1).map(|last| last + 1));
        }

        if attr.is_optimized_choose() {
            let Some(selector) = stack.pop() else {
                return Ok(Err(Abort::Malformed("operand stack underflow")));
            };
            let choices = attr.jump_table.len();
            let selector = single_value(selector, self)?;
            let distance = match to_number(&selector) {
                Ok(n) if n.trunc() >= 1.0 && n.trunc() <= choices as f64 => {
                    usize::from(attr.jump_table[n.trunc() as usize - 1])
                },
                Ok(_) => {
                    stack.push(Value::Error(ErrorCode::Value));
                    usize::from(attr.choose_func_offset) + 4
                },
                Err(code) => {
                    stack.push(Value::Error(code));
                    usize::from(attr.choose_func_offset) + 4
                },
            };
            // Jump distances count from the start of the jump table.
            let Some(distance) = distance.checked_sub(choices * 2 + 2) else {
                return Ok(Err(Abort::Malformed("bad CHOOSE jump")));
            };
            return Ok(skip(distance).map(|last| last + 1));
        }

        if attr.is_sum() {
            let Some(arg) = stack.pop() else {
                return Ok(Err(Abort::Malformed("operand stack underflow")));
            };
            let value = functions::invoke(FUNCTION_INDEX_SUM, &[arg], self)?;
            stack.push(value);
        }
        // Space and volatile markers do nothing.
        Ok(Ok(i + 1))
    }

    fn binary(&mut self, op: BinaryOp, right: Value, left: Value) -> XlsResult<Value> {
        let left = single_value(left, self)?;
        let right = single_value(right, self)?;
        Ok(eval_binary(op, &left, &right))
    }

    fn unary(&mut self, op: UnaryOp, operand: Value) -> XlsResult<Value> {
        let operand = single_value(operand, self)?;
        Ok(eval_unary(op, &operand))
    }

    fn defined_name(&mut self, index: u16) -> XlsResult<Value> {
        let Some(tokens) = self.book.name_tokens(index) else {
            return Ok(Value::Error(ErrorCode::Name));
        };
        if self.name_depth >= self.options.max_depth {
            return Err(XlsError::EvaluationDepthExceeded {
                limit: self.options.max_depth,
            });
        }
        self.name_depth += 1;
        let value = self.run(&tokens);
        self.name_depth -= 1;
        value
    }

    fn reference(&self, sheet: usize, cell: &CellReference) -> Value {
        Value::Ref {
            sheet,
            row: u32::from(cell.row()),
            col: cell.col(),
        }
    }

    fn area(&self, sheet: usize, area: &AreaReference) -> Value {
        Value::Area(SheetArea::new(
            sheet,
            u32::from(area.first.row()),
            area.first.col(),
            u32::from(area.last.row()),
            area.last.col(),
        ))
    }

    /// Position of the running formula for RefN/AreaN resolution. BIFF8
    /// rows fit in 16 bits.
    fn current_position_u16(&self) -> (u16, u16) {
        position_u16(self.current)
    }
}

fn position_u16(key: CellKey) -> (u16, u16) {
    (u16::try_from(key.row).unwrap_or(u16::MAX), key.col)
}

impl EvalContext for Interpreter<'_> {
    fn cell_value(&mut self, sheet: usize, row: u32, col: u16) -> XlsResult<Value> {
        Ok(self.evaluate_cell(sheet, row, col)?.into())
    }

    fn existing_cells(&mut self, area: &SheetArea) -> Vec<(u32, u16)> {
        self.tracker.record_area_dependency(*area);
        self.book.cells_in_area(
            area.sheet,
            area.first_row..=area.last_row,
            area.first_col..=area.last_col,
        )
    }

    fn position(&self) -> (u32, u16) {
        (self.current.row, self.current.col)
    }
}

/// Number of tokens after `tokens[start]` that together take exactly
/// `bytes` encoded bytes.
fn tokens_spanning(tokens: &[Ptg], start: usize, bytes: usize) -> Option<usize> {
    let mut remaining = bytes;
    let mut index = start;
    while remaining > 0 {
        index += 1;
        remaining = remaining.checked_sub(tokens.get(index)?.size())?;
    }
    Some(index - start)
}

fn intersect(left: &Value, right: &Value) -> Value {
    match (left.as_area(), right.as_area()) {
        (Some(a), Some(b)) => match a.intersect(&b) {
            Some(area) => Value::Area(area),
            None => Value::Error(ErrorCode::Null),
        },
        _ => Value::Error(ErrorCode::Value),
    }
}

/// `A1:B2` between two references: the smallest area covering both.
fn bounding_area(left: &Value, right: &Value) -> Value {
    match (left.as_area(), right.as_area()) {
        (Some(a), Some(b)) if a.sheet == b.sheet => Value::Area(SheetArea::new(
            a.sheet,
            a.first_row.min(b.first_row),
            a.first_col.min(b.first_col),
            a.last_row.max(b.last_row),
            a.last_col.max(b.last_col),
        )),
        _ => Value::Error(ErrorCode::Value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{FormulaContext, parse_formula};
    use std::collections::BTreeMap;
    use std::ops::RangeInclusive;

    /// One sheet of cells, formulas given as text.
    #[derive(Default)]
    struct TestBook {
        cells: BTreeMap<(u32, u16), EvaluationCell>,
        names: Vec<(String, Vec<Ptg>)>,
    }

    impl FormulaContext for TestBook {
        fn extern_sheet_index(&mut self, _sheet_name: &str) -> Option<u16> {
            None
        }

        fn extern_sheet_name(&self, _extern_sheet: u16) -> Option<String> {
            None
        }

        fn name_index(&self, name: &str) -> Option<u16> {
            let i = self.names.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))?;
            u16::try_from(i + 1).ok()
        }

        fn name_text(&self, index: u16) -> Option<String> {
            Some(self.names.get(usize::from(index).checked_sub(1)?)?.0.clone())
        }

        fn name_x_text(&self, _extern_sheet: u16, _name_index: u16) -> Option<String> {
            None
        }
    }

    impl TestBook {
        fn set(&mut self, row: u32, col: u16, cell: EvaluationCell) {
            self.cells.insert((row, col), cell);
        }

        fn formula(&mut self, row: u32, col: u16, text: &str) {
            let tokens = parse_formula(text, self).expect("formula parses");
            self.set(row, col, EvaluationCell::Formula(Some(tokens)));
        }

        fn eval(&self, (row, col): (u32, u16)) -> CellValue {
            let mut tracker = EvaluationTracker::default();
            let options = EvaluationOptions::default();
            Interpreter::new(self, &mut tracker, &options, CellKey::new(0, row, col))
                .evaluate_cell(0, row, col)
                .expect("evaluates")
        }

        fn eval_text(&mut self, text: &str) -> CellValue {
            self.formula(50, 5, text);
            self.eval((50, 5))
        }
    }

    impl EvaluationWorkbook for TestBook {
        fn sheet_count(&self) -> usize {
            1
        }

        fn sheet_name(&self, sheet: usize) -> Option<&str> {
            (sheet == 0).then_some("Sheet1")
        }

        fn sheet_index(&self, name: &str) -> Option<usize> {
            name.eq_ignore_ascii_case("Sheet1").then_some(0)
        }

        fn cell(&self, sheet: usize, row: u32, col: u16) -> Option<EvaluationCell> {
            if sheet != 0 {
                return None;
            }
            self.cells.get(&(row, col)).cloned()
        }

        fn cells_in_area(
            &self,
            _sheet: usize,
            rows: RangeInclusive<u32>,
            cols: RangeInclusive<u16>,
        ) -> Vec<(u32, u16)> {
            self.cells
                .keys()
                .filter(|(r, c)| rows.contains(r) && cols.contains(c))
                .copied()
                .collect()
        }

        fn sheet_index_from_extern_sheet(&self, _extern_sheet: u16) -> Option<usize> {
            None
        }

        fn name_tokens(&self, name_index: u16) -> Option<Vec<Ptg>> {
            Some(self.names.get(usize::from(name_index).checked_sub(1)?)?.1.clone())
        }

        fn name_x_text(&self, _extern_sheet: u16, _name_index: u16) -> Option<String> {
            None
        }
    }

    fn sample() -> TestBook {
        let mut book = TestBook::default();
        // A1:A5 = 3, 5, 7, 9, "x"
        for (row, n) in [3.0, 5.0, 7.0, 9.0].into_iter().enumerate() {
            book.set(row as u32, 0, EvaluationCell::Number(n));
        }
        book.set(4, 0, EvaluationCell::Text("x".to_string()));
        book.set(0, 1, EvaluationCell::Bool(true));
        book.set(1, 1, EvaluationCell::Error(ErrorCode::Div0.code()));
        book
    }

    #[test]
    fn test_operators_and_precedence() {
        let mut book = sample();
        assert_eq!(book.eval_text("A1*2+1"), CellValue::Number(7.0));
        assert_eq!(book.eval_text("-A2^2"), CellValue::Number(25.0));
        assert_eq!(book.eval_text("(A1+A2)*2"), CellValue::Number(16.0));
        assert_eq!(book.eval_text("50%"), CellValue::Number(0.5));
        assert_eq!(book.eval_text("A5&A1"), CellValue::Text("x3".to_string()));
        assert_eq!(book.eval_text("B1>5"), CellValue::Bool(true));
        assert_eq!(book.eval_text("\"abc\">999"), CellValue::Bool(true));
        assert_eq!(book.eval_text("Z99=0"), CellValue::Bool(true));
        assert_eq!(book.eval_text("B2+1"), CellValue::Error(ErrorCode::Div0));
        assert_eq!(book.eval_text("1/0"), CellValue::Error(ErrorCode::Div0));
        assert_eq!(book.eval_text("Z99"), CellValue::Number(0.0));
    }

    #[test]
    fn test_functions_through_tokens() {
        let mut book = sample();
        assert_eq!(book.eval_text("SUM(A1:A5)"), CellValue::Number(24.0));
        assert_eq!(book.eval_text("SUM(A1:A2,10)"), CellValue::Number(18.0));
        assert_eq!(book.eval_text("COUNTIF(A1:A5,\">5\")"), CellValue::Number(2.0));
        assert_eq!(book.eval_text("AVERAGE(A1:A4)"), CellValue::Number(6.0));
        assert_eq!(book.eval_text("ROUND(PI(),2)"), CellValue::Number(3.14));
        assert_eq!(book.eval_text("LEN(\"hello\")"), CellValue::Number(5.0));
        assert_eq!(book.eval_text("VLOOKUP(1,A1:A5,1)"), CellValue::Error(ErrorCode::Name));
    }

    #[test]
    fn test_lazy_if_skips_the_other_branch() {
        let mut book = sample();
        assert_eq!(book.eval_text("IF(A1>1,\"big\",\"small\")"), CellValue::Text("big".to_string()));
        assert_eq!(book.eval_text("IF(A1>5,\"big\",\"small\")"), CellValue::Text("small".to_string()));
        assert_eq!(book.eval_text("IF(A1>5,1)"), CellValue::Bool(false));
        assert_eq!(book.eval_text("IF(A1>1,1)"), CellValue::Number(1.0));
        // The untaken branch divides by zero but is never computed.
        assert_eq!(book.eval_text("IF(TRUE,1,1/0)"), CellValue::Number(1.0));
        assert_eq!(book.eval_text("IF(B2,1,2)+1"), CellValue::Error(ErrorCode::Div0));
        assert_eq!(book.eval_text("IF(A5,1,2)"), CellValue::Error(ErrorCode::Value));
        assert_eq!(book.eval_text("IF(A1>5,1,2)*10"), CellValue::Number(20.0));
        assert_eq!(book.eval_text("SUM(IF(A1>1,A1:A2,0))"), CellValue::Number(8.0));
    }

    #[test]
    fn test_choose_and_logic() {
        let mut book = sample();
        assert_eq!(book.eval_text("CHOOSE(2,\"a\",\"b\",\"c\")"), CellValue::Text("b".to_string()));
        assert_eq!(book.eval_text("AND(A1>1,A2>1)"), CellValue::Bool(true));
        assert_eq!(book.eval_text("OR(A1>5,NOT(TRUE))"), CellValue::Bool(false));
        assert_eq!(book.eval_text("ISERROR(B2)"), CellValue::Bool(true));
    }

    #[test]
    fn test_nested_formula_cells() {
        let mut book = sample();
        book.formula(0, 2, "A1+A2");
        book.formula(1, 2, "C1*2");
        assert_eq!(book.eval((1, 2)), CellValue::Number(16.0));
        assert_eq!(book.eval_text("SUM(C1:C2)"), CellValue::Number(24.0));
    }

    #[test]
    fn test_cycle_through_range() {
        let mut book = sample();
        book.formula(0, 3, "SUM(D1:D2)");
        book.formula(1, 3, "D1");
        let mut tracker = EvaluationTracker::default();
        let options = EvaluationOptions::default();
        let err = Interpreter::new(&book, &mut tracker, &options, CellKey::new(0, 0, 3))
            .evaluate_cell(0, 0, 3)
            .unwrap_err();
        assert!(matches!(err, XlsError::CircularReference { .. }));
        assert_eq!(tracker.depth(), 0);
    }

    fn chain(length: u32) -> TestBook {
        let mut book = TestBook::default();
        book.set(0, 0, EvaluationCell::Number(1.0));
        for row in 1..length {
            book.formula(row, 0, &format!("A{}+1", row));
        }
        book
    }

    #[test]
    fn test_long_chain_runs_inputs_first() {
        let book = chain(5000);
        let mut tracker = EvaluationTracker::default();
        let options = EvaluationOptions::new().with_max_depth(10_000);
        let value = Interpreter::new(&book, &mut tracker, &options, CellKey::new(0, 4999, 0))
            .evaluate_cell(0, 4999, 0)
            .unwrap();
        assert_eq!(value, CellValue::Number(5000.0));
        assert_eq!(tracker.depth(), 0);
        assert_eq!(tracker.cached_count(), 5000);
    }

    #[test]
    fn test_long_chain_over_the_limit() {
        let book = chain(3000);
        let mut tracker = EvaluationTracker::default();
        let options = EvaluationOptions::default();
        let err = Interpreter::new(&book, &mut tracker, &options, CellKey::new(0, 2999, 0))
            .evaluate_cell(0, 2999, 0)
            .unwrap_err();
        assert!(matches!(err, XlsError::EvaluationDepthExceeded { limit: 1024 }));
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn test_inputs_include_names_and_areas() {
        let mut book = sample();
        let tokens = parse_formula("C1:C2", &mut book).unwrap();
        book.names.push(("Totals".to_string(), tokens));
        book.formula(0, 2, "A1+A2");
        book.formula(1, 2, "SUM(A1:A4)");
        let tokens = parse_formula("SUM(Totals)+B1", &mut book).unwrap();
        let mut tracker = EvaluationTracker::default();
        let options = EvaluationOptions::default();
        let at = CellKey::new(0, 9, 9);
        let inputs = Interpreter::new(&book, &mut tracker, &options, at).formula_inputs(at, &tokens);
        assert_eq!(
            inputs,
            vec![CellKey::new(0, 0, 1), CellKey::new(0, 0, 2), CellKey::new(0, 1, 2)]
        );
    }

    #[test]
    fn test_defined_names() {
        let mut book = sample();
        let tokens = parse_formula("A1:A4", &mut book).unwrap();
        book.names.push(("Values".to_string(), tokens));
        assert_eq!(book.eval_text("SUM(Values)"), CellValue::Number(24.0));
        assert_eq!(book.eval_text("Values"), CellValue::Error(ErrorCode::Value));
    }

    #[test]
    fn test_undecodable_formula_is_value_error() {
        let mut book = sample();
        book.set(7, 7, EvaluationCell::Formula(None));
        assert_eq!(book.eval((7, 7)), CellValue::Error(ErrorCode::Value));
        book.set(7, 8, EvaluationCell::Formula(Some(vec![Ptg::Add])));
        assert_eq!(book.eval((7, 8)), CellValue::Error(ErrorCode::Value));
    }

    #[test]
    fn test_skip_distances() {
        let tokens = [Ptg::Int(1), Ptg::Num(2.0), Ptg::Add, Ptg::Int(3)];
        assert_eq!(tokens_spanning(&tokens, 0, 10), Some(2));
        assert_eq!(tokens_spanning(&tokens, 0, 4), None);
        assert_eq!(tokens_spanning(&tokens, 2, 100), None);
    }
}
