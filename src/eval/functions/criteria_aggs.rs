use super::{Criterion, scalar_arg};
use crate::common::error::XlsResult;
use crate::eval::EvalContext;
use crate::eval::operators::number_result;
use crate::eval::value::{SheetArea, Value};
use crate::formula::ErrorCode;

/// `COUNTIF(range, criteria)`. Cells of the range that do not exist are
/// blank and are counted when blank matches.
pub(crate) fn countif(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let Some(range) = args[0].as_area() else {
        return Ok(Value::Error(ErrorCode::Value));
    };
    let Some(criterion) = Criterion::parse(&scalar_arg(args, 1, ctx)?) else {
        return Ok(Value::Number(0.0));
    };
    let existing = ctx.existing_cells(&range);
    let mut count = 0u64;
    for &(row, col) in &existing {
        if criterion.matches(&ctx.cell_value(range.sheet, row, col)?) {
            count += 1;
        }
    }
    if criterion.matches(&Value::Blank) {
        count += range.cell_count() - existing.len() as u64;
    }
    Ok(Value::Number(count as f64))
}

/// `SUMIF(range, criteria, [sum_range])`. The sum range takes its top-left
/// corner from the third argument and its shape from `range`. A matching
/// error in the sum range is the result.
pub(crate) fn sumif(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let Some(range) = args[0].as_area() else {
        return Ok(Value::Error(ErrorCode::Value));
    };
    let anchor = match args.get(2) {
        None | Some(Value::Missing) => range,
        Some(arg) => match arg.as_area() {
            Some(area) => area,
            None => return Ok(Value::Error(ErrorCode::Value)),
        },
    };
    let Some(criterion) = Criterion::parse(&scalar_arg(args, 1, ctx)?) else {
        return Ok(Value::Number(0.0));
    };
    let col_span = u16::try_from(range.cols() - 1).unwrap_or(u16::MAX);
    let sum_area = SheetArea::new(
        anchor.sheet,
        anchor.first_row,
        anchor.first_col,
        anchor.first_row.saturating_add(range.rows() - 1),
        anchor.first_col.saturating_add(col_span),
    );

    let mut total = 0.0;
    for (row, col) in ctx.existing_cells(&sum_area) {
        let value = ctx.cell_value(sum_area.sheet, row, col)?;
        if !matches!(value, Value::Number(_) | Value::Error(_)) {
            continue;
        }
        let tested = ctx.cell_value(
            range.sheet,
            range.first_row + (row - sum_area.first_row),
            range.first_col + (col - sum_area.first_col),
        )?;
        if !criterion.matches(&tested) {
            continue;
        }
        match value {
            Value::Number(n) => total += n,
            Value::Error(e) => return Ok(Value::Error(e)),
            _ => {},
        }
    }
    Ok(number_result(total))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn column_a() -> Grid {
        // A1:A5 = 3, 5, 7, 9, "x" ; B1:B5 = 10, 20, 30, 40, 50
        let mut cells = Vec::new();
        for (row, v) in [num(3.0), num(5.0), num(7.0), num(9.0), text("x")].into_iter().enumerate() {
            cells.push(((row as u32, 0), v));
            cells.push(((row as u32, 1), num(10.0 * (row as f64 + 1.0))));
        }
        Grid::with(&cells)
    }

    #[test]
    fn test_countif_numeric_criteria() {
        let mut grid = column_a();
        assert_eq!(countif(&[area(0, 0, 4, 0), text(">5")], &mut grid).unwrap(), num(2.0));
        assert_eq!(countif(&[area(0, 0, 4, 0), num(5.0)], &mut grid).unwrap(), num(1.0));
        assert_eq!(countif(&[area(0, 0, 4, 0), text(">=5")], &mut grid).unwrap(), num(3.0));
        assert_eq!(countif(&[area(0, 0, 4, 0), text("x")], &mut grid).unwrap(), num(1.0));
    }

    #[test]
    fn test_countif_counts_missing_cells_as_blank() {
        let mut grid = column_a();
        // A1:A10 has five missing cells.
        assert_eq!(countif(&[area(0, 0, 9, 0), text("=")], &mut grid).unwrap(), num(5.0));
        assert_eq!(countif(&[area(0, 0, 9, 0), text("<>5")], &mut grid).unwrap(), num(9.0));
        assert_eq!(countif(&[area(0, 0, 9, 0), Value::Missing], &mut grid).unwrap(), num(0.0));
        assert_eq!(countif(&[num(1.0), num(1.0)], &mut grid).unwrap(), Value::Error(ErrorCode::Value));
    }

    #[test]
    fn test_sumif() {
        let mut grid = column_a();
        assert_eq!(sumif(&[area(0, 0, 4, 0), text(">5")], &mut grid).unwrap(), num(16.0));
        assert_eq!(
            sumif(&[area(0, 0, 4, 0), text(">5"), area(0, 1, 4, 1)], &mut grid).unwrap(),
            num(70.0)
        );
        // Only the anchor of the sum range matters.
        assert_eq!(
            sumif(&[area(0, 0, 4, 0), text("x"), area(0, 1, 0, 1)], &mut grid).unwrap(),
            num(50.0)
        );
    }

    #[test]
    fn test_sumif_propagates_matching_errors() {
        let mut grid = column_a();
        grid.cells.insert((2, 1), Value::Error(ErrorCode::Div0));
        assert_eq!(
            sumif(&[area(0, 0, 4, 0), text(">5"), area(0, 1, 4, 1)], &mut grid).unwrap(),
            Value::Error(ErrorCode::Div0)
        );
        assert_eq!(
            sumif(&[area(0, 0, 4, 0), text("<5"), area(0, 1, 4, 1)], &mut grid).unwrap(),
            num(10.0)
        );
    }
}
