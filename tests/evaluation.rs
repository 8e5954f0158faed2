//! Formula evaluation against workbooks built through the public API.

use litchi_xls::eval::is_function_supported;
use litchi_xls::{CellValue, ErrorCode, EvaluationOptions, FormulaEvaluator, Workbook, XlsError};

/// One sheet named `Sheet1` filled from `(a1, content)` pairs. Content
/// starting with `=` is a formula, numbers are numbers, anything else text.
fn sheet_with(cells: &[(&str, &str)]) -> Workbook {
    let mut book = Workbook::create();
    let sheet = book.create_sheet("Sheet1").unwrap();
    for &(at, content) in cells {
        let (row, col) = a1(at);
        match content.strip_prefix('=') {
            Some(formula) => book.set_cell_formula(sheet, row, col, formula).unwrap(),
            None => match content.parse::<f64>() {
                Ok(n) => book.set_cell_number(sheet, row, col, n).unwrap(),
                Err(_) => book.set_cell_string(sheet, row, col, content).unwrap(),
            },
        }
    }
    book
}

fn a1(at: &str) -> (u32, u16) {
    let split = at.find(|c: char| c.is_ascii_digit()).unwrap();
    let col = at[..split].bytes().fold(0u16, |acc, b| acc * 26 + u16::from(b - b'A' + 1)) - 1;
    let row = at[split..].parse::<u32>().unwrap() - 1;
    (row, col)
}

fn eval(book: &Workbook, at: &str) -> CellValue {
    let (row, col) = a1(at);
    FormulaEvaluator::new().evaluate(book, 0, row, col).unwrap()
}

#[test]
fn test_simple_arithmetic_scenario() {
    let book = sheet_with(&[("A1", "5"), ("B1", "=A1*2+1")]);
    assert_eq!(eval(&book, "B1"), CellValue::Number(11.0));
}

#[test]
fn test_countif_scenario() {
    let book = sheet_with(&[
        ("A1", "3"),
        ("A2", "5"),
        ("A3", "7"),
        ("A4", "9"),
        ("A5", "x"),
        ("B1", "=COUNTIF(A1:A5,\">5\")"),
        ("B2", "=SUMIF(A1:A5,\">5\")"),
        ("B3", "=COUNTIF(A1:A5,\"<>5\")"),
    ]);
    assert_eq!(eval(&book, "B1"), CellValue::Number(2.0));
    assert_eq!(eval(&book, "B2"), CellValue::Number(16.0));
    assert_eq!(eval(&book, "B3"), CellValue::Number(4.0));
}

#[test]
fn test_countif_compares_numeric_text_as_numbers() {
    let mut book = sheet_with(&[("A2", "7"), ("A3", "3"), ("B1", "=COUNTIF(A1:A3,\">5\")")]);
    book.set_cell_string(0, 0, 0, "9").unwrap();
    book.set_cell_formula(0, 1, 1, "COUNTIF(A1:A3,\"<=9\")").unwrap();
    book.set_cell_formula(0, 2, 1, "COUNTIF(A1:A3,\"<>9\")").unwrap();
    assert_eq!(eval(&book, "B1"), CellValue::Number(2.0));
    assert_eq!(eval(&book, "B2"), CellValue::Number(3.0));
    assert_eq!(eval(&book, "B3"), CellValue::Number(2.0));
}

#[test]
fn test_relational_coercion() {
    let book = sheet_with(&[
        ("A1", "=TRUE>5"),
        ("A2", "=\"\"=Z99"),
        ("A3", "=Z99=0"),
        ("A4", "=\"abc\">999"),
        ("A5", "=TRUE>\"zzz\""),
        ("A6", "=FALSE=Z99"),
        ("A7", "=Z99<1"),
        ("A8", "=Z99>-1"),
        ("A9", "=\"apple\"<\"Banana\""),
    ]);
    for cell in ["A1", "A2", "A3", "A4", "A5", "A6", "A7", "A8", "A9"] {
        assert_eq!(eval(&book, cell), CellValue::Bool(true), "{cell}");
    }
}

#[test]
fn test_errors_are_values() {
    let book = sheet_with(&[
        ("A1", "=1/0"),
        ("A2", "=A1+1"),
        ("A3", "=\"abc\"+1"),
        ("A5", "=\"x\"&A1"),
        ("A6", "=IF(TRUE,1,A1)"),
    ]);
    assert_eq!(eval(&book, "A1"), CellValue::Error(ErrorCode::Div0));
    assert_eq!(eval(&book, "A2"), CellValue::Error(ErrorCode::Div0));
    assert_eq!(eval(&book, "A3"), CellValue::Error(ErrorCode::Value));
    assert_eq!(eval(&book, "A5"), CellValue::Error(ErrorCode::Div0));
    assert_eq!(eval(&book, "A6"), CellValue::Number(1.0));
}

#[test]
fn test_unknown_function_is_rejected_when_parsing() {
    let mut book = sheet_with(&[]);
    let err = book.set_cell_formula(0, 0, 0, "NOSUCHFN(1)").unwrap_err();
    assert!(matches!(err, XlsError::InvalidFormula(_)), "{err}");
    assert!(book.sheet(0).unwrap().cell(0, 0).is_none());
}

#[test]
fn test_cycle_detection() {
    let book = sheet_with(&[("A1", "=B1+1"), ("B1", "=A1+1"), ("C1", "=A1")]);
    let mut evaluator = FormulaEvaluator::new();
    for (row, col) in [(0, 0), (0, 1), (0, 2)] {
        let err = evaluator.evaluate(&book, 0, row, col).unwrap_err();
        assert!(matches!(err, XlsError::CircularReference { .. }), "{err}");
    }
}

#[test]
fn test_cache_is_stale_until_cleared() {
    let mut book = sheet_with(&[("A1", "5"), ("B1", "=A1*2+1")]);
    let mut evaluator = FormulaEvaluator::new();
    assert_eq!(evaluator.evaluate(&book, 0, 0, 1).unwrap(), CellValue::Number(11.0));

    book.set_cell_number(0, 0, 0, 100.0).unwrap();
    assert_eq!(evaluator.evaluate(&book, 0, 0, 1).unwrap(), CellValue::Number(11.0));

    evaluator.clear_all_cached_results();
    assert_eq!(evaluator.evaluate(&book, 0, 0, 1).unwrap(), CellValue::Number(201.0));

    let mut fresh = FormulaEvaluator::with_options(EvaluationOptions::new().with_cache_results(false));
    book.set_cell_number(0, 0, 0, 1.0).unwrap();
    assert_eq!(fresh.evaluate(&book, 0, 0, 1).unwrap(), CellValue::Number(3.0));
}

#[test]
fn test_cross_sheet_and_named_references() {
    let mut book = Workbook::create();
    let data = book.create_sheet("Data").unwrap();
    let report = book.create_sheet("Report").unwrap();
    for row in 0..4u32 {
        book.set_cell_number(data, row, 0, f64::from(row + 1)).unwrap();
    }
    let name = book.create_name("Values", None).unwrap();
    book.set_name_formula(name, "Data!$A$1:$A$4").unwrap();
    book.set_cell_formula(report, 0, 0, "SUM(Data!A1:A4)").unwrap();
    book.set_cell_formula(report, 1, 0, "SUM(Values)*2").unwrap();
    book.set_cell_formula(report, 2, 0, "AVERAGE(Data!A1:A4)").unwrap();

    let mut evaluator = FormulaEvaluator::new();
    assert_eq!(evaluator.evaluate(&book, report, 0, 0).unwrap(), CellValue::Number(10.0));
    assert_eq!(evaluator.evaluate(&book, report, 1, 0).unwrap(), CellValue::Number(20.0));
    assert_eq!(evaluator.evaluate(&book, report, 2, 0).unwrap(), CellValue::Number(2.5));
}

#[test]
fn test_cached_results_survive_a_round_trip() {
    let mut book = sheet_with(&[
        ("A1", "4"),
        ("B1", "=SQRT(A1)"),
        ("C1", "=UPPER(\"done\")"),
        ("D1", "=A1>3"),
        ("E1", "=A1/0"),
    ]);
    let mut evaluator = FormulaEvaluator::new();
    assert_eq!(evaluator.evaluate_all_formula_cells(&mut book).unwrap(), 4);

    let reread = Workbook::from_bytes(&book.to_bytes().unwrap()).unwrap();
    let sheet = reread.sheet(0).unwrap();
    let upper = sheet.cell(0, 2).unwrap().as_formula().unwrap();
    assert_eq!(upper.cached_string(), Some("DONE"));
    assert_eq!(reread.cell_formula(0, 0, 1).as_deref(), Some("SQRT(A1)"));
}

#[test]
fn test_supported_functions() {
    for name in ["SUM", "IF", "COUNTIF", "SUMIF", "CHOOSE", "CONCATENATE", "ROUND"] {
        assert!(is_function_supported(name), "{name}");
    }
    assert!(!is_function_supported("VLOOKUP"));
}

/// `A1 = 1` and `A{n} = A{n-1}+1` down to row `length`.
fn chain(length: u32) -> Workbook {
    let mut book = sheet_with(&[("A1", "1")]);
    for row in 1..length {
        book.set_cell_formula(0, row, 0, &format!("A{}+1", row)).unwrap();
    }
    book
}

#[test]
fn test_deep_chain_at_default_options() {
    let book = chain(3000);

    let err = FormulaEvaluator::new().evaluate(&book, 0, 2999, 0).unwrap_err();
    assert!(matches!(err, XlsError::EvaluationDepthExceeded { limit: 1024 }), "{err}");

    // Cached prefixes shorten the walk of later requests.
    let mut evaluator = FormulaEvaluator::new();
    for row in [999, 1999, 2999] {
        let value = evaluator.evaluate(&book, 0, row, 0).unwrap();
        assert_eq!(value, CellValue::Number(f64::from(row + 1)));
    }

    let mut evaluator = FormulaEvaluator::with_options(EvaluationOptions::new().with_max_depth(4000));
    assert_eq!(evaluator.evaluate(&book, 0, 2999, 0).unwrap(), CellValue::Number(3000.0));
}
