//! Formula text to token conversion.
//!
//! A recursive-descent parser over the formula bytes. Operator precedence,
//! from loosest to tightest: comparison, `&`, `+ -`, `* /`, `^`, unary
//! `+ -`, postfix `%`. The parser first builds a small expression tree and
//! then flattens it into postfix tokens, assigning operand classes and
//! compiling IF into the tAttr If/Skip form.

use super::error_code::ErrorCode;
use super::functions::{self, FUNCTION_INDEX_IF, FUNCTION_INDEX_SUM, FunctionMetadata};
use super::ptg::{
    AreaReference, ArrayConstant, AttrPtg, CellReference, ConstantValue, OperandClass, Ptg,
};
use super::FormulaContext;
use crate::common::error::{XlsError, XlsResult};
use crate::records::strings::XlString;

/// Parse formula text (with or without a leading `=`) into tokens.
pub fn parse_formula(text: &str, ctx: &mut dyn FormulaContext) -> XlsResult<Vec<Ptg>> {
    let mut parser = FormulaParser::new(text, ctx);
    let node = parser.parse()?;
    let mut tokens = Vec::new();
    emit(&node, OperandClass::Value, &mut tokens)?;
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Node {
    Operand(Ptg),
    Unary(Ptg, Box<Node>),
    Binary(Ptg, Box<Node>, Box<Node>),
    Paren(Box<Node>),
    Function(&'static FunctionMetadata, Vec<Node>),
    Missing,
}

struct FormulaParser<'a, 'c> {
    text: &'a str,
    input: &'a [u8],
    position: usize,
    ctx: &'c mut dyn FormulaContext,
}

fn syntax_error(message: impl Into<String>) -> XlsError {
    XlsError::InvalidFormula(message.into())
}

impl<'a, 'c> FormulaParser<'a, 'c> {
    fn new(text: &'a str, ctx: &'c mut dyn FormulaContext) -> Self {
        Self {
            text,
            input: text.as_bytes(),
            position: 0,
            ctx,
        }
    }

    fn parse(&mut self) -> XlsResult<Node> {
        self.skip_whitespace();
        if self.peek() == Some(b'=') {
            self.advance();
        }
        let node = self.comparison()?;
        self.skip_whitespace();
        if !self.is_at_end() {
            return Err(syntax_error(format!(
                "unexpected '{}' at position {} in '{}'",
                self.text[self.position..].chars().next().unwrap_or(' '),
                self.position,
                self.text
            )));
        }
        Ok(node)
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.position + offset).copied()
    }

    #[inline]
    fn advance(&mut self) {
        self.position += 1;
    }

    #[inline]
    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.advance();
        }
    }

    fn expect(&mut self, ch: u8) -> XlsResult<()> {
        self.skip_whitespace();
        if self.peek() == Some(ch) {
            self.advance();
            Ok(())
        } else {
            Err(syntax_error(format!(
                "expected '{}' at position {} in '{}'",
                ch as char, self.position, self.text
            )))
        }
    }

    fn comparison(&mut self) -> XlsResult<Node> {
        let mut left = self.concatenation()?;
        loop {
            self.skip_whitespace();
            let op = match (self.peek(), self.peek_at(1)) {
                (Some(b'<'), Some(b'>')) => (Ptg::Ne, 2),
                (Some(b'<'), Some(b'=')) => (Ptg::Le, 2),
                (Some(b'>'), Some(b'=')) => (Ptg::Ge, 2),
                (Some(b'<'), _) => (Ptg::Lt, 1),
                (Some(b'>'), _) => (Ptg::Gt, 1),
                (Some(b'='), _) => (Ptg::Eq, 1),
                _ => return Ok(left),
            };
            self.position += op.1;
            let right = self.concatenation()?;
            left = Node::Binary(op.0, Box::new(left), Box::new(right));
        }
    }

    fn concatenation(&mut self) -> XlsResult<Node> {
        let mut left = self.additive()?;
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'&') {
                return Ok(left);
            }
            self.advance();
            let right = self.additive()?;
            left = Node::Binary(Ptg::Concat, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> XlsResult<Node> {
        let mut left = self.term()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some(b'+') => Ptg::Add,
                Some(b'-') => Ptg::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.term()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> XlsResult<Node> {
        let mut left = self.power()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some(b'*') => Ptg::Mul,
                Some(b'/') => Ptg::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.power()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn power(&mut self) -> XlsResult<Node> {
        let mut left = self.unary()?;
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'^') {
                return Ok(left);
            }
            self.advance();
            let right = self.unary()?;
            left = Node::Binary(Ptg::Power, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> XlsResult<Node> {
        self.skip_whitespace();
        let op = match self.peek() {
            Some(b'-') => Ptg::UnaryMinus,
            Some(b'+') => Ptg::UnaryPlus,
            _ => return self.percent(),
        };
        self.advance();
        let operand = self.unary()?;
        Ok(Node::Unary(op, Box::new(operand)))
    }

    fn percent(&mut self) -> XlsResult<Node> {
        let mut node = self.primary()?;
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'%') {
                return Ok(node);
            }
            self.advance();
            node = Node::Unary(Ptg::Percent, Box::new(node));
        }
    }

    fn primary(&mut self) -> XlsResult<Node> {
        self.skip_whitespace();
        let ch = self
            .peek()
            .ok_or_else(|| syntax_error(format!("unexpected end of formula '{}'", self.text)))?;
        match ch {
            b'(' => {
                self.advance();
                let inner = self.comparison()?;
                self.expect(b')')?;
                Ok(Node::Paren(Box::new(inner)))
            },
            b'"' => Ok(Node::Operand(Ptg::Str(XlString::new(self.string_literal()?)))),
            b'#' => Ok(Node::Operand(Ptg::Err(self.error_literal()?.code()))),
            b'{' => self.array_literal(),
            b'\'' => {
                let sheet = self.quoted_sheet_name()?;
                self.expect(b'!')?;
                self.sheet_reference(&sheet)
            },
            b'0'..=b'9' | b'.' => {
                if let Some(node) = self.try_row_range()? {
                    return Ok(node);
                }
                Ok(Node::Operand(Ptg::int_or_num(self.number_literal()?)))
            },
            b'$' | b'_' | b'\\' => self.identifier_expression(),
            c if c.is_ascii_alphabetic() || c >= 0x80 => self.identifier_expression(),
            other => Err(syntax_error(format!(
                "unexpected character '{}' in '{}'",
                other as char, self.text
            ))),
        }
    }

    fn string_literal(&mut self) -> XlsResult<String> {
        self.advance();
        let mut out = String::new();
        let mut start = self.position;
        loop {
            match self.peek() {
                None => return Err(syntax_error("unterminated string literal")),
                Some(b'"') => {
                    out.push_str(&self.text[start..self.position]);
                    self.advance();
                    if self.peek() == Some(b'"') {
                        out.push('"');
                        self.advance();
                        start = self.position;
                    } else {
                        return Ok(out);
                    }
                },
                Some(_) => self.advance(),
            }
        }
    }

    fn error_literal(&mut self) -> XlsResult<ErrorCode> {
        let start = self.position;
        self.advance();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'/' {
                self.advance();
            } else {
                break;
            }
        }
        if matches!(self.peek(), Some(b'!' | b'?')) {
            self.advance();
        }
        let literal = &self.text[start..self.position];
        ErrorCode::from_text(literal)
            .ok_or_else(|| syntax_error(format!("unknown error literal '{}'", literal)))
    }

    fn number_literal(&mut self) -> XlsResult<f64> {
        let start = self.position;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
        if self.peek() == Some(b'.') {
            self.advance();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E'))
            && matches!(self.peek_at(1), Some(b'0'..=b'9' | b'+' | b'-'))
        {
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }
        let lexeme = &self.text[start..self.position];
        fast_float2::parse::<f64, _>(lexeme)
            .map_err(|_| syntax_error(format!("invalid number '{}'", lexeme)))
    }

    fn quoted_sheet_name(&mut self) -> XlsResult<String> {
        self.advance();
        let mut out = String::new();
        let mut start = self.position;
        loop {
            match self.peek() {
                None => return Err(syntax_error("unterminated sheet name")),
                Some(b'\'') => {
                    out.push_str(&self.text[start..self.position]);
                    self.advance();
                    if self.peek() == Some(b'\'') {
                        out.push('\'');
                        self.advance();
                        start = self.position;
                    } else {
                        return Ok(out);
                    }
                },
                Some(_) => self.advance(),
            }
        }
    }

    fn identifier(&mut self) -> &'a str {
        let start = self.position;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'.' | b'$' | b'\\') || ch >= 0x80
            {
                self.advance();
            } else {
                break;
            }
        }
        &self.text[start..self.position]
    }

    /// `1:3` style whole-row range.
    fn try_row_range(&mut self) -> XlsResult<Option<Node>> {
        let start = self.position;
        let first = self.identifier();
        self.skip_whitespace();
        if self.peek() != Some(b':') || parse_row_part(first).is_none() {
            self.position = start;
            return Ok(None);
        }
        self.advance();
        self.skip_whitespace();
        let second = self.identifier();
        match (parse_row_part(first), parse_row_part(second)) {
            (Some((r1, abs1)), Some((r2, abs2))) => Ok(Some(Node::Operand(Ptg::area(
                AreaReference::new(
                    CellReference::new(r1, 0, !abs1, false)?,
                    CellReference::new(r2, 0xFF, !abs2, false)?,
                ),
            )))),
            _ => {
                self.position = start;
                Ok(None)
            },
        }
    }

    fn identifier_expression(&mut self) -> XlsResult<Node> {
        let start = self.position;
        let ident = self.identifier();
        if ident.is_empty() {
            return Err(syntax_error(format!("expected a name in '{}'", self.text)));
        }

        if self.peek() == Some(b'!') {
            self.advance();
            return self.sheet_reference(ident);
        }

        self.skip_whitespace();
        if self.peek() == Some(b'(') {
            return self.function_call(ident);
        }

        if ident.eq_ignore_ascii_case("TRUE") {
            return Ok(Node::Operand(Ptg::Bool(true)));
        }
        if ident.eq_ignore_ascii_case("FALSE") {
            return Ok(Node::Operand(Ptg::Bool(false)));
        }

        if let Some(area) = self.area_after(ident)? {
            return Ok(Node::Operand(Ptg::area(area)));
        }
        if let Some(cell) = parse_cell_part(ident)? {
            return Ok(Node::Operand(Ptg::reference(cell)));
        }

        match self.ctx.name_index(ident) {
            Some(index) => Ok(Node::Operand(Ptg::Name {
                class: OperandClass::Reference,
                index,
                reserved: 0,
            })),
            None => {
                self.position = start + ident.len();
                Err(syntax_error(format!("unknown name '{}'", ident)))
            },
        }
    }

    /// Parse `:second` after `first` when both halves form an area.
    fn area_after(&mut self, first: &str) -> XlsResult<Option<AreaReference>> {
        let save = self.position;
        self.skip_whitespace();
        if self.peek() != Some(b':') {
            self.position = save;
            return Ok(None);
        }
        self.advance();
        self.skip_whitespace();
        let second = self.identifier();

        if let (Some(a), Some(b)) = (parse_cell_part(first)?, parse_cell_part(second)?) {
            return Ok(Some(AreaReference::new(a, b)));
        }
        if let (Some((c1, abs1)), Some((c2, abs2))) = (parse_col_part(first), parse_col_part(second))
        {
            return Ok(Some(AreaReference::new(
                CellReference::new(0, c1, false, !abs1)?,
                CellReference::new(0xFFFF, c2, false, !abs2)?,
            )));
        }
        if let (Some((r1, abs1)), Some((r2, abs2))) = (parse_row_part(first), parse_row_part(second))
        {
            return Ok(Some(AreaReference::new(
                CellReference::new(r1, 0, !abs1, false)?,
                CellReference::new(r2, 0xFF, !abs2, false)?,
            )));
        }
        self.position = save;
        Ok(None)
    }

    fn sheet_reference(&mut self, sheet: &str) -> XlsResult<Node> {
        let extern_sheet = self
            .ctx
            .extern_sheet_index(sheet)
            .ok_or_else(|| syntax_error(format!("unknown sheet '{}'", sheet)))?;
        self.skip_whitespace();
        let ident = self.identifier();
        if let Some(area) = self.area_after(ident)? {
            return Ok(Node::Operand(Ptg::Area3d {
                class: OperandClass::Reference,
                extern_sheet,
                area,
            }));
        }
        match parse_cell_part(ident)? {
            Some(cell) => Ok(Node::Operand(Ptg::Ref3d {
                class: OperandClass::Reference,
                extern_sheet,
                cell,
            })),
            None => Err(syntax_error(format!(
                "'{}' is not a cell reference on sheet '{}'",
                ident, sheet
            ))),
        }
    }

    fn function_call(&mut self, name: &str) -> XlsResult<Node> {
        let meta = functions::function_by_name(name)
            .ok_or_else(|| syntax_error(format!("unknown function '{}'", name)))?;
        self.expect(b'(')?;
        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b')') {
            self.advance();
        } else {
            loop {
                self.skip_whitespace();
                let arg = if matches!(self.peek(), Some(b',' | b')')) {
                    Node::Missing
                } else {
                    self.comparison()?
                };
                args.push(arg);
                self.skip_whitespace();
                match self.peek() {
                    Some(b',') => self.advance(),
                    Some(b')') => {
                        self.advance();
                        break;
                    },
                    _ => {
                        return Err(syntax_error(format!(
                            "expected ',' or ')' in call to {}",
                            meta.name
                        )));
                    },
                }
            }
        }
        if args.len() < meta.min_args as usize || args.len() > meta.max_args as usize {
            return Err(syntax_error(format!(
                "{} takes {}..={} arguments, {} given",
                meta.name,
                meta.min_args,
                meta.max_args,
                args.len()
            )));
        }
        Ok(Node::Function(meta, args))
    }

    fn array_literal(&mut self) -> XlsResult<Node> {
        self.advance();
        let mut rows: Vec<Vec<ConstantValue>> = vec![Vec::new()];
        loop {
            self.skip_whitespace();
            let value = self.array_element()?;
            if let Some(row) = rows.last_mut() {
                row.push(value);
            }
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.advance(),
                Some(b';') => {
                    self.advance();
                    rows.push(Vec::new());
                },
                Some(b'}') => {
                    self.advance();
                    break;
                },
                _ => return Err(syntax_error("malformed array literal")),
            }
        }
        let cols = rows[0].len();
        if cols > 256 || rows.iter().any(|r| r.len() != cols) {
            return Err(syntax_error("array literal rows differ in length"));
        }
        let value = ArrayConstant {
            cols: cols as u16,
            rows: rows.len() as u16,
            values: rows.into_iter().flatten().collect(),
        };
        Ok(Node::Operand(Ptg::Array {
            class: OperandClass::Array,
            reserved: [0; 7],
            value,
        }))
    }

    fn array_element(&mut self) -> XlsResult<ConstantValue> {
        match self.peek() {
            Some(b'"') => Ok(ConstantValue::String(XlString::new(self.string_literal()?))),
            Some(b'#') => Ok(ConstantValue::Error(self.error_literal()?.code())),
            Some(b'-') => {
                self.advance();
                Ok(ConstantValue::Number(-self.number_literal()?))
            },
            Some(b'0'..=b'9' | b'.') => Ok(ConstantValue::Number(self.number_literal()?)),
            _ => {
                let ident = self.identifier();
                if ident.eq_ignore_ascii_case("TRUE") {
                    Ok(ConstantValue::Bool(true))
                } else if ident.eq_ignore_ascii_case("FALSE") {
                    Ok(ConstantValue::Bool(false))
                } else {
                    Err(syntax_error(format!("invalid array element '{}'", ident)))
                }
            },
        }
    }
}

/// Convert column letters (`A`..`IV`) to a zero-based index.
pub(crate) fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1);
    }
    Some(col - 1)
}

/// Split `$A$1` into column letters, row digits and their `$` markers.
fn split_cell(text: &str) -> Option<(bool, &str, bool, &str)> {
    let (col_abs, rest) = match text.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let letters_end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let (letters, rest) = rest.split_at(letters_end);
    let (row_abs, digits) = match rest.strip_prefix('$') {
        Some(d) => (true, d),
        None => (false, rest),
    };
    if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((col_abs, letters, row_abs, digits))
}

/// Parse an A1 cell reference. Syntactically valid references outside the
/// sheet grid are an `InvalidArgument`.
fn parse_cell_part(text: &str) -> XlsResult<Option<CellReference>> {
    let Some((col_abs, letters, row_abs, digits)) = split_cell(text) else {
        return Ok(None);
    };
    // Letters past IV are not a column (LOG10 is a name, not a cell).
    let Some(col) = column_index(letters).filter(|c| *c <= 0xFF) else {
        return Ok(None);
    };
    let row: u32 = match digits.parse::<u32>() {
        Ok(r) if r >= 1 => r - 1,
        Ok(_) => return Ok(None),
        Err(_) => u32::MAX,
    };
    CellReference::new(row, col, !row_abs, !col_abs).map(Some)
}

fn parse_col_part(text: &str) -> Option<(u32, bool)> {
    let (abs, letters) = match text.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    column_index(letters).filter(|c| *c <= 0xFF).map(|c| (c, abs))
}

fn parse_row_part(text: &str) -> Option<(u32, bool)> {
    let (abs, digits) = match text.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<u32>() {
        Ok(r) if (1..=65536).contains(&r) => Some((r - 1, abs)),
        _ => None,
    }
}

/// Functions whose arguments are taken as references (ranges stay ranges).
fn takes_reference_args(index: u16) -> bool {
    matches!(
        index,
        0 | 4 | 5 | 6 | 7 | 8 | 9 | 12 | 28 | 29 | 36 | 37 | 76 | 77 | 101 | 102 | 169 | 183
            | 345 | 346 | 347
    )
}

fn set_reference_class(mut ptg: Ptg, class: OperandClass) -> Ptg {
    if matches!(
        ptg,
        Ptg::Ref { .. }
            | Ptg::Area { .. }
            | Ptg::Ref3d { .. }
            | Ptg::Area3d { .. }
            | Ptg::Name { .. }
            | Ptg::NameX { .. }
    ) {
        ptg.set_operand_class(class);
    }
    ptg
}

fn emit(node: &Node, class: OperandClass, out: &mut Vec<Ptg>) -> XlsResult<()> {
    match node {
        Node::Operand(ptg) => out.push(set_reference_class(ptg.clone(), class)),
        Node::Missing => out.push(Ptg::MissingArg),
        Node::Paren(inner) => {
            emit(inner, class, out)?;
            out.push(Ptg::Paren);
        },
        Node::Unary(op, operand) => {
            emit(operand, OperandClass::Value, out)?;
            out.push(op.clone());
        },
        Node::Binary(op, left, right) => {
            emit(left, OperandClass::Value, out)?;
            emit(right, OperandClass::Value, out)?;
            out.push(op.clone());
        },
        Node::Function(meta, args) if meta.index == FUNCTION_INDEX_IF => emit_if(args, out)?,
        Node::Function(meta, args) if meta.index == FUNCTION_INDEX_SUM && args.len() == 1 => {
            emit(&args[0], OperandClass::Reference, out)?;
            out.push(Ptg::Attr(AttrPtg::sum()));
        },
        Node::Function(meta, args) => {
            let arg_class = if takes_reference_args(meta.index) {
                OperandClass::Reference
            } else {
                OperandClass::Value
            };
            for arg in args {
                emit(arg, arg_class, out)?;
            }
            if meta.has_fixed_args() {
                out.push(Ptg::Func {
                    class: OperandClass::Value,
                    index: meta.index,
                });
            } else {
                out.push(Ptg::FuncVar {
                    class: OperandClass::Value,
                    arg_count: args.len() as u8,
                    index: meta.index,
                });
            }
        },
    }
    Ok(())
}

fn token_span_size(tokens: &[Ptg]) -> XlsResult<u16> {
    u16::try_from(super::ptg::tokens_size(tokens))
        .map_err(|_| syntax_error("IF branch exceeds 65535 bytes"))
}

/// IF(c, t[, f]) compiles to
/// `c tAttrIf(t+4) t tAttrSkip(f+7) f tAttrSkip(3) tFuncVar(IF)`,
/// or without a false branch `c tAttrIf(t+4) t tAttrSkip(3) tFuncVar(IF)`.
/// Jump distances count the bytes after the attribute token.
fn emit_if(args: &[Node], out: &mut Vec<Ptg>) -> XlsResult<()> {
    emit(&args[0], OperandClass::Value, out)?;
    let if_index = out.len();
    out.push(Ptg::Attr(AttrPtg::if_attr(0)));
    emit(&args[1], OperandClass::Reference, out)?;
    let skip_after_true = out.len();
    out.push(Ptg::Attr(AttrPtg::skip(0)));
    let true_size = token_span_size(&out[if_index + 1..skip_after_true])?;
    out[if_index] = Ptg::Attr(AttrPtg::if_attr(true_size + 4));

    if let Some(false_arg) = args.get(2) {
        emit(false_arg, OperandClass::Reference, out)?;
        let skip_after_false = out.len();
        out.push(Ptg::Attr(AttrPtg::skip(3)));
        let false_size = token_span_size(&out[skip_after_true + 1..skip_after_false])?;
        out[skip_after_true] = Ptg::Attr(AttrPtg::skip(false_size + 4 + 3));
    } else {
        out[skip_after_true] = Ptg::Attr(AttrPtg::skip(3));
    }
    out.push(Ptg::FuncVar {
        class: OperandClass::Value,
        arg_count: args.len() as u8,
        index: FUNCTION_INDEX_IF,
    });
    Ok(())
}
