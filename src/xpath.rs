//! Restricted path-expression grammar: tokenizer, recursive-descent
//! parser, and evaluator.
//!
//! Supported surface: child (`/`) and descendant (`//`) steps, `*` name
//! tests, trailing `text()`, positional predicates (`[n]`), `last()`,
//! `position()` with comparisons and `mod`, `count()`, predicates over
//! child element text with numeric-else-lexical comparison, `contains()`,
//! `and`/`or`/`not()`, and the `preceding::name` axis used by the
//! distinct-value idiom `field[not(. = preceding::field)]`.
//!
//! The parser produces an arena of expression nodes addressed by integer
//! ids; evaluation walks the arena against a [`Document`] and cannot fail
//! at runtime: unmatched paths yield empty results, not errors.

use std::collections::HashSet;

use crate::{
    document::{Document, NodeId},
    error::{CoreError, Result},
};

pub type ExprId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NameTest {
    Name(String),
    Any,
}

impl NameTest {
    fn matches(&self, tag: &str) -> bool {
        match self {
            NameTest::Name(name) => name == tag,
            NameTest::Any => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub axis: Axis,
    pub test: NameTest,
    pub predicates: Vec<ExprId>,
}

#[derive(Debug, Clone)]
pub struct PathExpr {
    pub steps: Vec<Step>,
    pub absolute: bool,
    pub text_result: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Literal(String),
    ContextText,
    Path(PathExpr),
    Preceding(String),
    Position,
    Last,
    Count(PathExpr),
    Contains(ExprId, ExprId),
    Not(ExprId),
    And(ExprId, ExprId),
    Or(ExprId, ExprId),
    Mod(ExprId, ExprId),
    Compare(CmpOp, ExprId, ExprId),
}

#[derive(Debug, Clone)]
enum QueryKind {
    Path(PathExpr),
    Count(PathExpr),
}

/// A parsed top-level query expression.
#[derive(Debug, Clone)]
pub struct Query {
    kind: QueryKind,
    arena: Vec<Expr>,
    pub source: String,
}

/// A parsed standalone condition (the FLWOR `where` clause), evaluated
/// per node with the same grammar as step predicates.
#[derive(Debug, Clone)]
pub struct Condition {
    root: ExprId,
    arena: Vec<Expr>,
    pub source: String,
}

/// Result of evaluating a top-level query.
#[derive(Debug, Clone)]
pub enum PathResult {
    Nodes {
        nodes: Vec<NodeId>,
        text_result: bool,
    },
    Count(usize),
}

// ---------------------------------------------------------------------------
// Tokenizer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Dot,
    Star,
    Axis(String),
    Name(String),
    Number(f64),
    Literal(String),
    Op(CmpOp),
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn tokenize(source: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    tokens.push(Token::DoubleSlash);
                } else {
                    tokens.push(Token::Slash);
                }
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(CmpOp::Eq));
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(CmpOp::Ne));
                } else {
                    return Err("'!' must be followed by '='".to_string());
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(CmpOp::Le));
                } else {
                    tokens.push(Token::Op(CmpOp::Lt));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(CmpOp::Ge));
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => literal.push(ch),
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::Literal(literal));
            }
            '0'..='9' => {
                let mut number = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        number.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let parsed: f64 = number
                    .parse()
                    .map_err(|_| format!("invalid number '{number}'"))?;
                tokens.push(Token::Number(parsed));
            }
            c if is_name_start(c) => {
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if is_name_char(ch) {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // A name followed by '::' is an axis specifier.
                let mut lookahead = chars.clone();
                if lookahead.next() == Some(':') && lookahead.next() == Some(':') {
                    chars.next();
                    chars.next();
                    tokens.push(Token::Axis(name));
                } else {
                    tokens.push(Token::Name(name));
                }
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    arena: Vec<Expr>,
}

enum StepOrText {
    Step(Step),
    Text,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            arena: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> std::result::Result<(), String> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {expected:?}, found {token:?}")),
            None => Err(format!("expected {expected:?}, found end of input")),
        }
    }

    fn push(&mut self, expr: Expr) -> ExprId {
        self.arena.push(expr);
        self.arena.len() - 1
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn parse_path(&mut self) -> std::result::Result<PathExpr, String> {
        let (mut axis, absolute) = match self.peek() {
            Some(Token::DoubleSlash) => {
                self.next();
                (Axis::Descendant, true)
            }
            Some(Token::Slash) => {
                self.next();
                (Axis::Child, true)
            }
            _ => (Axis::Child, false),
        };

        let mut steps = Vec::new();
        let mut text_result = false;
        loop {
            match self.parse_step(axis)? {
                StepOrText::Step(step) => steps.push(step),
                StepOrText::Text => {
                    if steps.is_empty() {
                        return Err("text() requires a preceding step".to_string());
                    }
                    text_result = true;
                    break;
                }
            }
            match self.peek() {
                Some(Token::Slash) => {
                    self.next();
                    axis = Axis::Child;
                }
                Some(Token::DoubleSlash) => {
                    self.next();
                    axis = Axis::Descendant;
                }
                _ => break,
            }
        }

        if steps.is_empty() {
            return Err("path has no steps".to_string());
        }
        Ok(PathExpr {
            steps,
            absolute,
            text_result,
        })
    }

    fn parse_step(&mut self, axis: Axis) -> std::result::Result<StepOrText, String> {
        let test = match self.next() {
            Some(Token::Star) => NameTest::Any,
            Some(Token::Name(name)) => {
                if name == "text" && self.peek() == Some(&Token::LParen) {
                    self.next();
                    self.expect(&Token::RParen)?;
                    return Ok(StepOrText::Text);
                }
                NameTest::Name(name)
            }
            Some(token) => return Err(format!("expected step name, found {token:?}")),
            None => return Err("expected step name, found end of input".to_string()),
        };

        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.next();
            let expr = self.parse_or()?;
            self.expect(&Token::RBracket)?;
            predicates.push(expr);
        }
        Ok(StepOrText::Step(Step {
            axis,
            test,
            predicates,
        }))
    }

    fn parse_or(&mut self) -> std::result::Result<ExprId, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Name("or".to_string())) {
            self.next();
            let right = self.parse_and()?;
            left = self.push(Expr::Or(left, right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> std::result::Result<ExprId, String> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::Name("and".to_string())) {
            self.next();
            let right = self.parse_comparison()?;
            left = self.push(Expr::And(left, right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> std::result::Result<ExprId, String> {
        let left = self.parse_mod()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.next();
            let right = self.parse_mod()?;
            return Ok(self.push(Expr::Compare(op, left, right)));
        }
        Ok(left)
    }

    fn parse_mod(&mut self) -> std::result::Result<ExprId, String> {
        let mut left = self.parse_primary()?;
        while self.peek() == Some(&Token::Name("mod".to_string())) {
            self.next();
            let right = self.parse_primary()?;
            left = self.push(Expr::Mod(left, right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> std::result::Result<ExprId, String> {
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.next();
                Ok(self.push(Expr::Number(n)))
            }
            Some(Token::Literal(s)) => {
                self.next();
                Ok(self.push(Expr::Literal(s)))
            }
            Some(Token::Dot) => {
                self.next();
                Ok(self.push(Expr::ContextText))
            }
            Some(Token::LParen) => {
                self.next();
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Axis(axis)) => {
                self.next();
                if axis != "preceding" {
                    return Err(format!("unsupported axis '{axis}::'"));
                }
                match self.next() {
                    Some(Token::Name(name)) => Ok(self.push(Expr::Preceding(name))),
                    other => Err(format!("expected name after 'preceding::', found {other:?}")),
                }
            }
            Some(Token::Slash) | Some(Token::DoubleSlash) => {
                let path = self.parse_path()?;
                Ok(self.push(Expr::Path(path)))
            }
            Some(Token::Name(name)) => {
                if self.peek_at(1) == Some(&Token::LParen) {
                    self.next();
                    self.next();
                    return self.parse_function(&name);
                }
                let path = self.parse_path()?;
                Ok(self.push(Expr::Path(path)))
            }
            other => Err(format!("expected expression, found {other:?}")),
        }
    }

    /// Called with the name and opening parenthesis already consumed.
    fn parse_function(&mut self, name: &str) -> std::result::Result<ExprId, String> {
        match name {
            "last" => {
                self.expect(&Token::RParen)?;
                Ok(self.push(Expr::Last))
            }
            "position" => {
                self.expect(&Token::RParen)?;
                Ok(self.push(Expr::Position))
            }
            "not" => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(self.push(Expr::Not(inner)))
            }
            "contains" => {
                let left = self.parse_or()?;
                self.expect(&Token::Comma)?;
                let right = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(self.push(Expr::Contains(left, right)))
            }
            "count" => {
                let path = self.parse_path()?;
                self.expect(&Token::RParen)?;
                Ok(self.push(Expr::Count(path)))
            }
            other => Err(format!("unknown function '{other}()'")),
        }
    }
}

/// Parse a top-level query: either a path expression or `count(path)`.
pub fn parse_query(source: &str) -> Result<Query> {
    let tokens =
        tokenize(source).map_err(|reason| CoreError::invalid_query(source, reason))?;
    let mut parser = Parser::new(tokens);

    let kind = if parser.peek() == Some(&Token::Name("count".to_string()))
        && parser.peek_at(1) == Some(&Token::LParen)
    {
        parser.next();
        parser.next();
        let path = parser
            .parse_path()
            .map_err(|reason| CoreError::invalid_query(source, reason))?;
        parser
            .expect(&Token::RParen)
            .map_err(|reason| CoreError::invalid_query(source, reason))?;
        QueryKind::Count(path)
    } else {
        let path = parser
            .parse_path()
            .map_err(|reason| CoreError::invalid_query(source, reason))?;
        QueryKind::Path(path)
    };

    if !parser.at_end() {
        return Err(CoreError::invalid_query(source, "trailing input after query"));
    }
    Ok(Query {
        kind,
        arena: parser.arena,
        source: source.to_string(),
    })
}

/// Parse a standalone condition with the predicate grammar.
pub fn parse_condition(source: &str) -> Result<Condition> {
    let tokens =
        tokenize(source).map_err(|reason| CoreError::invalid_query(source, reason))?;
    let mut parser = Parser::new(tokens);
    let root = parser
        .parse_or()
        .map_err(|reason| CoreError::invalid_query(source, reason))?;
    if !parser.at_end() {
        return Err(CoreError::invalid_query(
            source,
            "trailing input after condition",
        ));
    }
    Ok(Condition {
        root,
        arena: parser.arena,
        source: source.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Evaluation

#[derive(Debug, Clone)]
enum EvalValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Nodes(Vec<NodeId>),
}

struct EvalContext<'d> {
    doc: &'d Document,
    node: NodeId,
    position: usize,
    size: usize,
}

impl Query {
    pub fn evaluate(&self, doc: &Document) -> PathResult {
        match &self.kind {
            QueryKind::Count(path) => {
                PathResult::Count(eval_path(&self.arena, doc, path, None).len())
            }
            QueryKind::Path(path) => PathResult::Nodes {
                nodes: eval_path(&self.arena, doc, path, None),
                text_result: path.text_result,
            },
        }
    }
}

impl Condition {
    /// Evaluate against one node with its position in the candidate set.
    pub fn matches(&self, doc: &Document, node: NodeId, position: usize, size: usize) -> bool {
        let ctx = EvalContext {
            doc,
            node,
            position,
            size,
        };
        let value = eval_expr(&self.arena, &ctx, self.root);
        predicate_truth(&value, position)
    }
}

/// Evaluate a path from `origin` (`None` = the document node).
fn eval_path(
    arena: &[Expr],
    doc: &Document,
    path: &PathExpr,
    origin: Option<NodeId>,
) -> Vec<NodeId> {
    // Contexts for the first step; `None` stands for the document node,
    // whose only child is the root element.
    let mut contexts: Vec<Option<NodeId>> = vec![match (path.absolute, origin) {
        (true, _) | (false, None) => None,
        (false, Some(node)) => Some(node),
    }];

    for step in &path.steps {
        let mut next: Vec<NodeId> = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        for context in &contexts {
            let candidates: Vec<NodeId> = match (step.axis, context) {
                (Axis::Child, None) => vec![doc.root],
                (Axis::Child, Some(node)) => doc.nodes[*node].children.clone(),
                (Axis::Descendant, None) => {
                    let mut all = vec![doc.root];
                    all.extend(doc.descendants(doc.root));
                    all
                }
                (Axis::Descendant, Some(node)) => doc.descendants(*node),
            };
            let mut group: Vec<NodeId> = candidates
                .into_iter()
                .filter(|&id| step.test.matches(&doc.nodes[id].tag))
                .collect();

            // Each predicate filters the group and renumbers positions for
            // the next one, matching XPath's left-to-right semantics.
            for &pred in &step.predicates {
                let size = group.len();
                group = group
                    .into_iter()
                    .enumerate()
                    .filter(|(idx, id)| {
                        let ctx = EvalContext {
                            doc,
                            node: *id,
                            position: idx + 1,
                            size,
                        };
                        let value = eval_expr(arena, &ctx, pred);
                        predicate_truth(&value, idx + 1)
                    })
                    .map(|(_, id)| id)
                    .collect();
            }

            for id in group {
                if seen.insert(id) {
                    next.push(id);
                }
            }
        }
        // Arena indices are document order; keep results in it.
        next.sort_unstable();
        contexts = next.into_iter().map(Some).collect();
        if contexts.is_empty() {
            return Vec::new();
        }
    }

    contexts.into_iter().flatten().collect()
}

fn eval_expr(arena: &[Expr], ctx: &EvalContext<'_>, id: ExprId) -> EvalValue {
    match &arena[id] {
        Expr::Number(n) => EvalValue::Number(*n),
        Expr::Literal(s) => EvalValue::Text(s.clone()),
        Expr::ContextText => EvalValue::Text(ctx.doc.text(ctx.node).to_string()),
        Expr::Position => EvalValue::Number(ctx.position as f64),
        Expr::Last => EvalValue::Number(ctx.size as f64),
        Expr::Path(path) => {
            let origin = if path.absolute { None } else { Some(ctx.node) };
            EvalValue::Nodes(eval_path(arena, ctx.doc, path, origin))
        }
        Expr::Count(path) => {
            let origin = if path.absolute { None } else { Some(ctx.node) };
            EvalValue::Number(eval_path(arena, ctx.doc, path, origin).len() as f64)
        }
        Expr::Preceding(name) => EvalValue::Nodes(
            (0..ctx.node)
                .filter(|&id| ctx.doc.nodes[id].tag == *name)
                .collect(),
        ),
        Expr::Contains(left, right) => {
            let haystack = to_text(ctx, &eval_expr(arena, ctx, *left));
            let needle = to_text(ctx, &eval_expr(arena, ctx, *right));
            EvalValue::Bool(haystack.contains(&needle))
        }
        Expr::Not(inner) => {
            let value = eval_expr(arena, ctx, *inner);
            EvalValue::Bool(!truthy(&value))
        }
        Expr::And(left, right) => {
            let l = eval_expr(arena, ctx, *left);
            if !truthy(&l) {
                return EvalValue::Bool(false);
            }
            let r = eval_expr(arena, ctx, *right);
            EvalValue::Bool(truthy(&r))
        }
        Expr::Or(left, right) => {
            let l = eval_expr(arena, ctx, *left);
            if truthy(&l) {
                return EvalValue::Bool(true);
            }
            let r = eval_expr(arena, ctx, *right);
            EvalValue::Bool(truthy(&r))
        }
        Expr::Mod(left, right) => {
            let l = to_number(ctx, &eval_expr(arena, ctx, *left));
            let r = to_number(ctx, &eval_expr(arena, ctx, *right));
            EvalValue::Number(l % r)
        }
        Expr::Compare(op, left, right) => {
            let l = eval_expr(arena, ctx, *left);
            let r = eval_expr(arena, ctx, *right);
            EvalValue::Bool(compare(ctx, *op, &l, &r))
        }
    }
}

fn truthy(value: &EvalValue) -> bool {
    match value {
        EvalValue::Bool(b) => *b,
        EvalValue::Number(n) => *n != 0.0 && !n.is_nan(),
        EvalValue::Text(t) => !t.is_empty(),
        EvalValue::Nodes(nodes) => !nodes.is_empty(),
    }
}

/// A bare numeric predicate selects by position; everything else is
/// truthiness.
fn predicate_truth(value: &EvalValue, position: usize) -> bool {
    match value {
        EvalValue::Number(n) => *n == position as f64,
        other => truthy(other),
    }
}

fn to_text(ctx: &EvalContext<'_>, value: &EvalValue) -> String {
    match value {
        EvalValue::Text(t) => t.clone(),
        EvalValue::Number(n) => n.to_string(),
        EvalValue::Bool(b) => b.to_string(),
        EvalValue::Nodes(nodes) => nodes
            .first()
            .map(|&id| ctx.doc.text(id).to_string())
            .unwrap_or_default(),
    }
}

fn to_number(ctx: &EvalContext<'_>, value: &EvalValue) -> f64 {
    match value {
        EvalValue::Number(n) => *n,
        EvalValue::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        EvalValue::Text(t) => t.trim().parse().unwrap_or(f64::NAN),
        EvalValue::Nodes(nodes) => nodes
            .first()
            .and_then(|&id| ctx.doc.text(id).trim().parse().ok())
            .unwrap_or(f64::NAN),
    }
}

/// Node-set operands compare existentially; scalars compare numerically
/// when both sides parse as numbers, lexically otherwise.
fn compare(ctx: &EvalContext<'_>, op: CmpOp, left: &EvalValue, right: &EvalValue) -> bool {
    let left_texts = operand_texts(ctx, left);
    let right_texts = operand_texts(ctx, right);
    left_texts.iter().any(|l| {
        right_texts
            .iter()
            .any(|r| scalar_compare(op, l, r))
    })
}

fn operand_texts(ctx: &EvalContext<'_>, value: &EvalValue) -> Vec<String> {
    match value {
        EvalValue::Nodes(nodes) => nodes
            .iter()
            .map(|&id| ctx.doc.text(id).to_string())
            .collect(),
        other => vec![to_text(ctx, other)],
    }
}

fn scalar_compare(op: CmpOp, left: &str, right: &str) -> bool {
    let numeric = match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => Some((l, r)),
        _ => None,
    };
    match numeric {
        Some((l, r)) => match op {
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
        },
        None => match op {
            CmpOp::Eq => left == right,
            CmpOp::Ne => left != right,
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
            CmpOp::Gt => left > right,
            CmpOp::Ge => left >= right,
        },
    }
}
