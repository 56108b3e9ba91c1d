//! Text to syntax tree.
//!
//! The grammar (`xpath.pest`) accepts the union of the supported XPath 2.0 and 3.x syntax; the
//! builder below rejects 3.x constructs when parsing for [`Language::XPath2`].

use pest::Parser;
use pest::iterators::Pair;
use tracing::trace;

use crate::engine::runtime::{Error, ErrorCode};
use crate::xdm::cast::{parse_decimal, parse_double};

pub mod ast;

#[derive(pest_derive::Parser)]
#[grammar = "parser/xpath.pest"]
pub struct XPathParser;

/// Language level an expression is parsed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    XPath2,
    #[default]
    XPath3,
}

impl Language {
    pub fn label(self) -> &'static str {
        match self {
            Language::XPath2 => "XPath 2.0",
            Language::XPath3 => "XPath 3.1",
        }
    }
}

/// Parses `input` into a syntax tree. Syntax errors are reported as `err:XPST0003` carrying the
/// location text produced by pest.
pub fn parse(input: &str, language: Language) -> Result<ast::Expr, Error> {
    trace!(input, language = language.label(), "parsing expression");
    let mut pairs = XPathParser::parse(Rule::xpath, input).map_err(syntax_error)?;
    let root = pairs.next().ok_or_else(|| syntax("empty input", None))?;
    let expr = root
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| syntax("empty input", None))?;
    AstBuilder { language }.build(expr)
}

fn syntax_error(e: pest::error::Error<Rule>) -> Error {
    let span = match e.location {
        pest::error::InputLocation::Pos(p) => (p, p),
        pest::error::InputLocation::Span(s) => s,
    };
    Error::from_code(ErrorCode::XPST0003, format!("syntax error\n{e}")).with_span(span)
}

fn syntax(msg: impl Into<String>, span: Option<ast::Span>) -> Error {
    let err = Error::from_code(ErrorCode::XPST0003, msg);
    match span {
        Some(s) => err.with_span(s),
        None => err,
    }
}

fn span_of(pair: &Pair<Rule>) -> ast::Span {
    let s = pair.as_span();
    (s.start(), s.end())
}

fn unexpected(pair: &Pair<Rule>) -> Error {
    syntax(format!("unexpected {:?} `{}`", pair.as_rule(), pair.as_str()), Some(span_of(pair)))
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::K_FOR
            | Rule::K_LET
            | Rule::K_IN
            | Rule::K_RETURN
            | Rule::K_SOME
            | Rule::K_EVERY
            | Rule::K_SATISFIES
            | Rule::K_IF
            | Rule::K_THEN
            | Rule::K_ELSE
            | Rule::K_OR
            | Rule::K_AND
            | Rule::K_TO
            | Rule::K_INSTANCE
            | Rule::K_OF
            | Rule::K_TREAT
            | Rule::K_AS
            | Rule::K_CASTABLE
            | Rule::K_CAST
    )
}

/// Rules that stand for their operand when they hold nothing else.
fn is_pass_through(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::expr
            | Rule::or_expr
            | Rule::and_expr
            | Rule::comparison_expr
            | Rule::string_concat_expr
            | Rule::range_expr
            | Rule::additive_expr
            | Rule::multiplicative_expr
            | Rule::union_expr
            | Rule::intersect_except_expr
            | Rule::instanceof_expr
            | Rule::treat_expr
            | Rule::castable_expr
            | Rule::cast_expr
            | Rule::unary_expr
            | Rule::simple_map_expr
            | Rule::path_expr
            | Rule::postfix_expr
            | Rule::parenthesized_expr
    )
}

fn only_child<'i>(pair: &Pair<'i, Rule>) -> Option<Pair<'i, Rule>> {
    let mut inner = pair.clone().into_inner();
    match (inner.next(), inner.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// Walks down the precedence chain to the first rule that contributes structure. Every operand
/// otherwise passes through about twenty single-child rules, so this runs as a loop rather than
/// as recursion through [`AstBuilder::build`].
fn collapse(mut pair: Pair<Rule>) -> Pair<Rule> {
    loop {
        let next = if is_pass_through(pair.as_rule()) {
            only_child(&pair)
        } else if pair.as_rule() == Rule::relative_path_expr {
            // a lone filter step is its postfix expression, not a path
            only_child(&pair).and_then(|step| only_child(&step)).filter(|p| p.as_rule() == Rule::postfix_expr)
        } else {
            None
        };
        match next {
            Some(inner) => pair = inner,
            None => return pair,
        }
    }
}

fn build_literal(pair: Pair<Rule>) -> Result<ast::Expr, Error> {
    let lit = match pair.as_rule() {
        Rule::integer_literal => {
            let text = pair.as_str();
            match text.parse::<i64>() {
                Ok(i) => ast::Literal::Integer(i),
                Err(_) => ast::Literal::Decimal(
                    parse_decimal(text).ok_or_else(|| syntax("integer literal out of range", Some(span_of(&pair))))?,
                ),
            }
        }
        Rule::decimal_literal => ast::Literal::Decimal(
            parse_decimal(pair.as_str()).ok_or_else(|| syntax("decimal literal out of range", Some(span_of(&pair))))?,
        ),
        Rule::double_literal => ast::Literal::Double(parse_double(pair.as_str()).ok_or_else(|| unexpected(&pair))?),
        _ => ast::Literal::String(string_literal(&pair)),
    };
    Ok(ast::Expr::Literal(lit))
}

struct AstBuilder {
    language: Language,
}

impl AstBuilder {
    fn require_3x(&self, what: &str, pair: &Pair<Rule>) -> Result<(), Error> {
        match self.language {
            Language::XPath3 => Ok(()),
            Language::XPath2 => Err(syntax(
                format!("{what} is not available in {}", self.language.label()),
                Some(span_of(pair)),
            )),
        }
    }

    /// Operands of a rule, skipping keyword tokens.
    fn operands<'i>(pair: &Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
        pair.clone().into_inner().filter(|p| !is_keyword(p.as_rule()))
    }

    fn build(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let pair = collapse(pair);
        match pair.as_rule() {
            Rule::expr => self.build_sequence(pair),
            Rule::for_expr | Rule::let_expr | Rule::quantified_expr => self.build_binding_expr(pair),
            Rule::if_expr => self.build_if(pair),
            Rule::or_expr => self.fold_logical(pair, ast::BinaryOp::Or),
            Rule::and_expr => self.fold_logical(pair, ast::BinaryOp::And),
            Rule::comparison_expr => self.build_comparison(pair),
            Rule::string_concat_expr | Rule::simple_map_expr => self.fold_3x_operator(pair),
            Rule::range_expr => self.build_range(pair),
            Rule::additive_expr | Rule::multiplicative_expr => self.fold_arithmetic(pair),
            Rule::union_expr | Rule::intersect_except_expr => self.fold_set_ops(pair),
            Rule::instanceof_expr | Rule::treat_expr => self.build_type_test(pair),
            Rule::castable_expr | Rule::cast_expr => self.build_cast(pair),
            Rule::unary_expr => self.build_unary(pair),
            Rule::path_expr | Rule::descendant_path | Rule::root_path | Rule::relative_path_expr => {
                self.build_path(pair)
            }
            Rule::postfix_expr => self.build_postfix(pair),
            Rule::integer_literal | Rule::decimal_literal | Rule::double_literal | Rule::string_literal => {
                build_literal(pair)
            }
            Rule::var_ref
            | Rule::parenthesized_expr
            | Rule::context_item_expr
            | Rule::named_function_ref
            | Rule::function_call => self.build_primary(pair),
            _ => Err(unexpected(&pair)),
        }
    }

    fn build_sequence(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut items = pair.into_inner().map(|p| self.build(p)).collect::<Result<Vec<_>, _>>()?;
        if items.len() == 1 { Ok(items.remove(0)) } else { Ok(ast::Expr::Sequence(items)) }
    }

    fn build_binding_expr(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        match pair.as_rule() {
            Rule::for_expr => {
                let (bindings, body) = self.bindings_and_body(&pair)?;
                Ok(ast::Expr::ForExpr { bindings, return_expr: Box::new(body) })
            }
            Rule::let_expr => {
                self.require_3x("`let`", &pair)?;
                let (bindings, body) = self.bindings_and_body(&pair)?;
                Ok(ast::Expr::LetExpr { bindings, return_expr: Box::new(body) })
            }
            _ => {
                let kind = match pair.clone().into_inner().next().map(|p| p.as_rule()) {
                    Some(Rule::K_EVERY) => ast::Quantifier::Every,
                    _ => ast::Quantifier::Some,
                };
                let (bindings, satisfies) = self.bindings_and_body(&pair)?;
                Ok(ast::Expr::Quantified { kind, bindings, satisfies: Box::new(satisfies) })
            }
        }
    }

    fn build_if(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut parts = Self::operands(&pair);
        let cond = self.next_expr(&mut parts, &pair)?;
        let then_expr = self.next_expr(&mut parts, &pair)?;
        let else_expr = self.next_expr(&mut parts, &pair)?;
        Ok(ast::Expr::IfThenElse { cond: Box::new(cond), then_expr: Box::new(then_expr), else_expr: Box::new(else_expr) })
    }

    /// `||` and `!`, both left-associative and XPath 3 only.
    fn fold_3x_operator(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let concat = pair.as_rule() == Rule::string_concat_expr;
        let mut inner = pair.clone().into_inner();
        let mut expr = self.next_expr(&mut inner, &pair)?;
        while let Some(op) = inner.next() {
            self.require_3x(if concat { "the `||` operator" } else { "the `!` operator" }, &op)?;
            let (left, right) = (Box::new(expr), Box::new(self.next_expr(&mut inner, &pair)?));
            expr = if concat { ast::Expr::StringConcat { left, right } } else { ast::Expr::SimpleMap { left, right } };
        }
        Ok(expr)
    }

    fn build_range(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut parts = Self::operands(&pair);
        let start = self.next_expr(&mut parts, &pair)?;
        match parts.next() {
            Some(end) => Ok(ast::Expr::Range { start: Box::new(start), end: Box::new(self.build(end)?) }),
            None => Ok(start),
        }
    }

    fn build_type_test(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let rule = pair.as_rule();
        let mut parts = Self::operands(&pair);
        let expr = self.next_expr(&mut parts, &pair)?;
        let Some(ty) = parts.next() else { return Ok(expr) };
        let ty = self.sequence_type(ty)?;
        Ok(if rule == Rule::instanceof_expr {
            ast::Expr::InstanceOf { expr: Box::new(expr), ty }
        } else {
            ast::Expr::TreatAs { expr: Box::new(expr), ty }
        })
    }

    fn build_cast(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let rule = pair.as_rule();
        let mut parts = Self::operands(&pair);
        let expr = self.next_expr(&mut parts, &pair)?;
        let Some(ty) = parts.next() else { return Ok(expr) };
        let ty = self.single_type(ty)?;
        Ok(if rule == Rule::castable_expr {
            ast::Expr::CastableAs { expr: Box::new(expr), ty }
        } else {
            ast::Expr::CastAs { expr: Box::new(expr), ty }
        })
    }

    fn build_unary(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut signs = Vec::new();
        let mut operand = None;
        for p in pair.clone().into_inner() {
            match p.as_rule() {
                Rule::unary_op if p.as_str() == "-" => signs.push(ast::UnarySign::Minus),
                Rule::unary_op => signs.push(ast::UnarySign::Plus),
                _ => operand = Some(self.build(p)?),
            }
        }
        let mut expr = operand.ok_or_else(|| unexpected(&pair))?;
        for sign in signs.into_iter().rev() {
            expr = ast::Expr::Unary { sign, expr: Box::new(expr) };
        }
        Ok(expr)
    }

    fn build_path(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        match pair.as_rule() {
            Rule::descendant_path => {
                let rel = pair.clone().into_inner().next().ok_or_else(|| unexpected(&pair))?;
                let steps = self.steps(rel)?;
                Ok(ast::Expr::Path(ast::PathExpr { start: ast::PathStart::RootDescendant, steps }))
            }
            Rule::root_path => {
                let steps = match pair.into_inner().next() {
                    Some(rel) => self.steps(rel)?,
                    None => Vec::new(),
                };
                Ok(ast::Expr::Path(ast::PathExpr { start: ast::PathStart::Root, steps }))
            }
            Rule::relative_path_expr => {
                let steps = self.steps(pair)?;
                Ok(ast::Expr::Path(ast::PathExpr { start: ast::PathStart::Relative, steps }))
            }
            _ => {
                let inner = pair.clone().into_inner().next().ok_or_else(|| unexpected(&pair))?;
                self.build(inner)
            }
        }
    }

    fn build_primary(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        match pair.as_rule() {
            Rule::var_ref => {
                let name = pair.clone().into_inner().next().ok_or_else(|| unexpected(&pair))?;
                Ok(ast::Expr::VarRef(self.qname(name)?))
            }
            Rule::parenthesized_expr => match pair.into_inner().next() {
                Some(inner) => self.build(inner),
                None => Ok(ast::Expr::EmptySequence),
            },
            Rule::context_item_expr => Ok(ast::Expr::ContextItem),
            Rule::named_function_ref => {
                self.require_3x("named function references", &pair)?;
                let span = span_of(&pair);
                let mut inner = pair.clone().into_inner();
                let name = self.qname(inner.next().ok_or_else(|| unexpected(&pair))?)?;
                let arity = inner
                    .next()
                    .and_then(|a| a.as_str().parse::<usize>().ok())
                    .ok_or_else(|| unexpected(&pair))?;
                Ok(ast::Expr::NamedFunctionRef { name, arity, span: Some(span) })
            }
            _ => {
                let span = span_of(&pair);
                let mut inner = pair.clone().into_inner();
                let name = self.qname(inner.next().ok_or_else(|| unexpected(&pair))?)?;
                let args = match inner.next() {
                    Some(list) => self.arguments(list)?,
                    None => Vec::new(),
                };
                Ok(ast::Expr::FunctionCall { name, args, span: Some(span) })
            }
        }
    }

    fn next_expr<'i>(
        &self,
        parts: &mut impl Iterator<Item = Pair<'i, Rule>>,
        parent: &Pair<'i, Rule>,
    ) -> Result<ast::Expr, Error> {
        let p = parts.next().ok_or_else(|| unexpected(parent))?;
        self.build(p)
    }

    fn bindings_and_body(&self, pair: &Pair<Rule>) -> Result<(Vec<ast::Binding>, ast::Expr), Error> {
        let mut bindings = Vec::new();
        let mut body = None;
        for p in Self::operands(pair) {
            match p.as_rule() {
                Rule::for_binding | Rule::let_binding => {
                    let mut inner = Self::operands(&p);
                    let var = self.qname(inner.next().ok_or_else(|| unexpected(&p))?)?;
                    let expr = self.next_expr(&mut inner, &p)?;
                    bindings.push(ast::Binding { var, expr });
                }
                _ => body = Some(self.build(p)?),
            }
        }
        Ok((bindings, body.ok_or_else(|| unexpected(pair))?))
    }

    fn fold_logical(&self, pair: Pair<Rule>, op: ast::BinaryOp) -> Result<ast::Expr, Error> {
        let mut parts = Self::operands(&pair);
        let mut expr = self.next_expr(&mut parts, &pair)?;
        for right in parts {
            expr = ast::Expr::Binary { left: Box::new(expr), op, right: Box::new(self.build(right)?) };
        }
        Ok(expr)
    }

    fn fold_arithmetic(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.clone().into_inner();
        let mut expr = self.next_expr(&mut inner, &pair)?;
        while let Some(op) = inner.next() {
            let op = match op.as_str() {
                "+" => ast::BinaryOp::Add,
                "-" => ast::BinaryOp::Sub,
                "*" => ast::BinaryOp::Mul,
                "div" => ast::BinaryOp::Div,
                "idiv" => ast::BinaryOp::IDiv,
                "mod" => ast::BinaryOp::Mod,
                _ => return Err(unexpected(&op)),
            };
            let right = self.next_expr(&mut inner, &pair)?;
            expr = ast::Expr::Binary { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn fold_set_ops(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.clone().into_inner();
        let mut expr = self.next_expr(&mut inner, &pair)?;
        while let Some(op) = inner.next() {
            let op = match op.as_str() {
                "union" | "|" => ast::SetOp::Union,
                "intersect" => ast::SetOp::Intersect,
                "except" => ast::SetOp::Except,
                _ => return Err(unexpected(&op)),
            };
            let right = self.next_expr(&mut inner, &pair)?;
            expr = ast::Expr::SetOp { left: Box::new(expr), op, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn build_comparison(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.clone().into_inner();
        let left = self.next_expr(&mut inner, &pair)?;
        let Some(op) = inner.next() else { return Ok(left) };
        let right = Box::new(self.next_expr(&mut inner, &pair)?);
        let left = Box::new(left);
        use ast::{Expr, GeneralComp as GC, NodeComp as NC, ValueComp as VC};
        let expr = match (op.as_rule(), op.as_str()) {
            (Rule::general_comp, "=") => Expr::GeneralComparison { left, op: GC::Eq, right },
            (Rule::general_comp, "!=") => Expr::GeneralComparison { left, op: GC::Ne, right },
            (Rule::general_comp, "<") => Expr::GeneralComparison { left, op: GC::Lt, right },
            (Rule::general_comp, "<=") => Expr::GeneralComparison { left, op: GC::Le, right },
            (Rule::general_comp, ">") => Expr::GeneralComparison { left, op: GC::Gt, right },
            (Rule::general_comp, ">=") => Expr::GeneralComparison { left, op: GC::Ge, right },
            (Rule::value_comp, "eq") => Expr::ValueComparison { left, op: VC::Eq, right },
            (Rule::value_comp, "ne") => Expr::ValueComparison { left, op: VC::Ne, right },
            (Rule::value_comp, "lt") => Expr::ValueComparison { left, op: VC::Lt, right },
            (Rule::value_comp, "le") => Expr::ValueComparison { left, op: VC::Le, right },
            (Rule::value_comp, "gt") => Expr::ValueComparison { left, op: VC::Gt, right },
            (Rule::value_comp, "ge") => Expr::ValueComparison { left, op: VC::Ge, right },
            (Rule::node_comp, "is") => Expr::NodeComparison { left, op: NC::Is, right },
            (Rule::node_comp, "<<") => Expr::NodeComparison { left, op: NC::Precedes, right },
            (Rule::node_comp, ">>") => Expr::NodeComparison { left, op: NC::Follows, right },
            _ => return Err(unexpected(&op)),
        };
        Ok(expr)
    }

    fn build_postfix(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let mut inner = pair.clone().into_inner();
        let mut expr = self.next_expr(&mut inner, &pair)?;
        let mut predicates = Vec::new();
        for p in inner {
            match p.as_rule() {
                Rule::predicate => predicates.push(self.predicate(p)?),
                Rule::argument_list => {
                    self.require_3x("dynamic function calls", &p)?;
                    if !predicates.is_empty() {
                        expr = ast::Expr::Filter { base: Box::new(expr), predicates: std::mem::take(&mut predicates) };
                    }
                    expr = ast::Expr::DynamicCall { callee: Box::new(expr), args: self.arguments(p)? };
                }
                _ => return Err(unexpected(&p)),
            }
        }
        if !predicates.is_empty() {
            expr = ast::Expr::Filter { base: Box::new(expr), predicates };
        }
        Ok(expr)
    }

    fn arguments(&self, list: Pair<Rule>) -> Result<Vec<ast::Expr>, Error> {
        list.into_inner().map(|a| self.build(a)).collect()
    }

    fn predicate(&self, pair: Pair<Rule>) -> Result<ast::Expr, Error> {
        let inner = pair.clone().into_inner().next().ok_or_else(|| unexpected(&pair))?;
        self.build(inner)
    }

    fn steps(&self, rel: Pair<Rule>) -> Result<Vec<ast::Step>, Error> {
        let mut out = Vec::new();
        for p in rel.into_inner() {
            match p.as_rule() {
                Rule::path_sep if p.as_str() == "//" => out.push(ast::Step::descendant_or_self()),
                Rule::path_sep => {}
                Rule::step_expr => out.push(self.step(p)?),
                _ => return Err(unexpected(&p)),
            }
        }
        Ok(out)
    }

    fn step(&self, pair: Pair<Rule>) -> Result<ast::Step, Error> {
        let inner = pair.clone().into_inner().next().ok_or_else(|| unexpected(&pair))?;
        if inner.as_rule() == Rule::postfix_expr {
            return Ok(ast::Step::Expr(self.build_postfix(inner)?));
        }
        let mut parts = inner.clone().into_inner();
        let head = parts.next().ok_or_else(|| unexpected(&inner))?;
        let (axis, test) = match head.as_rule() {
            Rule::full_step => {
                let mut h = head.clone().into_inner();
                let axis_pair = h.next().ok_or_else(|| unexpected(&head))?;
                let axis = ast::Axis::from_name(axis_pair.as_str()).ok_or_else(|| unexpected(&axis_pair))?;
                let test = self.node_test(h.next().ok_or_else(|| unexpected(&head))?)?;
                (axis, test)
            }
            Rule::abbrev_parent => (ast::Axis::Parent, ast::NodeTest::Kind(ast::KindTest::AnyKind)),
            Rule::abbrev_attribute => {
                let t = head.clone().into_inner().next().ok_or_else(|| unexpected(&head))?;
                (ast::Axis::Attribute, self.node_test(t)?)
            }
            Rule::abbrev_child => {
                let t = head.clone().into_inner().next().ok_or_else(|| unexpected(&head))?;
                let test = self.node_test(t)?;
                let axis = match &test {
                    ast::NodeTest::Kind(ast::KindTest::Attribute { .. }) => ast::Axis::Attribute,
                    ast::NodeTest::Kind(ast::KindTest::NamespaceNode) => ast::Axis::Namespace,
                    _ => ast::Axis::Child,
                };
                (axis, test)
            }
            _ => return Err(unexpected(&head)),
        };
        let predicates = parts.map(|p| self.predicate(p)).collect::<Result<Vec<_>, _>>()?;
        Ok(ast::Step::Axis { axis, test, predicates })
    }

    fn node_test(&self, pair: Pair<Rule>) -> Result<ast::NodeTest, Error> {
        let inner = pair.clone().into_inner().next().ok_or_else(|| unexpected(&pair))?;
        match inner.as_rule() {
            Rule::kind_test => Ok(ast::NodeTest::Kind(self.kind_test(inner)?)),
            Rule::name_test => {
                let t = inner.clone().into_inner().next().ok_or_else(|| unexpected(&inner))?;
                match t.as_rule() {
                    Rule::qname => Ok(ast::NodeTest::Name(ast::NameTest::QName(self.qname(t)?))),
                    Rule::wildcard => Ok(ast::NodeTest::Name(ast::NameTest::Wildcard(self.wildcard(t)?))),
                    _ => Err(unexpected(&t)),
                }
            }
            _ => Err(unexpected(&inner)),
        }
    }

    fn wildcard(&self, pair: Pair<Rule>) -> Result<ast::WildcardName, Error> {
        let text = pair.as_str();
        if text == "*" {
            return Ok(ast::WildcardName::Any);
        }
        if let Some(local) = text.strip_prefix("*:") {
            return Ok(ast::WildcardName::LocalWildcard(local.to_string()));
        }
        if let Some(rest) = text.strip_prefix("Q{") {
            self.require_3x("`Q{uri}*` wildcards", &pair)?;
            let uri = rest.strip_suffix("}*").ok_or_else(|| unexpected(&pair))?;
            return Ok(ast::WildcardName::UriWildcard(uri.to_string()));
        }
        text.strip_suffix(":*")
            .map(|prefix| ast::WildcardName::NsWildcard(prefix.to_string()))
            .ok_or_else(|| unexpected(&pair))
    }

    fn kind_test(&self, pair: Pair<Rule>) -> Result<ast::KindTest, Error> {
        let inner = pair.clone().into_inner().next().ok_or_else(|| unexpected(&pair))?;
        Ok(match inner.as_rule() {
            Rule::any_kind_test => ast::KindTest::AnyKind,
            Rule::text_test => ast::KindTest::Text,
            Rule::comment_test => ast::KindTest::Comment,
            Rule::namespace_node_test => {
                self.require_3x("`namespace-node()`", &inner)?;
                ast::KindTest::NamespaceNode
            }
            Rule::pi_test => {
                let target = inner.clone().into_inner().next().map(|t| match t.as_rule() {
                    Rule::string_literal => string_literal(&t).trim().to_string(),
                    _ => t.as_str().to_string(),
                });
                ast::KindTest::ProcessingInstruction(target)
            }
            Rule::document_test => match inner.clone().into_inner().next() {
                Some(el) => ast::KindTest::Document(Some(Box::new(self.element_or_attribute(el, true)?))),
                None => ast::KindTest::Document(None),
            },
            Rule::element_test => self.element_or_attribute(inner, true)?,
            Rule::attribute_test => self.element_or_attribute(inner, false)?,
            _ => return Err(unexpected(&inner)),
        })
    }

    fn element_or_attribute(&self, pair: Pair<Rule>, element: bool) -> Result<ast::KindTest, Error> {
        let mut name = None;
        let mut ty = None;
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::name_or_any => {
                    let n = p.clone().into_inner().next().ok_or_else(|| unexpected(&p))?;
                    if n.as_rule() == Rule::qname {
                        name = Some(self.qname(n)?);
                    }
                }
                Rule::type_name => {
                    let n = p.clone().into_inner().next().ok_or_else(|| unexpected(&p))?;
                    ty = Some(self.qname(n)?);
                }
                _ => return Err(unexpected(&p)),
            }
        }
        Ok(if element { ast::KindTest::Element { name, ty } } else { ast::KindTest::Attribute { name, ty } })
    }

    fn qname(&self, pair: Pair<Rule>) -> Result<ast::QName, Error> {
        let inner = pair.clone().into_inner().next();
        if let Some(p) = &inner
            && p.as_rule() == Rule::uri_qualified_name
        {
            self.require_3x("`Q{uri}local` names", &pair)?;
        }
        Ok(ast::QName::parse(pair.as_str()))
    }

    fn sequence_type(&self, pair: Pair<Rule>) -> Result<ast::SequenceType, Error> {
        let mut inner = pair.clone().into_inner();
        let first = inner.next().ok_or_else(|| unexpected(&pair))?;
        if first.as_rule() == Rule::empty_sequence_type {
            return Ok(ast::SequenceType::EmptySequence);
        }
        let item_pair = first.clone().into_inner().next().ok_or_else(|| unexpected(&first))?;
        let item = match item_pair.as_rule() {
            Rule::kind_test => ast::ItemType::Kind(self.kind_test(item_pair)?),
            Rule::item_test => ast::ItemType::Item,
            Rule::function_test => {
                self.require_3x("`function(*)`", &item_pair)?;
                ast::ItemType::AnyFunction
            }
            Rule::qname => ast::ItemType::Atomic(self.qname(item_pair)?),
            _ => return Err(unexpected(&item_pair)),
        };
        let occ = match inner.next().map(|o| o.as_str().to_string()).as_deref() {
            Some("?") => ast::Occurrence::ZeroOrOne,
            Some("*") => ast::Occurrence::ZeroOrMore,
            Some("+") => ast::Occurrence::OneOrMore,
            _ => ast::Occurrence::One,
        };
        Ok(ast::SequenceType::Typed { item, occ })
    }

    fn single_type(&self, pair: Pair<Rule>) -> Result<ast::SingleType, Error> {
        let mut inner = pair.clone().into_inner();
        let atomic = self.qname(inner.next().ok_or_else(|| unexpected(&pair))?)?;
        Ok(ast::SingleType { atomic, optional: inner.next().is_some() })
    }
}

fn string_literal(pair: &Pair<Rule>) -> String {
    match pair.clone().into_inner().next() {
        Some(content) if content.as_rule() == Rule::dbl_string_inner => content.as_str().replace("\"\"", "\""),
        Some(content) => content.as_str().replace("''", "'"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{Axis, Expr, Literal, NameTest, NodeTest, PathStart, Step};
    use rstest::rstest;

    fn parse3(input: &str) -> Expr {
        parse(input, Language::XPath3).unwrap()
    }

    #[rstest]
    #[case("1", Expr::Literal(Literal::Integer(1)))]
    #[case("'it''s'", Expr::Literal(Literal::String("it's".into())))]
    #[case("\"a\"\"b\"", Expr::Literal(Literal::String("a\"b".into())))]
    #[case("1.5e0", Expr::Literal(Literal::Double(1.5)))]
    #[case("()", Expr::EmptySequence)]
    #[case("(: note :) .", Expr::ContextItem)]
    fn primaries(#[case] input: &str, #[case] expected: Expr) {
        assert_eq!(parse3(input), expected);
    }

    #[rstest]
    fn abbreviated_steps_expand() {
        let Expr::Path(path) = parse3("//a/@id/..") else { panic!("expected a path") };
        assert_eq!(path.start, PathStart::RootDescendant);
        let axes: Vec<Axis> = path
            .steps
            .iter()
            .map(|s| match s {
                Step::Axis { axis, .. } => *axis,
                Step::Expr(_) => panic!("unexpected filter step"),
            })
            .collect();
        assert_eq!(axes, vec![Axis::Child, Axis::Attribute, Axis::Parent]);
    }

    #[rstest]
    fn double_slash_inside_path_inserts_descendant_step() {
        let Expr::Path(path) = parse3("a//b") else { panic!("expected a path") };
        assert_eq!(path.steps.len(), 3);
        assert_eq!(path.steps[1], Step::descendant_or_self());
    }

    #[rstest]
    fn name_test_keeps_prefix() {
        let Expr::Path(path) = parse3("child::x:item[1]") else { panic!("expected a path") };
        match &path.steps[0] {
            Step::Axis { test: NodeTest::Name(NameTest::QName(q)), predicates, .. } => {
                assert_eq!(q.prefix.as_deref(), Some("x"));
                assert_eq!(q.local, "item");
                assert_eq!(predicates.len(), 1);
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[rstest]
    fn keywords_need_boundaries() {
        // `order` starts with `or` but is a name
        assert!(matches!(parse3("order or fork"), Expr::Binary { op: ast::BinaryOp::Or, .. }));
        assert!(matches!(parse3("4 div 2"), Expr::Binary { op: ast::BinaryOp::Div, .. }));
    }

    #[rstest]
    #[case("let $x := 1 return $x")]
    #[case("'a' || 'b'")]
    #[case("(1, 2) ! string()")]
    #[case("fn:abs#1")]
    #[case("$f(1)")]
    #[case("Q{http://example.com}a")]
    fn xpath3_constructs_rejected_in_xpath2(#[case] input: &str) {
        assert!(parse(input, Language::XPath3).is_ok(), "{input} should parse as XPath 3");
        let err = parse(input, Language::XPath2).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0003, "{input}");
    }

    #[rstest]
    #[case("1 +")]
    #[case("a[")]
    #[case("for $x in return 1")]
    fn syntax_errors(#[case] input: &str) {
        let err = parse(input, Language::XPath3).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0003);
        assert!(err.span.is_some());
    }

    #[rstest]
    fn reserved_names_are_kind_tests() {
        let Expr::Path(path) = parse3("text()") else { panic!("expected a path") };
        assert!(matches!(&path.steps[0], Step::Axis { test: NodeTest::Kind(ast::KindTest::Text), .. }));
    }

    #[rstest]
    fn quantified_and_for_bindings() {
        let Expr::Quantified { kind, bindings, .. } = parse3("every $a in (1,2), $b in 3 satisfies $a < $b")
        else {
            panic!("expected a quantified expression")
        };
        assert_eq!(kind, ast::Quantifier::Every);
        assert_eq!(bindings.len(), 2);
        assert!(matches!(parse3("for $i in 1 to 3 return $i * 2"), Expr::ForExpr { .. }));
    }

    #[rstest]
    #[case("abs(", "-1", ")")]
    #[case("(", "1 + 2", ")")]
    #[case("(1)[", "1", "]")]
    fn deep_nesting_parses_on_a_small_stack(#[case] open: &str, #[case] inner: &str, #[case] close: &str) {
        let input = format!("{}{inner}{}", open.repeat(64), close.repeat(64));
        let parsed = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || parse(&input, Language::XPath3).is_ok())
            .unwrap()
            .join()
            .unwrap();
        assert!(parsed);
    }

    #[rstest]
    fn unary_minus_nests() {
        assert!(matches!(
            parse3("--1"),
            Expr::Unary { sign: ast::UnarySign::Minus, expr } if matches!(*expr, Expr::Unary { .. })
        ));
    }
}
