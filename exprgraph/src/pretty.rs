//! RcDoc-based s-expression printer with termcolor annotations.
//!
//! Renders the expression below a node in the language's surface syntax, e.g. `(< 1 2)`,
//! `(+ x x)` or `(f 1 x 2)`. Long forms break after the head and indent their operands.
//! Printing only reads the graph. Forms nested deeper than [`MAX_PRINT_DEPTH`] are elided as
//! `...`.
use std::io::{self, Write};

use pretty::{FmtWrite, RcDoc, RenderAnnotated};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::{
    graph::{ExprGraph, NodeId},
    node::ExprView,
};

/// Nesting depth below which subexpressions are printed as `...`.
pub const MAX_PRINT_DEPTH: usize = 128;

/// Styles used to annotate parts of the pretty-printed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// Parentheses are colored by nesting depth so matching pairs share a color.
    Paren(u8),
    Operator, // <, <=, +, *, ...
    Callee,   // function names in calls
    Ident,    // variables
    Literal,  // integers
    Error,    // edges into reclaimed nodes
    Elided,   // subexpressions beyond the depth limit
}

impl Style {
    fn to_color_spec(self) -> ColorSpec {
        let mut s = ColorSpec::new();
        match self {
            Style::Paren(depth) => {
                let fg = match depth % 6 {
                    0 => Color::Blue,
                    1 => Color::Green,
                    2 => Color::White,
                    3 => Color::Yellow,
                    4 => Color::Red,
                    5 => Color::Magenta,
                    _ => unreachable!(),
                };
                s.set_fg(Some(fg)).set_dimmed(true);
            }
            Style::Operator => {
                s.set_fg(Some(Color::Yellow)).set_bold(true);
            }
            Style::Callee => {
                s.set_fg(Some(Color::Cyan)).set_bold(true);
            }
            Style::Ident => {
                s.set_fg(Some(Color::Green)).set_bold(true);
            }
            Style::Literal => {
                s.set_fg(Some(Color::Magenta));
            }
            Style::Error => {
                s.set_fg(Some(Color::Red)).set_bold(true);
            }
            Style::Elided => {
                s.set_dimmed(true);
            }
        }
        s
    }
}

#[inline]
fn lparen(depth: usize) -> RcDoc<'static, Style> {
    RcDoc::as_string("(").annotate(Style::Paren((depth % 6) as u8))
}

#[inline]
fn rparen(depth: usize) -> RcDoc<'static, Style> {
    RcDoc::as_string(")").annotate(Style::Paren((depth % 6) as u8))
}

/// `(head operand operand ...)`, breaking after the head when it does not fit.
fn form(
    head: RcDoc<'static, Style>,
    operands: Vec<RcDoc<'static, Style>>,
    depth: usize,
) -> RcDoc<'static, Style> {
    let body = if operands.is_empty() {
        RcDoc::nil()
    } else {
        RcDoc::line()
            .append(RcDoc::intersperse(operands, RcDoc::line()))
            .nest(2)
    };
    lparen(depth)
        .append(head)
        .append(body)
        .append(rparen(depth))
        .group()
}

fn to_doc_with_depth(graph: &ExprGraph, id: NodeId, depth: usize) -> RcDoc<'static, Style> {
    let Some(view) = graph.view(id) else {
        return RcDoc::as_string(format!("<dangling {id:?}>")).annotate(Style::Error);
    };
    if depth >= MAX_PRINT_DEPTH && !view.is_int_literal() && !view.is_var_use() {
        return RcDoc::as_string("...").annotate(Style::Elided);
    }
    let next = depth + 1;

    match view {
        ExprView::IntLiteral(value) => RcDoc::as_string(value).annotate(Style::Literal),
        ExprView::VarUse(name) => RcDoc::as_string(name.to_string()).annotate(Style::Ident),
        ExprView::Comparison { op, left, right } => form(
            RcDoc::as_string(op.as_ref().to_string()).annotate(Style::Operator),
            vec![
                to_doc_with_depth(graph, left, next),
                to_doc_with_depth(graph, right, next),
            ],
            depth,
        ),
        ExprView::Arithmetic { op, operands } => form(
            RcDoc::as_string(op.as_ref().to_string()).annotate(Style::Operator),
            operands
                .iter()
                .map(|&child| to_doc_with_depth(graph, child, next))
                .collect(),
            depth,
        ),
        ExprView::Call { name, args } => form(
            RcDoc::as_string(name.to_string()).annotate(Style::Callee),
            args.iter()
                .map(|&child| to_doc_with_depth(graph, child, next))
                .collect(),
            depth,
        ),
    }
}

// A writer that maps Style annotations to termcolor ColorSpec on a WriteColor sink.
struct ColorWriter<'w, W: WriteColor + Write> {
    out: &'w mut W,
}

impl<'a, 'w, W: WriteColor + Write> RenderAnnotated<'a, Style> for ColorWriter<'w, W> {
    fn push_annotation(&mut self, ann: &'a Style) -> io::Result<()> {
        self.out.set_color(&ann.to_color_spec())
    }
    fn pop_annotation(&mut self) -> io::Result<()> {
        self.out.reset()
    }
}

impl<'w, W: WriteColor + Write> pretty::Render for ColorWriter<'w, W> {
    type Error = io::Error;
    fn write_str(&mut self, s: &str) -> io::Result<usize> {
        self.out.write_all(s.as_bytes())?;
        Ok(s.len())
    }
    fn write_str_all(&mut self, s: &str) -> io::Result<()> {
        self.out.write_all(s.as_bytes())
    }
    fn fail_doc(&self) -> Self::Error {
        io::Error::other("render failed")
    }
}

/// Retrieve the width of the terminal, or 80 if it cannot be determined.
fn terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

/// Printable expression rooted at one node. Obtained from [`ExprGraph::pretty`].
#[derive(Clone, Copy)]
pub struct PrettyNode<'g> {
    graph: &'g ExprGraph,
    id: NodeId,
}

impl<'g> PrettyNode<'g> {
    /// Annotated document for composing or rendering manually.
    pub fn pretty_doc(&self) -> RcDoc<'static, Style> {
        to_doc_with_depth(self.graph, self.id, 0)
    }

    /// Render with colors to any termcolor writer at the given width.
    pub fn pretty_render_to<W: WriteColor + Write>(
        &self,
        width: usize,
        out: &mut W,
    ) -> io::Result<()> {
        let mut cw = ColorWriter { out };
        self.pretty_doc().render_raw(width, &mut cw)
    }

    /// Print to stdout with colors (TTY-aware) at the terminal width.
    pub fn pretty_print(&self) -> io::Result<()> {
        let stdout = StandardStream::stdout(ColorChoice::Auto);
        let mut stdout = stdout.lock();
        self.pretty_render_to(terminal_width(), &mut stdout)?;
        writeln!(stdout)
    }

    /// Plain string at the given width, without colors.
    pub fn pretty_string_width(&self, width: usize) -> String {
        let mut buf = String::new();
        let _ = self.pretty_doc().render_fmt(width, &mut buf);
        buf
    }

    pub fn pretty_string(&self) -> String {
        self.pretty_string_width(80)
    }
}

impl<'g> std::fmt::Display for PrettyNode<'g> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut w = FmtWrite::new(f);
        self.pretty_doc().render_raw(80, &mut w)
    }
}

impl<'g> std::fmt::Debug for PrettyNode<'g> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrettyNode({:?}: {})", self.id, self)
    }
}

impl ExprGraph {
    pub fn pretty(&self, id: NodeId) -> PrettyNode<'_> {
        PrettyNode { graph: self, id }
    }
}

#[cfg(test)]
mod tests {
    use crate::node::{ArithmeticOp, ComparisonOp};

    use super::*;

    #[test]
    fn prints_surface_syntax() {
        let mut graph = ExprGraph::new();
        let one = graph.int_literal(1);
        let two = graph.int_literal(2);
        let x = graph.var_use("x");
        let lt = graph.comparison(ComparisonOp::Lt, one, two).unwrap();
        let sum = graph.arithmetic(ArithmeticOp::Add, [x, x]).unwrap();
        let call = graph.call("f", [one, x, two]).unwrap();

        assert_eq!(graph.pretty(lt).to_string(), "(< 1 2)");
        assert_eq!(graph.pretty(sum).pretty_string(), "(+ x x)");
        assert_eq!(graph.pretty(call).to_string(), "(f 1 x 2)");
        assert_eq!(graph.pretty(x).to_string(), "x");
    }

    #[test]
    fn nullary_call_and_negative_literal() {
        let mut graph = ExprGraph::new();
        let m = graph.int_literal(-7);
        let now = graph.call("now", Vec::<NodeId>::new()).unwrap();
        let ge = graph.comparison(ComparisonOp::Ge, now, m).unwrap();
        assert_eq!(graph.pretty(ge).to_string(), "(>= (now) -7)");
    }

    #[test]
    fn long_forms_break_and_indent() {
        let mut graph = ExprGraph::new();
        let args: Vec<_> = (0..8).map(|i| graph.var_use(format!("argument_{i}"))).collect();
        let call = graph.call("a_function_with_a_long_name", args).unwrap();

        let narrow = graph.pretty(call).pretty_string_width(20);
        let lines: Vec<_> = narrow.lines().collect();
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], "(a_function_with_a_long_name");
        assert_eq!(lines[1], "  argument_0");
        assert!(lines[8].ends_with("argument_7)"));
    }

    #[test]
    fn deep_chains_are_elided() {
        let mut graph = ExprGraph::new();
        let mut top = graph.int_literal(0);
        for _ in 0..100_000 {
            top = graph.arithmetic(ArithmeticOp::Sub, [top]).unwrap();
        }

        assert!(graph.pretty(top).to_string().contains("..."));
        let printed = graph.pretty(top).pretty_string_width(1_000_000);
        assert!(printed.starts_with("(- (- "));
        assert!(printed.contains("..."));
        assert!(!printed.contains('0'));
        assert_eq!(printed.matches('(').count(), MAX_PRINT_DEPTH);
        assert_eq!(printed.matches(')').count(), MAX_PRINT_DEPTH);
    }

    #[test]
    fn forms_at_the_depth_limit_are_printed_whole() {
        let mut graph = ExprGraph::new();
        let mut top = graph.var_use("x");
        for _ in 0..MAX_PRINT_DEPTH {
            top = graph.call("g", [top]).unwrap();
        }
        let printed = graph.pretty(top).pretty_string_width(1_000_000);
        assert!(!printed.contains("..."));
        assert!(printed.contains("(g x)"));
    }

    #[test]
    fn printing_does_not_touch_counts() {
        let mut graph = ExprGraph::new();
        let x = graph.var_use("x");
        let sum = graph.arithmetic(ArithmeticOp::Mul, [x, x]).unwrap();
        let before = graph.stats();
        let _ = graph.pretty(sum).to_string();
        assert_eq!(graph.stats(), before);
        assert_eq!(graph.reference_count(x), Some(2));
    }
}
