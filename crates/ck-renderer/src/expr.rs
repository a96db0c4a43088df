//! Math expression grammar for code spans.
//!
//! Unprefixed code spans hold small math expressions (`x^2 + 4`,
//! `pill(3x,"red")`). They render to two forms at once: presentational
//! markup for display and a plain "voice" string for narration. The
//! grammar is intentionally narrow: numbers, identifiers, quoted strings,
//! binary operators, parentheses, and a fixed set of helper functions.

use std::fmt::Write;

use ck_dom::{escape_attr, escape_text};

/// Error type for expression parsing and rendering.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExprError {
    /// A character outside the grammar.
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    /// Input ended mid-expression.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// A token that cannot start or continue an expression here.
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),
    /// A helper function was called with the wrong arguments.
    #[error("invalid arguments for {0}()")]
    Helper(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(String),
    Ident(String),
    Str(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, PartialEq)]
enum Expr {
    Num(String),
    Ident(String),
    Str(String),
    Neg(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Group(Box<Expr>),
    Call(String, Vec<Expr>),
}

const OPERATORS: &str = "+-*/^=<>±·×÷≤≥≠";

fn tokenize(src: &str) -> Result<Vec<Tok>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() {
            let mut num = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() || c == '.' {
                    num.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Tok::Num(num));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' || c == '-' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Tok::Ident(ident));
        } else if c == '"' || c == '\'' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some(q) if q == c => break,
                    Some(ch) => s.push(ch),
                    None => return Err(ExprError::UnexpectedEnd),
                }
            }
            tokens.push(Tok::Str(s));
        } else if OPERATORS.contains(c) {
            chars.next();
            tokens.push(Tok::Op(c));
        } else {
            match c {
                '(' => tokens.push(Tok::LParen),
                ')' => tokens.push(Tok::RParen),
                ',' => tokens.push(Tok::Comma),
                _ => return Err(ExprError::UnexpectedChar(c)),
            }
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

fn precedence(op: char) -> u8 {
    match op {
        '=' => 1,
        '<' | '>' | '≤' | '≥' | '≠' => 2,
        '+' | '-' | '±' => 3,
        '*' | '/' | '·' | '×' | '÷' => 4,
        _ => 5, // '^'
    }
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_primary()?;
        while let Some(Tok::Op(op)) = self.peek() {
            let op = *op;
            let prec = precedence(op);
            if prec < min_prec {
                break;
            }
            self.next();
            // '^' is right-associative.
            let next_min = if op == '^' { prec } else { prec + 1 };
            let rhs = self.parse_expr(next_min)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next().ok_or(ExprError::UnexpectedEnd)? {
            Tok::Num(n) => Ok(Expr::Num(n)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::Ident(name) => {
                if self.peek() == Some(&Tok::LParen) {
                    self.next();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Tok::RParen) {
                        loop {
                            args.push(self.parse_expr(0)?);
                            match self.next() {
                                Some(Tok::Comma) => {}
                                Some(Tok::RParen) => break,
                                Some(tok) => {
                                    return Err(ExprError::UnexpectedToken(format!("{tok:?}")));
                                }
                                None => return Err(ExprError::UnexpectedEnd),
                            }
                        }
                    } else {
                        self.next();
                    }
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Tok::Op('-') => Ok(Expr::Neg(Box::new(self.parse_primary()?))),
            Tok::LParen => {
                let inner = self.parse_expr(0)?;
                match self.next() {
                    Some(Tok::RParen) => Ok(Expr::Group(Box::new(inner))),
                    _ => Err(ExprError::UnexpectedEnd),
                }
            }
            tok => Err(ExprError::UnexpectedToken(format!("{tok:?}"))),
        }
    }
}

fn parse(src: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser {
        tokens: tokenize(src)?,
        pos: 0,
    };
    let expr = parser.parse_expr(0)?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ExprError::UnexpectedToken(format!("{tok:?}"))),
    }
}

/// Render an expression source to `(markup, voice)`.
pub fn render(src: &str) -> Result<(String, String), ExprError> {
    let expr = parse(src)?;
    Ok((markup(&expr)?, voice(&expr)?))
}

/// The string payload of a `Str` or `Ident` argument.
fn string_value<'a>(expr: &'a Expr, helper: &'static str) -> Result<&'a str, ExprError> {
    match expr {
        Expr::Str(s) | Expr::Ident(s) => Ok(s),
        _ => Err(ExprError::Helper(helper)),
    }
}

fn markup(expr: &Expr) -> Result<String, ExprError> {
    let out = match expr {
        Expr::Num(n) => format!("<mn>{n}</mn>"),
        Expr::Ident(s) => format!("<mi>{}</mi>", escape_text(s)),
        Expr::Str(s) => escape_text(s),
        Expr::Neg(inner) => format!("<mo>−</mo>{}", markup(inner)?),
        Expr::Binary(op, lhs, rhs) => {
            let sym = match op {
                '*' => '·',
                '-' => '−',
                other => *other,
            };
            format!("{}<mo>{sym}</mo>{}", markup(lhs)?, markup(rhs)?)
        }
        Expr::Group(inner) => format!("<mrow><mo>(</mo>{}<mo>)</mo></mrow>", markup(inner)?),
        Expr::Call(name, args) => call_markup(name, args)?,
    };
    Ok(out)
}

fn call_markup(name: &str, args: &[Expr]) -> Result<String, ExprError> {
    match name {
        "pill" => {
            let [expr, color, rest @ ..] = args else {
                return Err(ExprError::Helper("pill"));
            };
            let color = string_value(color, "pill")?;
            let inner = markup(expr)?;
            match rest {
                [] => Ok(format!(
                    r#"<span class="pill {}">{inner}</span>"#,
                    escape_attr(color)
                )),
                [target] => {
                    let target = string_value(target, "pill")?;
                    Ok(format!(
                        r#"<span class="pill step-target {}" data-to="{}" tabindex="0">{inner}</span>"#,
                        escape_attr(color),
                        escape_attr(target)
                    ))
                }
                _ => Err(ExprError::Helper("pill")),
            }
        }
        "reveal" => {
            let [expr, when] = args else {
                return Err(ExprError::Helper("reveal"));
            };
            let when = string_value(when, "reveal")?;
            Ok(format!(
                r#"<mrow class="reveal" data-when="{}">{}</mrow>"#,
                escape_attr(when),
                markup(expr)?
            ))
        }
        "input" => {
            let (value, placeholder) = match args {
                [Expr::Num(n)] => (n, "???"),
                [Expr::Num(n), ph] => (n, string_value(ph, "input")?),
                _ => return Err(ExprError::Helper("input")),
            };
            Ok(format!(
                r#"<x-blank solution="{value}" placeholder="{}"></x-blank>"#,
                escape_attr(placeholder)
            ))
        }
        "blank" => {
            let mut out = String::from("<x-blank-mc>");
            for arg in args {
                write!(out, r#"<button class="choice">{}</button>"#, markup(arg)?)
                    .expect("string write");
            }
            out.push_str("</x-blank-mc>");
            Ok(out)
        }
        "arc" => {
            let [value] = args else {
                return Err(ExprError::Helper("arc"));
            };
            Ok(format!(
                "<mover>{}<mo value=\"⌒\">⌒</mo></mover>",
                markup(value)?
            ))
        }
        "var" => {
            let [value] = args else {
                return Err(ExprError::Helper("var"));
            };
            let name = string_value(value, "var")?;
            Ok(format!(
                r#"<span class="var">${{{}}}</span>"#,
                escape_text(name)
            ))
        }
        "class" => {
            let [expr, name] = args else {
                return Err(ExprError::Helper("class"));
            };
            let name = string_value(name, "class")?;
            Ok(format!(
                r#"<mrow class="{}">{}</mrow>"#,
                escape_attr(name),
                markup(expr)?
            ))
        }
        _ => {
            // Unknown functions render literally: name(arg, arg).
            let mut out = format!("<mi>{}</mi><mo>(</mo>", escape_text(name));
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str("<mo>,</mo>");
                }
                out.push_str(&markup(arg)?);
            }
            out.push_str("<mo>)</mo>");
            Ok(out)
        }
    }
}

fn voice(expr: &Expr) -> Result<String, ExprError> {
    let out = match expr {
        Expr::Num(n) => n.clone(),
        Expr::Ident(s) | Expr::Str(s) => s.clone(),
        Expr::Neg(inner) => format!("minus {}", voice(inner)?),
        Expr::Binary(op, lhs, rhs) => {
            let word = match op {
                '+' => "plus",
                '-' => "minus",
                '*' | '·' | '×' => "times",
                '/' | '÷' => "over",
                '^' => "to the power of",
                '=' => "equals",
                '<' => "is less than",
                '>' => "is greater than",
                '≤' => "is at most",
                '≥' => "is at least",
                '≠' => "is not equal to",
                _ => "plus or minus", // '±'
            };
            format!("{} {word} {}", voice(lhs)?, voice(rhs)?)
        }
        Expr::Group(inner) => voice(inner)?,
        Expr::Call(name, args) => match name.as_str() {
            "input" | "blank" => "blank".to_owned(),
            "pill" | "reveal" | "arc" | "var" | "class" => match args.first() {
                Some(first) => voice(first)?,
                None => return Err(ExprError::Helper("voice")),
            },
            _ => {
                let mut parts = vec![name.clone()];
                for arg in args {
                    parts.push(voice(arg)?);
                }
                parts.join(" ")
            }
        },
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_simple_sum() {
        let (markup, voice) = render("x + 2").unwrap();
        assert_eq!(markup, "<mi>x</mi><mo>+</mo><mn>2</mn>");
        assert_eq!(voice, "x plus 2");
    }

    #[test]
    fn test_precedence() {
        let (_, voice) = render("1 + 2 * 3").unwrap();
        assert_eq!(voice, "1 plus 2 times 3");
        let (markup, _) = render("1 + 2 * 3").unwrap();
        // The * binds tighter; rendering order is unchanged either way.
        assert_eq!(
            markup,
            "<mn>1</mn><mo>+</mo><mn>2</mn><mo>·</mo><mn>3</mn>"
        );
    }

    #[test]
    fn test_power_voice() {
        let (_, voice) = render("x^2").unwrap();
        assert_eq!(voice, "x to the power of 2");
    }

    #[test]
    fn test_group() {
        let (markup, voice) = render("(a + b)").unwrap();
        assert_eq!(
            markup,
            "<mrow><mo>(</mo><mi>a</mi><mo>+</mo><mi>b</mi><mo>)</mo></mrow>"
        );
        assert_eq!(voice, "a plus b");
    }

    #[test]
    fn test_pill_helper() {
        let (markup, voice) = render(r#"pill(x,"red")"#).unwrap();
        assert_eq!(markup, r#"<span class="pill red"><mi>x</mi></span>"#);
        assert_eq!(voice, "x");
    }

    #[test]
    fn test_pill_with_target() {
        let (markup, _) = render(r#"pill(4,"blue","t1")"#).unwrap();
        assert_eq!(
            markup,
            r#"<span class="pill step-target blue" data-to="t1" tabindex="0"><mn>4</mn></span>"#
        );
    }

    #[test]
    fn test_input_helper() {
        let (markup, voice) = render("input(42)").unwrap();
        assert_eq!(
            markup,
            r#"<x-blank solution="42" placeholder="???"></x-blank>"#
        );
        assert_eq!(voice, "blank");
    }

    #[test]
    fn test_blank_helper() {
        let (markup, voice) = render("blank(3,5)").unwrap();
        assert_eq!(
            markup,
            concat!(
                "<x-blank-mc>",
                r#"<button class="choice"><mn>3</mn></button>"#,
                r#"<button class="choice"><mn>5</mn></button>"#,
                "</x-blank-mc>"
            )
        );
        assert_eq!(voice, "blank");
    }

    #[test]
    fn test_var_helper() {
        let (markup, _) = render(r#"var("n")"#).unwrap();
        assert_eq!(markup, r#"<span class="var">${n}</span>"#);
    }

    #[test]
    fn test_unknown_function() {
        let (markup, voice) = render("f(x)").unwrap();
        assert_eq!(markup, "<mi>f</mi><mo>(</mo><mi>x</mi><mo>)</mo>");
        assert_eq!(voice, "f x");
    }

    #[test]
    fn test_negation() {
        let (markup, voice) = render("-x").unwrap();
        assert_eq!(markup, "<mo>−</mo><mi>x</mi>");
        assert_eq!(voice, "minus x");
    }

    #[test]
    fn test_parse_errors() {
        assert!(render("").is_err());
        assert!(render("x +").is_err());
        assert!(render("pill()").is_err());
        assert!(render("@!").is_err());
        assert!(render("(a").is_err());
    }
}
