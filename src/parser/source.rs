//! parser::source
//!
//! A small scanner for the subset of the source language the driver needs.
//!
//! # Scope
//!
//! Per-file parsing extracts exactly four things: the package clause, the
//! import declarations, the presence of niladic top-level `init`/`Main`
//! functions, and the composite literals examined by the lint pass. Nothing
//! else in the file is interpreted; unknown constructs are tokenized and
//! skipped.
//!
//! The lexer understands line and block comments, interpreted and raw string
//! literals, rune literals, and numeric literals, so that braces and quotes
//! inside them never confuse the structural scan.

use std::fmt;

/// A scan or parse failure in a single source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    /// File the error occurred in.
    pub file: String,
    /// 1-based line.
    pub line: u32,
    /// What went wrong.
    pub msg: String,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.file, self.line, self.msg)
    }
}

impl std::error::Error for SourceError {}

/// One import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Explicit local name, if any (`_` and `.` included verbatim).
    pub alias: Option<String>,
    /// The quoted import path, decoded.
    pub path: String,
    /// Line of the import spec.
    pub line: u32,
}

/// A composite literal of the form `qualifier.Type{...}`.
///
/// Candidates are collected unconditionally; the lint pass decides which
/// qualifiers resolve to toolchain packages and are therefore checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeLit {
    pub qualifier: String,
    pub type_name: String,
    /// Whether every top-level element is a keyed `Field: value` pair.
    pub all_keyed: bool,
    pub line: u32,
}

/// The information extracted from one source file.
#[derive(Debug, Clone, Default)]
pub struct ParsedSource {
    pub package_name: String,
    pub imports: Vec<Import>,
    pub has_init: bool,
    pub has_niladic_main: bool,
    pub composite_lits: Vec<CompositeLit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBrack,
    RBrack,
    Comma,
    Colon,
    Dot,
    Semi,
    Op,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: u32,
}

struct Lexer<'a> {
    file: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
}

impl<'a> Lexer<'a> {
    fn new(file: &'a str, src: &'a str) -> Self {
        Self {
            file,
            chars: src.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, msg: impl Into<String>) -> SourceError {
        SourceError {
            file: self.file.to_string(),
            line: self.line,
            msg: msg.into(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn lex(mut self) -> Result<Vec<Token>, SourceError> {
        let mut toks = Vec::new();
        while let Some(&c) = self.chars.peek() {
            let line = self.line;
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '/' => {
                    self.bump();
                    match self.chars.peek() {
                        Some('/') => {
                            while let Some(&c) = self.chars.peek() {
                                if c == '\n' {
                                    break;
                                }
                                self.bump();
                            }
                        }
                        Some('*') => {
                            self.bump();
                            self.block_comment()?;
                        }
                        _ => toks.push(Token { tok: Tok::Op, line }),
                    }
                }
                '"' => {
                    self.bump();
                    let s = self.interpreted_string()?;
                    toks.push(Token {
                        tok: Tok::Str(s),
                        line,
                    });
                }
                '`' => {
                    self.bump();
                    let s = self.raw_string()?;
                    toks.push(Token {
                        tok: Tok::Str(s),
                        line,
                    });
                }
                '\'' => {
                    self.bump();
                    self.rune_literal()?;
                    toks.push(Token { tok: Tok::Op, line });
                }
                '.' => {
                    self.bump();
                    match self.chars.peek() {
                        Some(d) if d.is_ascii_digit() => {
                            self.number();
                            toks.push(Token { tok: Tok::Op, line });
                        }
                        Some('.') => {
                            // "..."
                            self.bump();
                            self.bump();
                            toks.push(Token { tok: Tok::Op, line });
                        }
                        _ => toks.push(Token {
                            tok: Tok::Dot,
                            line,
                        }),
                    }
                }
                ':' => {
                    self.bump();
                    if self.chars.peek() == Some(&'=') {
                        self.bump();
                        toks.push(Token { tok: Tok::Op, line });
                    } else {
                        toks.push(Token {
                            tok: Tok::Colon,
                            line,
                        });
                    }
                }
                '(' | ')' | '{' | '}' | '[' | ']' | ',' | ';' => {
                    self.bump();
                    let tok = match c {
                        '(' => Tok::LParen,
                        ')' => Tok::RParen,
                        '{' => Tok::LBrace,
                        '}' => Tok::RBrace,
                        '[' => Tok::LBrack,
                        ']' => Tok::RBrack,
                        ',' => Tok::Comma,
                        _ => Tok::Semi,
                    };
                    toks.push(Token { tok, line });
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            ident.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    toks.push(Token {
                        tok: Tok::Ident(ident),
                        line,
                    });
                }
                c if c.is_ascii_digit() => {
                    self.number();
                    toks.push(Token { tok: Tok::Op, line });
                }
                _ => {
                    self.bump();
                    toks.push(Token { tok: Tok::Op, line });
                }
            }
        }
        Ok(toks)
    }

    fn block_comment(&mut self) -> Result<(), SourceError> {
        loop {
            match self.bump() {
                Some('*') if self.chars.peek() == Some(&'/') => {
                    self.bump();
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(self.error("unterminated block comment")),
            }
        }
    }

    fn interpreted_string(&mut self) -> Result<String, SourceError> {
        let mut s = String::new();
        loop {
            if self.chars.peek() == Some(&'\n') {
                return Err(self.error("unterminated string literal"));
            }
            match self.bump() {
                Some('"') => return Ok(s),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some(c) => s.push(c),
                    None => return Err(self.error("unterminated string literal")),
                },
                None => return Err(self.error("unterminated string literal")),
                Some(c) => s.push(c),
            }
        }
    }

    fn raw_string(&mut self) -> Result<String, SourceError> {
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('`') => return Ok(s),
                Some(c) => s.push(c),
                None => return Err(self.error("unterminated raw string literal")),
            }
        }
    }

    fn rune_literal(&mut self) -> Result<(), SourceError> {
        loop {
            if self.chars.peek() == Some(&'\n') {
                return Err(self.error("unterminated rune literal"));
            }
            match self.bump() {
                Some('\'') => return Ok(()),
                Some('\\') => {
                    self.bump();
                }
                None => return Err(self.error("unterminated rune literal")),
                Some(_) => {}
            }
        }
    }

    fn number(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '.' || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
    }
}

/// Parse one source file.
pub fn parse_source(filename: &str, src: &str) -> Result<ParsedSource, SourceError> {
    let toks = Lexer::new(filename, src).lex()?;
    let err = |line: u32, msg: &str| SourceError {
        file: filename.to_string(),
        line,
        msg: msg.to_string(),
    };

    let mut i = 0;
    match toks.get(i).map(|t| &t.tok) {
        Some(Tok::Ident(kw)) if kw == "package" => i += 1,
        _ => return Err(err(1, "expected package clause")),
    }
    let package_name = match toks.get(i) {
        Some(Token {
            tok: Tok::Ident(name),
            ..
        }) => {
            i += 1;
            name.clone()
        }
        _ => return Err(err(1, "expected package name")),
    };

    let mut parsed = ParsedSource {
        package_name,
        ..ParsedSource::default()
    };

    let mut depth: i32 = 0;
    while i < toks.len() {
        let line = toks[i].line;
        match &toks[i].tok {
            Tok::LBrace => depth += 1,
            Tok::RBrace => depth -= 1,
            Tok::Ident(kw) if kw == "import" && depth == 0 => {
                i = parse_import_decl(filename, &toks, i + 1, &mut parsed.imports)?;
                continue;
            }
            Tok::Ident(kw) if kw == "func" && depth == 0 => {
                if let Some(Token {
                    tok: Tok::Ident(name),
                    ..
                }) = toks.get(i + 1)
                {
                    let niladic = matches!(toks.get(i + 2).map(|t| &t.tok), Some(Tok::LParen))
                        && matches!(toks.get(i + 3).map(|t| &t.tok), Some(Tok::RParen))
                        && matches!(toks.get(i + 4).map(|t| &t.tok), Some(Tok::LBrace));
                    if niladic {
                        match name.as_str() {
                            "init" => parsed.has_init = true,
                            "Main" => parsed.has_niladic_main = true,
                            _ => {}
                        }
                    }
                }
            }
            Tok::Ident(qualifier) => {
                // qualifier.Type{ ... }, unless the selector is part of a
                // larger expression or a function result type.
                if let Some(lit) = match_composite_lit(&toks, i, qualifier, line) {
                    parsed.composite_lits.push(lit);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Ok(parsed)
}

fn parse_import_decl(
    filename: &str,
    toks: &[Token],
    mut i: usize,
    imports: &mut Vec<Import>,
) -> Result<usize, SourceError> {
    let err = |line: u32| SourceError {
        file: filename.to_string(),
        line,
        msg: "malformed import declaration".to_string(),
    };

    let grouped = matches!(toks.get(i).map(|t| &t.tok), Some(Tok::LParen));
    if grouped {
        i += 1;
    }
    loop {
        let line = toks.get(i).map(|t| t.line).unwrap_or(0);
        match toks.get(i).map(|t| &t.tok) {
            Some(Tok::Semi) => {
                i += 1;
                continue;
            }
            Some(Tok::RParen) if grouped => return Ok(i + 1),
            Some(Tok::Str(path)) => {
                imports.push(Import {
                    alias: None,
                    path: path.clone(),
                    line,
                });
                i += 1;
            }
            Some(Tok::Ident(alias)) => {
                let path = match toks.get(i + 1).map(|t| &t.tok) {
                    Some(Tok::Str(path)) => path.clone(),
                    _ => return Err(err(line)),
                };
                imports.push(Import {
                    alias: Some(alias.clone()),
                    path,
                    line,
                });
                i += 2;
            }
            Some(Tok::Dot) => {
                let path = match toks.get(i + 1).map(|t| &t.tok) {
                    Some(Tok::Str(path)) => path.clone(),
                    _ => return Err(err(line)),
                };
                imports.push(Import {
                    alias: Some(".".to_string()),
                    path,
                    line,
                });
                i += 2;
            }
            _ if grouped => return Err(err(line)),
            _ => return Ok(i),
        }
        if !grouped {
            return Ok(i);
        }
    }
}

fn match_composite_lit(
    toks: &[Token],
    i: usize,
    qualifier: &str,
    line: u32,
) -> Option<CompositeLit> {
    if !matches!(toks.get(i + 1).map(|t| &t.tok), Some(Tok::Dot)) {
        return None;
    }
    let type_name = match toks.get(i + 2).map(|t| &t.tok) {
        Some(Tok::Ident(name)) => name.clone(),
        _ => return None,
    };
    if !matches!(toks.get(i + 3).map(|t| &t.tok), Some(Tok::LBrace)) {
        return None;
    }
    // Exclude selectors that are element types of a slice/map literal
    // (`[]q.T{...}`), results of a function signature (`func() q.T {`), or
    // members of a deeper selector chain (`x.q.T{...}`); in those positions
    // the literal's type is not the selector itself.
    if i > 0 {
        match toks[i - 1].tok {
            Tok::RParen | Tok::RBrack | Tok::Dot => return None,
            _ => {}
        }
    }

    // Scan the brace-balanced body; an element is keyed when it carries a
    // top-level colon.
    let mut j = i + 4;
    let mut braces = 0i32;
    let mut parens = 0i32;
    let mut bracks = 0i32;
    let mut elements = 0usize;
    let mut keyed = 0usize;
    let mut cur_has_content = false;
    let mut cur_keyed = false;
    while j < toks.len() {
        let at_top = braces == 0 && parens == 0 && bracks == 0;
        match toks[j].tok {
            Tok::LBrace => braces += 1,
            Tok::RBrace if at_top => {
                if cur_has_content {
                    elements += 1;
                    if cur_keyed {
                        keyed += 1;
                    }
                }
                return Some(CompositeLit {
                    qualifier: qualifier.to_string(),
                    type_name,
                    all_keyed: keyed == elements,
                    line,
                });
            }
            Tok::RBrace => braces -= 1,
            Tok::LParen => parens += 1,
            Tok::RParen => parens -= 1,
            Tok::LBrack => bracks += 1,
            Tok::RBrack => bracks -= 1,
            Tok::Comma if at_top => {
                if cur_has_content {
                    elements += 1;
                    if cur_keyed {
                        keyed += 1;
                    }
                }
                cur_has_content = false;
                cur_keyed = false;
            }
            Tok::Colon if at_top => {
                cur_has_content = true;
                cur_keyed = true;
            }
            _ => cur_has_content = true,
        }
        j += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ParsedSource {
        parse_source("test.go", src).expect("parse failed")
    }

    mod package_clause {
        use super::*;

        #[test]
        fn extracts_package_name() {
            let p = parse("package foo\n");
            assert_eq!(p.package_name, "foo");
        }

        #[test]
        fn leading_comments_are_skipped() {
            let p = parse("// a comment\n/* block */\npackage bar\n");
            assert_eq!(p.package_name, "bar");
        }

        #[test]
        fn missing_clause_is_an_error() {
            let err = parse_source("t.go", "func main() {}\n").unwrap_err();
            assert!(err.msg.contains("package clause"));
        }
    }

    mod imports {
        use super::*;

        #[test]
        fn single_import() {
            let p = parse("package a\nimport \"fmt\"\n");
            assert_eq!(p.imports.len(), 1);
            assert_eq!(p.imports[0].path, "fmt");
            assert_eq!(p.imports[0].alias, None);
        }

        #[test]
        fn grouped_imports_with_aliases() {
            let src = r#"package a

import (
	"fmt"
	foo "app/foo"
	_ "app/bar"
	. "app/baz"
)
"#;
            let p = parse(src);
            let paths: Vec<_> = p.imports.iter().map(|i| i.path.as_str()).collect();
            assert_eq!(paths, vec!["fmt", "app/foo", "app/bar", "app/baz"]);
            assert_eq!(p.imports[1].alias.as_deref(), Some("foo"));
            assert_eq!(p.imports[2].alias.as_deref(), Some("_"));
            assert_eq!(p.imports[3].alias.as_deref(), Some("."));
        }

        #[test]
        fn braces_inside_strings_do_not_confuse_the_scan() {
            let src = "package a\nimport \"fmt\"\nvar s = \"func init() {\"\n";
            let p = parse(src);
            assert!(!p.has_init);
            assert_eq!(p.imports.len(), 1);
        }

        #[test]
        fn raw_strings_may_span_lines() {
            let src = "package a\nvar s = `line1\nfunc init() {\nline3`\nimport \"os\"\n";
            let p = parse(src);
            assert!(!p.has_init);
            assert_eq!(p.imports[0].path, "os");
        }
    }

    mod func_decls {
        use super::*;

        #[test]
        fn detects_niladic_init() {
            let p = parse("package a\nfunc init() {}\n");
            assert!(p.has_init);
        }

        #[test]
        fn init_with_params_is_not_counted() {
            let p = parse("package a\nfunc init(x int) {}\n");
            assert!(!p.has_init);
        }

        #[test]
        fn init_with_result_is_not_counted() {
            let p = parse("package a\nfunc init() int { return 0 }\n");
            assert!(!p.has_init);
        }

        #[test]
        fn methods_are_not_counted() {
            let p = parse("package a\ntype T int\nfunc (t T) init() {}\n");
            assert!(!p.has_init);
        }

        #[test]
        fn detects_niladic_main() {
            let p = parse("package internal\nfunc Main() {}\n");
            assert!(p.has_niladic_main);
        }

        #[test]
        fn nested_funcs_are_ignored() {
            let p = parse("package a\nfunc outer() {\n\tf := func() {}\n\t_ = f\n}\n");
            assert!(!p.has_init);
        }
    }

    mod composite_lits {
        use super::*;

        #[test]
        fn unkeyed_literal_is_collected() {
            let p = parse("package a\nimport \"image\"\nvar v = image.Point{1, 2}\n");
            assert_eq!(p.composite_lits.len(), 1);
            let lit = &p.composite_lits[0];
            assert_eq!(lit.qualifier, "image");
            assert_eq!(lit.type_name, "Point");
            assert!(!lit.all_keyed);
        }

        #[test]
        fn keyed_literal_is_all_keyed() {
            let p = parse("package a\nimport \"image\"\nvar v = image.Point{X: 1, Y: 2}\n");
            assert!(p.composite_lits[0].all_keyed);
        }

        #[test]
        fn empty_literal_is_all_keyed() {
            let p = parse("package a\nimport \"image\"\nvar v = image.Point{}\n");
            assert!(p.composite_lits[0].all_keyed);
        }

        #[test]
        fn slice_element_types_are_not_candidates() {
            let p = parse("package a\nimport \"image\"\nvar v = []image.Point{{1, 2}}\n");
            assert!(p.composite_lits.is_empty());
        }

        #[test]
        fn function_result_types_are_not_candidates() {
            let p = parse(
                "package a\nimport \"time\"\nvar f = func() time.Time {\n\treturn time.Time{}\n}\n",
            );
            assert_eq!(p.composite_lits.len(), 1);
            assert!(p.composite_lits[0].all_keyed);
        }

        #[test]
        fn nested_braces_stay_within_their_element() {
            let src = "package a\nimport \"image\"\nvar v = image.Rectangle{Min: image.Point{1, 2}}\n";
            let p = parse(src);
            // The outer literal is keyed; the inner one is its own candidate.
            let outer = p
                .composite_lits
                .iter()
                .find(|l| l.type_name == "Rectangle")
                .unwrap();
            assert!(outer.all_keyed);
            let inner = p
                .composite_lits
                .iter()
                .find(|l| l.type_name == "Point")
                .unwrap();
            assert!(!inner.all_keyed);
        }

        #[test]
        fn slice_index_colons_do_not_mark_elements_keyed() {
            let p = parse("package a\nimport \"bytes\"\nvar v = bytes.Buffer{}\nvar w = v\n");
            assert!(p.composite_lits[0].all_keyed);
        }
    }

    mod lexer_errors {
        use super::*;

        #[test]
        fn unterminated_string_reports_line() {
            let err = parse_source("t.go", "package a\nvar s = \"oops\n").unwrap_err();
            assert_eq!(err.line, 2);
            assert!(err.msg.contains("unterminated"));
        }

        #[test]
        fn unterminated_block_comment() {
            let err = parse_source("t.go", "package a\n/* never closed\n").unwrap_err();
            assert!(err.msg.contains("block comment"));
        }
    }
}
