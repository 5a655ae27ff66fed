use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use geo_scene::{Attrs, CreateKind, Input, Scene};

mod extract;

pub use extract::{extract_program, extract_source};

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    message: String,
    line: Option<usize>,
    column: Option<usize>,
}

impl ScriptError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    fn at(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
            column: Some(column),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "{} at line {}, column {}", self.message, line, column)
            }
            _ => f.write_str(&self.message),
        }
    }
}

impl Error for ScriptError {}

/// One construction statement: `name = kind(inputs…) { attrs… }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub name: String,
    pub kind: CreateKind,
    pub inputs: Vec<Arg>,
    pub attrs: Attrs,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Number(f64),
    Reference(String),
}

/// An ordered, dependency-respecting sequence of construction statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Canonical newline-joined source form.
    pub fn to_source(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, statement) in self.statements.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}(", self.name, self.kind.keyword())?;
        for (index, arg) in self.inputs.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            match arg {
                Arg::Number(value) => write_number(f, *value)?,
                Arg::Reference(name) => f.write_str(name)?,
            }
        }
        f.write_str(")")?;
        write_attrs(f, &self.attrs)
    }
}

fn write_attrs(f: &mut fmt::Formatter<'_>, attrs: &Attrs) -> fmt::Result {
    let mut parts: Vec<String> = Vec::new();
    if let Some(name) = &attrs.name {
        parts.push(format!("name: \"{name}\""));
    }
    if let Some([dx, dy]) = attrs.label_offset {
        parts.push(format!("label_offset: [{dx}, {dy}]"));
    }
    if let Some(size) = attrs.size {
        parts.push(format!("size: {}", format_number(size)));
    }
    if let Some(color) = &attrs.fill_color {
        parts.push(format!("fill_color: \"{color}\""));
    }
    if let Some(color) = &attrs.stroke_color {
        parts.push(format!("stroke_color: \"{color}\""));
    }
    if let Some(width) = attrs.stroke_width {
        parts.push(format!("stroke_width: {}", format_number(width)));
    }
    if let Some(dash) = attrs.dash {
        parts.push(format!("dash: {dash}"));
    }
    if !attrs.visible {
        parts.push("visible: false".to_string());
    }

    if parts.is_empty() {
        return Ok(());
    }
    write!(f, " {{ {} }}", parts.join(", "))
}

fn write_number(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    f.write_str(&format_number(value))
}

fn format_number(value: f64) -> String {
    if value.fract().abs() <= f64::EPSILON {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Strips leading/trailing triple-backtick fence markup (with an optional
/// language tag on the opening fence) from a raw generated payload.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(position) => &rest[position + 1..],
            None => rest.trim_start_matches(|ch: char| ch.is_ascii_alphanumeric()),
        };
    }
    let trimmed = text.trim_end();
    if let Some(rest) = trimmed.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

pub fn parse_program(source: &str) -> Result<Program, ScriptError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

/// Interprets a program against a scene, strictly in statement order. The
/// only scene capability exercised is [`Scene::create`]; the first failing
/// statement aborts the whole application.
pub fn apply_program(program: &Program, scene: &mut Scene) -> Result<(), ScriptError> {
    let mut bindings: BTreeMap<&str, geo_scene::ObjectId> = BTreeMap::new();

    for (index, statement) in program.statements.iter().enumerate() {
        if bindings.contains_key(statement.name.as_str()) {
            return Err(ScriptError::new(format!(
                "variable '{}' is defined more than once",
                statement.name
            )));
        }

        let mut inputs = Vec::with_capacity(statement.inputs.len());
        for arg in &statement.inputs {
            match arg {
                Arg::Number(value) => inputs.push(Input::Number(*value)),
                Arg::Reference(name) => {
                    let id = bindings.get(name.as_str()).copied().ok_or_else(|| {
                        ScriptError::new(format!("unknown variable '{name}'"))
                    })?;
                    inputs.push(Input::Object(id));
                }
            }
        }

        let id = scene
            .create(statement.kind, &inputs, statement.attrs.clone())
            .map_err(|err| {
                ScriptError::new(format!(
                    "statement {} ('{}'): {err}",
                    index + 1,
                    statement.name
                ))
            })?;
        bindings.insert(statement.name.as_str(), id);
    }

    Ok(())
}

pub fn apply_source(source: &str, scene: &mut Scene) -> Result<(), ScriptError> {
    let program = parse_program(source)?;
    apply_program(&program, scene)
}

const KNOWN_CONSTRUCTIONS: &[&str] = &[
    "point",
    "line",
    "segment",
    "circle",
    "polygon",
    "midpoint",
    "circumcircle",
];

const KNOWN_ATTRIBUTES: &[&str] = &[
    "name",
    "size",
    "fill_color",
    "stroke_color",
    "stroke_width",
    "dash",
    "visible",
    "label_offset",
];

fn construction_kind(name: &str) -> Option<CreateKind> {
    match name {
        "point" => Some(CreateKind::Point),
        "line" => Some(CreateKind::Line),
        "segment" => Some(CreateKind::Segment),
        "circle" => Some(CreateKind::Circle),
        "polygon" => Some(CreateKind::Polygon),
        "midpoint" => Some(CreateKind::Midpoint),
        "circumcircle" => Some(CreateKind::Circumcircle),
        _ => None,
    }
}

fn suggest_name<'a>(name: &str, candidates: &'a [&str]) -> Option<&'a str> {
    let mut best: Option<(&str, usize)> = None;

    for candidate in candidates {
        let distance = levenshtein(name, candidate);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((candidate, distance)),
        }
    }

    match best {
        Some((candidate, distance)) if distance <= 3 => Some(candidate),
        _ => None,
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0usize; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let deletion = prev[j + 1] + 1;
            let insertion = curr[j] + 1;
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = deletion.min(insertion).min(substitution);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
    column: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Eq,
    Minus,
    Eof,
}

#[derive(Debug)]
struct Lexer<'a> {
    source: &'a str,
    index: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            index: 0,
            line: 1,
            column: 1,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance_char();
                continue;
            }

            if self.starts_with("//") {
                self.skip_line_comment();
                continue;
            }

            if self.starts_with("/*") {
                self.skip_block_comment()?;
                continue;
            }

            let line = self.line;
            let column = self.column;

            let kind = match ch {
                '(' => {
                    self.advance_char();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance_char();
                    TokenKind::RParen
                }
                '{' => {
                    self.advance_char();
                    TokenKind::LBrace
                }
                '}' => {
                    self.advance_char();
                    TokenKind::RBrace
                }
                '[' => {
                    self.advance_char();
                    TokenKind::LBracket
                }
                ']' => {
                    self.advance_char();
                    TokenKind::RBracket
                }
                ',' => {
                    self.advance_char();
                    TokenKind::Comma
                }
                ':' => {
                    self.advance_char();
                    TokenKind::Colon
                }
                '=' => {
                    self.advance_char();
                    TokenKind::Eq
                }
                '-' => {
                    self.advance_char();
                    TokenKind::Minus
                }
                '"' => self.lex_string()?,
                c if is_ident_start(c) => self.lex_identifier()?,
                c if c.is_ascii_digit()
                    || (c == '.'
                        && self
                            .peek_second_char()
                            .map(|next| next.is_ascii_digit())
                            .unwrap_or(false)) =>
                {
                    self.lex_number()?
                }
                _ => {
                    return Err(ScriptError::at(
                        format!("unexpected character '{ch}'"),
                        self.line,
                        self.column,
                    ));
                }
            };

            tokens.push(Token { kind, line, column });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            line: self.line,
            column: self.column,
        });

        Ok(tokens)
    }

    fn lex_identifier(&mut self) -> Result<TokenKind, ScriptError> {
        let start = self.index;

        self.advance_char();
        while self.peek_char().map(is_ident_continue).unwrap_or(false) {
            self.advance_char();
        }

        let ident = self
            .source
            .get(start..self.index)
            .ok_or_else(|| ScriptError::new("invalid identifier span"))?
            .to_string();

        Ok(TokenKind::Ident(ident))
    }

    fn lex_string(&mut self) -> Result<TokenKind, ScriptError> {
        let line = self.line;
        let column = self.column;
        self.advance_char();

        let start = self.index;
        loop {
            match self.peek_char() {
                Some('"') => break,
                Some('\n') | None => {
                    return Err(ScriptError::at("unterminated string literal", line, column));
                }
                Some(_) => {
                    self.advance_char();
                }
            }
        }

        let text = self
            .source
            .get(start..self.index)
            .ok_or_else(|| ScriptError::new("invalid string span"))?
            .to_string();
        self.advance_char();

        Ok(TokenKind::Str(text))
    }

    fn lex_number(&mut self) -> Result<TokenKind, ScriptError> {
        let line = self.line;
        let column = self.column;
        let start = self.index;

        let mut seen_digit = false;
        let mut seen_dot = false;

        if self.peek_char() == Some('.') {
            seen_dot = true;
            self.advance_char();
        }

        while self
            .peek_char()
            .map(|ch| ch.is_ascii_digit())
            .unwrap_or(false)
        {
            seen_digit = true;
            self.advance_char();
        }

        if self.peek_char() == Some('.') && !seen_dot {
            self.advance_char();
            while self
                .peek_char()
                .map(|ch| ch.is_ascii_digit())
                .unwrap_or(false)
            {
                seen_digit = true;
                self.advance_char();
            }
        }

        if !seen_digit {
            return Err(ScriptError::at("invalid number literal", line, column));
        }

        let text = self
            .source
            .get(start..self.index)
            .ok_or_else(|| ScriptError::new("invalid number span"))?;
        let value = text.parse::<f64>().map_err(|err| {
            ScriptError::at(format!("invalid number literal: {err}"), line, column)
        })?;

        Ok(TokenKind::Number(value))
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            self.advance_char();
            if ch == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ScriptError> {
        let start_line = self.line;
        let start_column = self.column;
        self.advance_char();
        self.advance_char();

        while self.index < self.source.len() {
            if self.starts_with("*/") {
                self.advance_char();
                self.advance_char();
                return Ok(());
            }
            self.advance_char();
        }

        Err(ScriptError::at(
            "unterminated block comment",
            start_line,
            start_column,
        ))
    }

    fn starts_with(&self, text: &str) -> bool {
        self.source[self.index..].starts_with(text)
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.index..].chars().next()
    }

    fn peek_second_char(&self) -> Option<char> {
        let mut chars = self.source[self.index..].chars();
        chars.next()?;
        chars.next()
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.index += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphabetic()
}

fn is_ident_continue(ch: char) -> bool {
    ch == '_' || ch.is_ascii_alphanumeric()
}

#[derive(Debug)]
struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, index: 0 }
    }

    fn parse_program(&mut self) -> Result<Program, ScriptError> {
        if self.check_kind(&TokenKind::Eof) {
            let token = self.peek();
            return Err(ScriptError::at("empty program", token.line, token.column));
        }

        let mut statements = Vec::new();
        while !self.check_kind(&TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, ScriptError> {
        let name = self.expect_ident("expected a variable name")?;
        self.expect_kind(TokenKind::Eq, "expected '=' after variable name")?;

        let keyword_token = self.peek().clone();
        let keyword = self.expect_ident("expected a construction kind")?;
        let Some(kind) = construction_kind(&keyword) else {
            let mut message = format!("unknown construction '{keyword}'");
            if let Some(suggestion) = suggest_name(&keyword, KNOWN_CONSTRUCTIONS) {
                message.push_str(&format!(". Did you mean '{suggestion}'?"));
            }
            return Err(ScriptError::at(
                message,
                keyword_token.line,
                keyword_token.column,
            ));
        };

        self.expect_kind(TokenKind::LParen, "expected '(' after construction kind")?;
        let mut inputs = Vec::new();
        if !self.check_kind(&TokenKind::RParen) {
            loop {
                inputs.push(self.parse_arg()?);
                if self.check_kind(&TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect_kind(TokenKind::RParen, "expected ')' after arguments")?;

        let attrs = if self.check_kind(&TokenKind::LBrace) {
            self.parse_attrs()?
        } else {
            Attrs::default()
        };

        Ok(Statement {
            name,
            kind,
            inputs,
            attrs,
        })
    }

    fn parse_arg(&mut self) -> Result<Arg, ScriptError> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Minus => {
                self.advance();
                let value = self.expect_number("expected a number after '-'")?;
                Ok(Arg::Number(-value))
            }
            TokenKind::Number(value) => {
                let value = *value;
                self.advance();
                Ok(Arg::Number(value))
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(Arg::Reference(name))
            }
            _ => Err(ScriptError::at(
                "expected a number or variable reference",
                token.line,
                token.column,
            )),
        }
    }

    fn parse_attrs(&mut self) -> Result<Attrs, ScriptError> {
        self.expect_kind(TokenKind::LBrace, "expected '{'")?;
        let mut attrs = Attrs::default();

        // Trailing commas are tolerated: generated payloads are not fully
        // controlled.
        while !self.check_kind(&TokenKind::RBrace) {
            self.parse_attr(&mut attrs)?;
            if self.check_kind(&TokenKind::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        self.expect_kind(TokenKind::RBrace, "expected '}' after attributes")?;

        Ok(attrs)
    }

    fn parse_attr(&mut self, attrs: &mut Attrs) -> Result<(), ScriptError> {
        let key_token = self.peek().clone();
        let key = self.expect_ident("expected an attribute name")?;
        self.expect_kind(TokenKind::Colon, "expected ':' after attribute name")?;

        match key.as_str() {
            "name" => attrs.name = Some(self.expect_string("attribute 'name' expects a string")?),
            "size" => {
                attrs.size = Some(self.expect_signed_number("attribute 'size' expects a number")?);
            }
            "fill_color" | "fillColor" => {
                attrs.fill_color =
                    Some(self.expect_string("attribute 'fill_color' expects a string")?);
            }
            "stroke_color" | "strokeColor" => {
                attrs.stroke_color =
                    Some(self.expect_string("attribute 'stroke_color' expects a string")?);
            }
            "stroke_width" | "strokeWidth" => {
                attrs.stroke_width =
                    Some(self.expect_signed_number("attribute 'stroke_width' expects a number")?);
            }
            "dash" => {
                let value = self.expect_signed_number("attribute 'dash' expects a number")?;
                if value < 0.0 || value.fract() != 0.0 {
                    return Err(ScriptError::at(
                        "attribute 'dash' expects a non-negative integer",
                        key_token.line,
                        key_token.column,
                    ));
                }
                attrs.dash = Some(value as u32);
            }
            "visible" => {
                attrs.visible = self.expect_bool("attribute 'visible' expects true or false")?;
            }
            "label_offset" | "labelOffset" => {
                attrs.label_offset = Some(self.parse_offset_pair()?);
            }
            other => {
                let mut message = format!("unknown attribute '{other}'");
                if let Some(suggestion) = suggest_name(other, KNOWN_ATTRIBUTES) {
                    message.push_str(&format!(". Did you mean '{suggestion}'?"));
                }
                return Err(ScriptError::at(message, key_token.line, key_token.column));
            }
        }

        Ok(())
    }

    fn parse_offset_pair(&mut self) -> Result<[i64; 2], ScriptError> {
        self.expect_kind(TokenKind::LBracket, "expected '[' for label offset")?;
        let dx = self.expect_signed_number("label offset expects numbers")?;
        self.expect_kind(TokenKind::Comma, "expected ',' between offset components")?;
        let dy = self.expect_signed_number("label offset expects numbers")?;
        self.expect_kind(TokenKind::RBracket, "expected ']' after label offset")?;
        Ok([dx.round() as i64, dy.round() as i64])
    }

    fn parse_signed_number(&mut self) -> Option<f64> {
        if self.check_kind(&TokenKind::Minus) {
            let saved = self.index;
            self.advance();
            if let Some(value) = self.peek_number() {
                self.advance();
                return Some(-value);
            }
            self.index = saved;
            return None;
        }
        if let Some(value) = self.peek_number() {
            self.advance();
            return Some(value);
        }
        None
    }

    fn peek_number(&self) -> Option<f64> {
        match &self.peek().kind {
            TokenKind::Number(value) => Some(*value),
            _ => None,
        }
    }

    fn expect_signed_number(&mut self, message: &str) -> Result<f64, ScriptError> {
        let token = self.peek().clone();
        self.parse_signed_number()
            .ok_or_else(|| ScriptError::at(message.to_string(), token.line, token.column))
    }

    fn expect_number(&mut self, message: &str) -> Result<f64, ScriptError> {
        let token = self.peek().clone();
        if let TokenKind::Number(value) = token.kind {
            self.advance();
            Ok(value)
        } else {
            Err(ScriptError::at(message.to_string(), token.line, token.column))
        }
    }

    fn expect_string(&mut self, message: &str) -> Result<String, ScriptError> {
        let token = self.peek().clone();
        if let TokenKind::Str(text) = token.kind {
            self.advance();
            Ok(text)
        } else {
            Err(ScriptError::at(message.to_string(), token.line, token.column))
        }
    }

    fn expect_bool(&mut self, message: &str) -> Result<bool, ScriptError> {
        let token = self.peek().clone();
        if let TokenKind::Ident(word) = &token.kind {
            match word.as_str() {
                "true" => {
                    self.advance();
                    return Ok(true);
                }
                "false" => {
                    self.advance();
                    return Ok(false);
                }
                _ => {}
            }
        }
        Err(ScriptError::at(message.to_string(), token.line, token.column))
    }

    fn expect_ident(&mut self, message: &str) -> Result<String, ScriptError> {
        let token = self.peek().clone();
        if let TokenKind::Ident(name) = token.kind {
            self.advance();
            Ok(name)
        } else {
            Err(ScriptError::at(message.to_string(), token.line, token.column))
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, message: &str) -> Result<(), ScriptError> {
        if self.peek().kind == kind {
            self.advance();
            Ok(())
        } else {
            let token = self.peek();
            Err(ScriptError::at(message.to_string(), token.line, token.column))
        }
    }

    fn check_kind(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
    }
}
