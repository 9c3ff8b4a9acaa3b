// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! A small text template engine for FQDN templates.
//!
//! Hostname templates are written in the `{{ }}` action syntax operators
//! already use for `--fqdn-template`, and are evaluated against the JSON form
//! of a Kubernetes object (or any other [`serde_json::Value`]).
//!
//! Supported syntax:
//!
//! - `{{ pipeline }}` with `|` chaining; the piped value is passed as the
//!   last argument of the next function
//! - field chains `.Spec.Type`, `$var.field`, `$` for the root object
//! - string (`"..."`, `` `...` ``), number, `true`, `false` and `nil` literals
//! - parenthesized sub-pipelines
//! - `{{ $x := pipeline }}` and `{{ $x = pipeline }}`
//! - `if` / `else if` / `else` / `end`, `with` / `else` / `end`,
//!   `range` (with optional `$i, $v :=`) / `else` / `end`, `break`, `continue`
//! - `{{-` and `-}}` whitespace trimming and `{{/* comments */}}`
//!
//! Field lookup is case-insensitive, `ObjectMeta` is an alias for
//! `metadata`, and fields missing from an object fall back to its
//! `metadata`, so `.Name` and `.Labels` work on any Kubernetes object.
//! Missing fields evaluate to `nil`, which renders as the empty string.

use crate::errors::TemplateError;
use serde_json::{Map, Number, Value};
use std::net::IpAddr;

/// A parsed template.
#[derive(Clone, Debug)]
pub struct Template {
    source: String,
    root: Vec<Node>,
}

#[derive(Clone, Debug)]
enum Node {
    Text(String),
    Action(Pipeline),
    If {
        cond: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    With {
        value: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        vars: Vec<String>,
        over: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Break,
    Continue,
}

#[derive(Clone, Debug)]
struct Pipeline {
    decl: Option<Declaration>,
    cmds: Vec<Vec<Operand>>,
}

#[derive(Clone, Debug)]
struct Declaration {
    name: String,
    define: bool,
}

#[derive(Clone, Debug)]
enum Operand {
    Field(Vec<String>),
    Var(String, Vec<String>),
    Ident(String),
    Literal(Value),
    Sub(Pipeline),
}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Field(Vec<String>),
    Var(String, Vec<String>),
    Ident(String),
    Str(String),
    Num(Number),
    LParen,
    RParen,
    Pipe,
    Declare,
    Assign,
    Comma,
}

enum Item {
    Text(String),
    Action(Vec<Tok>),
}

enum Terminator {
    End,
    Else(Vec<Tok>),
}

enum Flow {
    Normal,
    Break,
    Continue,
}

impl Template {
    /// Parse template text.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] for unterminated actions, unbalanced
    /// control blocks, or malformed pipelines.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let parse_err = |reason: String| TemplateError::Parse {
            template: source.to_string(),
            reason,
        };
        let items = scan(source).map_err(parse_err)?;
        let mut parser = Parser { items, pos: 0 };
        let (root, term) = parser.parse_list().map_err(parse_err)?;
        if term.is_some() {
            return Err(parse_err("unexpected {{end}} or {{else}}".to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The original template text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the template against `data`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Exec`] when a function is called with the
    /// wrong arguments, an unknown function or variable is referenced, or a
    /// field is taken from a value that has none.
    pub fn render(&self, data: &Value) -> Result<String, TemplateError> {
        let mut state = State {
            vars: vec![("$".to_string(), data.clone())],
            out: String::new(),
        };
        state
            .exec_list(&self.root, data)
            .map_err(TemplateError::Exec)?;
        Ok(state.out)
    }
}

// ============================================================================
// Scanning
// ============================================================================

fn scan(source: &str) -> Result<Vec<Item>, String> {
    let mut items = Vec::new();
    let mut rest = source;
    let mut trim_next = false;

    while !rest.is_empty() {
        let Some(open) = rest.find("{{") else {
            let text = if trim_next { rest.trim_start() } else { rest };
            if !text.is_empty() {
                items.push(Item::Text(text.to_string()));
            }
            break;
        };

        let mut text = &rest[..open];
        if trim_next {
            text = text.trim_start();
        }
        let mut body_start = open + 2;
        let trim_left =
            rest[body_start..].starts_with("- ") || rest[body_start..].starts_with("-\t");
        if trim_left {
            text = text.trim_end();
            body_start += 1;
        }
        if !text.is_empty() {
            items.push(Item::Text(text.to_string()));
        }

        let close = find_action_end(&rest[body_start..])
            .ok_or_else(|| "unclosed action".to_string())?
            + body_start;
        let mut body = &rest[body_start..close];
        trim_next = body.ends_with(" -") || body.ends_with("\t-");
        if trim_next {
            body = &body[..body.len() - 1];
        }

        let trimmed = body.trim();
        if !(trimmed.starts_with("/*") && trimmed.ends_with("*/")) {
            items.push(Item::Action(lex(trimmed)?));
        }
        rest = &rest[close + 2..];
    }

    Ok(items)
}

/// Position of the closing `}}`, skipping over quoted strings.
fn find_action_end(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn lex_path(chars: &[char], i: &mut usize) -> Vec<String> {
    let mut path = Vec::new();
    while *i < chars.len() && chars[*i] == '.' {
        *i += 1;
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        if *i > start {
            path.push(chars[start..*i].iter().collect());
        }
    }
    path
}

fn lex(body: &str) -> Result<Vec<Tok>, String> {
    let chars: Vec<char> = body.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            '|' => {
                toks.push(Tok::Pipe);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&'=') => {
                toks.push(Tok::Declare);
                i += 2;
            }
            '=' => {
                toks.push(Tok::Assign);
                i += 1;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err("unterminated quoted string".to_string());
                    };
                    i += 1;
                    match ch {
                        '"' => break,
                        '\\' => {
                            let esc = chars
                                .get(i)
                                .ok_or_else(|| "unterminated quoted string".to_string())?;
                            i += 1;
                            s.push(match esc {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                        }
                        other => s.push(other),
                    }
                }
                toks.push(Tok::Str(s));
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .ok_or_else(|| "unterminated raw string".to_string())?;
                toks.push(Tok::Str(chars[start..start + end].iter().collect()));
                i = start + end + 1;
            }
            '.' => {
                if chars.get(i + 1).is_some_and(|ch| ch.is_ascii_digit()) {
                    return Err(format!("unexpected number in {body:?}"));
                }
                let path = lex_path(&chars, &mut i);
                toks.push(Tok::Field(path));
            }
            '$' => {
                i += 1;
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let name: String = std::iter::once('$')
                    .chain(chars[start..i].iter().copied())
                    .collect();
                let path = lex_path(&chars, &mut i);
                toks.push(Tok::Var(name, path));
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = if let Ok(n) = text.parse::<i64>() {
                    Number::from(n)
                } else {
                    text.parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .ok_or_else(|| format!("bad number syntax {text:?}"))?
                };
                toks.push(Tok::Num(number));
            }
            c if is_ident_char(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                toks.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character {other:?} in action")),
        }
    }

    Ok(toks)
}

// ============================================================================
// Parsing
// ============================================================================

/// Functions callable from a template
const FUNCTIONS: [&str; 21] = [
    "contains",
    "trimPrefix",
    "trimSuffix",
    "trim",
    "toLower",
    "toUpper",
    "replace",
    "isIPv4",
    "isIPv6",
    "hasKey",
    "fromJson",
    "index",
    "len",
    "eq",
    "ne",
    "not",
    "and",
    "or",
    "printf",
    "print",
    "default",
];

struct Parser {
    items: Vec<Item>,
    pos: usize,
}

impl Parser {
    fn next_item(&mut self) -> Option<Item> {
        if self.pos >= self.items.len() {
            return None;
        }
        let item = std::mem::replace(&mut self.items[self.pos], Item::Text(String::new()));
        self.pos += 1;
        Some(item)
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Option<Terminator>), String> {
        let mut nodes = Vec::new();
        while let Some(item) = self.next_item() {
            let toks = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action(toks) => toks,
            };
            let keyword = match toks.first() {
                Some(Tok::Ident(word)) => word.as_str(),
                None => return Err("missing value for command".to_string()),
                _ => "",
            };
            match keyword {
                "end" => return Ok((nodes, Some(Terminator::End))),
                "else" => return Ok((nodes, Some(Terminator::Else(toks[1..].to_vec())))),
                "if" => nodes.push(self.parse_if(&toks[1..])?),
                "with" => {
                    let value = parse_pipeline(&toks[1..])?;
                    let (then, otherwise) = self.parse_branches("with")?;
                    nodes.push(Node::With {
                        value,
                        then,
                        otherwise,
                    });
                }
                "range" => nodes.push(self.parse_range(&toks[1..])?),
                "break" => nodes.push(Node::Break),
                "continue" => nodes.push(Node::Continue),
                _ => nodes.push(Node::Action(parse_pipeline(&toks)?)),
            }
        }
        Ok((nodes, None))
    }

    /// Body and optional plain `else` body of a block, consuming its `end`.
    fn parse_branches(&mut self, block: &str) -> Result<(Vec<Node>, Vec<Node>), String> {
        let (then, term) = self.parse_list()?;
        match term {
            Some(Terminator::End) => Ok((then, Vec::new())),
            Some(Terminator::Else(rest)) if rest.is_empty() => {
                let (otherwise, term) = self.parse_list()?;
                match term {
                    Some(Terminator::End) => Ok((then, otherwise)),
                    _ => Err(format!("expected {{{{end}}}} after {{{{else}}}} in {block}")),
                }
            }
            Some(Terminator::Else(_)) => Err(format!("unexpected else-if in {block}")),
            None => Err(format!("unexpected EOF in {block}")),
        }
    }

    fn parse_if(&mut self, cond: &[Tok]) -> Result<Node, String> {
        let cond = parse_pipeline(cond)?;
        let (then, term) = self.parse_list()?;
        let otherwise = match term {
            Some(Terminator::End) => Vec::new(),
            Some(Terminator::Else(rest)) if rest.is_empty() => {
                let (otherwise, term) = self.parse_list()?;
                match term {
                    Some(Terminator::End) => otherwise,
                    _ => return Err("expected {{end}} after {{else}} in if".to_string()),
                }
            }
            Some(Terminator::Else(rest)) => match rest.first() {
                Some(Tok::Ident(word)) if word == "if" => vec![self.parse_if(&rest[1..])?],
                _ => return Err("expected if after else".to_string()),
            },
            None => return Err("unexpected EOF in if".to_string()),
        };
        Ok(Node::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_range(&mut self, toks: &[Tok]) -> Result<Node, String> {
        let mut vars = Vec::new();
        let mut rest = toks;
        if let Some(decl) = toks.iter().position(|t| *t == Tok::Declare) {
            for tok in &toks[..decl] {
                match tok {
                    Tok::Var(name, path) if path.is_empty() => vars.push(name.clone()),
                    Tok::Comma => {}
                    _ => return Err("invalid range variable declaration".to_string()),
                }
            }
            if vars.is_empty() || vars.len() > 2 {
                return Err("range can declare one or two variables".to_string());
            }
            rest = &toks[decl + 1..];
        }
        let over = parse_pipeline(rest)?;
        let (body, otherwise) = self.parse_branches("range")?;
        Ok(Node::Range {
            vars,
            over,
            body,
            otherwise,
        })
    }
}

fn parse_pipeline(toks: &[Tok]) -> Result<Pipeline, String> {
    let mut toks = toks;
    let mut decl = None;
    if let [Tok::Var(name, path), op, rest @ ..] = toks {
        if path.is_empty() && (*op == Tok::Declare || *op == Tok::Assign) {
            decl = Some(Declaration {
                name: name.clone(),
                define: *op == Tok::Declare,
            });
            toks = rest;
        }
    }
    if toks.is_empty() {
        return Err("missing value for command".to_string());
    }

    let mut cmds = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;
    while i < toks.len() {
        match &toks[i] {
            Tok::Pipe => {
                if current.is_empty() {
                    return Err("missing command before |".to_string());
                }
                cmds.push(std::mem::take(&mut current));
                i += 1;
            }
            Tok::LParen => {
                let close = matching_paren(toks, i)?;
                current.push(Operand::Sub(parse_pipeline(&toks[i + 1..close])?));
                i = close + 1;
            }
            Tok::RParen => return Err("unexpected right paren".to_string()),
            Tok::Field(path) => {
                current.push(Operand::Field(path.clone()));
                i += 1;
            }
            Tok::Var(name, path) => {
                current.push(Operand::Var(name.clone(), path.clone()));
                i += 1;
            }
            Tok::Ident(word) => {
                current.push(match word.as_str() {
                    "true" => Operand::Literal(Value::Bool(true)),
                    "false" => Operand::Literal(Value::Bool(false)),
                    "nil" => Operand::Literal(Value::Null),
                    _ if FUNCTIONS.contains(&word.as_str()) => Operand::Ident(word.clone()),
                    _ => return Err(format!("function {word:?} not defined")),
                });
                i += 1;
            }
            Tok::Str(s) => {
                current.push(Operand::Literal(Value::String(s.clone())));
                i += 1;
            }
            Tok::Num(n) => {
                current.push(Operand::Literal(Value::Number(n.clone())));
                i += 1;
            }
            Tok::Declare | Tok::Assign | Tok::Comma => {
                return Err("unexpected token in pipeline".to_string())
            }
        }
    }
    if current.is_empty() {
        return Err("missing command after |".to_string());
    }
    cmds.push(current);
    Ok(Pipeline { decl, cmds })
}

fn matching_paren(toks: &[Tok], open: usize) -> Result<usize, String> {
    let mut depth = 0usize;
    for (i, tok) in toks.iter().enumerate().skip(open) {
        match tok {
            Tok::LParen => depth += 1,
            Tok::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err("unclosed left paren".to_string())
}

// ============================================================================
// Evaluation
// ============================================================================

struct State {
    vars: Vec<(String, Value)>,
    out: String,
}

impl State {
    fn exec_list(&mut self, nodes: &[Node], dot: &Value) -> Result<Flow, String> {
        let mark = self.vars.len();
        let mut flow = Flow::Normal;
        for node in nodes {
            flow = self.exec_node(node, dot)?;
            if !matches!(flow, Flow::Normal) {
                break;
            }
        }
        self.vars.truncate(mark);
        Ok(flow)
    }

    fn exec_node(&mut self, node: &Node, dot: &Value) -> Result<Flow, String> {
        match node {
            Node::Text(text) => self.out.push_str(text),
            Node::Action(pipe) => {
                let value = self.eval_pipeline(pipe, dot)?;
                if pipe.decl.is_none() {
                    self.out.push_str(&render(&value));
                }
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                let value = self.eval_pipeline(cond, dot)?;
                let branch = if truthy(&value) { then } else { otherwise };
                return self.exec_list(branch, dot);
            }
            Node::With {
                value,
                then,
                otherwise,
            } => {
                let value = self.eval_pipeline(value, dot)?;
                return if truthy(&value) {
                    self.exec_list(then, &value)
                } else {
                    self.exec_list(otherwise, dot)
                };
            }
            Node::Range {
                vars,
                over,
                body,
                otherwise,
            } => {
                let value = self.eval_pipeline(over, dot)?;
                let entries = range_entries(&value)?;
                if entries.is_empty() {
                    return self.exec_list(otherwise, dot);
                }
                for (key, elem) in entries {
                    let mark = self.vars.len();
                    match vars.as_slice() {
                        [v] => self.vars.push((v.clone(), elem.clone())),
                        [k, v] => {
                            self.vars.push((k.clone(), key));
                            self.vars.push((v.clone(), elem.clone()));
                        }
                        _ => {}
                    }
                    let flow = self.exec_list(body, &elem)?;
                    self.vars.truncate(mark);
                    if matches!(flow, Flow::Break) {
                        break;
                    }
                }
            }
            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn lookup_var(&self, name: &str) -> Result<Value, String> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| format!("undefined variable {name:?}"))
    }

    fn eval_pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value, String> {
        let mut piped: Option<Value> = None;
        for cmd in &pipe.cmds {
            piped = Some(self.eval_command(cmd, dot, piped.take())?);
        }
        let value = piped.unwrap_or(Value::Null);
        if let Some(decl) = &pipe.decl {
            if decl.define {
                self.vars.push((decl.name.clone(), value.clone()));
            } else {
                let slot = self
                    .vars
                    .iter_mut()
                    .rev()
                    .find(|(n, _)| *n == decl.name)
                    .ok_or_else(|| format!("undefined variable {:?}", decl.name))?;
                slot.1 = value.clone();
            }
        }
        Ok(value)
    }

    fn eval_command(
        &mut self,
        cmd: &[Operand],
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, String> {
        if let Some(Operand::Ident(name)) = cmd.first() {
            let mut args = Vec::with_capacity(cmd.len());
            for operand in &cmd[1..] {
                args.push(self.eval_operand(operand, dot)?);
            }
            if let Some(value) = piped {
                args.push(value);
            }
            return call(name, args);
        }
        if cmd.len() > 1 || piped.is_some() {
            return Err("can't give argument to non-function".to_string());
        }
        self.eval_operand(&cmd[0], dot)
    }

    fn eval_operand(&mut self, operand: &Operand, dot: &Value) -> Result<Value, String> {
        match operand {
            Operand::Field(path) => walk(dot, path),
            Operand::Var(name, path) => walk(&self.lookup_var(name)?, path),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Sub(pipe) => self.eval_pipeline(pipe, dot),
            Operand::Ident(name) => call(name, Vec::new()),
        }
    }
}

fn walk(start: &Value, path: &[String]) -> Result<Value, String> {
    let mut current = start.clone();
    for field in path {
        current = field_of(&current, field)?;
    }
    Ok(current)
}

fn lookup_ci<'a>(map: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    map.get(field).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(field))
            .map(|(_, v)| v)
    })
}

fn field_of(value: &Value, field: &str) -> Result<Value, String> {
    match value {
        Value::Object(map) => {
            let field = if field == "ObjectMeta" { "metadata" } else { field };
            if let Some(found) = lookup_ci(map, field) {
                return Ok(found.clone());
            }
            if let Some(Value::Object(meta)) = map.get("metadata") {
                if let Some(found) = lookup_ci(meta, field) {
                    return Ok(found.clone());
                }
            }
            Ok(Value::Null)
        }
        Value::Null => Ok(Value::Null),
        other => Err(format!(
            "can't evaluate field {field} in type {}",
            type_name(other)
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "slice",
        Value::Object(_) => "map",
    }
}

fn range_entries(value: &Value) -> Result<Vec<(Value, Value)>, String> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::from(i), v.clone()))
            .collect()),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Ok(keys
                .into_iter()
                .map(|k| (Value::String(k.clone()), map[k].clone()))
                .collect())
        }
        Value::Number(n) => {
            let count = n
                .as_u64()
                .ok_or_else(|| format!("can't range over {n}"))?;
            Ok((0..count).map(|i| (Value::from(i), Value::from(i))).collect())
        }
        other => Err(format!("range can't iterate over {}", type_name(other))),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", parts.join(" "))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{k}:{}", render(&map[k])))
                .collect();
            format!("map[{}]", parts.join(" "))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "wrong number of args for {name}: want {expected} got {}",
            args.len()
        ))
    }
}

fn string_arg(name: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        Value::Number(_) | Value::Bool(_) => Ok(render(value)),
        other => Err(format!(
            "{name}: expected string, got {}",
            type_name(other)
        )),
    }
}

fn index_value(item: &Value, key: &Value) -> Result<Value, String> {
    match (item, key) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Object(map), Value::String(k)) => Ok(map.get(k).cloned().unwrap_or(Value::Null)),
        (Value::Array(items), Value::Number(n)) => {
            let i = n
                .as_u64()
                .ok_or_else(|| format!("invalid index {n}"))?;
            usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| format!("index out of range: {i}"))
        }
        (item, key) => Err(format!(
            "can't index item of type {} with {}",
            type_name(item),
            type_name(key)
        )),
    }
}

fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('q') => match args.next() {
                Some(v) => out.push_str(&format!("{:?}", render(v))),
                None => out.push_str("%!q(MISSING)"),
            },
            Some(verb) => match args.next() {
                Some(v) => out.push_str(&render(v)),
                None => out.push_str(&format!("%!{verb}(MISSING)")),
            },
            None => out.push_str("%!(NOVERB)"),
        }
    }
    out
}

fn call(name: &str, args: Vec<Value>) -> Result<Value, String> {
    match name {
        "contains" => {
            arity(name, &args, 2)?;
            let s = string_arg(name, &args[0])?;
            let substr = string_arg(name, &args[1])?;
            Ok(Value::Bool(s.contains(&substr)))
        }
        "trimPrefix" => {
            arity(name, &args, 2)?;
            let s = string_arg(name, &args[0])?;
            let prefix = string_arg(name, &args[1])?;
            Ok(Value::String(
                s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_string(),
            ))
        }
        "trimSuffix" => {
            arity(name, &args, 2)?;
            let s = string_arg(name, &args[0])?;
            let suffix = string_arg(name, &args[1])?;
            Ok(Value::String(
                s.strip_suffix(suffix.as_str()).unwrap_or(&s).to_string(),
            ))
        }
        "trim" => {
            arity(name, &args, 1)?;
            Ok(Value::String(string_arg(name, &args[0])?.trim().to_string()))
        }
        "toLower" => {
            arity(name, &args, 1)?;
            Ok(Value::String(string_arg(name, &args[0])?.to_lowercase()))
        }
        "toUpper" => {
            arity(name, &args, 1)?;
            Ok(Value::String(string_arg(name, &args[0])?.to_uppercase()))
        }
        "replace" => {
            arity(name, &args, 3)?;
            let old = string_arg(name, &args[0])?;
            let new = string_arg(name, &args[1])?;
            let target = string_arg(name, &args[2])?;
            Ok(Value::String(target.replace(&old, &new)))
        }
        "isIPv4" => {
            arity(name, &args, 1)?;
            let s = string_arg(name, &args[0])?;
            Ok(Value::Bool(matches!(s.parse::<IpAddr>(), Ok(IpAddr::V4(_)))))
        }
        "isIPv6" => {
            arity(name, &args, 1)?;
            let s = string_arg(name, &args[0])?;
            Ok(Value::Bool(matches!(s.parse::<IpAddr>(), Ok(IpAddr::V6(_)))))
        }
        "hasKey" => {
            arity(name, &args, 2)?;
            let key = string_arg(name, &args[1])?;
            Ok(Value::Bool(match &args[0] {
                Value::Object(map) => map.contains_key(&key),
                _ => false,
            }))
        }
        "fromJson" => {
            arity(name, &args, 1)?;
            let s = string_arg(name, &args[0])?;
            Ok(serde_json::from_str(&s).unwrap_or(Value::Null))
        }
        "index" => {
            let (item, keys) = args
                .split_first()
                .ok_or_else(|| "index of untyped nil".to_string())?;
            let mut current = item.clone();
            for key in keys {
                current = index_value(&current, key)?;
            }
            Ok(current)
        }
        "len" => {
            arity(name, &args, 1)?;
            let n = match &args[0] {
                Value::String(s) => s.len(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                Value::Null => 0,
                other => return Err(format!("len of type {}", type_name(other))),
            };
            Ok(Value::from(n))
        }
        "eq" => {
            let (first, rest) = args
                .split_first()
                .ok_or_else(|| "missing argument for comparison".to_string())?;
            if rest.is_empty() {
                return Err("missing argument for comparison".to_string());
            }
            Ok(Value::Bool(rest.iter().any(|v| values_equal(first, v))))
        }
        "ne" => {
            arity(name, &args, 2)?;
            Ok(Value::Bool(!values_equal(&args[0], &args[1])))
        }
        "not" => {
            arity(name, &args, 1)?;
            Ok(Value::Bool(!truthy(&args[0])))
        }
        "and" => {
            if args.is_empty() {
                return Err("wrong number of args for and".to_string());
            }
            let mut last = Value::Null;
            for arg in args {
                if !truthy(&arg) {
                    return Ok(arg);
                }
                last = arg;
            }
            Ok(last)
        }
        "or" => {
            if args.is_empty() {
                return Err("wrong number of args for or".to_string());
            }
            let mut last = Value::Null;
            for arg in args {
                if truthy(&arg) {
                    return Ok(arg);
                }
                last = arg;
            }
            Ok(last)
        }
        "printf" => {
            let (format, rest) = args
                .split_first()
                .ok_or_else(|| "wrong number of args for printf".to_string())?;
            Ok(Value::String(sprintf(&string_arg(name, format)?, rest)))
        }
        "print" => Ok(Value::String(args.iter().map(render).collect())),
        "default" => {
            arity(name, &args, 2)?;
            Ok(if truthy(&args[1]) {
                args[1].clone()
            } else {
                args[0].clone()
            })
        }
        other => Err(format!("function {other:?} not defined")),
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod template_tests;
