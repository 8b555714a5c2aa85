//! Recursive-descent parser producing a [`Body`] tree.

use std::collections::{BTreeMap, HashSet};

use super::body::{Attribute, Block, Body};
use super::lexer::{Lexer, Token, TokenKind};
use super::value::{Reference, Scalar, Value};
use super::SyntaxError;

/// Parse a complete configuration file.
pub fn parse(source: &str) -> Result<Body, SyntaxError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(source, tokens, Context::Body).body(false)
}

/// Whether newlines end an item in the enclosing construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Body,
    Object,
    /// Parentheses, brackets, call arguments
    Group,
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    contexts: Vec<Context>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, tokens: Vec<Token>, context: Context) -> Self {
        Self {
            src,
            tokens,
            pos: 0,
            contexts: vec![context],
        }
    }

    fn newlines_significant(&self) -> bool {
        !matches!(self.contexts.last(), Some(Context::Group))
    }

    fn skip_newlines(&mut self) {
        while self.tokens[self.pos].kind == TokenKind::Newline {
            self.pos += 1;
        }
    }

    fn current(&mut self) -> &Token {
        if !self.newlines_significant() {
            self.skip_newlines();
        }
        &self.tokens[self.pos]
    }

    fn peek_kind(&mut self) -> TokenKind {
        self.current().kind.clone()
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn at_end(&mut self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    fn unexpected(&mut self, expected: &str) -> SyntaxError {
        let tok = self.current().clone();
        SyntaxError::new(
            tok.line,
            tok.column,
            format!("expected {}, found {}", expected, tok.kind.describe()),
        )
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, SyntaxError> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// Source text from `start` to the end of the last consumed token.
    fn raw_since(&self, start: usize) -> String {
        let end = self.tokens[self.pos.saturating_sub(1)].end.max(start);
        self.src[start..end].trim().to_string()
    }

    fn grouped<T>(
        &mut self,
        context: Context,
        f: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        self.contexts.push(context);
        let result = f(self);
        self.contexts.pop();
        result
    }

    fn body(&mut self, nested: bool) -> Result<Body, SyntaxError> {
        let mut body = Body::default();
        let mut seen: HashSet<String> = HashSet::new();
        loop {
            self.skip_newlines();
            let tok = self.tokens[self.pos].clone();
            match tok.kind {
                TokenKind::Eof if nested => {
                    return Err(SyntaxError::new(
                        tok.line,
                        tok.column,
                        "unexpected end of file, expected '}'",
                    ))
                }
                TokenKind::Eof => return Ok(body),
                TokenKind::RBrace if nested => return Ok(body),
                TokenKind::RBrace => {
                    return Err(SyntaxError::new(tok.line, tok.column, "unexpected '}'"))
                }
                TokenKind::Ident(name) => {
                    self.pos += 1;
                    match self.tokens[self.pos].kind {
                        TokenKind::Equals => {
                            self.pos += 1;
                            if !seen.insert(name.clone()) {
                                return Err(SyntaxError::new(
                                    tok.line,
                                    tok.column,
                                    format!("attribute '{}' redefined", name),
                                ));
                            }
                            let value = self.expression()?;
                            self.end_of_item()?;
                            body.attributes.push(Attribute {
                                name,
                                value,
                                line: tok.line,
                            });
                        }
                        TokenKind::Ident(_) | TokenKind::Str { .. } | TokenKind::LBrace => {
                            let block = self.block(name, tok.line)?;
                            body.blocks.push(block);
                        }
                        _ => {
                            return Err(
                                self.unexpected(&format!("'=' or a block body after '{}'", name))
                            )
                        }
                    }
                }
                other => {
                    return Err(SyntaxError::new(
                        tok.line,
                        tok.column,
                        format!("expected attribute or block, found {}", other.describe()),
                    ))
                }
            }
        }
    }

    fn block(&mut self, kind: String, line: usize) -> Result<Block, SyntaxError> {
        let mut labels = Vec::new();
        loop {
            match self.tokens[self.pos].kind.clone() {
                TokenKind::Ident(label) => labels.push(label),
                TokenKind::Str { value, .. } => labels.push(value),
                TokenKind::LBrace => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.unexpected("block label or '{'")),
            }
            self.pos += 1;
        }

        let body = self.grouped(Context::Body, |p| p.body(true))?;
        self.expect(TokenKind::RBrace, "'}'")?;
        self.end_of_item()?;
        Ok(Block {
            kind,
            labels,
            body,
            line,
        })
    }

    fn end_of_item(&mut self) -> Result<(), SyntaxError> {
        match self.tokens[self.pos].kind {
            TokenKind::Newline => {
                self.pos += 1;
                Ok(())
            }
            TokenKind::Eof | TokenKind::RBrace => Ok(()),
            _ => Err(self.unexpected("newline")),
        }
    }

    fn expression(&mut self) -> Result<Value, SyntaxError> {
        let start = self.current().start;
        let operand = self.operand()?;
        if self.at_operator() {
            self.expression_tail()?;
            return Ok(Value::Expression(self.raw_since(start)));
        }
        Ok(operand)
    }

    fn at_operator(&mut self) -> bool {
        match self.peek_kind() {
            TokenKind::Operator(op) => op != "!" && op != "=>",
            TokenKind::Question => true,
            _ => false,
        }
    }

    /// Consume the rest of a compound expression without interpreting it.
    fn expression_tail(&mut self) -> Result<(), SyntaxError> {
        let mut depth = 0usize;
        loop {
            let tok = &self.tokens[self.pos];
            match tok.kind {
                TokenKind::Eof if depth > 0 => {
                    return Err(SyntaxError::new(
                        tok.line,
                        tok.column,
                        "unexpected end of file in expression",
                    ))
                }
                TokenKind::Eof => return Ok(()),
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                }
                TokenKind::Comma if depth == 0 => return Ok(()),
                TokenKind::Newline if depth == 0 && self.newlines_significant() => return Ok(()),
                _ => {}
            }
            self.pos += 1;
        }
    }

    /// Consume through the bracket closing an already-consumed opener.
    fn skip_to_close(&mut self) -> Result<(), SyntaxError> {
        let mut depth = 1usize;
        loop {
            let tok = self.tokens[self.pos].clone();
            match tok.kind {
                TokenKind::Eof => {
                    return Err(SyntaxError::new(
                        tok.line,
                        tok.column,
                        "unexpected end of file, unclosed bracket",
                    ))
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => depth -= 1,
                _ => {}
            }
            self.pos += 1;
            if depth == 0 {
                return Ok(());
            }
        }
    }

    fn operand(&mut self) -> Result<Value, SyntaxError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Number(raw) => Ok(number(&raw)),
            TokenKind::Str {
                value,
                interpolated,
            } => Ok(string_value(value, interpolated)),
            TokenKind::Ident(name) => self.identifier(name, tok.start),
            TokenKind::Operator("-") => {
                if let TokenKind::Number(raw) = self.peek_kind() {
                    self.advance();
                    return Ok(negate(number(&raw)));
                }
                self.operand()?;
                Ok(Value::Expression(self.raw_since(tok.start)))
            }
            TokenKind::Operator("!") => {
                self.operand()?;
                Ok(Value::Expression(self.raw_since(tok.start)))
            }
            TokenKind::LBracket => self.list(tok.start),
            TokenKind::LBrace => self.object(tok.start),
            TokenKind::LParen => self.grouped(Context::Group, |p| {
                let inner = p.expression()?;
                p.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }),
            other => Err(SyntaxError::new(
                tok.line,
                tok.column,
                format!("expected expression, found {}", other.describe()),
            )),
        }
    }

    fn identifier(&mut self, name: String, start: usize) -> Result<Value, SyntaxError> {
        match name.as_str() {
            "true" => return Ok(Value::Scalar(Scalar::Bool(true))),
            "false" => return Ok(Value::Scalar(Scalar::Bool(false))),
            "null" => return Ok(Value::Scalar(Scalar::Null)),
            _ => {}
        }

        // provider::<name>::<function>
        while self.tokens[self.pos].kind == TokenKind::Colon
            && self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::Colon)
        {
            self.pos += 2;
            if !matches!(self.tokens[self.pos].kind, TokenKind::Ident(_)) {
                return Err(self.unexpected("function name after '::'"));
            }
            self.pos += 1;
        }

        if self.tokens[self.pos].kind == TokenKind::LParen {
            self.pos += 1;
            self.grouped(Context::Group, |p| p.call_arguments())?;
            return Ok(Value::Expression(self.raw_since(start)));
        }

        let mut parts = vec![name];
        loop {
            match self.tokens[self.pos].kind.clone() {
                TokenKind::Dot => {
                    self.pos += 1;
                    match self.tokens[self.pos].kind.clone() {
                        TokenKind::Ident(attr) | TokenKind::Number(attr) => parts.push(attr),
                        TokenKind::Operator("*") => parts.push("*".to_string()),
                        _ => return Err(self.unexpected("attribute name after '.'")),
                    }
                    self.pos += 1;
                }
                TokenKind::LBracket => {
                    self.pos += 1;
                    let index = self.grouped(Context::Group, |p| {
                        let index_start = p.current().start;
                        if p.peek_kind() == TokenKind::Operator("*") {
                            p.advance();
                        } else {
                            p.expression()?;
                        }
                        let raw = p.raw_since(index_start);
                        p.expect(TokenKind::RBracket, "']'")?;
                        Ok(raw)
                    })?;
                    parts.push(format!("[{}]", index));
                }
                _ => break,
            }
        }
        Ok(Value::Reference(Reference { parts }))
    }

    fn call_arguments(&mut self) -> Result<(), SyntaxError> {
        if self.peek_kind() == TokenKind::RParen {
            self.advance();
            return Ok(());
        }
        loop {
            self.expression()?;
            match self.peek_kind() {
                TokenKind::Comma => {
                    self.advance();
                    if self.peek_kind() == TokenKind::RParen {
                        self.advance();
                        return Ok(());
                    }
                }
                TokenKind::Ellipsis => {
                    self.advance();
                    self.expect(TokenKind::RParen, "')'")?;
                    return Ok(());
                }
                TokenKind::RParen => {
                    self.advance();
                    return Ok(());
                }
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
    }

    fn list(&mut self, start: usize) -> Result<Value, SyntaxError> {
        self.grouped(Context::Group, |p| {
            if matches!(p.peek_kind(), TokenKind::Ident(ref k) if k == "for") {
                p.skip_to_close()?;
                return Ok(Value::Expression(p.raw_since(start)));
            }
            let mut items = Vec::new();
            loop {
                if p.peek_kind() == TokenKind::RBracket {
                    p.advance();
                    break;
                }
                items.push(p.expression()?);
                match p.peek_kind() {
                    TokenKind::Comma => {
                        p.advance();
                    }
                    TokenKind::RBracket => {
                        p.advance();
                        break;
                    }
                    _ => return Err(p.unexpected("',' or ']'")),
                }
            }
            Ok(Value::List(items))
        })
    }

    fn object(&mut self, start: usize) -> Result<Value, SyntaxError> {
        self.grouped(Context::Object, |p| {
            p.skip_newlines();
            if matches!(p.tokens[p.pos].kind, TokenKind::Ident(ref k) if k == "for") {
                p.skip_to_close()?;
                return Ok(Value::Expression(p.raw_since(start)));
            }
            let mut map = BTreeMap::new();
            loop {
                p.skip_newlines();
                let tok = p.tokens[p.pos].clone();
                let key = match tok.kind {
                    TokenKind::RBrace => {
                        p.pos += 1;
                        break;
                    }
                    TokenKind::Ident(key) | TokenKind::Number(key) => {
                        p.pos += 1;
                        key
                    }
                    TokenKind::Str { value, .. } => {
                        p.pos += 1;
                        value
                    }
                    TokenKind::LParen => {
                        p.pos += 1;
                        p.grouped(Context::Group, |q| {
                            q.expression()?;
                            q.expect(TokenKind::RParen, "')'")?;
                            Ok(())
                        })?;
                        p.raw_since(tok.start)
                    }
                    _ => return Err(p.unexpected("object key or '}'")),
                };
                match p.tokens[p.pos].kind {
                    TokenKind::Equals | TokenKind::Colon => p.pos += 1,
                    _ => return Err(p.unexpected("'=' or ':' after object key")),
                }
                let value = p.expression()?;
                map.insert(key, value);
                match p.tokens[p.pos].kind {
                    TokenKind::Comma | TokenKind::Newline => p.pos += 1,
                    TokenKind::RBrace => {}
                    _ => return Err(p.unexpected("',' or newline after object item")),
                }
            }
            Ok(Value::Block(map))
        })
    }
}

fn number(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Scalar(Scalar::Int(n));
    }
    raw.parse::<f64>()
        .map(|f| Value::Scalar(Scalar::Float(f)))
        .unwrap_or_else(|_| Value::Expression(raw.to_string()))
}

fn negate(value: Value) -> Value {
    match value {
        Value::Scalar(Scalar::Int(n)) => Value::Scalar(Scalar::Int(-n)),
        Value::Scalar(Scalar::Float(f)) => Value::Scalar(Scalar::Float(-f)),
        other => other,
    }
}

fn string_value(value: String, interpolated: bool) -> Value {
    if interpolated {
        if let Some(reference) = sole_reference(&value) {
            return Value::Reference(reference);
        }
    }
    Value::Scalar(Scalar::String(value))
}

/// `"${aws_security_group.web.id}"` is the same as the bare traversal.
fn sole_reference(template: &str) -> Option<Reference> {
    let inner = template.strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains("${") || inner.contains('}') {
        return None;
    }
    let tokens = Lexer::new(inner).tokenize().ok()?;
    let mut parser = Parser::new(inner, tokens, Context::Group);
    match parser.expression().ok()? {
        Value::Reference(reference) if parser.at_end() => Some(reference),
        _ => None,
    }
}
