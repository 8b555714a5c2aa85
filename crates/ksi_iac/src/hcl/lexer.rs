//! Tokenizer for the HCL native syntax subset used by Terraform.

use super::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    /// Raw numeric literal
    Number(String),
    /// Quoted string or heredoc. Escapes are decoded; template sequences are
    /// kept verbatim.
    Str { value: String, interpolated: bool },
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Equals,
    Comma,
    Dot,
    Colon,
    Question,
    Ellipsis,
    Operator(&'static str),
    Newline,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{}'", name),
            Self::Number(n) => format!("number {}", n),
            Self::Str { .. } => "string".to_string(),
            Self::LBrace => "'{'".to_string(),
            Self::RBrace => "'}'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Equals => "'='".to_string(),
            Self::Comma => "','".to_string(),
            Self::Dot => "'.'".to_string(),
            Self::Colon => "':'".to_string(),
            Self::Question => "'?'".to_string(),
            Self::Ellipsis => "'...'".to_string(),
            Self::Operator(op) => format!("'{}'", op),
            Self::Newline => "newline".to_string(),
            Self::Eof => "end of file".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
    /// Byte offsets into the source
    pub start: usize,
    pub end: usize,
}

pub struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let (line, column, start) = (self.line, self.column, self.offset());
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line,
                    column,
                    start,
                    end: start,
                });
                break;
            };

            let kind = match c {
                '\n' => {
                    self.bump();
                    TokenKind::Newline
                }
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                ',' => self.single(TokenKind::Comma),
                ':' => self.single(TokenKind::Colon),
                '?' => self.single(TokenKind::Question),
                '.' => {
                    if self.peek_at(1) == Some('.') && self.peek_at(2) == Some('.') {
                        self.bump();
                        self.bump();
                        self.bump();
                        TokenKind::Ellipsis
                    } else {
                        self.single(TokenKind::Dot)
                    }
                }
                '=' => {
                    self.bump();
                    match self.peek() {
                        Some('=') => self.single(TokenKind::Operator("==")),
                        Some('>') => self.single(TokenKind::Operator("=>")),
                        _ => TokenKind::Equals,
                    }
                }
                '!' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.single(TokenKind::Operator("!="))
                    } else {
                        TokenKind::Operator("!")
                    }
                }
                '<' if self.peek_at(1) == Some('<') => self.heredoc()?,
                '<' | '>' => {
                    self.bump();
                    let eq = self.peek() == Some('=');
                    if eq {
                        self.bump();
                    }
                    TokenKind::Operator(match (c, eq) {
                        ('<', true) => "<=",
                        ('<', false) => "<",
                        (_, true) => ">=",
                        _ => ">",
                    })
                }
                '&' | '|' => {
                    if self.peek_at(1) != Some(c) {
                        return Err(SyntaxError::new(
                            line,
                            column,
                            format!("unexpected character '{}'", c),
                        ));
                    }
                    self.bump();
                    self.bump();
                    TokenKind::Operator(if c == '&' { "&&" } else { "||" })
                }
                '+' => self.single(TokenKind::Operator("+")),
                '-' => self.single(TokenKind::Operator("-")),
                '*' => self.single(TokenKind::Operator("*")),
                '/' => self.single(TokenKind::Operator("/")),
                '%' => self.single(TokenKind::Operator("%")),
                '"' => self.string()?,
                c if c.is_ascii_digit() => self.number(),
                c if c.is_alphabetic() || c == '_' => self.ident(),
                other => {
                    return Err(SyntaxError::new(
                        line,
                        column,
                        format!("unexpected character '{}'", other),
                    ))
                }
            };

            tokens.push(Token {
                kind,
                line,
                column,
                start,
                end: self.offset(),
            });
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(i, _)| i)
            .unwrap_or(self.src.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(' ' | '\t' | '\r'), _) => {
                    self.bump();
                }
                (Some('#'), _) | (Some('/'), Some('/')) => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let (line, column) = (self.line, self.column);
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (None, _) => {
                                return Err(SyntaxError::new(
                                    line,
                                    column,
                                    "unterminated block comment",
                                ))
                            }
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn ident(&mut self) -> TokenKind {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::Ident(name)
    }

    fn number(&mut self) -> TokenKind {
        let mut text = String::new();
        self.take_digits(&mut text);
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.bump();
            self.take_digits(&mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digit_at {
                    if let Some(c) = self.bump() {
                        text.push(c);
                    }
                }
                self.take_digits(&mut text);
            }
        }
        TokenKind::Number(text)
    }

    fn take_digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
    }

    fn string(&mut self) -> Result<TokenKind, SyntaxError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        let mut value = String::new();
        let mut interpolated = false;
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(SyntaxError::new(line, column, "unterminated string literal"))
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    value.push(self.escape()?);
                }
                Some(c @ ('$' | '%')) if self.peek_at(1) == Some(c) && self.peek_at(2) == Some('{') => {
                    // `$${` and `%%{` are literal
                    self.bump();
                    self.bump();
                    self.bump();
                    value.push(c);
                    value.push('{');
                }
                Some(c @ ('$' | '%')) if self.peek_at(1) == Some('{') => {
                    interpolated |= c == '$';
                    self.bump();
                    self.bump();
                    value.push(c);
                    value.push('{');
                    self.template_sequence(&mut value)?;
                }
                Some(c) => {
                    self.bump();
                    value.push(c);
                }
            }
        }
        Ok(TokenKind::Str { value, interpolated })
    }

    fn escape(&mut self) -> Result<char, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let invalid = |msg: &str| SyntaxError::new(line, column, msg.to_string());
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some(u @ ('u' | 'U')) => {
                let width = if u == 'u' { 4 } else { 8 };
                let mut hex = String::new();
                for _ in 0..width {
                    match self.bump() {
                        Some(h) if h.is_ascii_hexdigit() => hex.push(h),
                        _ => return Err(invalid("invalid unicode escape")),
                    }
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| invalid("invalid unicode escape"))
            }
            _ => Err(invalid("invalid escape sequence")),
        }
    }

    /// Copy a `${ ... }` or `%{ ... }` body verbatim; the opener is already consumed.
    fn template_sequence(&mut self, out: &mut String) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column);
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => {
                    return Err(SyntaxError::new(line, column, "unterminated template sequence"))
                }
                Some('"') => self.nested_string(out)?,
                Some(c) => {
                    self.bump();
                    out.push(c);
                    if c == '{' {
                        depth += 1;
                    } else if c == '}' {
                        depth -= 1;
                        if depth == 0 {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn nested_string(&mut self, out: &mut String) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        out.push('"');
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(SyntaxError::new(line, column, "unterminated string literal"))
                }
                Some('\\') => {
                    self.bump();
                    out.push('\\');
                    if let Some(c) = self.bump() {
                        out.push(c);
                    }
                }
                Some('"') => {
                    self.bump();
                    out.push('"');
                    return Ok(());
                }
                Some(c @ ('$' | '%')) if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    out.push(c);
                    out.push('{');
                    self.template_sequence(out)?;
                }
                Some(c) => {
                    self.bump();
                    out.push(c);
                }
            }
        }
    }

    fn heredoc(&mut self) -> Result<TokenKind, SyntaxError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        self.bump();
        let indented = self.peek() == Some('-');
        if indented {
            self.bump();
        }

        let mut marker = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                marker.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if marker.is_empty() {
            return Err(SyntaxError::new(line, column, "expected heredoc marker after '<<'"));
        }
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.bump();
        }
        if self.peek() != Some('\n') {
            return Err(SyntaxError::new(
                line,
                column,
                "heredoc marker must be followed by a newline",
            ));
        }
        self.bump();

        let mut lines: Vec<String> = Vec::new();
        loop {
            if self.peek().is_none() {
                return Err(SyntaxError::new(
                    line,
                    column,
                    format!("unterminated heredoc, expected closing '{}'", marker),
                ));
            }
            let mut current = String::new();
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                current.push(c);
                self.bump();
            }
            // The newline after the closing marker ends the attribute.
            if current.trim() == marker {
                break;
            }
            lines.push(current.trim_end_matches('\r').to_string());
            if self.peek() == Some('\n') {
                self.bump();
            }
        }

        if indented {
            let indent = lines
                .iter()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.len() - l.trim_start().len())
                .min()
                .unwrap_or(0);
            for l in &mut lines {
                *l = l.chars().skip(indent).collect();
            }
        }

        let mut value = lines.join("\n");
        if !lines.is_empty() {
            value.push('\n');
        }
        let interpolated = value.replace("$${", "").contains("${");
        Ok(TokenKind::Str {
            value,
            interpolated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        let toks = kinds("from_port = 22\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("from_port".into()),
                TokenKind::Equals,
                TokenKind::Number("22".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let toks = kinds("# hash\n// slash\n/* block\ncomment */ a = 1");
        assert_eq!(toks[0], TokenKind::Newline);
        assert_eq!(toks[1], TokenKind::Newline);
        assert_eq!(toks[2], TokenKind::Ident("a".into()));
    }

    #[test]
    fn test_string_with_interpolation_and_nested_quotes() {
        let toks = kinds(r#"name = "${format("%s-sg", var.env)}-x""#);
        assert_eq!(
            toks[2],
            TokenKind::Str {
                value: r#"${format("%s-sg", var.env)}-x"#.into(),
                interpolated: true,
            }
        );
    }

    #[test]
    fn test_escapes() {
        let toks = kinds(r#"a = "line\n\"quoted\" $${literal}""#);
        assert_eq!(
            toks[2],
            TokenKind::Str {
                value: "line\n\"quoted\" ${literal}".into(),
                interpolated: false,
            }
        );
    }

    #[test]
    fn test_heredoc() {
        let src = "policy = <<-EOT\n    {\n      \"a\": 1\n    }\n    EOT\nnext = 1\n";
        let toks = kinds(src);
        assert_eq!(
            toks[2],
            TokenKind::Str {
                value: "{\n  \"a\": 1\n}\n".into(),
                interpolated: false,
            }
        );
        assert_eq!(toks[3], TokenKind::Newline);
        assert_eq!(toks[4], TokenKind::Ident("next".into()));
    }

    #[test]
    fn test_operators() {
        let toks = kinds("a = b == c && !d || e >= -1");
        assert!(toks.contains(&TokenKind::Operator("==")));
        assert!(toks.contains(&TokenKind::Operator("&&")));
        assert!(toks.contains(&TokenKind::Operator("!")));
        assert!(toks.contains(&TokenKind::Operator("||")));
        assert!(toks.contains(&TokenKind::Operator(">=")));
        assert!(toks.contains(&TokenKind::Operator("-")));
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let err = Lexer::new("a = 1\nb = \"open\n").tokenize().unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 5);
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn test_unterminated_heredoc() {
        let err = Lexer::new("a = <<EOF\nnever closed\n").tokenize().unwrap_err();
        assert!(err.message.contains("unterminated heredoc"));
    }
}
