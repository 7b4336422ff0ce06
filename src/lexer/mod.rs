use logos::Logos;

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum Token {
    // Keywords
    #[token("var")]
    Var,
    #[token("final")]
    Final,
    #[token("fun")]
    Fun,
    #[token("class")]
    Class,
    #[token("is")]
    Is,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("return")]
    Return,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("throw")]
    Throw,
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,
    #[token("nan")]
    Nan,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("@")]
    At,
    #[token("?")]
    Question,

    // Assignment operators (longest first so logos prefers them)
    #[token("<<=")]
    ShlAssign,
    #[token(">>=")]
    ShrAssign,
    #[token("+=")]
    AddAssign,
    #[token("-=")]
    SubAssign,
    #[token("*=")]
    MulAssign,
    #[token("/=")]
    DivAssign,
    #[token("\\=")]
    FloorDivAssign,
    #[token("%=")]
    RemAssign,
    #[token("&=")]
    AndAssign,
    #[token("|=")]
    OrAssign,
    #[token("=")]
    Assign,

    // Binary / unary operators
    #[token("**")]
    StarStar,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("\\")]
    Backslash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,

    // Literals. Integer and float digits are kept as text: they become
    // bignums at evaluation time, and no native width would hold them.
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    Float(String),

    #[regex(r"[0-9]+", |lex| lex.slice().to_string())]
    Int(String),

    #[regex(r#""(\\.|[^"\\])*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len() - 1])
    })]
    Str(String),

    #[regex(r"'(\\.|[^'\\])'", |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len() - 1]).chars().next()
    })]
    Char(char),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

#[derive(Debug, thiserror::Error)]
#[error("lex error at byte {position}: unexpected '{snippet}'")]
pub struct LexError {
    pub position: usize,
    pub snippet: String,
}

/// Lex source into tokens with byte spans.
pub fn lex(source: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                let span = lexer.span();
                return Err(LexError {
                    position: span.start,
                    snippet: source[span].to_string(),
                });
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lex_var_decl() {
        let tokens = kinds("var x = 5");
        assert_eq!(
            tokens,
            vec![
                Token::Var,
                Token::Ident("x".to_string()),
                Token::Assign,
                Token::Int("5".to_string()),
            ]
        );
    }

    #[test]
    fn lex_big_integer_kept_as_text() {
        let tokens = kinds("123456789012345678901234567890");
        assert_eq!(
            tokens,
            vec![Token::Int("123456789012345678901234567890".to_string())]
        );
    }

    #[test]
    fn lex_float_with_exponent() {
        let tokens = kinds("1.5e10");
        assert_eq!(tokens, vec![Token::Float("1.5e10".to_string())]);
    }

    #[test]
    fn lex_compound_assign_wins_over_parts() {
        assert_eq!(kinds("<<=")[0], Token::ShlAssign);
        assert_eq!(kinds(">>=")[0], Token::ShrAssign);
        assert_eq!(kinds("\\=")[0], Token::FloorDivAssign);
        assert_eq!(kinds("**")[0], Token::StarStar);
    }

    #[test]
    fn lex_string_escapes() {
        let tokens = kinds(r#""a\nb\"c""#);
        assert_eq!(tokens, vec![Token::Str("a\nb\"c".to_string())]);
    }

    #[test]
    fn lex_char_literal() {
        assert_eq!(kinds("'x'"), vec![Token::Char('x')]);
        assert_eq!(kinds(r"'\n'"), vec![Token::Char('\n')]);
    }

    #[test]
    fn lex_comments_skipped() {
        let tokens = kinds("var x // trailing\n/* block\ncomment */ = 1");
        assert_eq!(
            tokens,
            vec![
                Token::Var,
                Token::Ident("x".to_string()),
                Token::Assign,
                Token::Int("1".to_string()),
            ]
        );
    }

    #[test]
    fn lex_keywords_vs_idents() {
        let tokens = kinds("class classy is island");
        assert_eq!(
            tokens,
            vec![
                Token::Class,
                Token::Ident("classy".to_string()),
                Token::Is,
                Token::Ident("island".to_string()),
            ]
        );
    }

    #[test]
    fn lex_error_position() {
        let err = lex("var x = $").unwrap_err();
        assert_eq!(err.position, 8);
        assert_eq!(err.snippet, "$");
    }

    #[test]
    fn lex_labeled_loop_tokens() {
        let tokens = kinds("outer: for (;;) { break outer }");
        assert_eq!(tokens[0], Token::Ident("outer".to_string()));
        assert_eq!(tokens[1], Token::Colon);
        assert_eq!(tokens[2], Token::For);
        assert!(tokens.contains(&Token::Break));
    }
}
