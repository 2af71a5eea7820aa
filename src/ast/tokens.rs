#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    /// Integer literal
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 314
    /// ```
    Integer(i64),

    /// Floating-point literal, including leading-dot and scientific forms
    ///
    /// # Examples
    /// ```text
    /// 3.14
    /// .5
    /// 11e-2
    /// ```
    Float(f64),

    /// String literal enclosed in single or double quotes, with backslash
    /// escapes already processed
    ///
    /// # Examples
    /// ```text
    /// "hello"
    /// 'it\'s'
    /// " "
    /// ```
    String(String),

    /// Boolean keyword (`true` / `false`)
    Boolean(bool),

    /// Null keyword
    Null,

    /// `this` keyword - refers to the evaluation context itself
    This,

    /// Identifier: `[A-Za-z_$][A-Za-z0-9_$]*`
    Identifier(String),

    // Structural
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `.`
    Dot,
    /// `?`
    Question,

    // Operators (longest match wins: `===` before `==` before `=`)
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `=` (assignment)
    Assign,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `===`
    EqEqEq,
    /// `!==`
    NotEqEq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    LtEq,
    /// `>=`
    GtEq,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `|` (filter pipe)
    Pipe,
    /// `!`
    Bang,

    /// End of input
    Eof,
}

impl Token {
    /// Short printable form used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Integer(n) => n.to_string(),
            Token::Float(n) => n.to_string(),
            Token::String(s) => format!("\"{}\"", s),
            Token::Boolean(b) => b.to_string(),
            Token::Null => "null".to_string(),
            Token::This => "this".to_string(),
            Token::Identifier(name) => name.clone(),
            Token::LBracket => "[".to_string(),
            Token::RBracket => "]".to_string(),
            Token::LBrace => "{".to_string(),
            Token::RBrace => "}".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
            Token::Colon => ":".to_string(),
            Token::Semicolon => ";".to_string(),
            Token::Dot => ".".to_string(),
            Token::Question => "?".to_string(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::Percent => "%".to_string(),
            Token::Assign => "=".to_string(),
            Token::EqEq => "==".to_string(),
            Token::NotEq => "!=".to_string(),
            Token::EqEqEq => "===".to_string(),
            Token::NotEqEq => "!==".to_string(),
            Token::Lt => "<".to_string(),
            Token::Gt => ">".to_string(),
            Token::LtEq => "<=".to_string(),
            Token::GtEq => ">=".to_string(),
            Token::AndAnd => "&&".to_string(),
            Token::OrOr => "||".to_string(),
            Token::Pipe => "|".to_string(),
            Token::Bang => "!".to_string(),
            Token::Eof => "end of expression".to_string(),
        }
    }
}
