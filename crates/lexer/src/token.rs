use std::fmt;

/// Source position of a lexed token: 1-based line, 0-based byte offset into the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: u32,
    pub offset: u32,
}

/// The exhaustive set of token kinds a spelling can resolve to. Kind is derived purely from
/// spelling during lexing; no semantic work beyond register/pseudo-register/keyword table
/// lookups and (for `!`-qualified identifiers) an eager resolver callback happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Unknown,
    Keyword,
    Special,
    Register,
    PseudoRegister,
    Hex,
    Octal,
    Decimal,
    Binary,
    String,
    GlobalId,
    LocalId,
    UnresolvedGlobalId,
    UnresolvedLocalId,
    WhiteSpace,
    Comment,
    SemanticRule,
    NonTerminal,
    EndOfStream,
    Temp,
}

/// A single lexeme. Immutable once emitted; ownership belongs exclusively to the
/// `TokenStream` (or caller) that produced it via `Lexer::next_token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub pos: SourcePos,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, pos: SourcePos) -> Self {
        Self {
            kind,
            value: value.into(),
            pos,
        }
    }

    pub fn end_of_stream(pos: SourcePos) -> Self {
        Self::new(TokenKind::EndOfStream, "$", pos)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.kind == TokenKind::EndOfStream
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?})@{}:{}", self.kind, self.value, self.pos.line, self.pos.offset)
    }
}
