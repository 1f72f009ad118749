mod arena;
mod token;
mod tokeniser;

pub use arena::{ArenaSpan, TokenArena};
pub use token::{
    keyword_text, AttributeValuePart, Token, TokenBlock, TokenKind, TokenText,
};
pub use tokeniser::{render_tokens, Tokeniser};
