//! The lexical and dense retrieval clients.

pub mod dense;
pub mod lexical;

pub use dense::{DenseIndex, Encoder, FlatInnerProductIndex, HashingEncoder};
pub use lexical::{
    HttpLexicalIndex, LexicalFilters, LexicalIndex, LexicalSearchResult, StaticLexicalIndex,
};
