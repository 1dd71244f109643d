#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

//! Clinical trial retrieval-and-ranking core: a hybrid lexical/dense retriever, a
//! free-text eligibility criteria parser, a feasibility scorer, and a re-ranking
//! orchestrator that blends the two and paginates.

pub mod cli;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod linker;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod parser;
pub mod render;
pub mod retrieval;
pub mod scorer;

mod utils;
