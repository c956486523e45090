pub mod lexer;
pub mod linker;
pub mod token;
pub mod token_dumper;
