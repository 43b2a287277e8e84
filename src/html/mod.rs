pub mod apply;
pub mod chunk;
pub mod dom;
pub mod extract;
