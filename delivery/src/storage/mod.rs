pub mod common;
pub mod entities;
pub mod in_memory;
pub mod prod;

pub use common::*;
pub use in_memory::InMemoryStorage;
pub use prod::ProdStorage;
