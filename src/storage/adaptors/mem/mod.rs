mod mem_engine;
pub use mem_engine::*;
