pub mod engine;
pub mod error;
pub mod example;
pub mod spec;
pub mod tensor;

pub use engine::*;
pub use error::*;
pub use example::*;
pub use spec::*;
pub use tensor::*;
