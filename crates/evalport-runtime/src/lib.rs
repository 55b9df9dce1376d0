pub mod batcher;
pub mod construct;
pub mod error;
pub mod graph;
pub mod request;
pub mod worker;
pub mod worker_model;

pub use batcher::*;
pub use construct::*;
pub use error::*;
pub use graph::*;
pub use request::*;
pub use worker::*;
pub use worker_model::*;
