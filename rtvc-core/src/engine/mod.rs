pub mod bypass;
pub mod invoker;
pub mod transform;
