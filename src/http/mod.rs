pub mod framer;
pub mod types;
