pub mod errors;
pub mod models;
pub mod normalize;
pub mod providers;
pub mod stream;
pub mod tools;
