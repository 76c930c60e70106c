pub mod instrument;
pub mod tick;
