pub mod manual;
pub mod runtime;
