pub mod broadcast;
pub mod buffer;
pub mod fanout;
pub mod json;
pub mod view;
