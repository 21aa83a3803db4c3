pub mod debug;
pub mod send;
