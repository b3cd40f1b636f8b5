//! Terminal dashboard: layout, rendering, input, auto-exit, and the
//! application controller tying them together.

pub mod app;
pub mod autoexit;
pub mod input;
pub mod layout;
pub mod renderer;
