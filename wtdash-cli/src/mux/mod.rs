//! Native terminal sessions hosted in a private tmux server.

mod controller;
mod tmux;

pub use controller::Controller;
pub use tmux::{MuxError, TMUX};
