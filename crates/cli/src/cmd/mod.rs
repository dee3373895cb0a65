mod names;
mod partials;
mod tools;

pub use names::cmd_names;
pub use partials::{PartialsOptions, cmd_partials};
pub use tools::cmd_tools;
