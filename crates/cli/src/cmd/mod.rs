mod build;
mod clean;
mod install;
mod plan;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use install::cmd_install;
pub use plan::cmd_plan;
