//! CLI command implementations.

mod add;
mod config;
mod episodes;
mod init;
mod process;
mod retry;
mod serve;
mod show;

pub use add::run_add;
pub use config::run_config;
pub use episodes::run_episodes;
pub use init::run_init;
pub use process::run_process;
pub use retry::run_retry;
pub use serve::run_serve;
pub use show::run_show;
