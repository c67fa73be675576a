mod config;
mod delete;
mod list;
mod show;
mod simulate;
mod upload;

pub use config::run as run_config;
pub use delete::run as run_delete;
pub use list::run as run_list;
pub use show::run as run_show;
pub use simulate::run as run_simulate;
pub use upload::run as run_upload;
