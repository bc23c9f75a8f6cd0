pub mod check_config;
pub mod run;
pub mod script;

pub use check_config::handle_check_config;
pub use run::handle_run;
pub use script::handle_script;
