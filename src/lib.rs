pub mod commands;
pub mod modules;

pub use modules::catalog;
pub use modules::common::error::TidyError;
pub use modules::common::utils;
pub use modules::deepscan;
pub use modules::detection;
pub use modules::inventory;
pub use modules::questionnaire;
pub use modules::store;
pub use modules::uninstall;
