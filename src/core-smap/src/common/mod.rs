pub mod health;
pub mod hostname;
pub mod logging;
pub mod settings;
