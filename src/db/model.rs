pub mod history;
pub mod person;
pub mod sample;
pub mod site_settings;
