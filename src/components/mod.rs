pub mod hooks;
pub mod ui;
