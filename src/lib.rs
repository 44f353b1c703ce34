pub mod debugger;
pub mod log;
pub mod ui;
pub mod version;
