pub mod assets;
pub mod convert;
pub mod health;
pub mod setup;
pub mod ui;
