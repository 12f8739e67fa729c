pub mod columns;
pub mod compare;
pub mod controller;
pub mod dataset;
pub mod domain;
pub mod inputter;
pub mod loader;
pub mod model;
pub mod table;
pub mod ui;
