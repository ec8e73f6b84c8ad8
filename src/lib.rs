pub mod collate;
pub mod controller;
pub mod csv_export;
pub mod dataset;
pub mod domain;
pub mod frequency;
pub mod inputter;
pub mod logging;
pub mod model;
pub mod ui;
pub mod view;
