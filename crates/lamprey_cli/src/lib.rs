//! Command-line front end for `lamprey_core`: JSON configurations, console
//! summaries, CSV export and trajectory plots.
pub mod commands;
pub mod config_file;
pub mod plot;
pub mod report;
