//! Scenario-based tests for mlpipeline

mod helpers;

mod config_merge;
mod dependency_wiring;
mod end_to_end;
mod prerequisites;
mod static_inputs;
