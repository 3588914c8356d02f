//! Grid Traffic Simulation Library
//!
//! A signalised urban grid with route-following vehicle agents. Runs
//! free-standing or paced by an external time coordinator.

pub mod config;
pub mod simulation;
