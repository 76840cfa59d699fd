//! Integration tests for the worker pool and batch orchestrator.
//!
//! Everything runs in-process against fake fetch and transcode capabilities;
//! no network access is needed.

pub mod support;

pub mod orchestrator_tests;
