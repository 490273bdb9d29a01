//! Automated grading pipeline for React assignment submissions.
//!
//! The pipeline clones each student's repository, verifies it is a React
//! project, installs and builds it, optionally exercises the running app,
//! evaluates it against a requirement spec, and writes a grade plus feedback
//! back to the roster. `pipeline::RunSession` is the entry point; everything
//! else is a stage it composes.

pub mod config;
pub mod errors;
pub mod evaluator;
pub mod functional;
pub mod grader;
pub mod pipeline;
pub mod requirements;
pub mod roster;
pub mod toolchain;
pub mod ui;
pub mod workspace;
