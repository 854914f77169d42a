//! Step definitions, fixtures, and scenario bindings for pipeline
//! behaviour.

mod bdd_steps;
mod scenarios;
mod test_helpers;
