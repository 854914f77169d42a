//! Step definitions, fixtures, and scenario bindings for janitor
//! behaviour.

mod bdd_steps;
mod scenarios;
mod test_helpers;
