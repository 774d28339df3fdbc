//! MedFlow CLI library: the command implementations behind the `medflow`
//! binary, exposed so they can be exercised from integration tests.

pub mod commands;
