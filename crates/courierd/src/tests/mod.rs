//! Test suites for the courier daemon.

pub(crate) mod support;
