//! Test suites for the daemon connection core.

mod disconnect_queue;
mod support;
