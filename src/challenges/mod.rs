// Step execution, challenge sessions, and the run state machine driven by the sequence runner.

pub mod core;
pub mod session;
pub mod state;
