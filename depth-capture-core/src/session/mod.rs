pub mod orchestrator;
pub mod stop_signal;
pub mod worker;
