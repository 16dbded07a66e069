// ABOUTME: Broker implementations for halyard
// ABOUTME: Currently the line-oriented console broker

pub mod console;

pub use console::ConsoleBroker;
