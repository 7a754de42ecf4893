mod command;
mod mode_state_machine;


pub use command::{Command, CommandAck, CommandError, ModeTransition, ValidationError};
#[cfg(test)]
pub use command::PreconditionError;
pub use mode_state_machine::ModeStateMachine;
