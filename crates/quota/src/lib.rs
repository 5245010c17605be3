//! Command implementations and output formatting for the `quota` binary.

pub mod commands;
pub mod format;
pub mod output;

/// Build-time version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process exit status for every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    GeneralError,
    InvalidUsage,
    /// Strict mode and nothing was discovered.
    NoAccounts,
    /// Strict mode and at least one account failed.
    StrictFailure,
}

impl Exit {
    pub fn code(self) -> u8 {
        match self {
            Exit::Success => 0,
            Exit::GeneralError => 1,
            Exit::InvalidUsage => 2,
            Exit::NoAccounts => 3,
            Exit::StrictFailure => 4,
        }
    }
}

impl From<Exit> for std::process::ExitCode {
    fn from(exit: Exit) -> Self {
        std::process::ExitCode::from(exit.code())
    }
}
