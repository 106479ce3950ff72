use thiserror::Error;
use traffic_core::TrafficError;

/// Process exit statuses, listed by `traffic codes exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Undefined,
    InvalidArgument,
    StoreUnavailable,
    Config,
}

impl ExitStatus {
    pub const ALL: [ExitStatus; 5] = [
        ExitStatus::Success,
        ExitStatus::Undefined,
        ExitStatus::InvalidArgument,
        ExitStatus::StoreUnavailable,
        ExitStatus::Config,
    ];

    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Undefined => 1,
            Self::InvalidArgument => 2,
            Self::StoreUnavailable => 3,
            Self::Config => 4,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Undefined => "Undefined error",
            Self::InvalidArgument => "Invalid argument (filter, regex, date)",
            Self::StoreUnavailable => "Statistics store unavailable",
            Self::Config => "Configuration error",
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn core_status(err: &TrafficError) -> ExitStatus {
    match err {
        TrafficError::InvalidFilter(_) => ExitStatus::InvalidArgument,
        TrafficError::Store(_) => ExitStatus::StoreUnavailable,
        TrafficError::Config(_) => ExitStatus::Config,
        _ => ExitStatus::Undefined,
    }
}

/// Map a command failure to the status the process exits with.
pub fn exit_status(err: &anyhow::Error) -> ExitStatus {
    for cause in err.chain() {
        if cause.downcast_ref::<CliError>().is_some() {
            return ExitStatus::InvalidArgument;
        }
        if let Some(core) = cause.downcast_ref::<TrafficError>() {
            return core_status(core);
        }
    }
    ExitStatus::Undefined
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn maps_core_errors() {
        let err = anyhow::Error::from(TrafficError::Store("unable to open database".into()));
        assert_eq!(exit_status(&err), ExitStatus::StoreUnavailable);

        let err = anyhow::Error::from(TrafficError::Config("bad".into()))
            .context("loading configuration");
        assert_eq!(exit_status(&err), ExitStatus::Config);

        let err: anyhow::Result<()> =
            Err(CliError::InvalidArgument("--from".into())).context("stats");
        assert_eq!(exit_status(&err.unwrap_err()), ExitStatus::InvalidArgument);

        assert_eq!(exit_status(&anyhow::anyhow!("boom")), ExitStatus::Undefined);
    }

    #[test]
    fn codes_are_distinct() {
        let codes: Vec<u8> = ExitStatus::ALL.iter().map(ExitStatus::code).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4]);
    }
}
