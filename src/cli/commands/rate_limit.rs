use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

use crate::api::rate_limit::{quota, DEFAULT_CAPACITY, DEFAULT_REFILL_PER_SECOND};

pub const ARG_RATE_LIMIT_CAPACITY: &str = "rate-limit-capacity";
pub const ARG_RATE_LIMIT_REFILL: &str = "rate-limit-refill";

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub capacity: u32,
    pub refill_per_second: f64,
}

impl Options {
    /// Parse admission gate arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the capacity is zero or the refill rate is not a positive number.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let capacity = matches
            .get_one::<u32>(ARG_RATE_LIMIT_CAPACITY)
            .copied()
            .unwrap_or(DEFAULT_CAPACITY);
        let refill_per_second = matches
            .get_one::<f64>(ARG_RATE_LIMIT_REFILL)
            .copied()
            .unwrap_or(DEFAULT_REFILL_PER_SECOND);

        quota(capacity, refill_per_second).with_context(|| {
            format!("Invalid --{ARG_RATE_LIMIT_CAPACITY}/--{ARG_RATE_LIMIT_REFILL}")
        })?;

        Ok(Self {
            capacity,
            refill_per_second,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_CAPACITY)
                .long(ARG_RATE_LIMIT_CAPACITY)
                .help("Burst size of the global admission gate")
                .env("BOUQUINISTE_RATE_LIMIT_CAPACITY")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_REFILL)
                .long(ARG_RATE_LIMIT_REFILL)
                .help("Tokens added to the admission gate per second")
                .env("BOUQUINISTE_RATE_LIMIT_REFILL")
                .default_value("1.0")
                .value_parser(clap::value_parser!(f64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options> {
        temp_env::with_vars(
            [
                ("BOUQUINISTE_RATE_LIMIT_CAPACITY", None::<&str>),
                ("BOUQUINISTE_RATE_LIMIT_REFILL", None::<&str>),
            ],
            || Options::parse(&with_args(Command::new("test")).get_matches_from(args)),
        )
    }

    #[test]
    fn defaults() {
        let options = parse(&["test"]).ok();
        assert_eq!(options.map(|o| o.capacity), Some(5));
        assert_eq!(options.map(|o| o.refill_per_second), Some(1.0));
    }

    #[test]
    fn rejects_empty_bucket() {
        assert!(parse(&["test", "--rate-limit-capacity", "0"]).is_err());
        assert!(parse(&["test", "--rate-limit-refill", "0"]).is_err());
        assert!(parse(&["test", "--rate-limit-refill", "NaN"]).is_err());
    }

    #[test]
    fn custom_values() {
        let options = parse(&[
            "test",
            "--rate-limit-capacity",
            "100",
            "--rate-limit-refill",
            "2.5",
        ])
        .ok();
        assert_eq!(options.map(|o| o.capacity), Some(100));
        assert_eq!(options.map(|o| o.refill_per_second), Some(2.5));
    }
}
