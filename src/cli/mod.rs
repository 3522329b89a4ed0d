//! CLI Module
//!
//! Command-line front end for the slowed + reverb processor.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::Result;
use crate::pipeline::ProcessingParameters;

/// Slowverb - slowed + reverb audio processor
#[derive(Parser, Debug)]
#[command(name = "slowverb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a file and export the result as WAV
    #[command(name = "process")]
    Process {
        /// Input audio file
        input: PathBuf,

        /// Output WAV file, or a directory to write the default file name into
        output: PathBuf,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Process a file and play it without exporting
    #[command(name = "preview")]
    Preview {
        /// Input audio file
        input: PathBuf,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Print the format and duration of an audio file
    #[command(name = "info")]
    Info {
        /// Audio file
        input: PathBuf,
    },

    /// Write the default configuration to a file
    #[command(name = "init-config")]
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

/// Processing overrides; unset flags fall back to the configuration
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ParamArgs {
    /// Speed multiplier in (0, 2.0]; below 1 slows down
    #[arg(short = 's', long = "slowdown")]
    pub slowdown_factor: Option<f64>,

    /// Reverb tail length in milliseconds
    #[arg(short = 'd', long = "reverb-duration")]
    pub reverb_duration_ms: Option<u32>,

    /// Share of the tail that fades out, in [0, 1]
    #[arg(long = "reverb-decay")]
    pub reverb_decay: Option<f64>,

    /// Tail kind: sine or silent
    #[arg(short = 't', long = "reverb-type")]
    pub reverb_type: Option<String>,
}

impl ParamArgs {
    /// Overlay the given flags on `defaults`
    ///
    /// Only the reverb type name is checked here; ranges are validated by
    /// the pipeline after the input checks.
    pub fn resolve(&self, defaults: &ProcessingParameters) -> Result<ProcessingParameters> {
        let reverb_type = match &self.reverb_type {
            Some(name) => name.parse()?,
            None => defaults.reverb_type,
        };
        Ok(ProcessingParameters {
            slowdown_factor: self.slowdown_factor.unwrap_or(defaults.slowdown_factor),
            reverb_duration_ms: self.reverb_duration_ms.unwrap_or(defaults.reverb_duration_ms),
            reverb_decay: self.reverb_decay.unwrap_or(defaults.reverb_decay),
            reverb_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::ReverbType;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_process() {
        let cli = Cli::try_parse_from([
            "slowverb", "-v", "process", "in.mp3", "out/", "--slowdown", "0.8", "-t", "silent",
        ])
        .unwrap();
        assert!(cli.verbose);

        match cli.command {
            Some(Commands::Process { input, output, params }) => {
                assert_eq!(input, PathBuf::from("in.mp3"));
                assert_eq!(output, PathBuf::from("out/"));
                assert_eq!(params.slowdown_factor, Some(0.8));
                assert_eq!(params.reverb_type.as_deref(), Some("silent"));
                assert_eq!(params.reverb_duration_ms, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_keeps_defaults() {
        let defaults = ProcessingParameters::default();
        assert_eq!(ParamArgs::default().resolve(&defaults).unwrap(), defaults);
    }

    #[test]
    fn test_resolve_overrides() {
        let args = ParamArgs {
            slowdown_factor: Some(0.7),
            reverb_duration_ms: Some(2500),
            reverb_decay: None,
            reverb_type: Some("Convolution".to_string()),
        };
        let params = args.resolve(&ProcessingParameters::default()).unwrap();
        assert_eq!(params.slowdown_factor, 0.7);
        assert_eq!(params.reverb_duration_ms, 2500);
        assert_eq!(params.reverb_decay, 0.5);
        assert_eq!(params.reverb_type, ReverbType::Silent);
    }

    #[test]
    fn test_resolve_defers_range_checks() {
        let args = ParamArgs {
            slowdown_factor: Some(9.0),
            ..ParamArgs::default()
        };
        let params = args.resolve(&ProcessingParameters::default()).unwrap();
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_resolve_unknown_reverb_type() {
        let args = ParamArgs {
            reverb_type: Some("plate".to_string()),
            ..ParamArgs::default()
        };
        let err = args.resolve(&ProcessingParameters::default()).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_REVERB_TYPE");
    }
}
