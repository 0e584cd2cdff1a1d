//! Transcoder process launch
//!
//! Builds the command line for the external process that rewraps the raw
//! H.264 elementary stream (stdin) into a container (stdout).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

/// Transcoder process settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderConfig {
    /// Program to launch
    pub program: PathBuf,

    /// Output container format (ffmpeg `-f` name)
    pub container: String,

    /// Extra arguments inserted before the output (ffmpeg mode only)
    pub extra_args: Vec<String>,

    /// Replaces the generated ffmpeg arguments entirely when set
    pub custom_args: Option<Vec<String>>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            container: "matroska".to_string(),
            extra_args: Vec::new(),
            custom_args: None,
        }
    }
}

impl TranscoderConfig {
    /// ffmpeg at a custom path
    pub fn ffmpeg(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Any program with a fixed argument list
    ///
    /// The program must read the elementary stream on stdin and write the
    /// container on stdout.
    pub fn custom<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            custom_args: Some(args.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Set the output container format
    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    /// Append an extra output argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Arguments passed to the program
    pub fn args(&self, framerate: u32) -> Vec<OsString> {
        if let Some(ref custom) = self.custom_args {
            return custom.iter().map(OsString::from).collect();
        }

        let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
        // Input: raw elementary stream at a fixed rate on stdin
        args.extend(["-f", "h264", "-r"].map(OsString::from));
        args.push(framerate.to_string().into());
        args.extend(["-i", "-"].map(OsString::from));
        // Output: container on stdout, video copied without re-encoding
        args.push("-f".into());
        args.push(self.container.as_str().into());
        args.extend(["-vcodec", "copy"].map(OsString::from));
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push("-".into());

        args
    }

    /// Program name for log output
    pub fn program_name(&self) -> &Path {
        &self.program
    }

    /// Build the command with all three standard streams piped
    ///
    /// The child is killed if its handle is dropped before it exits.
    pub(crate) fn command(&self, framerate: u32) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.args(framerate))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}
