//! External bitrate probing
//!
//! The probe measures a media resource's bitrate in bits per second by
//! running an external tool against its URL.

use crate::bitrate_cache::parse_bitrate;
use crate::config::ProbeConfig;
use crate::error::{FeedError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Measures the bitrate of a remote media resource
#[async_trait]
pub trait BitrateProbe: Send + Sync {
    /// Return the probe's raw numeric output (bits/sec) for `url`
    async fn probe(&self, url: &str) -> Result<String>;
}

/// Bitrate probe backed by `ffprobe`
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        FfprobeProbe {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.program.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn command(&self, url: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=bit_rate",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
            url,
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl BitrateProbe for FfprobeProbe {
    async fn probe(&self, url: &str) -> Result<String> {
        debug!("Running {} for url={}", self.program, url);

        let output = tokio::time::timeout(self.timeout, self.command(url).output())
            .await
            .map_err(|_| {
                FeedError::ProbeError(format!(
                    "{} timed out after {:?}",
                    self.program, self.timeout
                ))
            })?
            .map_err(|e| FeedError::ProbeError(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FeedError::ProbeError(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = stdout.lines().next().unwrap_or_default().trim().to_string();

        if parse_bitrate(&value).is_none() {
            return Err(FeedError::ProbeError(format!(
                "{} printed a non-numeric bitrate: {:?}",
                self.program, value
            )));
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_probe_error() {
        let probe = FfprobeProbe::new("feedit-no-such-probe-binary", Duration::from_secs(5));
        let result = probe.probe("http://127.0.0.1:1/a.mp4").await;
        assert!(matches!(result, Err(FeedError::ProbeError(_))));
    }

    #[test]
    fn test_from_config() {
        let probe = FfprobeProbe::from_config(&ProbeConfig::default());
        assert_eq!(probe.program, "ffprobe");
        assert_eq!(probe.timeout, Duration::from_secs(30));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_numeric_output_rejected() {
        // `echo` prints its arguments, which are not a number
        let probe = FfprobeProbe::new("echo", Duration::from_secs(5));
        let result = probe.probe("http://example.com/a.mp4").await;
        assert!(matches!(result, Err(FeedError::ProbeError(_))));
    }
}
