//! # Platform-specific utilities
//!
//! Questo modulo centralizza la risoluzione cross-platform dei tool esterni
//! usati dal backend media (ffmpeg, ffprobe, cwebp, exiftool).

use std::collections::HashMap;
use std::sync::OnceLock;

/// External tools the media backend may invoke
pub const MEDIA_TOOLS: [&str; 4] = ["ffmpeg", "ffprobe", "cwebp", "exiftool"];

/// Platform-specific command manager
pub struct PlatformCommands {
    commands: HashMap<&'static str, &'static str>,
    which_command: &'static str,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    fn new() -> Self {
        let (commands, which_command) = if cfg!(windows) {
            let commands = HashMap::from([
                ("ffmpeg", "ffmpeg.exe"),
                ("ffprobe", "ffprobe.exe"),
                ("cwebp", "cwebp.exe"),
                ("exiftool", "exiftool.exe"),
            ]);
            (commands, "where")
        } else {
            let commands = HashMap::from([
                ("ffmpeg", "ffmpeg"),
                ("ffprobe", "ffprobe"),
                ("cwebp", "cwebp"),
                ("exiftool", "exiftool"),
            ]);
            (commands, "which")
        };

        Self {
            commands,
            which_command,
        }
    }

    /// Get the platform-specific command name
    pub fn get_command<'a>(&self, base_name: &'a str) -> &'a str {
        self.commands.get(base_name).copied().unwrap_or(base_name)
    }

    /// Get the command used to check if a program exists
    pub fn which_command(&self) -> &str {
        self.which_command
    }

    /// Check if a command is available on the PATH
    pub async fn is_command_available(&self, base_name: &str) -> bool {
        let command_name = self.get_command(base_name);

        let result = tokio::process::Command::new(self.which_command)
            .arg(command_name)
            .output()
            .await;

        match result {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    /// Availability of every media tool, in `MEDIA_TOOLS` order
    pub async fn media_tools_report(&self) -> Vec<(&'static str, bool)> {
        let mut report = Vec::with_capacity(MEDIA_TOOLS.len());
        for tool in MEDIA_TOOLS {
            report.push((tool, self.is_command_available(tool).await));
        }
        report
    }
}
