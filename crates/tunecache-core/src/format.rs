//! # Target Audio Format
//!
//! Every cache entry holds exactly one linear audio artifact in a single
//! target format. The format fixes the file extension used for artifact
//! names, the transcode parameters handed to the fetch capability, and
//! the `Content-Type` served to clients.

/// Transcode target and serving parameters for stored artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Codec name understood by the fetch capability (e.g. `mp3`).
    pub codec: &'static str,
    /// File extension of stored artifacts, without the dot.
    pub extension: &'static str,
    /// MIME type served for the artifact.
    pub mime_type: &'static str,
    /// Target bitrate in kbit/s.
    pub quality_kbps: u32,
}

impl AudioFormat {
    /// MP3 at 192 kbit/s.
    pub const MP3: Self = Self {
        codec: "mp3",
        extension: "mp3",
        mime_type: "audio/mpeg",
        quality_kbps: 192,
    };
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::MP3
    }
}
