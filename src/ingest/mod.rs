//! Frame sources.
//!
//! This module provides the capture side of the pipeline:
//! - `PushSource`: frames submitted by an embedding camera callback
//! - `SyntheticSource`: generated scenes for `stub://` URIs (testing, demos)
//! - `DirectorySource`: still images from a local directory (feature: ingest-image)
//!
//! A source is bound to the pipeline with a `FrameSink` while the host is
//! visible and unbound when it is not. Sources push frames as they are
//! captured; backpressure is the pipeline's concern, not the source's.
//!
//! Sources MUST NOT:
//! - Queue frames internally once the sink is closed
//! - Log raw frame content

mod capture;
#[cfg(feature = "ingest-image")]
pub mod directory;
pub(crate) mod normalize;
pub mod push;
pub mod synthetic;

use anyhow::{anyhow, Result};

pub use crate::pipeline::FrameSink;
use crate::config::SourceSettings;
use crate::frame::Rotation;
#[cfg(feature = "ingest-image")]
pub use directory::{DirectoryConfig, DirectorySource};
pub use push::PushSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Push-based camera frame source bound to the pipeline lifecycle.
pub trait FrameSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Start delivering frames into `sink`. Rebinding replaces the previous sink.
    fn bind(&mut self, sink: FrameSink) -> Result<()>;

    /// Stop delivering frames and release capture resources.
    fn unbind(&mut self) -> Result<()>;
}

/// Open the source named by a configured URI.
///
/// `stub://...` selects the synthetic camera; a local path selects the
/// directory source when built with `ingest-image`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let rotation = Rotation::from_degrees(settings.rotation_degrees)?;
    if settings.uri.starts_with("stub://") {
        let config = SyntheticConfig {
            url: settings.uri.clone(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
            rotation,
            ..SyntheticConfig::default()
        };
        return Ok(Box::new(SyntheticSource::new(config)?));
    }
    if !is_local_path(&settings.uri) {
        return Err(anyhow!(
            "unsupported source '{}' (expected stub:// or a local directory)",
            settings.uri
        ));
    }
    #[cfg(feature = "ingest-image")]
    {
        let config = DirectoryConfig {
            path: settings.uri.clone().into(),
            target_fps: settings.target_fps,
            rotation,
            repeat: true,
        };
        Ok(Box::new(DirectorySource::new(config)?))
    }
    #[cfg(not(feature = "ingest-image"))]
    {
        Err(anyhow!(
            "directory sources require the ingest-image feature"
        ))
    }
}

fn is_local_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(uri: &str) -> SourceSettings {
        SourceSettings {
            uri: uri.to_string(),
            ..SourceSettings::default()
        }
    }

    #[test]
    fn stub_uri_opens_synthetic_source() {
        let source = open_source(&settings("stub://front")).unwrap();
        assert_eq!(source.name(), "stub://front");
    }

    #[test]
    fn remote_uris_are_rejected() {
        assert!(open_source(&settings("rtsp://camera/stream")).is_err());
        assert!(open_source(&settings("   ")).is_err());
    }

    #[test]
    fn invalid_rotation_is_rejected() {
        let mut settings = settings("stub://front");
        settings.rotation_degrees = 45;
        assert!(open_source(&settings).is_err());
    }
}
