use anyhow::Result;

use crate::detect::error::InitError;
use crate::detect::result::Detection;
use crate::detect::settings::{Delegate, DetectorSettings};
use crate::frame::RgbImage;

/// Inference engine seam.
///
/// A backend owns the loaded model. The `DetectorEngine` adapter decides which
/// delegate to load with, normalizes frames, and post-filters the candidates a
/// backend returns, so implementations only need to run the model.
///
/// `detect` takes `&mut self`: backends are not required to be re-entrant and
/// the engine never calls them concurrently.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the device can run this backend on `delegate`.
    fn supports_delegate(&self, delegate: Delegate) -> bool;

    /// Load (or reload) the model for the given settings.
    fn load(&mut self, settings: &DetectorSettings) -> std::result::Result<(), InitError>;

    /// Run inference on an upright image.
    ///
    /// Candidates may be unsorted and unfiltered. Zero candidates is not an error.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}
