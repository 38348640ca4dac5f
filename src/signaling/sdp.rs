//! Session description rewriting
//!
//! Descriptions are opaque except for one textual patch that forces stereo
//! Opus at the maximum average bitrate. The patch is applied to both offer
//! and answer before they are set locally and stored.

use crate::signaling::types::SessionDescription;

pub const FEC_PARAMETER: &str = "useinbandfec=1";
pub const STEREO_PARAMETERS: &str = "useinbandfec=1; stereo=1; maxaveragebitrate=510000";

/// Rewrite the first `useinbandfec=1` occurrence
///
/// A description without the parameter is returned unchanged.
pub fn patch_sdp(sdp: &str) -> String {
    sdp.replacen(FEC_PARAMETER, STEREO_PARAMETERS, 1)
}

pub fn patch_description(mut description: SessionDescription) -> SessionDescription {
    description.sdp = patch_sdp(&description.sdp);
    description
}
