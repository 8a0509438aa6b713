//! Track Router: classifies incoming local tracks as camera or
//! screen-share, and decides which existing outbound track, if any, a new
//! one replaces.

/// What kind of source a local track came from, as best as can be told
/// from the device/stream metadata exposed to this client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrackKind {
    Audio,
    Camera,
    ScreenShare,
}

/// Metadata describing a candidate local track, mirroring what a
/// `getUserMedia`/`getDisplayMedia` caller would have on hand: the track's
/// label, whether the capture reports a `displaySurface`, and the frame
/// resolution if known.
#[derive(Clone, Debug, Default)]
pub struct TrackDescriptor {
    pub label: String,
    pub has_display_surface: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub is_audio: bool,
}

const SCREEN_LABEL_MARKERS: [&str; 4] = ["screen", "window", "tab", "display"];

/// Classifies a track as camera or screen-share. A track is treated as
/// screen-share if its label contains one of the screen-sharing markers,
/// it reports a `displaySurface`, or its resolution exceeds 1000x700 — any
/// one of the three is sufficient.
#[must_use]
pub fn classify(descriptor: &TrackDescriptor) -> TrackKind {
    if descriptor.is_audio {
        return TrackKind::Audio;
    }

    let label_lower = descriptor.label.to_lowercase();
    let label_suggests_screen = SCREEN_LABEL_MARKERS
        .iter()
        .any(|marker| label_lower.contains(marker));

    let resolution_suggests_screen = matches!(
        (descriptor.width, descriptor.height),
        (Some(w), Some(h)) if w > 1000 && h > 700
    );

    if label_suggests_screen || descriptor.has_display_surface || resolution_suggests_screen {
        TrackKind::ScreenShare
    } else {
        TrackKind::Camera
    }
}

/// Picks the index of the existing outbound sender, if any, that a new
/// track of `kind` should replace: audio and camera tracks replace the
/// existing sender of the same kind (screen-share excluded, since a camera
/// swap must never preempt an active screen-share); a screen-share only
/// replaces an existing screen-share. No match means the track is added as
/// a new sender rather than replacing anything, and is enabled immediately
/// on arrival.
#[must_use]
pub fn replacement_target(kind: TrackKind, existing_kinds: &[TrackKind]) -> Option<usize> {
    match kind {
        TrackKind::ScreenShare => existing_kinds
            .iter()
            .position(|k| *k == TrackKind::ScreenShare),
        TrackKind::Audio | TrackKind::Camera => existing_kinds
            .iter()
            .position(|k| *k == kind && *k != TrackKind::ScreenShare),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_marker_wins_classification() {
        let d = TrackDescriptor {
            label: "Screen 1".into(),
            ..Default::default()
        };
        assert_eq!(classify(&d), TrackKind::ScreenShare);
    }

    #[test]
    fn display_surface_flag_wins_classification() {
        let d = TrackDescriptor {
            has_display_surface: true,
            ..Default::default()
        };
        assert_eq!(classify(&d), TrackKind::ScreenShare);
    }

    #[test]
    fn large_resolution_implies_screen_share() {
        let d = TrackDescriptor {
            width: Some(1920),
            height: Some(1080),
            ..Default::default()
        };
        assert_eq!(classify(&d), TrackKind::ScreenShare);
    }

    #[test]
    fn small_unlabeled_capture_is_camera() {
        let d = TrackDescriptor {
            label: "FaceTime HD Camera".into(),
            width: Some(640),
            height: Some(480),
            ..Default::default()
        };
        assert_eq!(classify(&d), TrackKind::Camera);
    }

    #[test]
    fn audio_flag_overrides_everything_else() {
        let d = TrackDescriptor {
            label: "Screen Capture Audio".into(),
            is_audio: true,
            ..Default::default()
        };
        assert_eq!(classify(&d), TrackKind::Audio);
    }

    #[test]
    fn camera_never_replaces_active_screen_share() {
        let existing = vec![TrackKind::ScreenShare];
        assert!(replacement_target(TrackKind::Camera, &existing).is_none());
    }

    #[test]
    fn screen_share_replaces_prior_screen_share_only() {
        let existing = vec![TrackKind::Camera, TrackKind::ScreenShare];
        assert_eq!(replacement_target(TrackKind::ScreenShare, &existing), Some(1));
    }
}
