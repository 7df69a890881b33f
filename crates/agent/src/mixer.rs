use stemline_core::{EnergyLevel, MixPlan, TrackId, Transition};

/// Plan the transition into `track_id`. Pure function, no I/O: high energy
/// cuts hard, low energy gets the long crossfade, everything else gets the
/// standard one.
pub fn plan(
    track_id: &TrackId,
    previous_track_id: Option<&TrackId>,
    mood: Option<&str>,
    energy: Option<EnergyLevel>,
) -> MixPlan {
    let transition = match energy {
        Some(EnergyLevel::High) => Transition::HardCut,
        Some(EnergyLevel::Low) => Transition::CrossfadeLong,
        _ => Transition::Crossfade,
    };

    let notes = match mood {
        Some(mood) if !mood.trim().is_empty() => format!("prioritize {mood} texture"),
        _ => "neutral".to_string(),
    };

    MixPlan {
        track_id: track_id.clone(),
        previous_track_id: previous_track_id.cloned(),
        transition,
        notes,
    }
}
