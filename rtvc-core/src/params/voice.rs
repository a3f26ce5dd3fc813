use super::store::ParameterSnapshot;

/// Voice configuration applied to the engine before a region is transformed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceSelection {
    Single(i32),
    /// Two voices mixed by weight; weights sum to 1.
    Blend { ids: [i32; 2], weights: [f32; 2] },
}

impl VoiceSelection {
    /// Derive the selection from the primary/secondary ids and blend amount.
    ///
    /// A negative secondary id disables blending.
    pub fn from_snapshot(snapshot: &ParameterSnapshot) -> Self {
        Self::new(
            snapshot.primary_voice,
            snapshot.secondary_voice,
            snapshot.blend_amount,
        )
    }

    pub fn new(primary: i32, secondary: i32, amount: f32) -> Self {
        if secondary < 0 {
            Self::Single(primary)
        } else {
            Self::Blend {
                ids: [primary, secondary],
                weights: [1.0 - amount, amount],
            }
        }
    }

    pub fn primary(&self) -> i32 {
        match self {
            Self::Single(id) => *id,
            Self::Blend { ids, .. } => ids[0],
        }
    }

    pub fn is_blend(&self) -> bool {
        matches!(self, Self::Blend { .. })
    }
}
