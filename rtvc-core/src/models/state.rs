/// Capture loop state machine.
///
/// State transitions:
/// ```text
/// idle → starting → running → stopping → idle
///           ↓
///          idle   (start failed, rolled back)
/// ```
///
/// There is no error state: a failed start rolls back to `Idle` and a device
/// fault while running moves to `Stopping` until the owner calls stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}
