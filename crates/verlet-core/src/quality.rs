/// Adaptive substep controller.
///
/// Watches `update_time_ms` and recommends a substep count that keeps the
/// frame within a time budget. When the smoothed frame time runs over budget
/// a substep is dropped; after a run of frames well under budget one is
/// restored.
///
/// The controller only recommends. The caller applies it with
/// `PhysicsEngine::set_substeps` or `update_with_substeps`.
#[derive(Clone, Debug)]
pub struct AdaptiveQuality {
    /// Frame budget in milliseconds.
    pub budget_ms: f32,
    pub min_substeps: u32,
    pub max_substeps: u32,
    /// When false, `substeps()` always returns `max_substeps`.
    pub enabled: bool,
    recommended: u32,
    smoothed_ms: f32,
    calm_frames: u32,
}

/// Weight of the newest sample in the moving average.
const SMOOTHING: f32 = 0.3;
/// Below this fraction of the budget a frame counts as calm.
const CALM_FRACTION: f32 = 0.6;
/// Calm frames required before a substep is restored.
const RESTORE_AFTER_FRAMES: u32 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Load {
    Over,
    Calm,
    Steady,
}

impl AdaptiveQuality {
    pub fn new(max_substeps: u32) -> Self {
        Self {
            budget_ms: 8.0,
            min_substeps: 1.min(max_substeps),
            max_substeps,
            enabled: true,
            recommended: max_substeps,
            smoothed_ms: 0.0,
            calm_frames: 0,
        }
    }

    /// Recommended substeps for the next frame.
    pub fn substeps(&self) -> u32 {
        match self.enabled {
            true => self.recommended,
            false => self.max_substeps,
        }
    }

    /// Smoothed frame time.
    pub fn average_ms(&self) -> f32 {
        self.smoothed_ms
    }

    fn load(&self) -> Load {
        if self.smoothed_ms > self.budget_ms {
            Load::Over
        } else if self.smoothed_ms < self.budget_ms * CALM_FRACTION {
            Load::Calm
        } else {
            Load::Steady
        }
    }

    /// Feeds the time of the last frame. Returns the new recommendation.
    pub fn record(&mut self, frame_ms: f32) -> u32 {
        if !self.enabled || !frame_ms.is_finite() {
            return self.substeps();
        }
        self.smoothed_ms += (frame_ms - self.smoothed_ms) * SMOOTHING;

        match self.load() {
            Load::Over => {
                self.calm_frames = 0;
                if self.recommended > self.min_substeps {
                    self.recommended -= 1;
                    tracing::debug!(
                        substeps = self.recommended,
                        smoothed_ms = self.smoothed_ms,
                        "over frame budget, dropping a substep"
                    );
                }
            }
            Load::Calm => {
                self.calm_frames += 1;
                if self.calm_frames > RESTORE_AFTER_FRAMES {
                    self.calm_frames = 0;
                    if self.recommended < self.max_substeps {
                        self.recommended += 1;
                        tracing::debug!(substeps = self.recommended, "restoring a substep");
                    }
                }
            }
            // Close to budget: no change, and a restore has to start over.
            Load::Steady => self.calm_frames = 0,
        }
        self.substeps()
    }
}
