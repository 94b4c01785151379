use std::sync::Arc;

use crate::physics::SimulationQueue;
use crate::settings::EngineSettings;
use crate::vr::VrDevice;

/// Engine-wide services handed to the frame passes by reference.
#[derive(Clone, Default)]
pub struct EngineContext {
    pub settings: EngineSettings,
    pub vr: Option<Arc<dyn VrDevice>>,
    pub physics: Option<SimulationQueue>,
}

impl EngineContext {
    #[must_use]
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            vr: None,
            physics: None,
        }
    }

    #[must_use]
    pub fn with_vr(mut self, device: Arc<dyn VrDevice>) -> Self {
        self.vr = Some(device);
        self
    }

    #[must_use]
    pub fn with_physics(mut self, queue: SimulationQueue) -> Self {
        self.physics = Some(queue);
        self
    }
}
