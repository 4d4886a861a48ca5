use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::ControllerError;
use crate::model::EntityRef;

/// Entities with a mutation between Begin and Settle.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    entities: Mutex<HashSet<EntityRef>>,
}

impl InFlight {
    /// Marks `entity` busy until the returned guard is dropped.
    pub fn acquire(self: &Arc<Self>, entity: EntityRef) -> Result<InFlightGuard, ControllerError> {
        if !self.entities.lock().insert(entity) {
            debug!(entity = %entity, "Rejecting a concurrent mutation.");
            return Err(ControllerError::Busy(entity));
        }
        Ok(InFlightGuard {
            in_flight: self.clone(),
            entity,
        })
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.entities.lock().contains(entity)
    }
}

#[derive(Debug)]
pub(crate) struct InFlightGuard {
    in_flight: Arc<InFlight>,
    entity: EntityRef,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.entities.lock().remove(&self.entity);
    }
}
