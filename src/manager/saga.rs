use tracing::warn;

use super::ManagerInner;
use crate::flight_plan::FlightPlanElement;

/// Compensation for an enroute element inserted locally before the simulator has it.
///
/// Dropping the saga without [`commit`](Self::commit) removes the element again, as
/// long as it is still the element at the index it was inserted at. This covers an
/// early `?` return as well as a cancelled task.
pub(super) struct EnrouteInsertSaga<'a> {
    inner: &'a ManagerInner,
    index: usize,
    element: FlightPlanElement,
    committed: bool,
}

impl<'a> EnrouteInsertSaga<'a> {
    pub(super) fn begin(inner: &'a ManagerInner, index: usize, element: FlightPlanElement) -> Self {
        Self {
            inner,
            index,
            element,
            committed: false,
        }
    }

    pub(super) fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for EnrouteInsertSaga<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        let mut state = self.inner.write_state();
        let still_there = state
            .active
            .enroute()
            .get(self.index)
            .is_some_and(|e| e.same_route(&self.element));
        if still_there {
            state.active.remove_enroute_element(self.index);
            warn!(
                instrument = %self.inner.instrument_id,
                "Rolled back enroute insert of {} at {}",
                self.element.describe(),
                self.index
            );
            metrics::counter!("flightplan.manager.rollbacks_total").increment(1);
        }
    }
}
