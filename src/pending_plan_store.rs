//! Hold decomposed plans awaiting human approval (C8).

use cos_core::{PendingPlan, ReferenceCode};
use dashmap::DashMap;

#[derive(Default)]
pub struct PendingPlanStore {
    plans: DashMap<ReferenceCode, PendingPlan>,
}

impl PendingPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, parent_ref: ReferenceCode, plan: PendingPlan) {
        self.plans.insert(parent_ref, plan);
    }

    pub fn get(&self, parent_ref: ReferenceCode) -> Option<PendingPlan> {
        self.plans.get(&parent_ref).map(|entry| entry.clone())
    }

    pub fn remove(&self, parent_ref: ReferenceCode) -> Option<PendingPlan> {
        self.plans.remove(&parent_ref).map(|(_, plan)| plan)
    }
}
