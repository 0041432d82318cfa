//! Controller registry: at most one live controller per network epoch.
//!
//! Roster lifecycle events name a construction; the registry hands back the
//! controller driving it. When the construction changes (a new transition
//! superseded the old one, or handoff retired it), the outgoing
//! controller's pending work is cancelled and a fresh controller is seeded
//! from the store — scratch state is never shared across controllers.

use super::{Controller, ControllerState, NodeContext};
use crate::roster::{RosterPhase, RosterTransition};
use crate::store::{Construction, ConstructionStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Holds the single live controller.
#[derive(Default)]
pub struct ControllerRegistry {
    current: Option<Controller>,
}

impl ControllerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The controller for `construction`, creating (and replacing) as
    /// needed. The replaced controller's pending work is cancelled first.
    pub fn get_or_create_for(
        &mut self,
        transition: &RosterTransition,
        construction: &Construction,
        store: &mut ConstructionStore,
        ctx: &Arc<NodeContext>,
        now: u64,
    ) -> &mut Controller {
        let needs_replacement = match &self.current {
            Some(existing) => existing.construction_id() != construction.id,
            None => true,
        };

        if needs_replacement {
            if let Some(old) = self.current.as_mut() {
                debug!(
                    old_id = old.construction_id(),
                    new_id = construction.id,
                    "replacing controller, cancelling pending work"
                );
                old.cancel_pending_work();
            }
            self.current = Some(Self::build(transition, construction, store, ctx, now));
        }

        self.current
            .as_mut()
            .expect("controller installed by the branch above")
    }

    /// Drop the live controller (if any), cancelling its pending work.
    pub fn clear(&mut self) {
        if let Some(mut old) = self.current.take() {
            old.cancel_pending_work();
        }
    }

    fn build(
        transition: &RosterTransition,
        construction: &Construction,
        store: &mut ConstructionStore,
        ctx: &Arc<NodeContext>,
        now: u64,
    ) -> Controller {
        if construction.is_complete() || transition.phase == RosterPhase::Handoff {
            debug!(construction = %construction, "installing inert controller");
            return Controller::Inert(construction.id);
        }

        // Seed scratch state from the store: adopted keys for the target
        // roster, plus this construction's signatures and votes from every
        // node involved in the transition.
        let mut involved = transition.source.node_ids();
        involved.extend(transition.target.node_ids());
        involved.sort_unstable();
        involved.dedup();

        let key_publications = store.get_key_publications(&transition.target.node_ids(), now);
        let signature_publications =
            store.get_signature_publications(construction.id, &involved);
        let votes = store.get_votes(construction.id, &involved);

        // The previous link of the chain, when the active slot holds it.
        let active = store.get_active();
        let source_proof = if active.id != construction.id
            && active.is_complete()
            && active.target_roster_hash == construction.source_roster_hash
        {
            active.target_proof.clone()
        } else {
            None
        };

        info!(
            construction = %construction,
            keys = key_publications.len(),
            signatures = signature_publications.len(),
            votes = votes.len(),
            "seeded controller from store"
        );

        Controller::Active(Box::new(ControllerState::new(
            Arc::clone(ctx),
            construction.clone(),
            transition.source.clone(),
            transition.target.clone(),
            source_proof,
            key_publications,
            signature_publications,
            votes,
        )))
    }
}
