//! Cart synchronisation store.
//!
//! Holds the local mirror of the user's cart and keeps it convergent with the server's cart.
//! Quantity edits are applied to the mirror straight away and then sent to the cart
//! collaborator. Every request is tagged with a [`RequestId`]; for any one line item only the
//! answer to the newest request may write into the mirror, older answers are dropped when they
//! arrive. A failed request puts the item back to what the server last confirmed.
//!
//! The store does no I/O itself. Mutations hand back a [`PendingMutation`] describing the
//! request to send, and the answer is fed back through [`CartStore::settle_quantity`] or
//! [`CartStore::settle_remove`].

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::{
    Aggregation, AppliedCoupon, CartError, LineItem, LineKey, Precondition,
    QuantityConfirmation, RemoteError, RequestId, ServerCart, aggregate, money::aggregate_items,
};

/// The lowest quantity `decrease` goes to.
pub const DEFAULT_FLOOR: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum LineState {
    Idle,
    Pending(RequestId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    SetQuantity(u32),
    Remove,
}

/// A request the caller must send to the cart collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub request_id: RequestId,
    pub key: LineKey,
    pub kind: MutationKind,
}

/// What became of an answer from the cart collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The answer is now reflected in the mirror.
    Committed,
    /// A newer request for the same item decides the mirror; the answer was dropped.
    Discarded,
}

#[derive(Debug, Clone)]
enum Outstanding {
    Quantity,
    // Where the item sat before it was optimistically removed.
    Removal { index: usize, item: LineItem },
}

#[derive(Debug, Clone, Copy)]
struct Confirmed {
    as_of: RequestId,
    quantity: u32,
}

#[derive(Debug, Clone, Default)]
struct KeyTracker {
    latest: Option<RequestId>,
    outstanding: Option<Outstanding>,
    confirmed: Option<Confirmed>,
}

impl KeyTracker {
    fn is_latest(&self, request_id: RequestId) -> bool {
        self.outstanding.is_some() && self.latest == Some(request_id)
    }

    // Answers can arrive in any order, so only a newer confirmation replaces an older one.
    fn confirm(&mut self, as_of: RequestId, quantity: u32) -> bool {
        let newer = self.confirmed.is_none_or(|confirmed| confirmed.as_of < as_of);
        if newer {
            self.confirmed = Some(Confirmed { as_of, quantity });
        }
        newer
    }

    fn overwrite(&mut self, as_of: RequestId, quantity: u32) {
        self.confirmed = Some(Confirmed { as_of, quantity });
    }

    fn confirmed_quantity(&self) -> u32 {
        self.confirmed.map_or(0, |confirmed| confirmed.quantity)
    }
}

#[derive(Debug, Default)]
pub struct CartStore {
    items: Vec<LineItem>,
    trackers: HashMap<LineKey, KeyTracker>,
    last_request: RequestId,
    applied_coupon: Option<AppliedCoupon>,
}

impl CartStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hydrated(server_cart: &ServerCart) -> Self {
        let mut store = Self::new();
        store.hydrate(server_cart);
        store
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, key: &LineKey) -> Option<&LineItem> {
        self.items.iter().find(|item| &item.key == key)
    }

    pub fn totals(&self) -> Aggregation {
        aggregate_items(&self.items)
    }

    pub fn line_state(&self, key: &LineKey) -> LineState {
        match self.trackers.get(key) {
            Some(tracker) if tracker.outstanding.is_some() => {
                tracker.latest.map_or(LineState::Idle, LineState::Pending)
            }
            _ => LineState::Idle,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.trackers.values().any(|tracker| tracker.outstanding.is_some())
    }

    pub fn applied_coupon(&self) -> Option<&AppliedCoupon> {
        self.applied_coupon.as_ref()
    }

    pub(crate) fn apply_coupon(&mut self, coupon: AppliedCoupon) {
        self.applied_coupon = Some(coupon);
    }

    pub(crate) fn clear_coupon(&mut self) -> Option<AppliedCoupon> {
        self.applied_coupon.take()
    }

    //---------------------- Optimistic edits ------------------------

    pub fn increase(&mut self, key: &LineKey) -> Result<PendingMutation, CartError> {
        let current = self.quantity_of(key)?;
        Ok(self.set_quantity_optimistically(key, current.saturating_add(1)))
    }

    /// Takes one unit off, never going below `floor`. At the floor nothing is sent.
    pub fn decrease(
        &mut self,
        key: &LineKey,
        floor: u32,
    ) -> Result<Option<PendingMutation>, CartError> {
        let current = self.quantity_of(key)?;
        let floor = floor.max(DEFAULT_FLOOR);
        if current <= floor {
            debug!("{key} is already at {current}, not decreasing below {floor}.");
            return Ok(None);
        }
        Ok(Some(self.set_quantity_optimistically(key, current - 1)))
    }

    pub fn remove(&mut self, key: &LineKey) -> Result<PendingMutation, CartError> {
        let index = self
            .position(key)
            .ok_or(CartError::PreconditionFailed(Precondition::UnknownItem))?;
        let item = self.items.remove(index);
        let request_id = self.issue(key, Outstanding::Removal { index, item });
        self.after_change();
        Ok(PendingMutation {
            request_id,
            key: key.clone(),
            kind: MutationKind::Remove,
        })
    }

    fn quantity_of(&self, key: &LineKey) -> Result<u32, CartError> {
        self.find(key)
            .map(LineItem::quantity)
            .ok_or(CartError::PreconditionFailed(Precondition::UnknownItem))
    }

    fn set_quantity_optimistically(&mut self, key: &LineKey, quantity: u32) -> PendingMutation {
        if let Some(item) = self.items.iter_mut().find(|item| &item.key == key) {
            item.set_quantity(quantity);
        }
        let request_id = self.issue(key, Outstanding::Quantity);
        PendingMutation {
            request_id,
            key: key.clone(),
            kind: MutationKind::SetQuantity(quantity),
        }
    }

    fn issue(&mut self, key: &LineKey, outstanding: Outstanding) -> RequestId {
        self.last_request = self.last_request.next();
        let request_id = self.last_request;
        let tracker = self.trackers.entry(key.clone()).or_default();
        tracker.latest = Some(request_id);
        tracker.outstanding = Some(outstanding);
        request_id
    }

    //------------------------ Reconciliation -------------------------

    pub fn settle_quantity(
        &mut self,
        request_id: RequestId,
        key: &LineKey,
        result: Result<QuantityConfirmation, RemoteError>,
    ) -> Result<Reconciliation, CartError> {
        let tracker = self.trackers.entry(key.clone()).or_default();

        if !tracker.is_latest(request_id) {
            let settled = tracker.outstanding.is_none();
            let advanced = match &result {
                Ok(confirmation) => tracker.confirm(request_id, confirmation.quantity),
                Err(_) => false,
            };
            // Nothing newer is in flight, so this is now the best the mirror can know.
            if let (true, true, Ok(confirmation)) = (settled, advanced, &result) {
                debug!("Late response {request_id} for {key} moves it to {}.", confirmation.quantity);
                let unit_price = confirmation.item.declared_price();
                self.write_quantity(key, confirmation.quantity, unit_price);
                self.after_change();
                return Ok(Reconciliation::Committed);
            }
            debug!("Discarded stale response {request_id} for {key}.");
            return Ok(Reconciliation::Discarded);
        }

        tracker.outstanding = None;
        match result {
            Ok(confirmation) => {
                tracker.confirm(request_id, confirmation.quantity);
                let unit_price = confirmation.item.declared_price();
                self.write_quantity(key, confirmation.quantity, unit_price);
                self.after_change();
                Ok(Reconciliation::Committed)
            }
            Err(error) => {
                let confirmed = tracker.confirmed_quantity();
                warn!("Quantity change {request_id} for {key} failed, rolling back to {confirmed}: {error}");
                self.write_quantity(key, confirmed, None);
                self.after_change();
                Err(error.into())
            }
        }
    }

    pub fn settle_remove(
        &mut self,
        request_id: RequestId,
        key: &LineKey,
        result: Result<(), RemoteError>,
    ) -> Result<Reconciliation, CartError> {
        let tracker = self.trackers.entry(key.clone()).or_default();

        if !tracker.is_latest(request_id) {
            if result.is_ok() {
                tracker.confirm(request_id, 0);
            }
            debug!("Discarded stale removal {request_id} for {key}.");
            return Ok(Reconciliation::Discarded);
        }

        let outstanding = tracker.outstanding.take();
        match result {
            Ok(()) => {
                tracker.confirm(request_id, 0);
                Ok(Reconciliation::Committed)
            }
            Err(error) => {
                let confirmed = tracker.confirmed_quantity();
                warn!("Removal {request_id} of {key} failed, restoring it: {error}");
                if let Some(Outstanding::Removal { index, mut item }) = outstanding {
                    if confirmed > 0 {
                        item.set_quantity(confirmed);
                    }
                    let index = index.min(self.items.len());
                    self.items.insert(index, item);
                }
                self.after_change();
                Err(error.into())
            }
        }
    }

    // Quantity zero removes the item. A key missing from the mirror is re-added at the end.
    fn write_quantity(&mut self, key: &LineKey, quantity: u32, unit_price: Option<Decimal>) {
        match self.position(key) {
            Some(index) => {
                let item = &mut self.items[index];
                if let Some(unit_price) = unit_price {
                    item.unit_price = unit_price;
                }
                if !item.set_quantity(quantity) {
                    self.items.remove(index);
                }
            }
            None => {
                if let Some(item) =
                    LineItem::new(key.clone(), unit_price.unwrap_or_default(), quantity)
                {
                    self.items.push(item);
                }
            }
        }
    }

    //------------------------- Hydration -----------------------------

    /// Replaces the mirror with a freshly fetched server cart. Items with a request in flight
    /// keep their local state until their own answer arrives.
    pub fn hydrate(&mut self, server_cart: &ServerCart) {
        let as_of = self.last_request;
        let aggregation = aggregate(&server_cart.items);

        let pending: HashMap<LineKey, Option<LineItem>> = self
            .trackers
            .iter()
            .filter(|(_, tracker)| tracker.outstanding.is_some())
            .map(|(key, _)| (key.clone(), self.find(key).cloned()))
            .collect();

        let mut items = Vec::with_capacity(aggregation.items_by_variant.len());
        for total in &aggregation.items_by_variant {
            if let Some(local) = pending.get(&total.key) {
                items.extend(local.clone());
                continue;
            }
            self.trackers
                .entry(total.key.clone())
                .or_default()
                .overwrite(as_of, u32::try_from(total.quantity).unwrap_or(u32::MAX));
            match LineItem::try_from(total) {
                Ok(item) => items.push(item),
                Err(key) => warn!("Server cart line {key} has no quantity, skipping it."),
            }
        }

        // Keys the server no longer holds are confirmed gone, unless we are waiting on them.
        for (key, tracker) in self.trackers.iter_mut() {
            if tracker.outstanding.is_none()
                && !aggregation.items_by_variant.iter().any(|total| &total.key == key)
            {
                tracker.overwrite(as_of, 0);
            }
        }

        for (key, local) in pending {
            if let Some(item) = local {
                if !items.iter().any(|existing| existing.key == key) {
                    items.push(item);
                }
            }
        }

        self.items = items;
        self.after_change();
    }

    /// Empties the mirror after the order went through. Answers still in flight are dropped
    /// when they arrive.
    pub fn clear(&mut self) {
        self.items.clear();
        let as_of = self.last_request;
        for tracker in self.trackers.values_mut() {
            tracker.outstanding = None;
            tracker.overwrite(as_of, 0);
        }
        self.after_change();
    }

    fn position(&self, key: &LineKey) -> Option<usize> {
        self.items.iter().position(|item| &item.key == key)
    }

    fn after_change(&mut self) {
        if self.items.is_empty() && self.applied_coupon.take().is_some() {
            debug!("Cart is empty, dropped the applied coupon.");
        }
    }
}

//-------------------------- Tests -------------------------------
