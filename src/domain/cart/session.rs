//! Cart session.
//!
//! One session per signed-in user. The session task is the only writer of that user's cart
//! store and checkout; everything else talks to it through a [`SessionHandle`]. Commands are
//! handled one at a time. Remote calls run concurrently in the background and their answers
//! are fed back into the store as they arrive, in whatever order that is.
//!
//! An order is only submitted once every cart edit in flight has been answered, so the draft
//! carries quantities the server has confirmed. From the moment a submission is requested
//! until it has settled, commands that would change the cart are held back and replayed
//! afterwards.

use std::collections::VecDeque;

use futures::{
    FutureExt, StreamExt,
    future::BoxFuture,
    stream::FuturesUnordered,
};
use jiff::Timestamp;
use rust_decimal::Decimal;
use tokio::{
    select,
    sync::{mpsc, oneshot, watch},
};
use tracing::{debug, info};

use super::{
    AppliedCoupon, CartError, CartStore, Checkout, CheckoutState, Coupon, LineItem, LineKey,
    MutationKind, OrderId, OrderReceipt, PaymentMethod, PendingMutation, Precondition,
    QuantityConfirmation,
    Redemption, RemoteError, Remotes, ServerCart, ShippingAddress, UserId,
    checkout::final_total,
    coupons::{self, CouponRequest},
    store::DEFAULT_FLOOR,
};

const COMMAND_BUFFER: usize = 64;

/// What the rendering layer gets to see of a cart.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CartView {
    pub items: Vec<LineItem>,
    pub total_items: u64,
    pub subtotal: Decimal,
    pub final_total: Decimal,
    pub applied_coupon: Option<AppliedCoupon>,
    pub checkout_state: CheckoutState,
    /// Why the last order submission failed, until the next one starts.
    pub last_failure: Option<String>,
}

impl CartView {
    pub fn of(store: &CartStore, checkout: &Checkout) -> Self {
        let totals = store.totals();
        let applied_coupon = store.applied_coupon().cloned();
        // A coupon computed against another subtotal does not count towards the total.
        let current_coupon = applied_coupon
            .as_ref()
            .filter(|coupon| coupon.applies_to(totals.subtotal));
        Self {
            items: store.items().to_vec(),
            total_items: totals.total_items,
            subtotal: totals.subtotal,
            final_total: final_total(totals.subtotal, current_coupon),
            applied_coupon,
            checkout_state: checkout.state().clone(),
            last_failure: checkout.last_failure().map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Cart(#[from] CartError),
    #[error("Cart session for user {0} has ended.")]
    Ended(UserId),
}

type Reply<T> = oneshot::Sender<Result<T, CartError>>;

enum Command {
    Increase {
        key: LineKey,
        reply: Reply<CartView>,
    },
    Decrease {
        key: LineKey,
        reply: Reply<CartView>,
    },
    Remove {
        key: LineKey,
        reply: Reply<CartView>,
    },
    ApplyCoupon {
        code: String,
        reply: Reply<AppliedCoupon>,
    },
    Submit {
        shipping_address: Option<ShippingAddress>,
        payment_method: Option<PaymentMethod>,
        reply: Reply<OrderId>,
    },
    Refresh {
        reply: Reply<CartView>,
    },
}

impl Command {
    fn changes_cart(&self) -> bool {
        !matches!(self, Command::Submit { .. })
    }

    fn name(&self) -> &'static str {
        match self {
            Command::Increase { .. } => "increase",
            Command::Decrease { .. } => "decrease",
            Command::Remove { .. } => "remove",
            Command::ApplyCoupon { .. } => "apply_coupon",
            Command::Submit { .. } => "submit",
            Command::Refresh { .. } => "refresh",
        }
    }
}

enum Completion {
    Quantity {
        pending: PendingMutation,
        result: Result<QuantityConfirmation, RemoteError>,
        reply: Reply<CartView>,
    },
    Removal {
        pending: PendingMutation,
        result: Result<(), RemoteError>,
        reply: Reply<CartView>,
    },
    Redemption {
        request: CouponRequest,
        result: Result<Redemption, RemoteError>,
        reply: Reply<AppliedCoupon>,
    },
    Order {
        result: Result<OrderReceipt, RemoteError>,
        reply: Reply<OrderId>,
    },
    Fetched {
        result: Result<ServerCart, RemoteError>,
        reply: Reply<CartView>,
    },
}

//------------------------- Handle ----------------------------

#[derive(Clone, Debug)]
pub struct SessionHandle {
    user_id: UserId,
    remotes: Remotes,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<CartView>,
}

impl SessionHandle {
    /// Starts a session hydrated from the user's server cart.
    pub async fn start(user_id: UserId, remotes: Remotes) -> Result<Self, CartError> {
        let server_cart = remotes.cart.fetch_cart().await?;
        Ok(Self::spawn(user_id, remotes, CartStore::hydrated(&server_cart)))
    }

    /// Starts a session on top of an existing store.
    pub fn spawn(user_id: UserId, remotes: Remotes, store: CartStore) -> Self {
        let checkout = Checkout::new();
        let (view_tx, view_rx) = watch::channel(CartView::of(&store, &checkout));
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);

        let session = Session {
            user_id: user_id.clone(),
            store,
            checkout,
            remotes: remotes.clone(),
            commands: commands_rx,
            inflight: FuturesUnordered::new(),
            queued: VecDeque::new(),
            held_submit: None,
            view: view_tx,
        };
        tokio::spawn(session.run());

        Self {
            user_id,
            remotes,
            commands: commands_tx,
            view: view_rx,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The latest published state.
    pub fn view(&self) -> CartView {
        self.view.borrow().clone()
    }

    /// Receives every state the session publishes from now on.
    pub fn subscribe(&self) -> watch::Receiver<CartView> {
        self.view.clone()
    }

    pub async fn increase(&self, key: LineKey) -> Result<CartView, SessionError> {
        self.request(|reply| Command::Increase { key, reply }).await
    }

    pub async fn decrease(&self, key: LineKey) -> Result<CartView, SessionError> {
        self.request(|reply| Command::Decrease { key, reply }).await
    }

    pub async fn remove(&self, key: LineKey) -> Result<CartView, SessionError> {
        self.request(|reply| Command::Remove { key, reply }).await
    }

    pub async fn apply_coupon(&self, code: String) -> Result<AppliedCoupon, SessionError> {
        self.request(|reply| Command::ApplyCoupon { code, reply }).await
    }

    pub async fn submit_order(
        &self,
        shipping_address: Option<ShippingAddress>,
        payment_method: Option<PaymentMethod>,
    ) -> Result<OrderId, SessionError> {
        self.request(|reply| Command::Submit {
            shipping_address,
            payment_method,
            reply,
        })
        .await
    }

    /// Re-reads the server cart. Items with a request in flight keep their local state.
    pub async fn refresh(&self) -> Result<CartView, SessionError> {
        self.request(|reply| Command::Refresh { reply }).await
    }

    /// The coupon to advertise to this user: the newest of the currently valid ones.
    pub async fn offered_coupon(&self) -> Result<Option<Coupon>, SessionError> {
        let coupons = self
            .remotes
            .coupons
            .list_active_coupons()
            .await
            .map_err(CartError::from)?;
        let now = Timestamp::now();
        let valid: Vec<Coupon> = coupons
            .into_iter()
            .filter(|coupon| coupon.is_valid_at(now))
            .collect();
        Ok(coupons::select_offered_coupon(&valid).cloned())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Ended(self.user_id.clone()))?;
        response
            .await
            .map_err(|_| SessionError::Ended(self.user_id.clone()))?
            .map_err(SessionError::from)
    }
}

//------------------------- Session task ----------------------------

struct Session {
    user_id: UserId,
    store: CartStore,
    checkout: Checkout,
    remotes: Remotes,
    commands: mpsc::Receiver<Command>,
    inflight: FuturesUnordered<BoxFuture<'static, Completion>>,
    queued: VecDeque<Command>,
    // A submission waiting for cart edits in flight to be answered.
    held_submit: Option<Command>,
    view: watch::Sender<CartView>,
}

impl Session {
    async fn run(mut self) {
        info!("Cart session for user {} started.", self.user_id);
        loop {
            select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(completion) = self.inflight.next(), if !self.inflight.is_empty() => {
                    self.complete(completion);
                }
            }
        }
        info!(
            "Cart session for user {} ended with {} request(s) in flight.",
            self.user_id,
            self.inflight.len()
        );
    }

    fn handle(&mut self, command: Command) {
        if self.holding_back() && command.changes_cart() {
            debug!("Holding back {} until the order submission settles.", command.name());
            self.queued.push_back(command);
            return;
        }

        match command {
            Command::Increase { key, reply } => match self.store.increase(&key) {
                Ok(pending) => self.send_mutation(pending, reply),
                Err(error) => respond(reply, Err(error)),
            },
            Command::Decrease { key, reply } => match self.store.decrease(&key, DEFAULT_FLOOR) {
                Ok(Some(pending)) => self.send_mutation(pending, reply),
                Ok(None) => respond(reply, Ok(self.current_view())),
                Err(error) => respond(reply, Err(error)),
            },
            Command::Remove { key, reply } => match self.store.remove(&key) {
                Ok(pending) => self.send_mutation(pending, reply),
                Err(error) => respond(reply, Err(error)),
            },
            Command::ApplyCoupon { code, reply } => {
                match coupons::prepare_redemption(&self.store, &code) {
                    Ok(request) => {
                        let coupons = self.remotes.coupons.clone();
                        let user_id = self.user_id.clone();
                        self.inflight.push(
                            async move {
                                let result = coupons
                                    .redeem_coupon(&request.code, &user_id, request.cart_total)
                                    .await;
                                Completion::Redemption {
                                    request,
                                    result,
                                    reply,
                                }
                            }
                            .boxed(),
                        );
                    }
                    Err(error) => respond(reply, Err(error)),
                }
            }
            Command::Submit { reply, .. } if self.held_submit.is_some() => {
                respond(reply, Err(Precondition::AlreadySubmitting.into()));
            }
            command @ Command::Submit { .. }
                if self.store.has_pending() && !self.checkout.is_submitting() =>
            {
                debug!("Waiting for cart edits in flight before submitting the order.");
                self.held_submit = Some(command);
            }
            Command::Submit {
                shipping_address,
                payment_method,
                reply,
            } => match self
                .checkout
                .begin(&mut self.store, shipping_address, payment_method)
            {
                Ok(draft) => {
                    self.publish();
                    let orders = self.remotes.orders.clone();
                    self.inflight.push(
                        async move {
                            let result = orders.submit_order(&draft).await;
                            Completion::Order { result, reply }
                        }
                        .boxed(),
                    );
                }
                Err(error) => respond(reply, Err(error)),
            },
            Command::Refresh { reply } => {
                let cart = self.remotes.cart.clone();
                self.inflight.push(
                    async move {
                        let result = cart.fetch_cart().await;
                        Completion::Fetched { result, reply }
                    }
                    .boxed(),
                );
            }
        }
    }

    fn send_mutation(&mut self, pending: PendingMutation, reply: Reply<CartView>) {
        self.publish();
        let cart = self.remotes.cart.clone();
        self.inflight.push(
            async move {
                match pending.kind {
                    MutationKind::SetQuantity(quantity) => {
                        let result = cart.mutate_quantity(&pending.key, quantity).await;
                        Completion::Quantity {
                            pending,
                            result,
                            reply,
                        }
                    }
                    MutationKind::Remove => {
                        let result = cart.remove_item(&pending.key).await;
                        Completion::Removal {
                            pending,
                            result,
                            reply,
                        }
                    }
                }
            }
            .boxed(),
        );
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Quantity {
                pending,
                result,
                reply,
            } => {
                let outcome =
                    self.store
                        .settle_quantity(pending.request_id, &pending.key, result);
                self.publish();
                respond(reply, outcome.map(|_| self.current_view()));
            }
            Completion::Removal {
                pending,
                result,
                reply,
            } => {
                let outcome = self
                    .store
                    .settle_remove(pending.request_id, &pending.key, result);
                self.publish();
                respond(reply, outcome.map(|_| self.current_view()));
            }
            Completion::Redemption {
                request,
                result,
                reply,
            } => {
                let outcome = coupons::settle_redemption(&mut self.store, request, result);
                self.publish();
                respond(reply, outcome);
            }
            Completion::Order { result, reply } => {
                let outcome = self.checkout.settle(&mut self.store, result);
                self.publish();
                respond(reply, outcome);
            }
            Completion::Fetched { result, reply } => match result {
                Ok(server_cart) => {
                    self.store.hydrate(&server_cart);
                    self.publish();
                    respond(reply, Ok(self.current_view()));
                }
                Err(error) => respond(reply, Err(error.into())),
            },
        }
        self.resume();
    }

    fn holding_back(&self) -> bool {
        self.checkout.is_submitting() || self.held_submit.is_some()
    }

    fn resume(&mut self) {
        if !self.store.has_pending() {
            if let Some(submit) = self.held_submit.take() {
                debug!("Cart edits settled, submitting the held order.");
                self.handle(submit);
            }
        }
        self.replay_queued();
    }

    fn replay_queued(&mut self) {
        while !self.holding_back() {
            let Some(command) = self.queued.pop_front() else {
                break;
            };
            debug!("Replaying held back {}.", command.name());
            self.handle(command);
        }
    }

    fn current_view(&self) -> CartView {
        CartView::of(&self.store, &self.checkout)
    }

    fn publish(&self) {
        self.view.send_replace(self.current_view());
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T, CartError>) {
    if reply.send(result).is_err() {
        debug!("Caller went away before its answer was ready.");
    }
}

//-------------------------- Tests -------------------------------
