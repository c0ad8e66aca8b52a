//! The storefront session: catalog, cart, checkout, accounts and admin tools
//! over one shared state.
//!
//! State is an immutable [`StoreSnapshot`] behind an `Arc`, published on a
//! `watch` channel. Every mutation runs under one writer lock: it clones the
//! snapshot, applies the change, writes the persisted aggregates back to the
//! [`KeyValueStore`] and only then publishes the result. A failed change or a
//! failed write publishes nothing. Readers keep whatever snapshot they already
//! hold.
//!
//! There is a single session per process. The admin flag, the cart and the
//! signed-in user are shared by every client of one `Storefront`, so an admin
//! login over HTTP grants admin access to every caller until logout.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::domain::aggregates::order::{generate_order_id, orders_for};
use crate::domain::aggregates::product::generate_product_id;
use crate::domain::aggregates::{Cart, CartItem, Catalog, CategoryFilter, Order, OrderStatus, Product, ProductDraft, SalesSummary, User};
use crate::domain::events::{ProductEvent, UserEvent};
use crate::domain::pricing::{self, DeliveryPolicy, FreeDeliveryProgress};
use crate::domain::settings::StoreSettings;
use crate::domain::value_objects::{Money, Phone};
use crate::services::assistant::{ChatMessage, ShoppingAssistant};
use crate::services::checkout::{self, CheckoutDetails, CheckoutError, ProcessingFlag};
use crate::services::events::EventPublisher;
use crate::services::identity::{AdminCredentials, AuthError, IdentityResolver, OtpChallenge, OtpOutcome, OtpPurpose, OtpVerification, Resolution, SignUpRequest};
use crate::services::notifier::{read_logs, Notifier, SystemLogEntry};
use crate::services::storage::{self, load_json, save_json, KeyValueStore, StorageError, StorageKey};
use crate::{Result, StorefrontError};

/// Everything the session knows at one point in time.
#[derive(Clone, Debug, Default)]
pub struct StoreSnapshot {
    pub catalog: Catalog,
    pub orders: Vec<Order>,
    pub users: Vec<User>,
    pub settings: StoreSettings,
    pub current_user: Option<User>,
    pub cart: Cart,
    pub is_admin: bool,
    pub pending_otp: Option<OtpChallenge>,
}

/// Figures shown in the bag drawer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub item_count: u32,
    pub subtotal: Money,
    pub mrp_total: Money,
    pub savings: Money,
    pub shipping: Money,
    pub total: Money,
    pub free_delivery: FreeDeliveryProgress,
}

impl CartView {
    pub fn new(cart: &Cart, policy: &DeliveryPolicy) -> Self {
        let subtotal = cart.subtotal();
        let shipping = policy.shipping_for(subtotal);
        Self {
            items: cart.items().to_vec(),
            item_count: cart.item_count(),
            subtotal,
            mrp_total: pricing::mrp_total(cart.items()),
            savings: cart.savings(),
            shipping,
            total: subtotal.add(shipping),
            free_delivery: policy.progress(subtotal),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StorefrontOptions {
    pub otp_policy: OtpVerification,
    pub admin: AdminCredentials,
}

pub struct Storefront {
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    events: EventPublisher,
    assistant: ShoppingAssistant,
    options: StorefrontOptions,
    state: watch::Sender<Arc<StoreSnapshot>>,
    writer: Mutex<()>,
    checkout_flag: ProcessingFlag,
    otp_flag: ProcessingFlag,
}

impl Storefront {
    /// Loads every aggregate from `store` and writes back anything migrated on the way.
    pub async fn open(store: Arc<dyn KeyValueStore>, notifier: Arc<dyn Notifier>, options: StorefrontOptions) -> Result<Self> {
        let snapshot = load_snapshot(store.as_ref()).await?;
        persist(store.as_ref(), &snapshot).await?;
        info!(products = snapshot.catalog.len(), orders = snapshot.orders.len(), users = snapshot.users.len(), "storefront loaded");
        let (state, _) = watch::channel(Arc::new(snapshot));
        Ok(Self {
            store,
            notifier,
            events: EventPublisher::disabled(),
            assistant: ShoppingAssistant::default(),
            options,
            state,
            writer: Mutex::new(()),
            checkout_flag: ProcessingFlag::new(),
            otp_flag: ProcessingFlag::new(),
        })
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self { self.events = events; self }
    pub fn with_assistant(mut self, assistant: ShoppingAssistant) -> Self { self.assistant = assistant; self }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> { self.state.borrow().clone() }
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> { self.state.subscribe() }

    async fn apply<R>(&self, persisted: bool, change: impl FnOnce(&mut StoreSnapshot) -> Result<R>) -> Result<R> {
        let _writer = self.writer.lock().await;
        let current = self.snapshot();
        let mut next = current.clone();
        let out = change(Arc::make_mut(&mut next))?;
        if persisted {
            if let Err(e) = persist(self.store.as_ref(), &next).await {
                // Some keys may already hold `next`; put back what readers still see.
                if let Err(undo) = persist(self.store.as_ref(), &current).await {
                    warn!(error = %undo, "restoring persisted state failed");
                }
                return Err(e.into());
            }
        }
        self.state.send_replace(next);
        Ok(out)
    }

    /// Mutation of persisted aggregates.
    async fn commit<R>(&self, change: impl FnOnce(&mut StoreSnapshot) -> Result<R>) -> Result<R> { self.apply(true, change).await }

    /// Mutation of session-only state (cart, admin flag, pending code).
    async fn touch<R>(&self, change: impl FnOnce(&mut StoreSnapshot) -> Result<R>) -> Result<R> { self.apply(false, change).await }

    fn require_admin(&self) -> Result<()> {
        if self.state.borrow().is_admin { Ok(()) } else { Err(StorefrontError::AdminRequired) }
    }

    async fn reload(&self) -> Result<()> {
        let loaded = load_snapshot(self.store.as_ref()).await?;
        self.commit(move |s| {
            s.catalog = loaded.catalog;
            s.orders = loaded.orders;
            s.users = loaded.users;
            s.settings = loaded.settings;
            s.current_user = loaded.current_user;
            Ok(())
        })
        .await
    }

    // Catalog

    pub fn products(&self, filter: CategoryFilter, search: &str) -> Vec<Product> {
        self.snapshot().catalog.storefront(filter, search).into_iter().cloned().collect()
    }

    pub fn product(&self, id: &str) -> Option<Product> {
        self.snapshot().catalog.get(id).filter(|p| p.is_active).cloned()
    }

    pub fn recommendations(&self) -> Vec<Product> {
        self.snapshot().catalog.recommendations().into_iter().cloned().collect()
    }

    pub fn admin_products(&self) -> Result<Vec<Product>> {
        self.require_admin()?;
        Ok(self.snapshot().catalog.all().to_vec())
    }

    pub async fn add_product(&self, draft: &ProductDraft) -> Result<Product> {
        self.require_admin()?;
        let product = draft.build(generate_product_id(Utc::now()))?;
        let stored = product.clone();
        self.commit(move |s| {
            s.catalog.add(stored);
            Ok(())
        })
        .await?;
        info!(product_id = %product.id, "product added");
        self.events.publish(&ProductEvent::Created { product_id: product.id.clone() }.into()).await;
        Ok(product)
    }

    /// Replaces a product from an edited draft; `None` when the id is unknown.
    pub async fn update_product(&self, id: &str, draft: &ProductDraft) -> Result<Option<Product>> {
        self.require_admin()?;
        let edited = draft.build(id)?;
        let updated = self
            .commit(move |s| {
                // Rating and visibility are not part of the form.
                let Some(existing) = s.catalog.get(&edited.id) else {
                    return Ok(None);
                };
                let product = Product { rating: existing.rating, is_active: existing.is_active, ..edited };
                Ok(s.catalog.update(product.clone()).then_some(product))
            })
            .await?;
        if updated.is_some() {
            self.events.publish(&ProductEvent::Updated { product_id: id.to_string() }.into()).await;
        }
        Ok(updated)
    }

    pub async fn delete_product(&self, id: &str) -> Result<Option<Product>> {
        self.require_admin()?;
        let removed = self.commit(|s| Ok(s.catalog.remove(id))).await?;
        if removed.is_some() {
            info!(product_id = id, "product removed");
            self.events.publish(&ProductEvent::Removed { product_id: id.to_string() }.into()).await;
        }
        Ok(removed)
    }

    pub async fn set_stock(&self, id: &str, raw: &str) -> Result<Option<u32>> {
        self.require_admin()?;
        let stock = self.commit(|s| Ok(s.catalog.set_stock(id, raw))).await?;
        if let Some(stock) = stock {
            self.events.publish(&ProductEvent::StockAdjusted { product_id: id.to_string(), stock }.into()).await;
        }
        Ok(stock)
    }

    pub async fn toggle_active(&self, id: &str) -> Result<Option<bool>> {
        self.require_admin()?;
        let is_active = self.commit(|s| Ok(s.catalog.toggle_active(id))).await?;
        if let Some(is_active) = is_active {
            self.events.publish(&ProductEvent::VisibilityChanged { product_id: id.to_string(), is_active }.into()).await;
        }
        Ok(is_active)
    }

    // Cart

    pub fn cart(&self) -> CartView {
        let snapshot = self.snapshot();
        CartView::new(&snapshot.cart, &snapshot.settings.delivery_policy())
    }

    pub async fn add_to_cart(&self, product_id: &str) -> Result<CartItem> {
        let product = self.snapshot().catalog.get(product_id).cloned().ok_or(StorefrontError::ProductNotFound)?;
        self.touch(|s| Ok(s.cart.add(&product).cloned()?)).await
    }

    pub async fn adjust_cart(&self, product_id: &str, delta: i64) -> Result<u32> {
        self.touch(|s| Ok(s.cart.adjust_quantity(product_id, delta)?)).await
    }

    pub async fn remove_from_cart(&self, product_id: &str) -> Result<CartItem> {
        self.touch(|s| Ok(s.cart.remove(product_id)?)).await
    }

    // Checkout and orders

    /// Places the current cart as an order. Confirmations are best effort.
    pub async fn checkout(&self, details: &CheckoutDetails) -> Result<Order> {
        let _processing = self.checkout_flag.try_acquire().ok_or(CheckoutError::InProgress)?;
        let snapshot = self.snapshot();
        let now = Utc::now();
        let placement = checkout::place(
            generate_order_id(now),
            &snapshot.cart,
            details,
            &snapshot.settings,
            &snapshot.users,
            snapshot.current_user.as_ref(),
            now,
        )?;
        drop(snapshot);

        let store_name = self.state.borrow().settings.store_name.clone();
        if let Err(e) = self.notifier.send_sms(&details.phone, &checkout::sms_confirmation(&placement.order, &store_name)).await {
            warn!(error = %e, order_id = placement.order.id(), "order sms failed");
        }
        if let Err(e) = self.notifier.send_whatsapp(&details.phone, &checkout::whatsapp_confirmation(&placement.order)).await {
            warn!(error = %e, order_id = placement.order.id(), "order whatsapp failed");
        }

        let event = placement.event();
        let order = placement.order.clone();
        let stored = order.clone();
        let customer = placement.customer;
        let created = self
            .commit(move |s| {
                // The bag and the users may have changed while confirmations were sent.
                s.cart.remove_ordered(stored.items());
                s.orders.insert(0, stored);
                let customer = match customer {
                    Resolution::Created(user) => match s.users.iter().find(|u| u.matches_email(&user.email) || u.matches_phone(&user.phone)).cloned() {
                        Some(existing) => Resolution::Existing(existing),
                        None => {
                            s.users.push(user.clone());
                            Resolution::Created(user)
                        }
                    },
                    existing => existing,
                };
                let created = customer.is_new();
                s.current_user = Some(customer.into_user());
                Ok(created)
            })
            .await?;
        info!(order_id = order.id(), total = %order.total(), new_customer = created, "order placed");
        self.events.publish(&event.into()).await;
        Ok(order)
    }

    pub fn orders(&self) -> Result<Vec<Order>> {
        self.require_admin()?;
        Ok(self.snapshot().orders.clone())
    }

    /// Orders of the signed-in customer.
    pub fn my_orders(&self) -> Result<Vec<Order>> {
        let snapshot = self.snapshot();
        let user = snapshot.current_user.as_ref().ok_or(StorefrontError::NotSignedIn)?;
        Ok(orders_for(&snapshot.orders, user).into_iter().cloned().collect())
    }

    pub async fn update_order_status(&self, order_id: &str, status: OrderStatus) -> Result<Option<Order>> {
        self.require_admin()?;
        let changed = self
            .commit(|s| {
                let event = checkout::transition(&mut s.orders, order_id, status)?;
                Ok(event.map(|e| (e, s.orders.iter().find(|o| o.id() == order_id).cloned())))
            })
            .await?;
        let Some((event, order)) = changed else {
            return Ok(None);
        };
        info!(order_id, %status, "order status changed");
        self.events.publish(&event.into()).await;
        Ok(order)
    }

    pub async fn reject_order(&self, order_id: &str) -> Result<Option<Order>> {
        self.update_order_status(order_id, OrderStatus::Cancelled).await
    }

    pub fn dashboard(&self) -> Result<SalesSummary> {
        self.require_admin()?;
        Ok(SalesSummary::from_orders(&self.snapshot().orders))
    }

    // Accounts

    pub fn current_user(&self) -> Option<User> { self.snapshot().current_user.clone() }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let user = IdentityResolver::new(&self.snapshot().users).login_with_password(email, password)?;
        let session = user.clone();
        self.commit(move |s| {
            s.current_user = Some(session);
            Ok(())
        })
        .await?;
        info!(user_id = %user.id, "customer signed in");
        Ok(user)
    }

    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<User> {
        let user = IdentityResolver::new(&self.snapshot().users).sign_up(request, Utc::now())?;
        let stored = user.clone();
        self.commit(move |s| {
            // Another registration may have landed while the password was hashed.
            if s.users.iter().any(|u| u.matches_email(&stored.email) || u.matches_phone(&stored.phone)) {
                return Err(AuthError::AlreadyRegistered.into());
            }
            s.users.push(stored.clone());
            s.current_user = Some(stored);
            Ok(())
        })
        .await?;
        info!(user_id = %user.id, "customer registered");
        self.events.publish(&UserEvent::Registered { user_id: user.id.clone(), email: user.email.clone() }.into()).await;
        Ok(user)
    }

    /// Issues a code and sends it by SMS.
    pub async fn request_otp(&self, phone: &str, purpose: OtpPurpose) -> Result<()> {
        let phone = Phone::parse(phone).map_err(AuthError::from)?;
        let _sending = self.otp_flag.try_acquire().ok_or(AuthError::SendInProgress)?;
        let now = Utc::now();
        let (too_soon, store_name) = {
            let state = self.state.borrow();
            let too_soon = state
                .pending_otp
                .as_ref()
                .is_some_and(|c| c.phone() == &phone && c.purpose() == purpose && !c.can_resend(now));
            (too_soon, state.settings.store_name.clone())
        };
        if too_soon {
            return Err(AuthError::ResendTooSoon.into());
        }

        let challenge = OtpChallenge::issue(phone, purpose, now);
        self.notifier.send_sms(challenge.phone().as_str(), &challenge.sms_text(&store_name)).await?;
        self.touch(move |s| {
            s.pending_otp = Some(challenge);
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Reads the pending code out over a voice call.
    pub async fn request_voice_otp(&self) -> Result<()> {
        let challenge = self.snapshot().pending_otp.clone().ok_or(AuthError::NoPendingOtp)?;
        let _sending = self.otp_flag.try_acquire().ok_or(AuthError::SendInProgress)?;
        self.notifier.initiate_voice_call(challenge.phone().as_str(), &challenge.spoken_code()).await?;
        Ok(())
    }

    /// Checks the code against the pending challenge; one challenge signs in at most once.
    pub async fn verify_otp(&self, input: &str) -> Result<OtpOutcome> {
        let policy = self.options.otp_policy;
        let now = Utc::now();
        self.commit(move |s| {
            let challenge = s.pending_otp.as_ref().ok_or(AuthError::NoPendingOtp)?;
            let outcome = IdentityResolver::new(&s.users).verify_otp(challenge, input, policy, now)?;
            s.pending_otp = None;
            match &outcome {
                OtpOutcome::LoggedIn(Resolution::Created(user)) => {
                    s.users.push(user.clone());
                    s.current_user = Some(user.clone());
                }
                OtpOutcome::LoggedIn(Resolution::Existing(user)) => s.current_user = Some(user.clone()),
                OtpOutcome::RecoveryVerified { .. } => {}
            }
            Ok(outcome)
        })
        .await
    }

    pub async fn logout(&self) -> Result<()> {
        self.commit(|s| {
            s.current_user = None;
            Ok(())
        })
        .await
    }

    /// Turns on the process-wide admin flag; see the crate docs on sessions.
    pub async fn admin_login(&self, email: &str, password: &str) -> Result<()> {
        self.options.admin.verify(email, password)?;
        self.touch(|s| {
            s.is_admin = true;
            Ok(())
        })
        .await?;
        info!("admin signed in");
        Ok(())
    }

    pub async fn admin_logout(&self) -> Result<()> {
        self.touch(|s| {
            s.is_admin = false;
            Ok(())
        })
        .await
    }

    pub fn users(&self) -> Result<Vec<User>> {
        self.require_admin()?;
        Ok(self.snapshot().users.clone())
    }

    /// Replaces the whole users collection from the admin console.
    pub async fn replace_users(&self, mut users: Vec<User>) -> Result<()> {
        self.require_admin()?;
        for user in &mut users {
            user.upgrade_legacy_password().map_err(AuthError::from)?;
        }
        self.commit(move |s| {
            s.users = users;
            Ok(())
        })
        .await
    }

    // Settings

    pub fn settings(&self) -> StoreSettings { self.snapshot().settings.clone() }

    /// Lays a partial settings document over the current settings.
    pub async fn update_settings(&self, patch: Value) -> Result<StoreSettings> {
        self.require_admin()?;
        let settings = self
            .commit(move |s| {
                s.settings = s.settings.patched(patch)?;
                Ok(s.settings.clone())
            })
            .await?;
        info!(store_name = %settings.store_name, "settings saved");
        Ok(settings)
    }

    // Maintenance

    pub async fn logs(&self) -> Result<Vec<SystemLogEntry>> {
        self.require_admin()?;
        Ok(read_logs(self.store.as_ref()).await?)
    }

    pub async fn export_backup(&self) -> Result<String> {
        self.require_admin()?;
        Ok(storage::export_backup(self.store.as_ref(), Utc::now()).await?)
    }

    /// Restores a backup document and reloads the session from it.
    pub async fn restore_backup(&self, json: &str) -> Result<()> {
        self.require_admin()?;
        {
            let _writer = self.writer.lock().await;
            storage::restore_backup(self.store.as_ref(), json).await?;
        }
        self.reload().await
    }

    /// Wipes every aggregate except the signed-in user and starts over from defaults.
    pub async fn reset(&self) -> Result<()> {
        self.require_admin()?;
        {
            let _writer = self.writer.lock().await;
            storage::clear_database(self.store.as_ref()).await?;
        }
        self.reload().await
    }

    // Assistant

    pub async fn ask_assistant(&self, query: &str, history: &[ChatMessage]) -> String {
        let snapshot = self.snapshot();
        let orders: Vec<Order> = match &snapshot.current_user {
            Some(user) => orders_for(&snapshot.orders, user).into_iter().cloned().collect(),
            None => Vec::new(),
        };
        self.assistant.advise(query, snapshot.catalog.all(), history, &orders).await
    }
}

/// Reads a blob, treating an undecodable one as absent.
async fn load_lenient<T: serde::de::DeserializeOwned>(store: &dyn KeyValueStore, key: StorageKey) -> std::result::Result<Option<T>, StorageError> {
    match load_json(store, key).await {
        Err(StorageError::Serialization(e)) => {
            warn!(key = key.as_str(), error = %e, "discarding unreadable blob");
            Ok(None)
        }
        other => other,
    }
}

async fn load_snapshot(store: &dyn KeyValueStore) -> std::result::Result<StoreSnapshot, StorefrontError> {
    let catalog = match load_lenient::<Vec<Product>>(store, StorageKey::Products).await? {
        Some(products) => Catalog::new(products),
        None => Catalog::seed(),
    };
    let mut users: Vec<User> = load_lenient(store, StorageKey::Users).await?.unwrap_or_default();
    let mut current_user: Option<User> = load_lenient(store, StorageKey::CurrentUser).await?;
    for user in users.iter_mut().chain(current_user.iter_mut()) {
        if user.upgrade_legacy_password().map_err(AuthError::from)? {
            info!(user_id = %user.id, "legacy password hashed");
        }
    }
    let settings = StoreSettings::from_persisted(store.load(StorageKey::Settings).await?.filter(|v| !v.is_null()));
    Ok(StoreSnapshot {
        catalog,
        orders: load_lenient(store, StorageKey::Orders).await?.unwrap_or_default(),
        users,
        settings,
        current_user,
        ..Default::default()
    })
}

async fn persist(store: &dyn KeyValueStore, snapshot: &StoreSnapshot) -> std::result::Result<(), StorageError> {
    save_json(store, StorageKey::Products, &snapshot.catalog).await?;
    save_json(store, StorageKey::Orders, &snapshot.orders).await?;
    save_json(store, StorageKey::Users, &snapshot.users).await?;
    save_json(store, StorageKey::Settings, &snapshot.settings).await?;
    match &snapshot.current_user {
        Some(user) => save_json(store, StorageKey::CurrentUser, user).await,
        None => store.remove(StorageKey::CurrentUser).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::PriceForm;
    use crate::services::notifier::tests::RecordingNotifier;
    use crate::services::notifier::{Channel, GatewayLatency, SimulatedGateway};
    use crate::services::storage::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Memory store whose writes can be switched off.
    #[derive(Default)]
    struct BrokenDisk {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for BrokenDisk {
        async fn load(&self, key: StorageKey) -> std::result::Result<Option<serde_json::Value>, StorageError> { self.inner.load(key).await }

        async fn save(&self, key: StorageKey, value: &serde_json::Value) -> std::result::Result<(), StorageError> {
            if self.failing.load(Ordering::SeqCst) && key == StorageKey::Users {
                return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.save(key, value).await
        }

        async fn remove(&self, key: StorageKey) -> std::result::Result<(), StorageError> { self.inner.remove(key).await }
    }

    async fn open_with(store: Arc<MemoryStore>, notifier: Arc<RecordingNotifier>) -> Storefront {
        Storefront::open(store, notifier, StorefrontOptions::default()).await.unwrap()
    }

    async fn fresh() -> (Storefront, Arc<MemoryStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        (open_with(store.clone(), notifier.clone()).await, store, notifier)
    }

    fn details(email: Option<&str>, phone: &str) -> CheckoutDetails {
        CheckoutDetails {
            full_name: "Asha Rao".into(),
            email: email.map(Into::into),
            phone: phone.into(),
            address: "12 MG Road".into(),
            city: "Hyderabad".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_open_seeds_and_persists_catalog() {
        let (storefront, store, _) = fresh().await;
        assert_eq!(storefront.snapshot().catalog.len(), 5);
        let saved = store.load(StorageKey::Products).await.unwrap().unwrap();
        assert_eq!(saved.as_array().unwrap().len(), 5);
        assert_eq!(storefront.recommendations().len(), 2);
    }

    #[tokio::test]
    async fn test_checkout_flow() {
        let (storefront, store, notifier) = fresh().await;
        storefront.add_to_cart("cos-1").await.unwrap();
        storefront.add_to_cart("cos-1").await.unwrap();
        let cart = storefront.cart();
        assert_eq!(cart.item_count, 2);
        assert_eq!(cart.subtotal, Money::new(1798));
        assert_eq!(cart.shipping, Money::ZERO);
        assert_eq!(cart.savings, Money::new(602));

        let order = storefront.checkout(&details(None, "9876543210")).await.unwrap();
        assert_eq!(order.total(), Money::new(1798));
        assert_eq!(order.status(), OrderStatus::Pending);

        let snapshot = storefront.snapshot();
        assert!(snapshot.cart.is_empty());
        assert_eq!(snapshot.orders[0].id(), order.id());
        assert_eq!(snapshot.users.len(), 1);
        assert_eq!(snapshot.current_user.as_ref().unwrap().email, order.customer_email());
        assert_eq!(storefront.my_orders().unwrap().len(), 1);

        let channels: Vec<Channel> = notifier.sent().iter().map(|(c, _, _)| *c).collect();
        assert_eq!(channels, vec![Channel::Sms, Channel::Whatsapp]);
        let persisted = store.load(StorageKey::Orders).await.unwrap().unwrap();
        assert_eq!(persisted[0]["customerName"], "Asha Rao");
    }

    #[tokio::test]
    async fn test_checkout_survives_notifier_failure() {
        let store = Arc::new(MemoryStore::new());
        let storefront = open_with(store, Arc::new(RecordingNotifier::failing())).await;
        storefront.add_to_cart("cos-3").await.unwrap();
        let order = storefront.checkout(&details(Some("asha@example.com"), "9876543210")).await.unwrap();
        assert_eq!(order.shipping(), Money::new(60));
        assert_eq!(order.customer_email(), "asha@example.com");
    }

    #[tokio::test]
    async fn test_empty_cart_checkout_changes_nothing() {
        let (storefront, _, notifier) = fresh().await;
        let err = storefront.checkout(&details(None, "9876543210")).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Checkout(CheckoutError::EmptyCart)));
        assert!(storefront.snapshot().orders.is_empty());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_product_not_addable() {
        let (storefront, _, _) = fresh().await;
        storefront.admin_login("admin@nayavish.com", "admin").await.unwrap();
        assert_eq!(storefront.toggle_active("cos-2").await.unwrap(), Some(false));
        assert!(storefront.add_to_cart("cos-2").await.is_err());
        assert!(storefront.product("cos-2").is_none());
        assert!(matches!(storefront.add_to_cart("nope").await, Err(StorefrontError::ProductNotFound)));
    }

    #[tokio::test]
    async fn test_admin_operations_require_login() {
        let (storefront, _, _) = fresh().await;
        assert!(matches!(storefront.orders(), Err(StorefrontError::AdminRequired)));
        assert!(matches!(storefront.set_stock("cos-1", "3").await, Err(StorefrontError::AdminRequired)));
        assert!(storefront.admin_login("admin@nayavish.com", "wrong").await.is_err());
        storefront.admin_login("admin@nayavish.com", "admin").await.unwrap();
        assert_eq!(storefront.set_stock("cos-1", "-4").await.unwrap(), Some(0));
        assert_eq!(storefront.set_stock("missing", "4").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_product_admin_lifecycle() {
        let (storefront, _, _) = fresh().await;
        storefront.admin_login("admin@nayavish.com", "admin").await.unwrap();
        let mut draft = ProductDraft { name: "Neem Comb".into(), stock: "12".into(), ..Default::default() };
        draft.pricing = PriceForm::new("200", "25", "");
        draft.pricing.edit_discount("25");
        let product = storefront.add_product(&draft).await.unwrap();
        assert_eq!(product.price, Money::new(150));
        assert_eq!(storefront.admin_products().unwrap()[0].id, product.id);

        let mut edit = ProductDraft::from_product(&product);
        edit.name = "Neem Wood Comb".into();
        assert_eq!(storefront.update_product(&product.id, &edit).await.unwrap().unwrap().name, "Neem Wood Comb");
        assert!(storefront.update_product("ghost", &edit).await.unwrap().is_none());
        assert!(storefront.delete_product(&product.id).await.unwrap().is_some());
        assert!(storefront.delete_product(&product.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_order_status_workflow() {
        let (storefront, _, _) = fresh().await;
        storefront.add_to_cart("cos-4").await.unwrap();
        let order = storefront.checkout(&details(None, "9876543210")).await.unwrap();
        storefront.admin_login("admin@nayavish.com", "admin").await.unwrap();

        let rejected = storefront.reject_order(order.id()).await.unwrap().unwrap();
        assert_eq!(rejected.status(), OrderStatus::Cancelled);
        let err = storefront.update_order_status(order.id(), OrderStatus::Accepted).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Order(_)));
        assert_eq!(storefront.orders().unwrap()[0].status(), OrderStatus::Cancelled);
        assert!(storefront.update_order_status("ORD-404", OrderStatus::Accepted).await.unwrap().is_none());

        let summary = storefront.dashboard().unwrap();
        assert_eq!(summary.orders, 1);
        assert_eq!(summary.pending, 0);
    }

    #[tokio::test]
    async fn test_sign_up_then_login() {
        let (storefront, store, _) = fresh().await;
        let request = SignUpRequest {
            name: "Meera".into(),
            email: "meera@example.com".into(),
            phone: "9123456780".into(),
            address: String::new(),
            password: "rosewater".into(),
        };
        storefront.sign_up(&request).await.unwrap();
        assert!(matches!(storefront.sign_up(&request).await, Err(StorefrontError::Auth(AuthError::AlreadyRegistered))));
        storefront.logout().await.unwrap();
        assert!(store.load(StorageKey::CurrentUser).await.unwrap().is_none());

        let user = storefront.login("Meera@Example.com", "rosewater").await.unwrap();
        assert_eq!(user.name, "Meera");
        assert!(storefront.login("meera@example.com", "nope").await.is_err());
        assert!(!store.load(StorageKey::Users).await.unwrap().unwrap().to_string().contains("rosewater"));
    }

    #[tokio::test]
    async fn test_otp_login_creates_account() {
        let (storefront, _, notifier) = fresh().await;
        assert!(matches!(storefront.verify_otp("123456").await, Err(StorefrontError::Auth(AuthError::NoPendingOtp))));
        storefront.request_otp("91234 56789", OtpPurpose::Login).await.unwrap();
        assert!(matches!(
            storefront.request_otp("9123456789", OtpPurpose::Login).await,
            Err(StorefrontError::Auth(AuthError::ResendTooSoon))
        ));
        storefront.request_voice_otp().await.unwrap();
        assert_eq!(notifier.sent().len(), 2);

        let outcome = storefront.verify_otp("000000").await.unwrap();
        assert!(matches!(outcome, OtpOutcome::LoggedIn(Resolution::Created(_))));
        let user = storefront.current_user().unwrap();
        assert_eq!(user.name, "Guest-9123456789");
        assert!(storefront.snapshot().pending_otp.is_none());
    }

    #[tokio::test]
    async fn test_legacy_data_is_migrated_on_open() {
        let store = Arc::new(MemoryStore::new());
        store.save(StorageKey::Users, &json!([{
            "id": "u1", "name": "Old", "email": "old@x.com", "phone": "9999999999",
            "address": "", "avatar": "", "joinedAt": "2024-05-01T10:00:00Z", "password": "hunter2"
        }])).await.unwrap();
        store.save(StorageKey::Settings, &json!({ "customBadges": ["Vegan"], "storeName": "Old Shop" })).await.unwrap();
        store.save(StorageKey::Products, &json!([])).await.unwrap();

        let storefront = open_with(store.clone(), Arc::new(RecordingNotifier::default())).await;
        assert!(storefront.snapshot().catalog.is_empty());
        assert_eq!(storefront.settings().store_name, "Old Shop");
        assert_eq!(storefront.settings().custom_badges.len(), 3);
        let users = store.load(StorageKey::Users).await.unwrap().unwrap().to_string();
        assert!(!users.contains("hunter2"));
        assert!(storefront.login("old@x.com", "hunter2").await.is_ok());
    }

    #[tokio::test]
    async fn test_backup_restore_and_reset() {
        let (storefront, _, _) = fresh().await;
        storefront.admin_login("admin@nayavish.com", "admin").await.unwrap();
        let exported = storefront.export_backup().await.unwrap();

        storefront.delete_product("cos-1").await.unwrap();
        assert_eq!(storefront.snapshot().catalog.len(), 4);
        storefront.restore_backup(&exported).await.unwrap();
        assert_eq!(storefront.snapshot().catalog.len(), 5);

        assert!(storefront.restore_backup("{}").await.is_err());
        assert_eq!(storefront.snapshot().catalog.len(), 5);

        storefront.update_settings(json!({ "storeName": "Renamed" })).await.unwrap();
        storefront.reset().await.unwrap();
        assert_eq!(storefront.settings(), StoreSettings::default());
        assert_eq!(storefront.snapshot().catalog.len(), 5);
    }

    #[tokio::test]
    async fn test_subscribers_see_new_snapshots() {
        let (storefront, _, _) = fresh().await;
        let mut rx = storefront.subscribe();
        let before = storefront.snapshot();
        storefront.add_to_cart("cos-1").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().cart.item_count(), 1);
        assert!(before.cart.is_empty());
    }

    #[tokio::test]
    async fn test_assistant_without_backend() {
        let (storefront, _, _) = fresh().await;
        let reply = storefront.ask_assistant("hair fall?", &[]).await;
        assert_eq!(reply, crate::services::assistant::NOT_CONFIGURED_REPLY);
    }

    #[tokio::test]
    async fn test_cart_lines_added_while_confirming_stay_in_bag() {
        let store = Arc::new(MemoryStore::new());
        let latency = Duration::from_millis(200);
        let gateway = Arc::new(SimulatedGateway::new(store.clone(), GatewayLatency { message: latency, call: latency }));
        let storefront = Arc::new(Storefront::open(store, gateway, StorefrontOptions::default()).await.unwrap());
        storefront.add_to_cart("cos-1").await.unwrap();

        let placing = tokio::spawn({
            let storefront = storefront.clone();
            async move { storefront.checkout(&details(None, "9876543210")).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        storefront.add_to_cart("cos-3").await.unwrap();

        let order = placing.await.unwrap().unwrap();
        let ordered: Vec<&str> = order.items().iter().map(CartItem::id).collect();
        assert_eq!(ordered, vec!["cos-1"]);
        let left: Vec<String> = storefront.cart().items.iter().map(|i| i.id().to_string()).collect();
        assert_eq!(left, vec!["cos-3".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sign_ups_register_once() {
        let (storefront, _, _) = fresh().await;
        let storefront = Arc::new(storefront);
        let request = SignUpRequest {
            name: "Meera".into(),
            email: "meera@example.com".into(),
            phone: "9123456780".into(),
            address: String::new(),
            password: "rosewater".into(),
        };
        let attempts: Vec<_> = (0..6)
            .map(|_| {
                let (storefront, request) = (storefront.clone(), request.clone());
                tokio::spawn(async move { storefront.sign_up(&request).await.is_ok() })
            })
            .collect();
        let mut succeeded = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(storefront.snapshot().users.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_publishes_nothing() {
        let store = Arc::new(BrokenDisk::default());
        let storefront = Storefront::open(store.clone(), Arc::new(RecordingNotifier::default()), StorefrontOptions::default()).await.unwrap();
        storefront.add_to_cart("cos-1").await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        let err = storefront.checkout(&details(None, "9876543210")).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Storage(_)));
        let snapshot = storefront.snapshot();
        assert!(snapshot.orders.is_empty());
        assert_eq!(snapshot.cart.item_count(), 1);
        assert!(snapshot.current_user.is_none());
        assert_eq!(store.load(StorageKey::Orders).await.unwrap(), Some(json!([])));

        store.failing.store(false, Ordering::SeqCst);
        storefront.checkout(&details(None, "9876543210")).await.unwrap();
        assert_eq!(storefront.snapshot().orders.len(), 1);
    }

    #[tokio::test]
    async fn test_settings_edit_merges_over_current() {
        let (storefront, _, _) = fresh().await;
        storefront.admin_login("admin@nayavish.com", "admin").await.unwrap();
        storefront.update_settings(json!({ "deliveryFee": 40 })).await.unwrap();
        let saved = storefront.update_settings(json!({ "storeName": "Renamed Shop" })).await.unwrap();
        assert_eq!(saved.delivery_fee, Money::new(40));

        let err = storefront.update_settings(json!({ "storeName": "Other", "deliveryFee": "sixty" })).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Settings(_)));
        assert_eq!(storefront.settings().store_name, "Renamed Shop");
        assert_eq!(storefront.settings().delivery_fee, Money::new(40));
    }

    #[tokio::test]
    async fn test_huge_cart_adjustment_saturates() {
        let (storefront, _, _) = fresh().await;
        storefront.add_to_cart("cos-1").await.unwrap();
        assert_eq!(storefront.adjust_cart("cos-1", i64::MAX).await.unwrap(), u32::MAX);
        assert_eq!(storefront.cart().item_count, u32::MAX);
    }
}
