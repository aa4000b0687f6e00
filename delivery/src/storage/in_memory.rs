use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::common::{
    AccountDefaults, DeliveryStorage, Settlement, SettlementOutcome, settlement_conflict,
};
use crate::error::DeliveryError;
use crate::model::{
    Canteen, DeliveryUser, NewCanteen, Order, OrderFilter, OrderId, OrderStatus, Wallet,
    new_document_id,
};

#[derive(Debug, Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    wallets: HashMap<String, Wallet>,
    delivery_users: HashMap<String, DeliveryUser>,
    canteens: HashMap<String, Canteen>,
}

/// Process-local store. Every operation runs under a single lock, which is
/// what makes settlement atomic here.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    defaults: AccountDefaults,
    state: Mutex<State>,
}

impl InMemoryStorage {
    pub fn new(defaults: AccountDefaults) -> Self {
        Self {
            defaults,
            state: Mutex::new(State::default()),
        }
    }

    fn wallet_or_default(&self, state: &State, user_id: &str) -> Wallet {
        state
            .wallets
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Wallet::new(user_id, self.defaults.wallet_balance))
    }

    fn delivery_user_or_default(
        &self,
        state: &State,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> DeliveryUser {
        state
            .delivery_users
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| DeliveryUser::new(user_id, self.defaults.rating, at))
    }
}

#[async_trait]
impl DeliveryStorage for InMemoryStorage {
    async fn insert_order(&self, order: Order) -> Result<Order, DeliveryError> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.id) {
            return Err(DeliveryError::Conflict(format!("Order {} already exists", order.id)));
        }
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, DeliveryError> {
        Ok(self.state.lock().await.orders.get(order_id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, DeliveryError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn replace_order(
        &self,
        order: Order,
        expected_status: OrderStatus,
    ) -> Result<Order, DeliveryError> {
        let mut state = self.state.lock().await;
        let stored = state
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| DeliveryError::order_not_found(&order.id))?;
        if stored.status != expected_status {
            return Err(DeliveryError::Conflict(format!(
                "Order {} is now {}, expected {}",
                order.id, stored.status, expected_status
            )));
        }
        *stored = order.clone();
        Ok(order)
    }

    async fn get_or_create_wallet(
        &self,
        user_id: &str,
        _at: DateTime<Utc>,
    ) -> Result<Wallet, DeliveryError> {
        let mut state = self.state.lock().await;
        let wallet = self.wallet_or_default(&state, user_id);
        state.wallets.insert(user_id.to_string(), wallet.clone());
        Ok(wallet)
    }

    async fn top_up_wallet(
        &self,
        user_id: &str,
        amount: f64,
        at: DateTime<Utc>,
    ) -> Result<Wallet, DeliveryError> {
        let mut state = self.state.lock().await;
        let mut wallet = self.wallet_or_default(&state, user_id);
        wallet.top_up(amount, at);
        state.wallets.insert(user_id.to_string(), wallet.clone());
        Ok(wallet)
    }

    async fn get_or_create_delivery_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<DeliveryUser, DeliveryError> {
        let mut state = self.state.lock().await;
        let user = self.delivery_user_or_default(&state, user_id, at);
        state.delivery_users.insert(user_id.to_string(), user.clone());
        Ok(user)
    }

    async fn record_earning(
        &self,
        user_id: &str,
        amount: f64,
        order_id: Option<OrderId>,
        at: DateTime<Utc>,
    ) -> Result<DeliveryUser, DeliveryError> {
        let mut state = self.state.lock().await;
        let mut user = self.delivery_user_or_default(&state, user_id, at);
        user.credit(amount, order_id, at)?;
        state.delivery_users.insert(user_id.to_string(), user.clone());
        Ok(user)
    }

    async fn upsert_canteen(
        &self,
        canteen: NewCanteen,
        at: DateTime<Utc>,
    ) -> Result<(Canteen, bool), DeliveryError> {
        let mut state = self.state.lock().await;
        let id = canteen.id.clone().unwrap_or_else(new_document_id);
        let existing_created_at = state.canteens.get(&id).map(|c| c.created_at);
        let mut stored = Canteen::from_new(id.clone(), canteen, at);
        if let Some(created_at) = existing_created_at {
            stored.created_at = created_at;
        }
        state.canteens.insert(id, stored.clone());
        Ok((stored, existing_created_at.is_none()))
    }

    async fn list_canteens(&self) -> Result<Vec<Canteen>, DeliveryError> {
        let state = self.state.lock().await;
        let mut canteens: Vec<Canteen> = state.canteens.values().cloned().collect();
        canteens.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(canteens)
    }

    async fn settle_delivery(
        &self,
        settlement: &Settlement,
    ) -> Result<SettlementOutcome, DeliveryError> {
        settlement.check_amounts()?;
        let mut state = self.state.lock().await;

        // Stage on copies; nothing is written back until every step passed.
        let mut order = state
            .orders
            .get(&settlement.order_id)
            .cloned()
            .ok_or_else(|| DeliveryError::order_not_found(&settlement.order_id))?;
        if !order.status.awaits_handover()
            || order.otp.as_deref() != Some(settlement.expected_otp.as_str())
        {
            return Err(settlement_conflict(&settlement.order_id));
        }
        order.status = OrderStatus::Delivered;
        order.delivered_at = Some(settlement.at);
        order.updated_at = settlement.at;
        order.clear_otp();

        let mut wallet = self.wallet_or_default(&state, &settlement.student_id);
        wallet
            .debit_order(&settlement.order_id, settlement.amount, settlement.at)?;

        let mut delivery_user =
            self.delivery_user_or_default(&state, &settlement.buddy_id, settlement.at);
        delivery_user.credit(
            settlement.fee,
            Some(settlement.order_id.clone()),
            settlement.at,
        )?;

        state.orders.insert(order.id.clone(), order.clone());
        state
            .wallets
            .insert(settlement.student_id.clone(), wallet.clone());
        state
            .delivery_users
            .insert(settlement.buddy_id.clone(), delivery_user.clone());

        Ok(SettlementOutcome {
            order,
            wallet,
            delivery_user,
        })
    }
}
