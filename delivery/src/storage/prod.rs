use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    NotSet, QueryFilter, QueryOrder, Schema, Set, TransactionTrait,
};
use tracing::{debug, info};

use super::common::{
    AccountDefaults, DeliveryStorage, Settlement, SettlementOutcome, settlement_conflict,
};
use super::entities::{canteens, deliveries, delivery_users, orders, wallet_entries, wallets};
use crate::error::DeliveryError;
use crate::model::{
    Canteen, DeliveryRecord, DeliveryUser, NewCanteen, Order, OrderFilter, OrderId, OrderStatus,
    Wallet, WalletEntry, WalletEntryKind, day_of, new_document_id, round_money,
};

/// SQL store on sea-orm. Works against SQLite and Postgres.
#[derive(Clone)]
pub struct ProdStorage {
    pub db: DatabaseConnection,
    defaults: AccountDefaults,
}

impl ProdStorage {
    pub async fn new(database_url: &str, defaults: AccountDefaults) -> Result<Self, DeliveryError> {
        let db = Database::connect(database_url).await?;
        let storage = Self { db, defaults };
        storage.create_tables().await?;
        info!("Connected SQL storage");
        Ok(storage)
    }

    async fn create_tables(&self) -> Result<(), DeliveryError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);
        let mut statements = vec![
            schema.create_table_from_entity(orders::Entity),
            schema.create_table_from_entity(wallets::Entity),
            schema.create_table_from_entity(wallet_entries::Entity),
            schema.create_table_from_entity(delivery_users::Entity),
            schema.create_table_from_entity(deliveries::Entity),
            schema.create_table_from_entity(canteens::Entity),
        ];
        for statement in statements.iter_mut() {
            statement.if_not_exists();
            self.db.execute(backend.build(&*statement)).await?;
        }
        Ok(())
    }

    async fn ensure_wallet<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        let row = wallets::ActiveModel {
            user_id: Set(user_id.to_string()),
            balance: Set(self.defaults.wallet_balance),
            updated_at: Set(at),
        };
        wallets::Entity::insert(row)
            .on_conflict(
                OnConflict::column(wallets::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    async fn ensure_delivery_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        let row = delivery_users::ActiveModel {
            user_id: Set(user_id.to_string()),
            total_earnings: Set(0.0),
            delivery_count: Set(0),
            rating: Set(self.defaults.rating),
            created_at: Set(at),
            updated_at: Set(at),
        };
        delivery_users::Entity::insert(row)
            .on_conflict(
                OnConflict::column(delivery_users::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    async fn credit_delivery_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        amount: f64,
        order_id: Option<OrderId>,
        at: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(DeliveryError::Validation(format!(
                "Earning amount must be a non-negative number, got {amount}"
            )));
        }
        self.ensure_delivery_user(conn, user_id, at).await?;
        delivery_users::Entity::update_many()
            .col_expr(
                delivery_users::Column::TotalEarnings,
                Expr::col(delivery_users::Column::TotalEarnings).add(amount),
            )
            .col_expr(
                delivery_users::Column::DeliveryCount,
                Expr::col(delivery_users::Column::DeliveryCount).add(1),
            )
            .col_expr(delivery_users::Column::UpdatedAt, Expr::value(at))
            .filter(delivery_users::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;
        deliveries::ActiveModel {
            id: NotSet,
            user_id: Set(user_id.to_string()),
            amount: Set(amount),
            order_id: Set(order_id),
            timestamp: Set(at),
            date: Set(day_of(at)),
        }
        .insert(conn)
        .await?;
        Ok(())
    }
}

fn order_to_active(order: &Order) -> Result<orders::ActiveModel, DeliveryError> {
    Ok(orders::ActiveModel {
        id: Set(order.id.clone()),
        canteen_name: Set(order.canteen_name.clone()),
        pickup_point: Set(order.pickup_point.clone()),
        drop_location: Set(order.drop_location.clone()),
        items: Set(serde_json::to_value(&order.items)?),
        subtotal: Set(order.subtotal),
        delivery_fee: Set(order.delivery_fee),
        total_amount: Set(order.total_amount),
        placed_by: Set(order.placed_by.clone()),
        picked_by: Set(order.picked_by.clone()),
        student_email: Set(order.student_email.clone()),
        status: Set(order.status.to_string()),
        otp: Set(order.otp.clone()),
        otp_expires_at: Set(order.otp_expires_at),
        created_at: Set(order.created_at),
        updated_at: Set(order.updated_at),
        delivered_at: Set(order.delivered_at),
    })
}

impl TryFrom<orders::Model> for Order {
    type Error = DeliveryError;

    fn try_from(model: orders::Model) -> Result<Self, Self::Error> {
        let status = model
            .status
            .parse::<OrderStatus>()
            .map_err(|e| DeliveryError::Storage(e.to_string()))?;
        Ok(Order {
            id: model.id,
            canteen_name: model.canteen_name,
            pickup_point: model.pickup_point,
            drop_location: model.drop_location,
            items: serde_json::from_value(model.items)?,
            subtotal: model.subtotal,
            delivery_fee: model.delivery_fee,
            total_amount: model.total_amount,
            placed_by: model.placed_by,
            picked_by: model.picked_by,
            student_email: model.student_email,
            status,
            otp: model.otp,
            otp_expires_at: model.otp_expires_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
            delivered_at: model.delivered_at,
        })
    }
}

impl TryFrom<canteens::Model> for Canteen {
    type Error = DeliveryError;

    fn try_from(model: canteens::Model) -> Result<Self, Self::Error> {
        Ok(Canteen {
            id: model.id,
            name: model.name,
            location: model.location,
            contact_number: model.contact_number,
            operating_hours: serde_json::from_value(model.operating_hours)?,
            menu: serde_json::from_value(model.menu)?,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

fn entry_kind(kind: &str) -> Result<WalletEntryKind, DeliveryError> {
    match kind {
        "order" => Ok(WalletEntryKind::Order),
        "topup" => Ok(WalletEntryKind::Topup),
        other => Err(DeliveryError::Storage(format!("Unknown wallet entry kind {other}"))),
    }
}

async fn load_wallet<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
) -> Result<Option<Wallet>, DeliveryError> {
    let Some(row) = wallets::Entity::find_by_id(user_id.to_string()).one(conn).await? else {
        return Ok(None);
    };
    let history = wallet_entries::Entity::find()
        .filter(wallet_entries::Column::UserId.eq(user_id))
        .order_by_asc(wallet_entries::Column::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(|entry| {
            Ok(WalletEntry {
                kind: entry_kind(&entry.kind)?,
                amount: entry.amount,
                date: entry.date,
                order_id: entry.order_id,
            })
        })
        .collect::<Result<Vec<_>, DeliveryError>>()?;
    Ok(Some(Wallet {
        user_id: row.user_id,
        balance: round_money(row.balance),
        history,
    }))
}

async fn load_delivery_user<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
) -> Result<Option<DeliveryUser>, DeliveryError> {
    let Some(row) = delivery_users::Entity::find_by_id(user_id.to_string())
        .one(conn)
        .await?
    else {
        return Ok(None);
    };
    let deliveries = deliveries::Entity::find()
        .filter(deliveries::Column::UserId.eq(user_id))
        .order_by_asc(deliveries::Column::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(|record| DeliveryRecord {
            amount: record.amount,
            order_id: record.order_id,
            timestamp: record.timestamp,
            date: record.date,
        })
        .collect();
    Ok(Some(DeliveryUser {
        user_id: row.user_id,
        total_earnings: round_money(row.total_earnings),
        delivery_count: row.delivery_count.max(0) as u32,
        rating: row.rating,
        deliveries,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

fn missing(what: &str, id: &str) -> DeliveryError {
    DeliveryError::Storage(format!("{what} {id} vanished after write"))
}

#[async_trait]
impl DeliveryStorage for ProdStorage {
    async fn insert_order(&self, order: Order) -> Result<Order, DeliveryError> {
        orders::Entity::insert(order_to_active(&order)?)
            .exec_without_returning(&self.db)
            .await?;
        debug!(order_id = %order.id, "Inserted order");
        Ok(order)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, DeliveryError> {
        orders::Entity::find_by_id(order_id.to_string())
            .one(&self.db)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, DeliveryError> {
        let mut query = orders::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(orders::Column::Status.eq(status.to_string()));
        }
        let rows = query
            .order_by_asc(orders::Column::CreatedAt)
            .order_by_asc(orders::Column::Id)
            .all(&self.db)
            .await?;
        // User ids match case-insensitively, which is simpler to apply here
        // than portably in SQL.
        rows.into_iter()
            .map(Order::try_from)
            .filter(|order| order.as_ref().map_or(true, |o| filter.matches(o)))
            .collect()
    }

    async fn replace_order(
        &self,
        order: Order,
        expected_status: OrderStatus,
    ) -> Result<Order, DeliveryError> {
        let result = orders::Entity::update_many()
            .set(order_to_active(&order)?)
            .filter(orders::Column::Id.eq(order.id.clone()))
            .filter(orders::Column::Status.eq(expected_status.to_string()))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return match self.get_order(&order.id).await? {
                None => Err(DeliveryError::order_not_found(&order.id)),
                Some(current) => Err(DeliveryError::Conflict(format!(
                    "Order {} is now {}, expected {}",
                    order.id, current.status, expected_status
                ))),
            };
        }
        Ok(order)
    }

    async fn get_or_create_wallet(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Wallet, DeliveryError> {
        self.ensure_wallet(&self.db, user_id, at).await?;
        load_wallet(&self.db, user_id)
            .await?
            .ok_or_else(|| missing("Wallet", user_id))
    }

    async fn top_up_wallet(
        &self,
        user_id: &str,
        amount: f64,
        at: DateTime<Utc>,
    ) -> Result<Wallet, DeliveryError> {
        let txn = self.db.begin().await?;
        self.ensure_wallet(&txn, user_id, at).await?;
        wallets::Entity::update_many()
            .col_expr(
                wallets::Column::Balance,
                Expr::col(wallets::Column::Balance).add(amount),
            )
            .col_expr(wallets::Column::UpdatedAt, Expr::value(at))
            .filter(wallets::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        wallet_entries::ActiveModel {
            id: NotSet,
            user_id: Set(user_id.to_string()),
            kind: Set(WalletEntryKind::Topup.to_string()),
            amount: Set(amount),
            date: Set(at),
            order_id: Set(None),
        }
        .insert(&txn)
        .await?;
        let wallet = load_wallet(&txn, user_id)
            .await?
            .ok_or_else(|| missing("Wallet", user_id))?;
        txn.commit().await?;
        Ok(wallet)
    }

    async fn get_or_create_delivery_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<DeliveryUser, DeliveryError> {
        self.ensure_delivery_user(&self.db, user_id, at).await?;
        load_delivery_user(&self.db, user_id)
            .await?
            .ok_or_else(|| missing("Delivery user", user_id))
    }

    async fn record_earning(
        &self,
        user_id: &str,
        amount: f64,
        order_id: Option<OrderId>,
        at: DateTime<Utc>,
    ) -> Result<DeliveryUser, DeliveryError> {
        let txn = self.db.begin().await?;
        self.credit_delivery_user(&txn, user_id, amount, order_id, at)
            .await?;
        let user = load_delivery_user(&txn, user_id)
            .await?
            .ok_or_else(|| missing("Delivery user", user_id))?;
        txn.commit().await?;
        Ok(user)
    }

    async fn upsert_canteen(
        &self,
        canteen: NewCanteen,
        at: DateTime<Utc>,
    ) -> Result<(Canteen, bool), DeliveryError> {
        let id = canteen.id.clone().unwrap_or_else(new_document_id);
        let txn = self.db.begin().await?;
        let existing = canteens::Entity::find_by_id(id.clone()).one(&txn).await?;
        let created = existing.is_none();
        let mut stored = Canteen::from_new(id.clone(), canteen, at);
        if let Some(existing) = existing {
            stored.created_at = existing.created_at;
        }
        let row = canteens::ActiveModel {
            id: Set(stored.id.clone()),
            name: Set(stored.name.clone()),
            location: Set(stored.location.clone()),
            contact_number: Set(stored.contact_number.clone()),
            operating_hours: Set(serde_json::to_value(&stored.operating_hours)?),
            menu: Set(serde_json::to_value(&stored.menu)?),
            created_at: Set(stored.created_at),
            updated_at: Set(stored.updated_at),
        };
        if created {
            row.insert(&txn).await?;
        } else {
            row.update(&txn).await?;
        }
        txn.commit().await?;
        Ok((stored, created))
    }

    async fn list_canteens(&self) -> Result<Vec<Canteen>, DeliveryError> {
        canteens::Entity::find()
            .order_by_asc(canteens::Column::CreatedAt)
            .order_by_asc(canteens::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Canteen::try_from)
            .collect()
    }

    async fn settle_delivery(
        &self,
        settlement: &Settlement,
    ) -> Result<SettlementOutcome, DeliveryError> {
        settlement.check_amounts()?;
        let at = settlement.at;
        // Dropping `txn` on any early return rolls every step back.
        let txn = self.db.begin().await?;

        let current = orders::Entity::find_by_id(settlement.order_id.clone())
            .one(&txn)
            .await?
            .map(Order::try_from)
            .transpose()?
            .ok_or_else(|| DeliveryError::order_not_found(&settlement.order_id))?;
        if !current.status.awaits_handover() {
            return Err(settlement_conflict(&settlement.order_id));
        }

        let delivered = orders::Entity::update_many()
            .col_expr(
                orders::Column::Status,
                Expr::value(OrderStatus::Delivered.to_string()),
            )
            .col_expr(orders::Column::Otp, Expr::value(Option::<String>::None))
            .col_expr(
                orders::Column::OtpExpiresAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(orders::Column::DeliveredAt, Expr::value(Some(at)))
            .col_expr(orders::Column::UpdatedAt, Expr::value(at))
            .filter(orders::Column::Id.eq(settlement.order_id.clone()))
            .filter(orders::Column::Status.eq(current.status.to_string()))
            .filter(orders::Column::Otp.eq(settlement.expected_otp.clone()))
            .exec(&txn)
            .await?;
        if delivered.rows_affected != 1 {
            return Err(settlement_conflict(&settlement.order_id));
        }

        self.ensure_wallet(&txn, &settlement.student_id, at).await?;
        let debited = wallets::Entity::update_many()
            .col_expr(
                wallets::Column::Balance,
                Expr::col(wallets::Column::Balance).sub(settlement.amount),
            )
            .col_expr(wallets::Column::UpdatedAt, Expr::value(at))
            .filter(wallets::Column::UserId.eq(settlement.student_id.clone()))
            .filter(wallets::Column::Balance.gte(settlement.amount))
            .exec(&txn)
            .await?;
        if debited.rows_affected != 1 {
            let available = wallets::Entity::find_by_id(settlement.student_id.clone())
                .one(&txn)
                .await?
                .map(|w| round_money(w.balance))
                .unwrap_or_default();
            return Err(DeliveryError::InsufficientBalance {
                required: settlement.amount,
                available,
            });
        }
        wallet_entries::ActiveModel {
            id: NotSet,
            user_id: Set(settlement.student_id.clone()),
            kind: Set(WalletEntryKind::Order.to_string()),
            amount: Set(settlement.amount),
            date: Set(at),
            order_id: Set(Some(settlement.order_id.clone())),
        }
        .insert(&txn)
        .await?;

        self.credit_delivery_user(
            &txn,
            &settlement.buddy_id,
            settlement.fee,
            Some(settlement.order_id.clone()),
            at,
        )
        .await?;

        let order = orders::Entity::find_by_id(settlement.order_id.clone())
            .one(&txn)
            .await?
            .map(Order::try_from)
            .transpose()?
            .ok_or_else(|| missing("Order", &settlement.order_id))?;
        let wallet = load_wallet(&txn, &settlement.student_id)
            .await?
            .ok_or_else(|| missing("Wallet", &settlement.student_id))?;
        let delivery_user = load_delivery_user(&txn, &settlement.buddy_id)
            .await?
            .ok_or_else(|| missing("Delivery user", &settlement.buddy_id))?;

        txn.commit().await?;
        debug!(order_id = %settlement.order_id, "Settlement committed");
        Ok(SettlementOutcome {
            order,
            wallet,
            delivery_user,
        })
    }
}
