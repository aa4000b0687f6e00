use sea_orm::entity::prelude::*;

pub mod orders {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "orders")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub canteen_name: String,
        pub pickup_point: String,
        pub drop_location: String,
        pub items: Json,
        #[sea_orm(column_type = "Double")]
        pub subtotal: f64,
        #[sea_orm(column_type = "Double")]
        pub delivery_fee: f64,
        #[sea_orm(column_type = "Double")]
        pub total_amount: f64,
        pub placed_by: String,
        pub picked_by: Option<String>,
        pub student_email: Option<String>,
        pub status: String,
        pub otp: Option<String>,
        pub otp_expires_at: Option<DateTimeUtc>,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
        pub delivered_at: Option<DateTimeUtc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod wallets {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "wallets")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub user_id: String,
        #[sea_orm(column_type = "Double")]
        pub balance: f64,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::wallet_entries::Entity")]
        Entries,
    }

    impl Related<super::wallet_entries::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Entries.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod wallet_entries {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "wallet_entries")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub user_id: String,
        pub kind: String,
        #[sea_orm(column_type = "Double")]
        pub amount: f64,
        pub date: DateTimeUtc,
        pub order_id: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::wallets::Entity",
            from = "Column::UserId",
            to = "super::wallets::Column::UserId"
        )]
        Wallet,
    }

    impl Related<super::wallets::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Wallet.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod delivery_users {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "delivery_users")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub user_id: String,
        #[sea_orm(column_type = "Double")]
        pub total_earnings: f64,
        pub delivery_count: i32,
        #[sea_orm(column_type = "Double")]
        pub rating: f64,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::deliveries::Entity")]
        Deliveries,
    }

    impl Related<super::deliveries::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Deliveries.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod deliveries {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "deliveries")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub user_id: String,
        #[sea_orm(column_type = "Double")]
        pub amount: f64,
        pub order_id: Option<String>,
        pub timestamp: DateTimeUtc,
        pub date: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::delivery_users::Entity",
            from = "Column::UserId",
            to = "super::delivery_users::Column::UserId"
        )]
        DeliveryUser,
    }

    impl Related<super::delivery_users::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::DeliveryUser.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod canteens {
    use super::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "canteens")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub name: String,
        pub location: String,
        pub contact_number: String,
        pub operating_hours: Json,
        pub menu: Json,
        pub created_at: DateTimeUtc,
        pub updated_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
