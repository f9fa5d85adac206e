//! 领域记录存储：订单、物流、用户
//!
//! 每条记录单独一把锁：读返回快照，写通过 `update_*` 闭包在该记录的临界区内完成
//! 「检查 + 修改」，同一订单上的并发退款不会丢失更新。闭包内不能 await。

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::ToolError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    LabelCreated,
    InTransit,
    OutForDelivery,
    Delivered,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_usd: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub total_amount: f64,
    pub refunded_amount: f64,
    pub used_idempotency_keys: BTreeSet<String>,
    pub tracking_id: Option<String>,
    pub items: Vec<OrderItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub tracking_id: String,
    pub carrier: String,
    pub status: ShipmentStatus,
    pub last_update: DateTime<Utc>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub phone: Option<String>,
}

type Table<T> = RwLock<HashMap<String, Arc<Mutex<T>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn get_entry<T>(table: &Table<T>, id: &str) -> Option<Arc<Mutex<T>>> {
    let map = match table.read() {
        Ok(map) => map,
        Err(poisoned) => poisoned.into_inner(),
    };
    map.get(id).cloned()
}

fn insert_entry<T>(table: &Table<T>, id: String, value: T) {
    let mut map = match table.write() {
        Ok(map) => map,
        Err(poisoned) => poisoned.into_inner(),
    };
    map.insert(id, Arc::new(Mutex::new(value)));
}

/// 内存记录存储（生产环境可替换为数据库适配器，工具 schema 不变）
#[derive(Default)]
pub struct RecordStore {
    orders: Table<Order>,
    shipments: Table<Shipment>,
    users: Table<User>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 本地开发与测试用的确定性种子数据
    pub fn seeded() -> Self {
        let now = Utc::now();
        let store = Self::new();

        store.insert_user(User {
            user_id: "user_123".to_string(),
            email: "customer@example.com".to_string(),
            phone: Some("+14155552671".to_string()),
        });

        store.insert_shipment(Shipment {
            tracking_id: "trk_ABC12345".to_string(),
            carrier: "UPS".to_string(),
            status: ShipmentStatus::InTransit,
            last_update: now - Duration::hours(4),
            estimated_delivery: Some(now + Duration::days(2)),
        });

        store.insert_order(Order {
            order_id: "ord_XYZ78901".to_string(),
            user_id: "user_123".to_string(),
            status: OrderStatus::Shipped,
            created_at: now - Duration::days(10),
            total_amount: 120.0,
            refunded_amount: 0.0,
            used_idempotency_keys: BTreeSet::new(),
            tracking_id: Some("trk_ABC12345".to_string()),
            items: vec![
                OrderItem {
                    sku: "sku_001".to_string(),
                    name: "Wireless Mouse".to_string(),
                    quantity: 1,
                    unit_price_usd: 40.0,
                },
                OrderItem {
                    sku: "sku_002".to_string(),
                    name: "Mechanical Keyboard".to_string(),
                    quantity: 1,
                    unit_price_usd: 80.0,
                },
            ],
        });

        store
    }

    pub fn insert_order(&self, order: Order) {
        insert_entry(&self.orders, order.order_id.clone(), order);
    }

    pub fn insert_shipment(&self, shipment: Shipment) {
        insert_entry(&self.shipments, shipment.tracking_id.clone(), shipment);
    }

    pub fn insert_user(&self, user: User) {
        insert_entry(&self.users, user.user_id.clone(), user);
    }

    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        get_entry(&self.orders, order_id).map(|o| lock(&o).clone())
    }

    pub fn get_shipment(&self, tracking_id: &str) -> Option<Shipment> {
        get_entry(&self.shipments, tracking_id).map(|s| lock(&s).clone())
    }

    pub fn get_user(&self, user_id: &str) -> Option<User> {
        get_entry(&self.users, user_id).map(|u| lock(&u).clone())
    }

    /// 反查持有该运单号的订单（物流记录本身不带归属）
    pub fn find_order_by_tracking(&self, tracking_id: &str) -> Option<Order> {
        let entries: Vec<Arc<Mutex<Order>>> = match self.orders.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        entries
            .iter()
            .map(|o| lock(o).clone())
            .find(|o| o.tracking_id.as_deref() == Some(tracking_id))
    }

    /// 在订单锁内执行闭包；闭包返回 Err 时调用方负责不做任何修改
    pub fn update_order<R>(
        &self,
        order_id: &str,
        f: impl FnOnce(&mut Order) -> Result<R, ToolError>,
    ) -> Result<R, ToolError> {
        let entry = get_entry(&self.orders, order_id)
            .ok_or_else(|| ToolError::Validation("Order not found.".to_string()))?;
        let mut order = lock(&entry);
        // 在副本上修改，成功后整体写回，失败时记录保持原样
        let mut draft = order.clone();
        let out = f(&mut draft)?;
        *order = draft;
        Ok(out)
    }

    pub fn update_user<R>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut User) -> Result<R, ToolError>,
    ) -> Result<R, ToolError> {
        let entry = get_entry(&self.users, user_id)
            .ok_or_else(|| ToolError::Validation("User not found.".to_string()))?;
        let mut user = lock(&entry);
        let mut draft = user.clone();
        let out = f(&mut draft)?;
        *user = draft;
        Ok(out)
    }
}
