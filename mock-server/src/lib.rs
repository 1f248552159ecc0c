use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

pub const DEFAULT_LIMIT: usize = 25;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: i64,
    pub name: String,
    pub short_desc: String,
    pub image: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub short_desc: String,
    pub price: f64,
    pub quantity: i64,
    pub quantity_shipped: i64,
    pub quantity_instock: i64,
    pub activity_id: i64,
    pub image: String,
}

/// `{ items, totalSize, hasMore }`
#[derive(Debug, Serialize, Deserialize)]
pub struct PageBody<T> {
    pub items: Vec<T>,
    #[serde(rename = "totalSize")]
    pub total_size: usize,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct ItemQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Case-insensitive substring match on the item name.
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateItem {
    pub name: String,
    #[serde(default)]
    pub short_desc: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub quantity_shipped: i64,
    #[serde(default)]
    pub quantity_instock: i64,
    #[serde(default)]
    pub image: String,
}

#[derive(Deserialize)]
pub struct UpdateItem {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub short_desc: Option<String>,
    pub quantity_shipped: Option<i64>,
    pub quantity_instock: Option<i64>,
}

/// In-memory dataset. `BTreeMap` keeps listing order stable by id.
#[derive(Debug, Default)]
pub struct Store {
    activities: BTreeMap<i64, Activity>,
    items: BTreeMap<i64, Item>,
    next_item_id: i64,
}

impl Store {
    pub fn new() -> Self {
        Self {
            next_item_id: 1,
            ..Self::default()
        }
    }

    pub fn insert_activity(&mut self, id: i64, name: &str) {
        self.activities.insert(
            id,
            Activity {
                id,
                name: name.to_string(),
                short_desc: String::new(),
                image: String::new(),
            },
        );
    }

    /// Insert an item with the next free id and return that id.
    pub fn insert_item(&mut self, activity_id: i64, name: &str, quantity_instock: i64, quantity_shipped: i64) -> i64 {
        let id = self.next_item_id;
        self.next_item_id += 1;
        self.items.insert(
            id,
            Item {
                id,
                name: name.to_string(),
                short_desc: String::new(),
                price: 0.0,
                quantity: quantity_instock + quantity_shipped,
                quantity_shipped,
                quantity_instock,
                activity_id,
                image: String::new(),
            },
        );
        id
    }

    /// A few activities with items, for running the server by hand.
    pub fn demo() -> Self {
        let mut store = Self::new();
        for (id, name) in [(1, "Baseball"), (2, "Bicycling"), (3, "Skiing"), (4, "Soccer")] {
            store.insert_activity(id, name);
        }
        for (name, instock, shipped) in [("SureCatch Baseball Glove", 20, 5), ("Western R16 Helmet", 12, 3)] {
            store.insert_item(1, name, instock, shipped);
        }
        for (name, instock, shipped) in [("Ski Jacket", 8, 4), ("Ski Goggles", 30, 11), ("Ski Boots", 6, 2)] {
            store.insert_item(3, name, instock, shipped);
        }
        store
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with(Store::new())
}

pub fn app_with(store: Store) -> Router {
    let db: Db = Arc::new(RwLock::new(store));
    Router::new()
        .route("/activities/", get(list_activities))
        .route("/activities/{activity_id}/items/", get(list_items).post(create_item))
        .route(
            "/activities/{activity_id}/items/{item_id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .with_state(db)
}

pub async fn run_with(listener: TcpListener, store: Store) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(store)).await
}

fn paginate<T: Clone>(rows: Vec<T>, limit: Option<usize>, offset: Option<usize>) -> PageBody<T> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    let offset = offset.unwrap_or(0);
    let total_size = rows.len();
    let items: Vec<T> = rows.into_iter().skip(offset).take(limit).collect();
    let has_more = offset + items.len() < total_size;
    PageBody {
        items,
        total_size,
        has_more,
    }
}

async fn list_activities(State(db): State<Db>, Query(query): Query<ListQuery>) -> Json<PageBody<Activity>> {
    let store = db.read().await;
    let rows = store.activities.values().cloned().collect();
    Json(paginate(rows, query.limit, query.offset))
}

async fn list_items(
    State(db): State<Db>,
    Path(activity_id): Path<i64>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<PageBody<Item>>, StatusCode> {
    let store = db.read().await;
    if !store.activities.contains_key(&activity_id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let needle = query.name.as_deref().map(str::to_lowercase);
    let rows = store
        .items
        .values()
        .filter(|item| item.activity_id == activity_id)
        .filter(|item| needle.as_ref().map_or(true, |n| item.name.to_lowercase().contains(n)))
        .cloned()
        .collect();
    debug!(activity_id, filter = ?query.name, "list items");
    Ok(Json(paginate(rows, query.limit, query.offset)))
}

async fn create_item(
    State(db): State<Db>,
    Path(activity_id): Path<i64>,
    Json(input): Json<CreateItem>,
) -> Result<(StatusCode, Json<Item>), StatusCode> {
    let mut store = db.write().await;
    if !store.activities.contains_key(&activity_id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let id = store.next_item_id;
    store.next_item_id += 1;
    let item = Item {
        id,
        name: input.name,
        short_desc: input.short_desc,
        price: input.price,
        quantity: input.quantity,
        quantity_shipped: input.quantity_shipped,
        quantity_instock: input.quantity_instock,
        activity_id,
        image: input.image,
    };
    store.items.insert(id, item.clone());
    debug!(activity_id, id, "created item");
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_item(State(db): State<Db>, Path((activity_id, item_id)): Path<(i64, i64)>) -> Result<Json<Item>, StatusCode> {
    let store = db.read().await;
    store
        .items
        .get(&item_id)
        .filter(|item| item.activity_id == activity_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_item(
    State(db): State<Db>,
    Path((activity_id, item_id)): Path<(i64, i64)>,
    Json(input): Json<UpdateItem>,
) -> Result<Json<Item>, StatusCode> {
    let mut store = db.write().await;
    let item = store
        .items
        .get_mut(&item_id)
        .filter(|item| item.activity_id == activity_id)
        .ok_or(StatusCode::NOT_FOUND)?;
    if let Some(name) = input.name {
        item.name = name;
    }
    if let Some(price) = input.price {
        item.price = price;
    }
    if let Some(short_desc) = input.short_desc {
        item.short_desc = short_desc;
    }
    if let Some(shipped) = input.quantity_shipped {
        item.quantity_shipped = shipped;
    }
    if let Some(instock) = input.quantity_instock {
        item.quantity_instock = instock;
    }
    item.quantity = item.quantity_instock + item.quantity_shipped;
    Ok(Json(item.clone()))
}

async fn delete_item(State(db): State<Db>, Path((activity_id, item_id)): Path<(i64, i64)>) -> StatusCode {
    let mut store = db.write().await;
    let owned = store
        .items
        .get(&item_id)
        .is_some_and(|item| item.activity_id == activity_id);
    if !owned {
        return StatusCode::NOT_FOUND;
    }
    store.items.remove(&item_id);
    debug!(activity_id, item_id, "deleted item");
    StatusCode::OK
}
