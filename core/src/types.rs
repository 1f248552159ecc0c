//! Domain DTOs for the activities API.
//!
//! # Design
//! These mirror the mock-server's schema but are defined independently;
//! integration tests catch schema drift. Optional server fields default so a
//! sparse row still decodes, while the key field is checked separately by the
//! endpoint adapter.

use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Image assigned to items created from the dashboard.
pub const DEFAULT_ITEM_IMAGE: &str = "css/images/product_images/jet_logo_256.png";

/// One row of a remote collection, identified by the value of its
/// configured key field.
pub trait Record: Clone + fmt::Debug + DeserializeOwned {
    type Key: Clone + Eq + Hash + fmt::Debug + fmt::Display;

    /// Value of `field` as a key, or `None` if this record type has no
    /// field by that name.
    fn key(&self, field: &str) -> Option<Self::Key>;
}

/// A parent record; selecting one binds the item collection to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_desc: String,
    #[serde(default)]
    pub image: String,
}

impl Record for Activity {
    type Key = i64;

    fn key(&self, field: &str) -> Option<i64> {
        (field == "id").then_some(self.id)
    }
}

/// A child record owned by an activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: i64,
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
    pub activity_id: i64,
    #[serde(default)]
    pub image: String,
}

impl Record for Item {
    type Key = i64;

    fn key(&self, field: &str) -> Option<i64> {
        (field == "id").then_some(self.id)
    }
}

/// Fields the user fills in to create an item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDraft {
    pub name: String,
    pub short_desc: String,
    pub price: f64,
    pub quantity_instock: i64,
    pub quantity_shipped: i64,
}

/// POST body for a new item. The server assigns the key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub short_desc: String,
    pub price: f64,
    pub quantity_instock: i64,
    pub quantity_shipped: i64,
    pub quantity: i64,
    pub activity_id: i64,
    pub image: String,
}

impl NewItem {
    /// Build the POST body for `draft` under `activity_id`. `quantity` is the
    /// sum of stock and shipped counts.
    pub fn from_draft(draft: ItemDraft, activity_id: i64) -> Self {
        Self {
            quantity: draft.quantity_instock + draft.quantity_shipped,
            name: draft.name,
            short_desc: draft.short_desc,
            price: draft.price,
            quantity_instock: draft.quantity_instock,
            quantity_shipped: draft.quantity_shipped,
            activity_id,
            image: DEFAULT_ITEM_IMAGE.to_string(),
        }
    }
}

/// PUT body for an edited item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemUpdate {
    #[serde(rename = "itemId")]
    pub item_id: i64,
    pub name: String,
    pub price: f64,
    pub short_desc: String,
}

impl ItemUpdate {
    /// Pre-fill the edit form from the currently selected item.
    pub fn from_item(item: &Item) -> Self {
        Self {
            item_id: item.id,
            name: item.name.clone(),
            price: item.price,
            short_desc: item.short_desc.clone(),
        }
    }
}

/// A window over the server-side ordering: rows `[offset, offset + size)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub offset: usize,
    pub size: usize,
    pub filter_text: Option<String>,
}

impl FetchRequest {
    pub fn new(offset: usize, size: usize) -> Self {
        Self {
            offset,
            size,
            filter_text: None,
        }
    }

    pub fn with_filter(mut self, text: impl Into<String>) -> Self {
        self.filter_text = Some(text.into());
        self
    }

    /// The filter text, treating an empty string as no filter.
    pub fn filter(&self) -> Option<&str> {
        self.filter_text.as_deref().filter(|text| !text.is_empty())
    }

    /// The window immediately after this one, under the same filter.
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.size,
            size: self.size,
            filter_text: self.filter_text.clone(),
        }
    }
}

/// One fetched window of records plus pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R> {
    pub data: Vec<R>,
    /// Best-effort total count; `-1` when the server does not know.
    pub total_size: i64,
    pub has_more: bool,
}

impl<R> Page<R> {
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            total_size: 0,
            has_more: false,
        }
    }
}

/// Per-record metadata carried by a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata<K> {
    pub key: K,
}

/// Record types keyed by something other than `id`.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Keyed by `code`; `id` is carried but need not be unique.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Product {
        pub code: String,
        #[serde(default)]
        pub id: i64,
        #[serde(default)]
        pub name: String,
    }

    impl Product {
        pub fn new(code: &str, id: i64) -> Self {
            Self {
                code: code.to_string(),
                id,
                name: String::new(),
            }
        }
    }

    impl Record for Product {
        type Key = String;

        fn key(&self, field: &str) -> Option<String> {
            match field {
                "code" => Some(self.code.clone()),
                "id" => Some(self.id.to_string()),
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_sums_quantities_and_sets_defaults() {
        let draft = ItemDraft {
            name: "Widget".to_string(),
            short_desc: "A widget".to_string(),
            price: 9.99,
            quantity_instock: 5,
            quantity_shipped: 3,
        };
        let item = NewItem::from_draft(draft, 7);
        assert_eq!(item.quantity, 8);
        assert_eq!(item.activity_id, 7);
        assert_eq!(item.image, DEFAULT_ITEM_IMAGE);
    }

    #[test]
    fn new_item_omits_key() {
        let json = serde_json::to_value(NewItem::from_draft(ItemDraft::default(), 1)).unwrap();
        assert!(json.get("id").is_none());
    }

    #[test]
    fn item_update_uses_item_id_field_name() {
        let item: Item = serde_json::from_str(r#"{"id":4,"name":"Ball","price":2.5,"short_desc":"round"}"#).unwrap();
        let json = serde_json::to_value(ItemUpdate::from_item(&item)).unwrap();
        assert_eq!(json["itemId"], 4);
        assert_eq!(json["name"], "Ball");
        assert_eq!(json["short_desc"], "round");
        assert!(json.get("quantity").is_none());
    }

    #[test]
    fn sparse_item_decodes_with_defaults() {
        let item: Item = serde_json::from_str(r#"{"id":1,"name":"Bare"}"#).unwrap();
        assert_eq!(item.key("id"), Some(1));
        assert_eq!(item.key("itemId"), None);
        assert_eq!(item.quantity_instock, 0);
        assert!(item.image.is_empty());
    }

    #[test]
    fn empty_filter_text_is_no_filter() {
        assert_eq!(FetchRequest::new(0, 10).with_filter("").filter(), None);
        assert_eq!(FetchRequest::new(0, 10).with_filter("ski").filter(), Some("ski"));
    }

    #[test]
    fn next_window_keeps_filter() {
        let next = FetchRequest::new(10, 10).with_filter("x").next();
        assert_eq!(next, FetchRequest::new(20, 10).with_filter("x"));
    }
}
