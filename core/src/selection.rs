//! Activity/item selection and the item collection bound to it.
//!
//! # Design
//! `Dashboard` owns the long-lived activities collection and at most one item
//! collection. Selecting an activity always builds a fresh item collection
//! with the next generation number and drops the old one together with any
//! item selection; a page completing for a dropped generation is discarded.

use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CollectionConfig, DashboardConfig};
use crate::error::ApiError;
use crate::http::HttpResponse;
use crate::provider::{PendingFetch, RemoteCollection};
use crate::transport::Transport;
use crate::types::{Activity, FetchRequest, Item, ItemDraft, ItemUpdate, NewItem, Page};

pub const DELETE_CONFIRMATION: &str = "Are you sure you want to delete this item?";

/// Confirmation and alert surface used by the delete flow.
pub trait Prompt {
    fn confirm(&self, message: &str) -> bool;
    fn alert(&self, message: &str);
}

/// One pie chart series derived from the selected item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSeries {
    pub name: String,
    pub items: Vec<i64>,
}

/// Stock versus shipped quantities of `item`.
pub fn chart_series(item: &Item) -> Vec<ChartSeries> {
    vec![
        ChartSeries {
            name: "Quantity in Stock".to_string(),
            items: vec![item.quantity_instock],
        },
        ChartSeries {
            name: "Quantity Shipped".to_string(),
            items: vec![item.quantity_shipped],
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(i64),
    Cancelled,
    NothingSelected,
}

#[derive(Debug)]
pub struct Dashboard {
    config: DashboardConfig,
    activities: RemoteCollection<Activity>,
    selected_activity: Option<Activity>,
    items: Option<RemoteCollection<Item>>,
    selected_item: Option<Item>,
    chart: Vec<ChartSeries>,
    next_generation: u64,
}

impl Dashboard {
    pub fn new(config: DashboardConfig) -> Result<Self, ApiError> {
        let url = join(&config.base_url, "activities/")?;
        let activities = CollectionConfig::from_url(url).with_key_field(config.key_field.clone());
        Ok(Self {
            activities: RemoteCollection::new(Arc::new(activities), 0),
            config,
            selected_activity: None,
            items: None,
            selected_item: None,
            chart: Vec::new(),
            next_generation: 1,
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn activities(&self) -> &RemoteCollection<Activity> {
        &self.activities
    }

    pub fn activities_mut(&mut self) -> &mut RemoteCollection<Activity> {
        &mut self.activities
    }

    /// The item collection for the selected activity.
    pub fn items(&self) -> Option<&RemoteCollection<Item>> {
        self.items.as_ref()
    }

    pub fn items_mut(&mut self) -> Option<&mut RemoteCollection<Item>> {
        self.items.as_mut()
    }

    pub fn selected_activity(&self) -> Option<&Activity> {
        self.selected_activity.as_ref()
    }

    pub fn selected_item(&self) -> Option<&Item> {
        self.selected_item.as_ref()
    }

    pub fn chart(&self) -> &[ChartSeries] {
        &self.chart
    }

    /// Pre-filled edit form for the selected item.
    pub fn edit_form(&self) -> Option<ItemUpdate> {
        self.selected_item.as_ref().map(ItemUpdate::from_item)
    }

    // ── Selection ────────────────────────────────────────────────────

    /// Bind a new item collection to `activity`, dropping the previous one
    /// and any item selection.
    pub fn select_activity(&mut self, activity: Activity) -> Result<(), ApiError> {
        let url = join(&self.config.base_url, &format!("activities/{}/items/", activity.id))?;
        let config = CollectionConfig::from_url(url)
            .with_key_field(self.config.key_field.clone())
            .with_filterable_fields(self.config.item_filter_fields.iter().cloned());

        let generation = self.next_generation;
        self.next_generation += 1;
        info!(activity = activity.id, generation, "activity selected");

        self.items = Some(RemoteCollection::new(Arc::new(config), generation));
        self.selected_activity = Some(activity);
        self.clear_item_selection();
        Ok(())
    }

    pub fn deselect_activity(&mut self) {
        if let Some(activity) = self.selected_activity.take() {
            info!(activity = activity.id, "activity deselected");
        }
        self.items = None;
        self.clear_item_selection();
    }

    /// Select `item` and publish its chart series. No request is made.
    pub fn select_item(&mut self, item: Item) -> Result<(), ApiError> {
        if self.items.is_none() {
            return Err(ApiError::NoActivitySelected);
        }
        debug!(item = item.id, "item selected");
        self.chart = chart_series(&item);
        self.selected_item = Some(item);
        Ok(())
    }

    pub fn deselect_item(&mut self) {
        self.clear_item_selection();
    }

    fn clear_item_selection(&mut self) {
        self.selected_item = None;
        self.chart.clear();
    }

    // ── Fetching ─────────────────────────────────────────────────────

    pub fn fetch_activities<T: Transport>(&mut self, transport: &T, request: FetchRequest) -> Result<Page<Activity>, ApiError> {
        self.activities.fetch_page(transport, request)
    }

    pub fn begin_item_fetch(&mut self, request: FetchRequest) -> Result<PendingFetch, ApiError> {
        self.items_or_err()?.begin_fetch(request)
    }

    /// Apply an item page. Returns `Ok(None)` when the page belongs to an
    /// item collection that has since been replaced or dropped.
    pub fn complete_item_fetch(&mut self, pending: PendingFetch, response: HttpResponse) -> Result<Option<Page<Item>>, ApiError> {
        let Some(items) = self.items.as_mut() else {
            debug!(generation = pending.generation(), "discarding page, no activity selected");
            return Ok(None);
        };
        match items.complete_fetch(pending, response) {
            Ok(page) => Ok(Some(page)),
            Err(err) if err.is_stale() => {
                warn!(error = %err, "discarding stale item page");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn fetch_items<T: Transport>(&mut self, transport: &T, request: FetchRequest) -> Result<Page<Item>, ApiError> {
        self.items_or_err()?.fetch_page(transport, request)
    }

    /// Next window of activities at the configured page size.
    pub fn next_activities_request(&self) -> Option<FetchRequest> {
        self.activities.next_fetch(self.config.page_size)
    }

    /// Next window of items at the configured page size, or `None` with no
    /// activity selected or once the server reports the end.
    pub fn next_items_request(&self) -> Option<FetchRequest> {
        self.items.as_ref()?.next_fetch(self.config.page_size)
    }

    /// Load the first page of items matching `text`. An empty `text` clears
    /// the filter.
    pub fn filter_items<T: Transport>(&mut self, transport: &T, text: &str) -> Result<Page<Item>, ApiError> {
        let request = FetchRequest::new(0, self.config.page_size).with_filter(text);
        self.fetch_items(transport, request)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Create an item under the selected activity.
    pub fn create_item<T: Transport>(&mut self, transport: &T, draft: ItemDraft) -> Result<Item, ApiError> {
        let activity_id = self
            .selected_activity
            .as_ref()
            .map(|activity| activity.id)
            .ok_or(ApiError::NoActivitySelected)?;
        let body = NewItem::from_draft(draft, activity_id);
        self.items_or_err()?.create(transport, &body)
    }

    /// Submit the edit form. A successful update of the selected item
    /// republishes its chart series.
    pub fn update_item<T: Transport>(&mut self, transport: &T, update: ItemUpdate) -> Result<Item, ApiError> {
        let updated = self.items_or_err()?.update(transport, &update.item_id, &update)?;
        if self.selected_item.as_ref().is_some_and(|item| item.id == updated.id) {
            self.chart = chart_series(&updated);
            self.selected_item = Some(updated.clone());
        }
        Ok(updated)
    }

    /// Delete the selected item after confirmation. Failures are reported
    /// through `prompt.alert` and leave the collection untouched.
    pub fn delete_selected_item<T: Transport, P: Prompt>(&mut self, transport: &T, prompt: &P) -> Result<DeleteOutcome, ApiError> {
        let Some(key) = self.selected_item.as_ref().map(|item| item.id) else {
            return Ok(DeleteOutcome::NothingSelected);
        };
        if !prompt.confirm(DELETE_CONFIRMATION) {
            return Ok(DeleteOutcome::Cancelled);
        }

        if let Err(err) = self.items_or_err()?.remove(transport, &key) {
            prompt.alert(&err.to_string());
            return Err(err);
        }
        self.clear_item_selection();
        Ok(DeleteOutcome::Deleted(key))
    }

    fn items_or_err(&mut self) -> Result<&mut RemoteCollection<Item>, ApiError> {
        self.items.as_mut().ok_or(ApiError::NoActivitySelected)
    }
}

fn join(base: &Url, path: &str) -> Result<Url, ApiError> {
    base.join(path).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}
