use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::dialogue::stage::Stage;
use crate::domain::catalog::{Category, Unit};
use crate::domain::records::{location_label, ClientRecord};

pub const MEMORY_CAP: usize = 500;
const PREVIEW_CHARS: usize = 120;

/// One piece of information the dialogue collects, in asking order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Name,
    Department,
    Subzone,
    Crop,
    Hectares,
    Season,
    Category,
    Product,
    Variant,
    Quantity,
    Checkout,
}

impl Slot {
    pub fn is_product_slot(self) -> bool {
        matches!(self, Self::Category | Self::Product | Self::Variant | Self::Quantity)
    }
}

/// The concrete question last put to the customer. Several prompts can serve
/// one slot (a list first, free text after the "other" escape).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    Name,
    Department,
    SubzoneList,
    SubzoneFree,
    CropList,
    CropFree,
    HectaresList,
    HectaresFree,
    Season,
    Category,
    ProductList,
    ProductName,
    Variant,
    Quantity,
    AddMore,
    Help,
}

impl Prompt {
    pub fn slot(self) -> Slot {
        match self {
            Self::Name => Slot::Name,
            Self::Department => Slot::Department,
            Self::SubzoneList | Self::SubzoneFree => Slot::Subzone,
            Self::CropList | Self::CropFree => Slot::Crop,
            Self::HectaresList | Self::HectaresFree => Slot::Hectares,
            Self::Season => Slot::Season,
            Self::Category => Slot::Category,
            Self::ProductList | Self::ProductName => Slot::Product,
            Self::Variant => Slot::Variant,
            Self::Quantity => Slot::Quantity,
            Self::AddMore | Self::Help => Slot::Checkout,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Bot,
    Agent,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "bot" => Some(Self::Bot),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: Decimal,
    pub unit: Unit,
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} {}", self.amount.normalize(), self.unit.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub sku: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: ProductRef,
    pub variant: String,
    pub quantity: Quantity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailMark {
    pub sku: String,
    pub at: DateTime<Utc>,
}

/// Values collected so far plus the small amount of matching state the
/// dialogue needs between turns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotValues {
    pub department: Option<String>,
    pub subzone: Option<String>,
    pub crops: Vec<String>,
    pub hectares: Option<String>,
    pub season: Option<String>,
    pub category: Option<Category>,
    pub product: Option<ProductRef>,
    pub variant: Option<String>,
    pub quantity: Option<Quantity>,
    pub cart: Vec<CartItem>,
    /// Product named before qualification finished; selected once it does.
    pub candidate_sku: Option<String>,
    pub catalog_offset: usize,
    pub last_detail: Option<DetailMark>,
    /// Set after "add another product" until the next item lands in the cart.
    pub selecting_product: bool,
    /// The summary was shown and the customer is choosing to quote or continue.
    pub reviewing: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Organic,
    FacebookAd,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub headline: Option<String>,
    pub body: Option<String>,
    pub source_url: Option<String>,
    pub source_id: Option<String>,
}

impl Referral {
    pub fn text(&self) -> String {
        [self.headline.as_deref(), self.body.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub role: Role,
    pub preview: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMeta {
    pub origin: Origin,
    pub referral: Option<Referral>,
    pub referral_handled: bool,
    pub unread: u32,
    pub last_message: Option<LastMessage>,
    pub last_inbound_id: Option<String>,
    pub muted_until: Option<DateTime<Utc>>,
    pub billing_capture_until: Option<DateTime<Utc>>,
    pub client_preloaded: bool,
}

/// Everything known about one conversation. Serialized as the snapshot body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub stage: Stage,
    pub pending: Option<Slot>,
    #[serde(default)]
    pub asked: BTreeSet<Slot>,
    #[serde(default)]
    pub vars: SlotValues,
    pub profile_name: Option<String>,
    #[serde(default)]
    pub memory: Vec<MemoryEntry>,
    pub last_prompt: Option<Prompt>,
    pub last_prompt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meta: SessionMeta,
    #[serde(default)]
    pub greeted: bool,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub saved_externally: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Row of the operator console's conversation list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub name: Option<String>,
    pub human: bool,
    pub unread: u32,
    pub last_message: Option<String>,
    pub last_at: Option<DateTime<Utc>>,
    pub stage: Stage,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage: Stage::Discovery,
            pending: None,
            asked: BTreeSet::new(),
            vars: SlotValues::default(),
            profile_name: None,
            memory: Vec::new(),
            last_prompt: None,
            last_prompt_at: None,
            meta: SessionMeta::default(),
            greeted: false,
            closed_at: None,
            saved_externally: false,
            expires_at: None,
        }
    }

    /// Appends to the log, keeping the newest `MEMORY_CAP` entries.
    pub fn remember(&mut self, role: Role, content: impl Into<String>, at: DateTime<Utc>) -> MemoryEntry {
        let entry = MemoryEntry { role, content: content.into(), at };
        self.memory.push(entry.clone());
        if self.memory.len() > MEMORY_CAP {
            let overflow = self.memory.len() - MEMORY_CAP;
            self.memory.drain(..overflow);
        }

        self.meta.last_message = Some(LastMessage {
            role,
            preview: entry.content.chars().take(PREVIEW_CHARS).collect(),
            at,
        });
        if role == Role::User {
            self.meta.unread = self.meta.unread.saturating_add(1);
        }
        entry
    }

    pub fn mark_read(&mut self) {
        self.meta.unread = 0;
    }

    pub fn is_muted(&self, now: DateTime<Utc>) -> bool {
        self.meta.muted_until.is_some_and(|until| until > now)
    }

    pub fn mute_until(&mut self, until: DateTime<Utc>) {
        self.meta.muted_until = Some(until);
    }

    pub fn unmute(&mut self) {
        self.meta.muted_until = None;
    }

    pub fn billing_capture_open(&self, now: DateTime<Utc>) -> bool {
        self.meta.billing_capture_until.is_some_and(|until| until > now)
    }

    pub fn discovery_complete(&self) -> bool {
        self.profile_name.is_some()
            && self.vars.department.is_some()
            && self.vars.subzone.is_some()
            && !self.vars.crops.is_empty()
            && self.vars.hectares.is_some()
            && self.vars.season.is_some()
    }

    pub fn missing_discovery_slots(&self) -> Vec<Slot> {
        let checks = [
            (Slot::Name, self.profile_name.is_some()),
            (Slot::Department, self.vars.department.is_some()),
            (Slot::Subzone, self.vars.subzone.is_some()),
            (Slot::Crop, !self.vars.crops.is_empty()),
            (Slot::Hectares, self.vars.hectares.is_some()),
            (Slot::Season, self.vars.season.is_some()),
        ];
        checks.into_iter().filter(|(_, filled)| !filled).map(|(slot, _)| slot).collect()
    }

    /// True while the customer is picking the next product for the cart.
    pub fn selecting_product(&self) -> bool {
        self.discovery_complete() && (self.vars.cart.is_empty() || self.vars.selecting_product)
    }

    /// Clears category, product, variant and quantity so the next product can
    /// be chosen. Qualification answers and the cart are kept.
    pub fn reset_product_slots(&mut self) {
        self.vars.category = None;
        self.vars.product = None;
        self.vars.variant = None;
        self.vars.quantity = None;
        self.vars.candidate_sku = None;
        self.vars.catalog_offset = 0;
        self.vars.reviewing = false;
        self.vars.selecting_product = true;
        self.asked.retain(|slot| !slot.is_product_slot() && *slot != Slot::Checkout);
        if self.pending.is_some_and(|slot| slot.is_product_slot() || slot == Slot::Checkout) {
            self.pending = None;
            self.last_prompt = None;
            self.last_prompt_at = None;
        }
    }

    pub fn clear_cart(&mut self) {
        self.vars.cart.clear();
    }

    /// Adds or replaces the cart line for a product. Returns true when an
    /// existing line was updated in place.
    pub fn upsert_cart(&mut self, item: CartItem) -> bool {
        match self.vars.cart.iter_mut().find(|line| line.product.sku == item.product.sku) {
            Some(existing) => {
                *existing = item;
                true
            }
            None => {
                self.vars.cart.push(item);
                false
            }
        }
    }

    /// Marks the prompt as issued now and makes its slot the pending one.
    pub fn record_prompt(&mut self, prompt: Prompt, at: DateTime<Utc>) {
        let slot = prompt.slot();
        self.pending = Some(slot);
        self.asked.insert(slot);
        self.last_prompt = Some(prompt);
        self.last_prompt_at = Some(at);
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub fn apply_client(&mut self, client: &ClientRecord) {
        if self.profile_name.is_none() {
            self.profile_name = client.name.clone().filter(|name| !name.trim().is_empty());
        }
        if self.vars.department.is_none() {
            self.vars.department = client.department.clone();
        }
        if self.vars.subzone.is_none() {
            self.vars.subzone = client.subzone.clone();
        }
        if self.vars.crops.is_empty() {
            self.vars.crops = client
                .crop
                .iter()
                .flat_map(|crop| crop.split(','))
                .map(str::trim)
                .filter(|crop| !crop.is_empty())
                .map(str::to_string)
                .collect();
        }
        if self.vars.hectares.is_none() {
            self.vars.hectares = client.hectares.clone();
        }
        if self.vars.season.is_none() {
            self.vars.season = client.season.clone();
        }

        let filled = [
            (Slot::Name, self.profile_name.is_some()),
            (Slot::Department, self.vars.department.is_some()),
            (Slot::Subzone, self.vars.subzone.is_some()),
            (Slot::Crop, !self.vars.crops.is_empty()),
            (Slot::Hectares, self.vars.hectares.is_some()),
            (Slot::Season, self.vars.season.is_some()),
        ];
        for (slot, is_filled) in filled {
            if is_filled {
                self.asked.insert(slot);
            }
        }
    }

    pub fn client_record(&self) -> ClientRecord {
        ClientRecord {
            phone: self.id.clone(),
            name: self.profile_name.clone(),
            department: self.vars.department.clone(),
            subzone: self.vars.subzone.clone(),
            crop: (!self.vars.crops.is_empty()).then(|| self.vars.crops.join(", ")),
            hectares: self.vars.hectares.clone(),
            season: self.vars.season.clone(),
        }
    }

    pub fn location(&self) -> String {
        location_label(self.vars.department.as_deref(), self.vars.subzone.as_deref())
    }

    pub fn summary(&self, now: DateTime<Utc>) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            name: self.profile_name.clone(),
            human: self.is_muted(now),
            unread: self.meta.unread,
            last_message: self.meta.last_message.as_ref().map(|last| last.preview.clone()),
            last_at: self.meta.last_message.as_ref().map(|last| last.at),
            stage: self.stage,
        }
    }
}
