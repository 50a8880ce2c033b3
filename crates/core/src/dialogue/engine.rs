use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dialogue::actions::InteractiveAction;
use crate::dialogue::intents::{self, Intent};
use crate::dialogue::matching::{ProductMatch, ProductMatcher};
use crate::dialogue::messages::{self, LeadAlert, LeadReason};
use crate::dialogue::options::{self, HECTARES, SUBZONES};
use crate::dialogue::outbound::OutboundMessage;
use crate::dialogue::parse;
use crate::dialogue::slots;
use crate::dialogue::stage::{
    Stage, StageAction, StageContext, StageEvent, StageMachine, StageTransitionError,
};
use crate::dialogue::text::{clamp, normalize, title_case};
use crate::domain::catalog::{Catalog, Category, Product};
use crate::domain::inbound::InboundEvent;
use crate::domain::records::{BillingDetails, ClientRecord, QuoteLine, QuoteRecord};
use crate::domain::session::{
    CartItem, DetailMark, Origin, ProductRef, Prompt, Quantity, Referral, Role, Session, Slot,
};

/// Timing and wording knobs the engine reads on every turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogueSettings {
    pub stale_after: Duration,
    pub mute_for: Duration,
    pub detail_cooldown: Duration,
    pub billing_capture_for: Duration,
    pub reactivation_phrase: String,
    pub brand: String,
    pub opening_hours: String,
    pub store_map_url: String,
}

impl DialogueSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let seconds = |value: u64| Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1_000));
        Self {
            stale_after: seconds(config.dialogue.stale_prompt_secs),
            mute_for: seconds(config.dialogue.mute_secs),
            detail_cooldown: seconds(config.dialogue.detail_cooldown_secs),
            billing_capture_for: seconds(config.dialogue.billing_capture_secs),
            reactivation_phrase: config.dialogue.reactivation_phrase.clone(),
            brand: config.escalation.brand_name.clone(),
            opening_hours: config.escalation.opening_hours.clone(),
            store_map_url: config.escalation.store_map_url.clone(),
        }
    }
}

impl Default for DialogueSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnStep {
    Send { role: Role, message: OutboundMessage },
    /// Render the quote document and send it to the customer.
    QuoteDocument(QuoteRecord),
}

/// Side effects the runtime carries out after the replies are queued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    HandoffChanged { human: bool, until: Option<DateTime<Utc>> },
    RecordQuote(QuoteRecord),
    UpsertClient(ClientRecord),
    AlertAdvisors(LeadAlert),
    StoreBilling(BillingDetails),
    ConversationsChanged,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Turn {
    pub steps: Vec<TurnStep>,
    pub effects: Vec<Effect>,
}

impl Turn {
    fn say(&mut self, message: OutboundMessage) {
        self.steps.push(TurnStep::Send { role: Role::Bot, message });
    }

    fn say_all(&mut self, messages: impl IntoIterator<Item = OutboundMessage>) {
        for message in messages {
            self.say(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.effects.is_empty()
    }

    /// Outbound messages in send order, documents excluded.
    pub fn messages(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.steps.iter().filter_map(|step| match step {
            TurnStep::Send { message, .. } => Some(message),
            TurnStep::QuoteDocument(_) => None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// How the customer's text fared against the pending question.
#[derive(Debug)]
enum SlotInput {
    Accepted,
    Rejected(OutboundMessage),
    Escape(Prompt),
    Action(InteractiveAction),
    Ignored,
}

/// Slot-filling dialogue. Each call recomputes the next question from the
/// session's data, so a skipped or repeated event heals on the next one.
pub struct DialogueEngine {
    catalog: Catalog,
    settings: DialogueSettings,
    stages: StageMachine,
}

impl DialogueEngine {
    pub fn new(catalog: Catalog, settings: DialogueSettings) -> Self {
        Self { catalog, settings, stages: StageMachine }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn settings(&self) -> &DialogueSettings {
        &self.settings
    }

    /// Advances a conversation whose bot is active.
    pub fn handle(&self, session: &mut Session, event: &InboundEvent, now: DateTime<Utc>) -> Turn {
        let mut turn = Turn::default();

        if let Some(text) = event.text.as_deref() {
            if let Some(captured) = self.capture_billing(session, text, now) {
                return captured;
            }
        }

        if session.stage == Stage::Closed {
            self.reopen(session);
        }

        if let Some(referral) = event.referral.as_ref().filter(|_| !session.meta.referral_handled) {
            self.greet_once(session, &mut turn);
            if self.on_referral(session, referral, &mut turn) == Flow::Stop {
                return turn;
            }
        }
        self.greet_once(session, &mut turn);

        let action = event.selection.as_ref().and_then(|selection| InteractiveAction::decode(&selection.id));
        let flow = match (action, event.selection.as_ref(), event.text.as_deref()) {
            (Some(action), _, _) => self.on_action(session, action, &mut turn, now),
            (None, Some(selection), _) => self.on_text(session, &selection.title, &mut turn, now),
            (None, None, Some(text)) => self.on_text(session, text, &mut turn, now),
            (None, None, None) => Flow::Continue,
        };

        if flow == Flow::Continue {
            self.advance(session, &mut turn, now);
        }
        turn
    }

    /// A muted conversation only reacts to the reactivation phrase and to
    /// billing details inside the capture window.
    pub fn handle_muted(&self, session: &mut Session, event: &InboundEvent, now: DateTime<Utc>) -> Turn {
        let Some(text) = event.text.as_deref() else {
            return Turn::default();
        };

        if intents::is_reactivation(text, &self.settings.reactivation_phrase) {
            let mut turn = Turn::default();
            if session.stage == Stage::Closed {
                self.reopen(session);
            }
            self.reactivate(session, &mut turn);
            self.advance(session, &mut turn, now);
            return turn;
        }

        self.capture_billing(session, text, now).unwrap_or_default()
    }

    /// Billing and pickup details sent while the capture window is open.
    /// Never changes the handoff mode.
    pub fn capture_billing(&self, session: &mut Session, text: &str, now: DateTime<Utc>) -> Option<Turn> {
        if !session.billing_capture_open(now) || !parse::mentions_billing(text) {
            return None;
        }
        let details = parse::billing_details(text);
        if details.is_empty() {
            return None;
        }

        session.meta.billing_capture_until = None;
        debug!(
            event_name = "dialogue.billing_captured",
            conversation_id = %session.id,
            "billing details captured"
        );
        Some(Turn {
            steps: vec![TurnStep::Send { role: Role::Agent, message: messages::billing_received() }],
            effects: vec![Effect::StoreBilling(details)],
        })
    }

    /// Opens the billing capture window, usually after an operator asked for
    /// the invoice and pickup data.
    pub fn open_billing_capture(&self, session: &mut Session, now: DateTime<Utc>) {
        session.meta.billing_capture_until = Some(now + self.settings.billing_capture_for);
    }

    /// Fills qualification answers from a known client so the conversation
    /// goes straight to products.
    pub fn apply_returning_client(&self, session: &mut Session, client: &ClientRecord) {
        session.apply_client(client);
        if session.stage == Stage::Discovery && session.discovery_complete() {
            self.complete_discovery(session);
        }
    }

    fn greet_once(&self, session: &mut Session, turn: &mut Turn) {
        if !session.greeted {
            turn.say(messages::greeting(session.profile_name.as_deref(), &self.settings.brand));
            session.greeted = true;
        }
    }

    fn context(&self, session: &Session) -> StageContext {
        StageContext {
            missing_discovery: session.missing_discovery_slots(),
            cart_items: session.vars.cart.len(),
        }
    }

    fn reopen(&self, session: &mut Session) {
        match self.stages.apply(session.stage, StageEvent::Reopened, &self.context(session)) {
            Ok(transition) => {
                for action in &transition.actions {
                    match action {
                        StageAction::ResetProductSlots => session.reset_product_slots(),
                        StageAction::ClearCart => session.clear_cart(),
                        StageAction::ClearSavedFlag => session.saved_externally = false,
                        _ => {}
                    }
                }
                session.stage = transition.to;
                session.closed_at = None;
                debug!(
                    event_name = "dialogue.conversation_reopened",
                    conversation_id = %session.id,
                    stage = transition.to.as_str(),
                    "closed conversation reopened"
                );
            }
            Err(error) => log_rejected(session, &error),
        }
    }

    fn complete_discovery(&self, session: &mut Session) {
        match self.stages.apply(session.stage, StageEvent::DiscoveryCompleted, &self.context(session)) {
            Ok(transition) => session.stage = transition.to,
            Err(error) => log_rejected(session, &error),
        }
    }

    fn on_referral(&self, session: &mut Session, referral: &Referral, turn: &mut Turn) -> Flow {
        session.meta.origin = Origin::FacebookAd;
        session.meta.referral = Some(referral.clone());
        session.meta.referral_handled = true;
        session.reset_product_slots();

        let text = referral.text();
        let found = ProductMatcher::new(&self.catalog).find(&text);
        match found.as_ref().and_then(ProductMatch::single) {
            Some(product) => {
                turn.say(messages::referral_question(product));
                Flow::Stop
            }
            None => Flow::Continue,
        }
    }

    fn on_action(
        &self,
        session: &mut Session,
        action: InteractiveAction,
        turn: &mut Turn,
        now: DateTime<Utc>,
    ) -> Flow {
        match action {
            InteractiveAction::Department(label) => self.set_department(session, label),
            InteractiveAction::Subzone(label) => session.vars.subzone = Some(label.to_string()),
            InteractiveAction::Crop(label) => session.vars.crops = vec![label.to_string()],
            InteractiveAction::CropOther => {
                session.vars.crops.clear();
                self.issue(session, Prompt::CropFree, turn, now);
            }
            InteractiveAction::Hectares(label) => session.vars.hectares = Some(label.to_string()),
            InteractiveAction::HectaresOther => {
                session.vars.hectares = None;
                self.issue(session, Prompt::HectaresFree, turn, now);
            }
            InteractiveAction::Season(label) => session.vars.season = Some(label.to_string()),
            InteractiveAction::Category(category) => self.set_category(session, category),
            InteractiveAction::CategoryMore(offset) => {
                session.vars.catalog_offset = offset;
                if session.vars.category.is_some() {
                    self.issue(session, Prompt::ProductList, turn, now);
                }
            }
            InteractiveAction::Product(sku) | InteractiveAction::ReferralYes(sku) => {
                self.select_product(session, &sku, turn, now);
            }
            InteractiveAction::Variant { sku, index } => self.set_variant(session, &sku, index, turn, now),
            InteractiveAction::AddMore => {
                self.add_another(session, messages::add_another_intro(), turn);
            }
            InteractiveAction::Continue => {
                self.add_another(session, messages::continue_intro(), turn);
            }
            InteractiveAction::NoMore => self.review(session, turn, now),
            InteractiveAction::Finalize => return self.finalize(session, turn, now),
            InteractiveAction::ReferralNo => {
                session.vars.candidate_sku = None;
                session.vars.selecting_product = true;
                turn.say(messages::referral_other_product());
            }
        }
        Flow::Continue
    }

    fn on_text(&self, session: &mut Session, text: &str, turn: &mut Turn, now: DateTime<Utc>) -> Flow {
        if session.discovery_complete()
            && intents::is_reactivation(text, &self.settings.reactivation_phrase)
        {
            self.reactivate(session, turn);
            return Flow::Continue;
        }

        if let Some(intent) = intents::detect(text) {
            match intent {
                Intent::RequestAgent => return self.request_agent(session, turn, now),
                Intent::CloseConversation => return self.close(session, turn, now),
                Intent::AnotherProduct if session.discovery_complete() => {
                    self.add_another(session, messages::add_another_intro(), turn);
                    return Flow::Continue;
                }
                Intent::AnotherProduct => {}
                Intent::Location => {
                    turn.say(messages::location(&self.settings.store_map_url));
                    return Flow::Continue;
                }
                Intent::Hours => {
                    turn.say(messages::opening_hours(&self.settings.opening_hours));
                    return Flow::Continue;
                }
                Intent::PriceInquiry if session.pending == Some(Slot::Checkout) => {}
                Intent::PriceInquiry => {
                    turn.say(messages::price_inquiry());
                    self.extract_product(session, text, turn, now);
                    return Flow::Continue;
                }
            }
        }

        match self.fill_pending(session, text) {
            SlotInput::Accepted => Flow::Continue,
            SlotInput::Escape(prompt) => {
                self.issue(session, prompt, turn, now);
                Flow::Continue
            }
            SlotInput::Action(action) => self.on_action(session, action, turn, now),
            SlotInput::Rejected(reprompt) => {
                if self.extract_product(session, text, turn, now) {
                    return Flow::Continue;
                }
                turn.say(reprompt);
                session.last_prompt_at = Some(now);
                Flow::Stop
            }
            SlotInput::Ignored => {
                self.extract_product(session, text, turn, now);
                Flow::Continue
            }
        }
    }

    /// Applies free text to the pending question.
    fn fill_pending(&self, session: &mut Session, text: &str) -> SlotInput {
        let Some(slot) = session.pending else {
            return SlotInput::Ignored;
        };
        let prompt = session.last_prompt;
        let escape_requested = {
            let normalized = normalize(text);
            matches!(normalized.as_str(), "otro" | "otros" | "otra" | "otras" | "otras cantidades")
        };

        match slot {
            Slot::Name => match parse::full_name(text) {
                Some(name) => {
                    session.profile_name = Some(name);
                    SlotInput::Accepted
                }
                None => SlotInput::Rejected(messages::reprompt_name()),
            },
            Slot::Department => match options::department_from_text(text) {
                Some(label) => {
                    self.set_department(session, label);
                    SlotInput::Accepted
                }
                None => SlotInput::Rejected(messages::reprompt_choice()),
            },
            Slot::Subzone => {
                if prompt == Some(Prompt::SubzoneFree) {
                    if intents::is_greeting(text) || text.trim().chars().count() < 2 {
                        return SlotInput::Rejected(OutboundMessage::text(
                            "Escríbeme por favor el nombre de tu *zona* o municipio.",
                        ));
                    }
                    session.vars.subzone = Some(title_case(&clamp(text, 60)));
                    return SlotInput::Accepted;
                }
                match options::by_text(&SUBZONES, text) {
                    Some(option) => {
                        session.vars.subzone = Some(option.label.to_string());
                        SlotInput::Accepted
                    }
                    None => SlotInput::Rejected(messages::reprompt_choice()),
                }
            }
            Slot::Crop => {
                let crops = options::crops_from_text(text);
                if !crops.is_empty() {
                    session.vars.crops = crops.into_iter().map(str::to_string).collect();
                    return SlotInput::Accepted;
                }
                if prompt == Some(Prompt::CropFree) {
                    if intents::is_greeting(text) || text.trim().chars().count() < 3 {
                        let again = messages::prompt_messages(Prompt::CropFree, session, &self.catalog);
                        return SlotInput::Rejected(
                            again.into_iter().next().unwrap_or_else(messages::reprompt_choice),
                        );
                    }
                    session.vars.crops = vec![title_case(&clamp(text, 40))];
                    return SlotInput::Accepted;
                }
                if escape_requested {
                    return SlotInput::Escape(Prompt::CropFree);
                }
                SlotInput::Rejected(messages::reprompt_choice())
            }
            Slot::Hectares => {
                if let Some(option) = options::by_text(&HECTARES, text) {
                    session.vars.hectares = Some(option.label.to_string());
                    return SlotInput::Accepted;
                }
                if escape_requested && prompt != Some(Prompt::HectaresFree) {
                    return SlotInput::Escape(Prompt::HectaresFree);
                }
                match parse::hectares(text) {
                    Some(value) => {
                        session.vars.hectares = Some(format!("{} ha", value.normalize()));
                        SlotInput::Accepted
                    }
                    None => SlotInput::Rejected(messages::reprompt_hectares()),
                }
            }
            Slot::Season => match options::season_from_text(text) {
                Some(label) => {
                    session.vars.season = Some(label.to_string());
                    SlotInput::Accepted
                }
                None => SlotInput::Rejected(messages::reprompt_choice()),
            },
            Slot::Category => match Category::from_label(text) {
                Some(category) => {
                    self.set_category(session, category);
                    SlotInput::Accepted
                }
                None => SlotInput::Rejected(messages::reprompt_choice()),
            },
            Slot::Product => SlotInput::Rejected(OutboundMessage::text(
                "No encontré ese producto 🤔. Elige uno del listado o escribe su nombre tal como aparece en el catálogo.",
            )),
            Slot::Variant => self.fill_variant(session, text),
            Slot::Quantity => self.fill_quantity(session, text),
            Slot::Checkout => {
                let normalized = normalize(text);
                if prompt == Some(Prompt::Help) {
                    if ["cotiza", "finaliz", "enviar"].iter().any(|word| normalized.contains(word)) {
                        return SlotInput::Action(InteractiveAction::Finalize);
                    }
                    if ["anadir", "agregar", "seguir", "otro"].iter().any(|word| normalized.contains(word)) {
                        return SlotInput::Action(InteractiveAction::Continue);
                    }
                    return SlotInput::Ignored;
                }
                if intents::is_affirmative(text) {
                    SlotInput::Action(InteractiveAction::AddMore)
                } else if intents::is_negative(text) || normalized.contains("continuar") {
                    SlotInput::Action(InteractiveAction::NoMore)
                } else {
                    SlotInput::Ignored
                }
            }
        }
    }

    fn fill_variant(&self, session: &mut Session, text: &str) -> SlotInput {
        let Some(product) = self.current_product(session) else {
            return SlotInput::Ignored;
        };
        let normalized = normalize(text);
        let by_position = parse::number_only(text)
            .filter(|number| number.fract().is_zero())
            .and_then(|number| number.to_usize())
            .filter(|position| (1..=product.variants.len()).contains(position))
            .map(|position| &product.variants[position - 1]);
        let by_label = product
            .variants
            .iter()
            .find(|variant| normalized.contains(&normalize(&variant.label)));

        match by_label.or(by_position) {
            Some(variant) => {
                session.vars.variant = Some(variant.label.clone());
                SlotInput::Accepted
            }
            None => SlotInput::Rejected(messages::reprompt_choice()),
        }
    }

    fn fill_quantity(&self, session: &mut Session, text: &str) -> SlotInput {
        let Some(product) = self.current_product(session) else {
            return SlotInput::Ignored;
        };
        let variant = session
            .vars
            .variant
            .as_deref()
            .and_then(|label| product.variant(label))
            .or_else(|| product.single_variant());
        let Some(variant) = variant else {
            return SlotInput::Ignored;
        };

        let parsed = parse::quantity(text).or_else(|| {
            parse::number_only(text).map(|amount| parse::ParsedQuantity { amount, unit: None })
        });
        let Some(parsed) = parsed else {
            return SlotInput::Rejected(messages::reprompt_quantity());
        };

        if parsed.unit.is_some_and(|unit| unit != variant.unit) {
            return SlotInput::Rejected(messages::reprompt_unit(variant.unit.label(), &variant.label));
        }
        if !parse::is_pack_multiple(parsed.amount, variant.pack_size) {
            return SlotInput::Rejected(messages::reprompt_pack_multiple(
                &variant.pack_size.normalize().to_string(),
                variant.unit.label(),
                &variant.label,
            ));
        }

        let quantity = Quantity { amount: parsed.amount, unit: variant.unit };
        let item = CartItem {
            product: ProductRef { sku: product.sku.clone(), name: product.name.clone() },
            variant: variant.label.clone(),
            quantity,
        };
        let replaced = session.upsert_cart(item);
        debug!(
            event_name = "dialogue.cart_updated",
            conversation_id = %session.id,
            sku = %product.sku,
            replaced,
            "cart line stored"
        );
        self.finish_item(session);
        SlotInput::Accepted
    }

    /// The item landed in the cart; the next question is "add another?".
    fn finish_item(&self, session: &mut Session) {
        session.vars.category = None;
        session.vars.product = None;
        session.vars.variant = None;
        session.vars.quantity = None;
        session.vars.catalog_offset = 0;
        session.vars.selecting_product = false;
        session.vars.reviewing = false;
        session.asked.retain(|slot| !slot.is_product_slot() && *slot != Slot::Checkout);
    }

    fn current_product(&self, session: &Session) -> Option<&Product> {
        self.catalog.by_sku(&session.vars.product.as_ref()?.sku)
    }

    fn set_department(&self, session: &mut Session, label: &str) {
        if session.vars.department.as_deref() != Some(label) {
            session.vars.subzone = None;
            session.asked.remove(&Slot::Subzone);
        }
        session.vars.department = Some(label.to_string());
    }

    fn set_category(&self, session: &mut Session, category: Category) {
        session.vars.category = Some(category);
        session.vars.catalog_offset = 0;
        session.vars.product = None;
        session.vars.variant = None;
        session.vars.quantity = None;
        session.vars.selecting_product = true;
    }

    fn set_variant(
        &self,
        session: &mut Session,
        sku: &str,
        index: usize,
        turn: &mut Turn,
        now: DateTime<Utc>,
    ) {
        if session.vars.product.as_ref().map(|product| product.sku.as_str()) != Some(sku) {
            self.select_product(session, sku, turn, now);
        }
        if let Some(variant) = self.catalog.by_sku(sku).and_then(|product| product.variants.get(index)) {
            session.vars.variant = Some(variant.label.clone());
        }
    }

    /// Makes `sku` the product being quoted and shows its sheet. Before
    /// qualification is done the product is only remembered.
    fn select_product(&self, session: &mut Session, sku: &str, turn: &mut Turn, now: DateTime<Utc>) {
        let Some(product) = self.catalog.by_sku(sku) else {
            return;
        };
        if !session.discovery_complete() {
            session.vars.candidate_sku = Some(product.sku.clone());
            return;
        }

        session.vars.candidate_sku = None;
        session.vars.selecting_product = true;
        session.vars.reviewing = false;
        session.vars.product = Some(ProductRef { sku: product.sku.clone(), name: product.name.clone() });
        if let Some(category) = product.category {
            session.vars.category = Some(category);
        }
        session.vars.variant = product.single_variant().map(|variant| variant.label.clone());
        session.vars.quantity = None;
        session.asked.remove(&Slot::Variant);
        session.asked.remove(&Slot::Quantity);
        self.send_detail(session, product, turn, now);
    }

    fn send_detail(&self, session: &mut Session, product: &Product, turn: &mut Turn, now: DateTime<Utc>) {
        let recently_shown = session.vars.last_detail.as_ref().is_some_and(|mark| {
            mark.sku == product.sku && now - mark.at < self.settings.detail_cooldown
        });
        if recently_shown {
            return;
        }
        turn.say(messages::product_card(product));
        session.vars.last_detail = Some(DetailMark { sku: product.sku.clone(), at: now });
    }

    /// Looks for a product named in free text. Returns true when something
    /// was shown to the customer.
    fn extract_product(&self, session: &mut Session, text: &str, turn: &mut Turn, now: DateTime<Utc>) -> bool {
        let Some(found) = ProductMatcher::new(&self.catalog).find(text) else {
            return false;
        };

        match found {
            ProductMatch::Ambiguous(products) => {
                if !session.discovery_complete() {
                    return false;
                }
                session.vars.selecting_product = true;
                session.vars.reviewing = false;
                session.vars.product = None;
                turn.say_all(messages::ingredient_matches(&clamp(text, 40), &products));
                session.record_prompt(Prompt::ProductList, now);
                true
            }
            single => {
                let Some(product) = single.single() else {
                    return false;
                };
                let sku = product.sku.clone();
                self.select_product(session, &sku, turn, now);
                session.discovery_complete()
            }
        }
    }

    fn add_another(&self, session: &mut Session, intro: OutboundMessage, turn: &mut Turn) {
        if session.stage == Stage::Product {
            match self.stages.apply(session.stage, StageEvent::AnotherProductRequested, &self.context(session)) {
                Ok(_) => session.reset_product_slots(),
                Err(error) => log_rejected(session, &error),
            }
        } else {
            session.reset_product_slots();
        }
        turn.say(intro);
    }

    fn review(&self, session: &mut Session, turn: &mut Turn, now: DateTime<Utc>) {
        if session.vars.cart.is_empty() {
            turn.say(messages::empty_cart());
            session.reset_product_slots();
            return;
        }
        turn.say(messages::summary(session));
        session.vars.reviewing = true;
        session.vars.selecting_product = false;
        self.issue(session, Prompt::Help, turn, now);
    }

    fn reactivate(&self, session: &mut Session, turn: &mut Turn) {
        let was_muted = session.meta.muted_until.is_some();
        session.unmute();
        session.reset_product_slots();
        turn.say(messages::reactivated(session.profile_name.as_deref(), &self.settings.brand));
        if was_muted {
            turn.effects.push(Effect::HandoffChanged { human: false, until: None });
        }
    }

    fn request_agent(&self, session: &mut Session, turn: &mut Turn, now: DateTime<Utc>) -> Flow {
        let until = now + self.settings.mute_for;
        session.mute_until(until);
        turn.say(messages::agent_requested(session.profile_name.as_deref()));
        turn.effects.push(Effect::HandoffChanged { human: true, until: Some(until) });
        turn.effects.push(Effect::AlertAdvisors(LeadAlert::from_session(
            session,
            LeadReason::AdvisorRequested,
            now,
        )));
        Flow::Stop
    }

    fn close(&self, session: &mut Session, turn: &mut Turn, now: DateTime<Utc>) -> Flow {
        match self.stages.apply(session.stage, StageEvent::CloseRequested, &self.context(session)) {
            Ok(transition) => {
                session.stage = transition.to;
                session.closed_at = Some(now);
                session.clear_pending();
                turn.say(messages::goodbye());
                turn.effects.push(Effect::ConversationsChanged);
                Flow::Stop
            }
            Err(error) => {
                log_rejected(session, &error);
                Flow::Continue
            }
        }
    }

    fn finalize(&self, session: &mut Session, turn: &mut Turn, now: DateTime<Utc>) -> Flow {
        let transition =
            match self.stages.apply(session.stage, StageEvent::Finalized, &self.context(session)) {
                Ok(transition) => transition,
                Err(StageTransitionError::EmptyCart { .. }) => {
                    turn.say(messages::empty_cart());
                    session.reset_product_slots();
                    return Flow::Continue;
                }
                Err(error) => {
                    log_rejected(session, &error);
                    return Flow::Continue;
                }
            };

        let quote = self.quote_record(session, now);
        turn.steps.push(TurnStep::QuoteDocument(quote.clone()));

        for action in &transition.actions {
            match action {
                StageAction::RecordQuote => {
                    if !session.saved_externally {
                        session.saved_externally = true;
                        turn.effects.push(Effect::RecordQuote(quote.clone()));
                    }
                    turn.effects.push(Effect::UpsertClient(session.client_record()));
                }
                StageAction::NotifyAdvisors => {
                    turn.say(messages::quote_thanks());
                    turn.say(messages::reactivation_hint(&self.settings.reactivation_phrase));
                    turn.effects.push(Effect::AlertAdvisors(LeadAlert::from_session(
                        session,
                        LeadReason::QuoteRequested,
                        now,
                    )));
                }
                StageAction::MuteBot => {
                    let until = now + self.settings.mute_for;
                    session.mute_until(until);
                    turn.effects.push(Effect::HandoffChanged { human: true, until: Some(until) });
                }
                StageAction::ArchiveConversation => {
                    session.stage = transition.to;
                    session.closed_at = Some(now);
                    session.clear_pending();
                    turn.effects.push(Effect::ConversationsChanged);
                }
                StageAction::AskCategory
                | StageAction::ResetProductSlots
                | StageAction::ClearCart
                | StageAction::ClearSavedFlag => {}
            }
        }
        Flow::Stop
    }

    fn quote_record(&self, session: &Session, now: DateTime<Utc>) -> QuoteRecord {
        QuoteRecord {
            id: Uuid::new_v4().to_string(),
            conversation_id: session.id.clone(),
            customer_name: session.profile_name.clone().unwrap_or_default(),
            department: session.vars.department.clone(),
            subzone: session.vars.subzone.clone(),
            crops: session.vars.crops.clone(),
            hectares: session.vars.hectares.clone(),
            season: session.vars.season.clone(),
            lines: session
                .vars
                .cart
                .iter()
                .map(|item| QuoteLine {
                    sku: item.product.sku.clone(),
                    product_name: item.product.name.clone(),
                    variant: item.variant.clone(),
                    quantity: item.quantity.amount,
                    unit: item.quantity.unit,
                    unit_price: None,
                    line_total: None,
                })
                .collect(),
            total: None,
            created_at: now,
        }
    }

    /// Asks the next open question unless the same one is still fresh.
    fn advance(&self, session: &mut Session, turn: &mut Turn, now: DateTime<Utc>) {
        if session.stage == Stage::Discovery && session.discovery_complete() {
            self.complete_discovery(session);
        }

        if session.selecting_product() && session.vars.product.is_none() {
            if let Some(sku) = session.vars.candidate_sku.take() {
                self.select_product(session, &sku, turn, now);
            }
        }

        match slots::next_open(session, &self.catalog) {
            Some((slot, prompt)) => {
                if self.should_ask(session, slot, prompt, now) {
                    self.issue(session, prompt, turn, now);
                } else {
                    session.pending = Some(slot);
                }
            }
            None => session.clear_pending(),
        }
    }

    fn should_ask(&self, session: &Session, slot: Slot, prompt: Prompt, now: DateTime<Utc>) -> bool {
        if !session.asked.contains(&slot) || session.last_prompt != Some(prompt) {
            return true;
        }
        session.last_prompt_at.map_or(true, |at| now - at > self.settings.stale_after)
    }

    fn issue(&self, session: &mut Session, prompt: Prompt, turn: &mut Turn, now: DateTime<Utc>) {
        turn.say_all(messages::prompt_messages(prompt, session, &self.catalog));
        session.record_prompt(prompt, now);
        debug!(
            event_name = "dialogue.prompt_issued",
            conversation_id = %session.id,
            prompt = ?prompt,
            "question sent"
        );
    }
}

fn log_rejected(session: &Session, error: &StageTransitionError) {
    debug!(
        event_name = "dialogue.stage_transition_rejected",
        conversation_id = %session.id,
        error = %error,
        "stage transition rejected"
    );
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{DialogueEngine, DialogueSettings, Effect, Turn, TurnStep};
    use crate::dialogue::actions::InteractiveAction;
    use crate::dialogue::outbound::OutboundMessage;
    use crate::dialogue::stage::Stage;
    use crate::domain::catalog::{Catalog, Category, Product, Unit, Variant};
    use crate::domain::inbound::InboundEvent;
    use crate::domain::records::ClientRecord;
    use crate::domain::session::{Prompt, Referral, Role, Session, Slot};

    const PHONE: &str = "59171234567";

    fn product(sku: &str, name: &str, category: Category, ingredient: &str, variants: Vec<Variant>) -> Product {
        let unit = variants.first().map_or(Unit::Kilogram, |variant| variant.unit);
        Product {
            sku: sku.to_string(),
            name: name.to_string(),
            category: Some(category),
            active_ingredient: ingredient.to_string(),
            formulation: String::new(),
            dose: String::new(),
            targets: String::new(),
            image_url: None,
            variants,
            unit,
        }
    }

    fn variant(label: &str, pack: i64, unit: Unit) -> Variant {
        Variant { label: label.to_string(), pack_size: Decimal::from(pack), unit }
    }

    fn engine() -> DialogueEngine {
        let catalog = Catalog::new(vec![
            product(
                "FB-01",
                "Fertimax Boro",
                Category::Fertilizer,
                "Boro",
                vec![variant("Saco 25 Kg", 25, Unit::Kilogram)],
            ),
            product(
                "KV-02",
                "Kelp Verde",
                Category::Biostimulant,
                "Extracto de algas",
                vec![variant("Bidón 5 L", 5, Unit::Liter), variant("Bidón 20 L", 20, Unit::Liter)],
            ),
            product(
                "GM-03",
                "Glifo Max",
                Category::Conditioner,
                "Glifosato",
                vec![variant("Bidón 20 L", 20, Unit::Liter)],
            ),
            product(
                "GU-04",
                "Glifo Ultra",
                Category::Conditioner,
                "Glifosato",
                vec![variant("Bidón 20 L", 20, Unit::Liter)],
            ),
        ]);
        DialogueEngine::new(catalog, DialogueSettings::default())
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).single().expect("valid timestamp")
    }

    fn say(engine: &DialogueEngine, session: &mut Session, text: &str, at: DateTime<Utc>) -> Turn {
        engine.handle(session, &InboundEvent::text(PHONE, text, at), at)
    }

    fn tap(engine: &DialogueEngine, session: &mut Session, id: &str, at: DateTime<Utc>) -> Turn {
        engine.handle(session, &InboundEvent::selection(PHONE, id, id, at), at)
    }

    fn bodies(turn: &Turn) -> Vec<String> {
        turn.messages().map(OutboundMessage::transcript).collect()
    }

    fn list_rows(message: &OutboundMessage) -> usize {
        match message {
            OutboundMessage::List { rows, .. } => rows.len(),
            _ => 0,
        }
    }

    /// Runs the whole qualification; returns the time of the last step.
    fn qualify(engine: &DialogueEngine, session: &mut Session) -> DateTime<Utc> {
        let mut at = start();
        say(engine, session, "Hola", at);
        at += Duration::seconds(2);
        say(engine, session, "Juan Pérez", at);
        for id in ["DPTO_SANTA_CRUZ", "SUBZ_NORTE", "CROP_SOYA", "HA_0_100", "CAMP_VERANO"] {
            at += Duration::seconds(2);
            tap(engine, session, id, at);
        }
        at
    }

    #[test]
    fn first_message_greets_and_asks_for_the_name() {
        let engine = engine();
        let mut session = Session::new(PHONE);

        let turn = say(&engine, &mut session, "Hola", start());

        let sent = bodies(&turn);
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("Greenfield"));
        assert!(sent[1].contains("nombre completo"));
        assert_eq!(session.pending, Some(Slot::Name));
        assert!(session.greeted);
    }

    #[test]
    fn name_then_department_list_then_flagship_subzones() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        say(&engine, &mut session, "Hola", start());

        let turn = say(&engine, &mut session, "juan pérez", start() + Duration::seconds(3));
        assert_eq!(session.profile_name.as_deref(), Some("Juan Pérez"));
        let department = turn.messages().last().expect("department prompt");
        assert_eq!(list_rows(department), 9);
        assert_eq!(session.pending, Some(Slot::Department));

        let turn = tap(&engine, &mut session, "DPTO_SANTA_CRUZ", start() + Duration::seconds(6));
        assert_eq!(session.vars.department.as_deref(), Some("Santa Cruz"));
        let subzones = turn.messages().last().expect("subzone prompt");
        assert_eq!(list_rows(subzones), 5);
        assert_eq!(session.last_prompt, Some(Prompt::SubzoneList));
    }

    #[test]
    fn other_departments_get_a_free_text_zone_question() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        say(&engine, &mut session, "Hola", start());
        say(&engine, &mut session, "Juan Pérez", start() + Duration::seconds(2));

        say(&engine, &mut session, "la paz", start() + Duration::seconds(4));
        assert_eq!(session.last_prompt, Some(Prompt::SubzoneFree));

        say(&engine, &mut session, "caranavi", start() + Duration::seconds(6));
        assert_eq!(session.vars.subzone.as_deref(), Some("Caranavi"));
        assert_eq!(session.pending, Some(Slot::Crop));
    }

    #[test]
    fn question_is_not_repeated_inside_the_stale_window() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        say(&engine, &mut session, "Hola", start());

        let mut sticker = InboundEvent::text(PHONE, "", start());
        sticker.text = None;
        sticker.kind = crate::domain::inbound::InboundKind::Media;

        let quiet = engine.handle(&mut session, &sticker, start() + Duration::seconds(10));
        assert!(quiet.is_empty());
        assert_eq!(session.pending, Some(Slot::Name));

        let again = engine.handle(&mut session, &sticker, start() + Duration::seconds(40));
        assert_eq!(bodies(&again).len(), 1);
        assert!(bodies(&again)[0].contains("nombre completo"));
    }

    #[test]
    fn unreadable_answer_gets_a_reprompt_not_the_next_question() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        say(&engine, &mut session, "Hola", start());

        let turn = say(&engine, &mut session, "buenas", start() + Duration::seconds(3));
        assert_eq!(bodies(&turn).len(), 1);
        assert!(session.profile_name.is_none());
        assert_eq!(session.pending, Some(Slot::Name));
    }

    #[test]
    fn crop_other_switches_to_free_text() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        say(&engine, &mut session, "Hola", start());
        say(&engine, &mut session, "Juan Pérez", start() + Duration::seconds(1));
        tap(&engine, &mut session, "DPTO_SANTA_CRUZ", start() + Duration::seconds(2));
        tap(&engine, &mut session, "SUBZ_ESTE", start() + Duration::seconds(3));

        let turn = tap(&engine, &mut session, "CROP_OTRO", start() + Duration::seconds(4));
        assert_eq!(bodies(&turn), vec!["¿Qué *cultivo* manejas?".to_string()]);

        say(&engine, &mut session, "chía", start() + Duration::seconds(5));
        assert_eq!(session.vars.crops, vec!["Chía".to_string()]);
        assert_eq!(session.pending, Some(Slot::Hectares));
    }

    #[test]
    fn completed_qualification_moves_to_product_stage() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        qualify(&engine, &mut session);

        assert_eq!(session.stage, Stage::Product);
        assert!(session.missing_discovery_slots().is_empty());
        assert_eq!(session.last_prompt, Some(Prompt::Category));
    }

    #[test]
    fn quantity_must_be_a_multiple_of_the_pack() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let mut at = qualify(&engine, &mut session);

        at += Duration::seconds(2);
        let turn = tap(&engine, &mut session, "PROD_FB-01", at);
        assert!(bodies(&turn)[0].contains("Fertimax Boro"));
        assert_eq!(session.vars.variant.as_deref(), Some("Saco 25 Kg"));
        assert_eq!(session.pending, Some(Slot::Quantity));

        at += Duration::seconds(2);
        let turn = say(&engine, &mut session, "30", at);
        assert!(bodies(&turn)[0].contains("25"));
        assert!(session.vars.cart.is_empty());
        assert_eq!(session.pending, Some(Slot::Quantity));

        at += Duration::seconds(2);
        let turn = say(&engine, &mut session, "50", at);
        assert_eq!(session.vars.cart.len(), 1);
        assert_eq!(session.vars.cart[0].quantity.amount, Decimal::from(50));
        assert_eq!(session.vars.cart[0].quantity.unit, Unit::Kilogram);
        assert_eq!(session.pending, Some(Slot::Checkout));
        assert!(matches!(turn.messages().last(), Some(OutboundMessage::Buttons { .. })));
    }

    #[test]
    fn quantity_in_another_unit_is_asked_again() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let mut at = qualify(&engine, &mut session);

        at += Duration::seconds(2);
        tap(&engine, &mut session, "PROD_FB-01", at);

        for text in ["50 litros", "100 unid"] {
            at += Duration::seconds(2);
            let turn = say(&engine, &mut session, text, at);
            assert!(bodies(&turn)[0].contains("Kg"), "unexpected reprompt for {text}");
            assert!(session.vars.cart.is_empty());
            assert_eq!(session.pending, Some(Slot::Quantity));
        }

        at += Duration::seconds(2);
        say(&engine, &mut session, "50 kilos", at);
        assert_eq!(session.vars.cart.len(), 1);
        assert_eq!(session.vars.cart[0].quantity.unit, Unit::Kilogram);
    }

    #[test]
    fn same_product_twice_updates_the_cart_line() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let mut at = qualify(&engine, &mut session);

        at += Duration::seconds(2);
        tap(&engine, &mut session, "PROD_FB-01", at);
        at += Duration::seconds(2);
        say(&engine, &mut session, "50 kg", at);

        at += Duration::seconds(2);
        let turn = tap(&engine, &mut session, "ADD_MORE", at);
        assert_eq!(session.last_prompt, Some(Prompt::Category));
        assert_eq!(bodies(&turn).len(), 2);

        at += Duration::seconds(2);
        let turn = tap(&engine, &mut session, "PROD_FB-01", at);
        assert!(
            bodies(&turn).iter().all(|body| !body.starts_with("Sobre *Fertimax Boro*")),
            "product sheet is not resent inside the cooldown"
        );

        at += Duration::seconds(2);
        say(&engine, &mut session, "100", at);
        assert_eq!(session.vars.cart.len(), 1);
        assert_eq!(session.vars.cart[0].quantity.amount, Decimal::from(100));
    }

    #[test]
    fn shared_ingredient_offers_a_choice() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let at = qualify(&engine, &mut session) + Duration::seconds(2);

        let turn = say(&engine, &mut session, "glifosato", at);
        let rows = turn.messages().map(list_rows).max().unwrap_or_default();
        assert_eq!(rows, 2);
        assert_eq!(session.pending, Some(Slot::Product));
    }

    #[test]
    fn product_named_before_qualification_is_picked_up_later() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        say(&engine, &mut session, "Hola", start());
        say(&engine, &mut session, "Juan Pérez", start() + Duration::seconds(1));

        say(&engine, &mut session, "quiero kelp verde", start() + Duration::seconds(2));
        assert_eq!(session.vars.candidate_sku.as_deref(), Some("KV-02"));
        assert!(session.vars.product.is_none());

        let mut at = start() + Duration::seconds(2);
        for id in ["DPTO_SANTA_CRUZ", "SUBZ_NORTE", "CROP_SOYA", "HA_0_100", "CAMP_VERANO"] {
            at += Duration::seconds(2);
            tap(&engine, &mut session, id, at);
        }
        assert_eq!(session.vars.product.as_ref().map(|product| product.sku.as_str()), Some("KV-02"));
        assert_eq!(session.last_prompt, Some(Prompt::Variant));
    }

    #[test]
    fn finalizing_closes_mutes_and_records_the_quote() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let mut at = qualify(&engine, &mut session);
        at += Duration::seconds(2);
        tap(&engine, &mut session, "PROD_FB-01", at);
        at += Duration::seconds(2);
        say(&engine, &mut session, "75", at);

        at += Duration::seconds(2);
        let turn = tap(&engine, &mut session, "NO_MORE", at);
        assert!(bodies(&turn)[0].contains("Fertimax Boro"));
        assert_eq!(session.last_prompt, Some(Prompt::Help));

        at += Duration::seconds(2);
        let turn = tap(&engine, &mut session, &InteractiveAction::Finalize.encode(), at);

        assert_eq!(session.stage, Stage::Closed);
        assert_eq!(session.closed_at, Some(at));
        assert!(session.is_muted(at));
        assert!(session.saved_externally);
        assert!(matches!(turn.steps.first(), Some(TurnStep::QuoteDocument(quote)) if quote.lines.len() == 1));
        let recorded = turn.effects.iter().filter(|effect| matches!(effect, Effect::RecordQuote(_))).count();
        assert_eq!(recorded, 1);
        assert!(turn.effects.iter().any(|effect| matches!(effect, Effect::AlertAdvisors(_))));
        assert!(turn
            .effects
            .iter()
            .any(|effect| matches!(effect, Effect::HandoffChanged { human: true, .. })));
    }

    #[test]
    fn finalizing_an_already_saved_quote_does_not_record_again() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let mut at = qualify(&engine, &mut session);
        at += Duration::seconds(2);
        tap(&engine, &mut session, "PROD_FB-01", at);
        at += Duration::seconds(2);
        say(&engine, &mut session, "25", at);
        session.saved_externally = true;

        at += Duration::seconds(2);
        let turn = tap(&engine, &mut session, "QR_FINALIZAR", at);
        assert!(turn.effects.iter().all(|effect| !matches!(effect, Effect::RecordQuote(_))));
        assert_eq!(session.stage, Stage::Closed);
    }

    #[test]
    fn finalize_with_empty_cart_keeps_the_conversation_open() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let at = qualify(&engine, &mut session) + Duration::seconds(2);

        let turn = tap(&engine, &mut session, "QR_FINALIZAR", at);
        assert_eq!(session.stage, Stage::Product);
        assert!(!session.is_muted(at));
        assert!(turn.steps.iter().all(|step| !matches!(step, TurnStep::QuoteDocument(_))));
    }

    #[test]
    fn asking_for_an_advisor_mutes_and_alerts() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let at = qualify(&engine, &mut session) + Duration::seconds(2);

        let turn = say(&engine, &mut session, "Quiero hablar con un asesor", at);

        assert!(session.is_muted(at));
        assert_eq!(bodies(&turn).len(), 1);
        assert!(turn.effects.iter().any(|effect| matches!(effect, Effect::AlertAdvisors(_))));
    }

    #[test]
    fn goodbye_closes_without_muting() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let at = qualify(&engine, &mut session) + Duration::seconds(2);

        say(&engine, &mut session, "no gracias, eso es todo", at);
        assert_eq!(session.stage, Stage::Closed);
        assert!(!session.is_muted(at));

        let turn = say(&engine, &mut session, "hola de nuevo", at + Duration::minutes(5));
        assert_eq!(session.stage, Stage::Product);
        assert!(session.closed_at.is_none());
        assert_eq!(session.last_prompt, Some(Prompt::Category));
        assert!(!turn.is_empty());
    }

    #[test]
    fn muted_conversation_wakes_up_with_the_phrase() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let at = qualify(&engine, &mut session) + Duration::seconds(2);
        say(&engine, &mut session, "necesito un asesor", at);

        let later = at + Duration::minutes(10);
        let ignored = engine.handle_muted(&mut session, &InboundEvent::text(PHONE, "hola?", later), later);
        assert!(ignored.is_empty());

        let turn =
            engine.handle_muted(&mut session, &InboundEvent::text(PHONE, "Greenfield", later), later);
        assert!(!session.is_muted(later));
        assert!(bodies(&turn)[0].contains("Reactivé"));
        assert!(turn
            .effects
            .iter()
            .any(|effect| matches!(effect, Effect::HandoffChanged { human: false, .. })));
        assert_eq!(session.last_prompt, Some(Prompt::Category));
    }

    #[test]
    fn billing_details_are_captured_while_muted() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let now = start();
        session.mute_until(now + Duration::hours(4));
        engine.open_billing_capture(&mut session, now);

        let reply = "NIT: 1234567\nRazón social: Agro Norte SRL\nPlaca: 123abc";
        let turn = engine.handle_muted(&mut session, &InboundEvent::text(PHONE, reply, now), now);

        assert!(matches!(
            turn.steps.first(),
            Some(TurnStep::Send { role: Role::Agent, .. })
        ));
        let stored = turn.effects.iter().find_map(|effect| match effect {
            Effect::StoreBilling(details) => Some(details.clone()),
            _ => None,
        });
        let stored = stored.expect("billing stored");
        assert_eq!(stored.nit.as_deref(), Some("1234567"));
        assert_eq!(stored.plate.as_deref(), Some("123ABC"));
        assert!(session.is_muted(now));
        assert!(session.meta.billing_capture_until.is_none());
    }

    #[test]
    fn returning_client_skips_qualification() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let client = ClientRecord {
            phone: PHONE.to_string(),
            name: Some("Ana Rojas".to_string()),
            department: Some("Santa Cruz".to_string()),
            subzone: Some("Norte".to_string()),
            crop: Some("Soya, Maíz".to_string()),
            hectares: Some("101–300 ha".to_string()),
            season: Some("Invierno".to_string()),
        };
        engine.apply_returning_client(&mut session, &client);

        let turn = say(&engine, &mut session, "Hola", start());
        assert_eq!(session.stage, Stage::Product);
        assert!(bodies(&turn)[0].contains("Ana"));
        assert_eq!(session.last_prompt, Some(Prompt::Category));
    }

    #[test]
    fn ad_referral_asks_about_the_advertised_product() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        let referral = Referral {
            headline: Some("Kelp Verde".to_string()),
            body: Some("Bioestimulante a base de algas".to_string()),
            ..Referral::default()
        };
        let event = InboundEvent::text(PHONE, "Hola, quiero info", start()).with_referral(referral);

        let turn = engine.handle(&mut session, &event, start());
        assert_eq!(bodies(&turn).len(), 2);
        assert!(matches!(turn.messages().last(), Some(OutboundMessage::Buttons { .. })));
        assert!(session.meta.referral_handled);

        let turn = tap(&engine, &mut session, "REF_YES_KV-02", start() + Duration::seconds(2));
        assert_eq!(session.vars.candidate_sku.as_deref(), Some("KV-02"));
        assert!(bodies(&turn).iter().any(|body| body.contains("nombre completo")));
    }

    #[test]
    fn opening_hours_answer_does_not_repeat_the_pending_question() {
        let engine = engine();
        let mut session = Session::new(PHONE);
        say(&engine, &mut session, "Hola", start());

        let turn = say(&engine, &mut session, "¿Qué horario atienden?", start() + Duration::seconds(5));
        assert_eq!(bodies(&turn).len(), 1);
        assert_eq!(session.pending, Some(Slot::Name));
    }
}
