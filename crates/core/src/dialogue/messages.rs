//! Customer-facing wording. Every message the dialogue sends is built here so
//! the engine only decides *what* to say.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::dialogue::actions::InteractiveAction;
use crate::dialogue::options::{
    is_flagship, ChoiceOption, CROPS, CROP_OTHER, DEPARTMENTS, HECTARES, HECTARES_OTHER,
    SEASONS, SUBZONES,
};
use crate::dialogue::outbound::OutboundMessage;
use crate::domain::catalog::{Catalog, Category, Product, Variant};
use crate::domain::session::{Prompt, Session};

pub const PAGE_SIZE: usize = 9;
pub const MINIMUM_PURCHASE_NOTE: &str = "*Compra mínima: US$ 3.000 (puedes combinar productos).";

fn option_list(
    body: impl Into<String>,
    button: &str,
    options: &[ChoiceOption],
    extra: Option<ChoiceOption>,
) -> OutboundMessage {
    OutboundMessage::list(body, button, |list| {
        for option in options.iter().chain(extra.iter()) {
            list.row(option.payload, option.label);
        }
    })
}

fn greeting_name(name: Option<&str>) -> String {
    name.and_then(|name| name.split_whitespace().next())
        .map(|first| format!(", {first}"))
        .unwrap_or_default()
}

/// Messages that ask the question behind `prompt`.
pub fn prompt_messages(prompt: Prompt, session: &Session, catalog: &Catalog) -> Vec<OutboundMessage> {
    let message = match prompt {
        Prompt::Name => OutboundMessage::text(
            "Para personalizar tu atención, ¿cuál es tu *nombre completo*?",
        ),
        Prompt::Department => option_list(
            "📍 Cuéntanos, ¿desde qué *departamento* de Bolivia nos escribes?",
            "Elegir departamento",
            &DEPARTMENTS,
            None,
        ),
        Prompt::SubzoneList => option_list(
            "Gracias. ¿En qué *zona de Santa Cruz*?",
            "Elegir zona",
            &SUBZONES,
            None,
        ),
        Prompt::SubzoneFree => {
            let department = session.vars.department.as_deref().unwrap_or("tu departamento");
            OutboundMessage::text(format!("Perfecto. ¿En qué *zona* de *{department}* trabajas?"))
        }
        Prompt::CropList => option_list(
            "📋 ¿Para qué *cultivo* necesitas el producto?",
            "Elegir cultivo",
            &CROPS,
            Some(CROP_OTHER),
        ),
        Prompt::CropFree => OutboundMessage::text("¿Qué *cultivo* manejas?"),
        Prompt::HectaresList => option_list(
            "¿Cuántas *hectáreas* vas a tratar?",
            "Elegir hectáreas",
            &HECTARES,
            Some(HECTARES_OTHER),
        ),
        Prompt::HectaresFree => {
            OutboundMessage::text("¿Podrías escribir el total de *hectáreas*? (ej. 50 ha)")
        }
        Prompt::Season => OutboundMessage::buttons("¿En qué *campaña* te encuentras?", |buttons| {
            for option in &SEASONS {
                buttons.choice(option.payload, option.label);
            }
        }),
        Prompt::Category => category_list(),
        Prompt::ProductList => {
            return match session.vars.category {
                Some(category) => product_page(catalog, category, session.vars.catalog_offset),
                None => vec![category_list()],
            }
        }
        Prompt::ProductName => {
            OutboundMessage::text("Dime el *nombre del producto* que buscas 🙂")
        }
        Prompt::Variant => {
            let product =
                session.vars.product.as_ref().and_then(|product| catalog.by_sku(&product.sku));
            match product {
                Some(product) => variant_list(product),
                None => OutboundMessage::text("¿En qué *presentación* lo necesitas?"),
            }
        }
        Prompt::Quantity => {
            let hint = selected_variant(session, catalog)
                .map(|(_, variant)| {
                    format!(" (múltiplos de {} {})", variant.pack_size.normalize(), variant.unit.label())
                })
                .unwrap_or_default();
            OutboundMessage::text(format!(
                "Para poder realizar tu cotización, ¿qué *cantidad* necesitas *(L/KG o unidades)*?{hint}"
            ))
        }
        Prompt::AddMore => add_more_buttons(),
        Prompt::Help => help_buttons(),
    };
    vec![message]
}

fn selected_variant<'a>(
    session: &Session,
    catalog: &'a Catalog,
) -> Option<(&'a Product, &'a Variant)> {
    let product = catalog.by_sku(&session.vars.product.as_ref()?.sku)?;
    let variant = product.variant(session.vars.variant.as_deref()?)?;
    Some((product, variant))
}

pub fn category_list() -> OutboundMessage {
    OutboundMessage::list("¿Qué tipo de producto necesitas?", "Elegir categoría", |list| {
        for category in Category::ALL {
            list.row(InteractiveAction::Category(category).encode(), category.plural());
        }
    })
}

/// One page of a category: up to nine products and a "Ver más…" row.
pub fn product_page(catalog: &Catalog, category: Category, offset: usize) -> Vec<OutboundMessage> {
    let products = catalog.in_category(category);
    if products.is_empty() {
        return vec![OutboundMessage::text(format!(
            "Por ahora no tengo {} en el catálogo. Dime el *nombre del producto* que buscas.",
            category.plural().to_lowercase()
        ))];
    }

    let start = if offset < products.len() { offset } else { 0 };
    let page: Vec<&Product> = products.iter().skip(start).take(PAGE_SIZE).copied().collect();
    let next = start + page.len();
    let body = format!("{} disponibles", category.plural());

    vec![OutboundMessage::list(body, "Elegir producto", |list| {
        for product in &page {
            list.row_with_description(
                InteractiveAction::Product(product.sku.clone()).encode(),
                product.name.as_str(),
                product.active_ingredient.as_str(),
            );
        }
        if next < products.len() {
            list.row(InteractiveAction::CategoryMore(next).encode(), "Ver más…");
        }
    })]
}

pub fn variant_list(product: &Product) -> OutboundMessage {
    OutboundMessage::list(
        format!("¿En qué *presentación* deseas *{}*?", product.name),
        "Elegir presentación",
        |list| {
            for (index, variant) in product.variants.iter().enumerate() {
                list.row(
                    InteractiveAction::Variant { sku: product.sku.clone(), index }.encode(),
                    variant.label.as_str(),
                );
            }
        },
    )
}

/// List shown when several products share the searched active ingredient.
pub fn ingredient_matches(query: &str, products: &[&Product]) -> Vec<OutboundMessage> {
    vec![
        OutboundMessage::list(format!("Productos con IA: {query}"), "Elegir producto", |list| {
            for product in products {
                list.row_with_description(
                    InteractiveAction::Product(product.sku.clone()).encode(),
                    product.name.as_str(),
                    product.active_ingredient.as_str(),
                );
            }
        }),
        OutboundMessage::text(
            "Decime cuál te interesa y te paso el detalle. *Compra mínima: US$ 3.000*",
        ),
    ]
}

/// Technical sheet: the catalog image when there is one, else a text card.
pub fn product_card(product: &Product) -> OutboundMessage {
    if let Some(url) = product.image_url.as_deref().filter(|url| !url.trim().is_empty()) {
        return OutboundMessage::image_link(
            url,
            Some(format!("Aquí tienes la ficha técnica de *{}* 📄", product.name)),
        );
    }

    let category = product.category.map(Category::label).unwrap_or("producto");
    let mut lines = vec![format!("Sobre *{}* ({category}):", product.name)];
    let fields = [
        ("Ingrediente activo", product.active_ingredient.as_str()),
        ("Formulación / acción", product.formulation.as_str()),
        ("Dosis de referencia", product.dose.as_str()),
        ("Espectro objetivo", product.targets.as_str()),
    ];
    for (label, value) in fields {
        if !value.trim().is_empty() {
            lines.push(format!("• {label}: {value}"));
        }
    }
    if !product.variants.is_empty() {
        lines.push(format!("• Presentaciones: {}", product.presentations()));
    }
    OutboundMessage::text(lines.join("\n"))
}

pub fn add_more_buttons() -> OutboundMessage {
    OutboundMessage::buttons("¿Deseas añadir otro producto?", |buttons| {
        buttons
            .choice(InteractiveAction::AddMore.encode(), "Sí, añadir otro")
            .choice(InteractiveAction::NoMore.encode(), "No, continuar");
    })
}

pub fn help_buttons() -> OutboundMessage {
    OutboundMessage::buttons("¿Necesitas ayuda en algo más?", |buttons| {
        buttons
            .choice(InteractiveAction::Continue.encode(), "Añadir producto")
            .choice(InteractiveAction::Finalize.encode(), "Cotizar");
    })
}

pub fn summary(session: &Session) -> OutboundMessage {
    let value = |value: Option<&str>| value.unwrap_or("-").to_string();
    let mut lines = vec![
        "Perfecto, enseguida te enviaremos una cotización con estos datos:".to_string(),
        format!("* {}", value(session.profile_name.as_deref())),
        format!("* Departamento: {}", value(session.vars.department.as_deref())),
        format!("* Zona: {}", value(session.vars.subzone.as_deref())),
        format!("* Cultivo: {}", session.vars.crops.join(", ")),
        format!("* Hectáreas: {}", value(session.vars.hectares.as_deref())),
        format!("* Campaña: {}", value(session.vars.season.as_deref())),
    ];
    for item in &session.vars.cart {
        lines.push(format!("* {} ({}) — {}", item.product.name, item.variant, item.quantity));
    }
    lines.push(String::new());
    lines.push(MINIMUM_PURCHASE_NOTE.to_string());
    lines.push("*La entrega de tu pedido se realiza en nuestro almacén*.".to_string());
    OutboundMessage::text(lines.join("\n"))
}

pub fn greeting(name: Option<&str>, brand: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "¡Qué gusto saludarte{}! Soy el asistente virtual de *{brand}*. Estoy para ayudarte 🙂",
        greeting_name(name)
    ))
}

pub fn reprompt_name() -> OutboundMessage {
    OutboundMessage::text("Para continuar, por favor escribe tu *nombre y apellido*.")
}

pub fn reprompt_hectares() -> OutboundMessage {
    OutboundMessage::text("Por favor ingresa un número válido de *hectáreas* (ej. 50 ha).")
}

pub fn reprompt_choice() -> OutboundMessage {
    OutboundMessage::text("Por favor, *elige una opción del listado* para continuar.")
}

pub fn reprompt_quantity() -> OutboundMessage {
    OutboundMessage::text(
        "No logré leer la cantidad. Escríbela con número y unidad, por ejemplo *40 L* o *50 Kg*.",
    )
}

pub fn reprompt_unit(unit: &str, variant: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "La presentación *{variant}* se vende en *{unit}*. ¿Cuántos {unit} necesitas?"
    ))
}

pub fn reprompt_pack_multiple(pack: &str, unit: &str, variant: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "La presentación *{variant}* se vende en múltiplos de *{pack} {unit}*. ¿Qué cantidad necesitas? (ej. {pack}, o el doble)"
    ))
}

pub fn agent_requested(name: Option<&str>) -> OutboundMessage {
    OutboundMessage::text(format!(
        "¡Perfecto{}! Ya notifiqué a nuestro equipo. Un asesor comercial se pondrá en contacto contigo por este medio. Mientras tanto pauso el asistente automático.",
        greeting_name(name)
    ))
}

pub fn opening_hours(hours: &str) -> OutboundMessage {
    OutboundMessage::text(format!("Atendemos {hours} 🙂"))
}

pub fn location(map_url: &str) -> OutboundMessage {
    OutboundMessage::text(format!("Nuestra ubicación en Google Maps 👇\nVer ubicación: {map_url}"))
}

pub fn goodbye() -> OutboundMessage {
    OutboundMessage::text(
        "¡Gracias por escribirnos! Si más adelante te surge algo, aquí estoy para ayudarte. 👋",
    )
}

pub fn price_inquiry() -> OutboundMessage {
    OutboundMessage::text(
        "Con gusto te preparo una *cotización* con un precio a medida. Solo necesito que me compartas unos datos y te la envío por aquí.",
    )
}

pub fn reactivated(name: Option<&str>, brand: &str) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Listo{} 🙌. Reactivé el *Asistente Virtual de {brand}*.",
        greeting_name(name)
    ))
}

pub fn quote_thanks() -> OutboundMessage {
    OutboundMessage::text(
        "¡Gracias por escribirnos! Te envío la *cotización en PDF*. Un asesor comercial se comunicará contigo para coordinar tu pedido.",
    )
}

pub fn reactivation_hint(phrase: &str) -> OutboundMessage {
    let mut word: Vec<char> = phrase.trim().chars().collect();
    if let Some(first) = word.first_mut() {
        *first = first.to_ascii_uppercase();
    }
    let word: String = word.into_iter().collect();
    OutboundMessage::text(format!(
        "Para volver a activar el asistente, por favor, escribe *{word}*."
    ))
}

pub fn empty_cart() -> OutboundMessage {
    OutboundMessage::text(
        "Aún no tienes productos en tu pedido. Dime el *nombre del producto* o elige una categoría 👇",
    )
}

pub fn referral_question(product: &Product) -> OutboundMessage {
    OutboundMessage::buttons(
        format!("Gracias por escribirnos desde Facebook. ¿La consulta es sobre *{}*?", product.name),
        |buttons| {
            buttons
                .choice(InteractiveAction::ReferralYes(product.sku.clone()).encode(), format!("Sí, {}", product.name))
                .choice(InteractiveAction::ReferralNo.encode(), "No, otro producto");
        },
    )
}

pub fn referral_other_product() -> OutboundMessage {
    OutboundMessage::text(
        "Claro, indícame por favor el *nombre del producto* que te interesa o elige una categoría.",
    )
}

pub fn add_another_intro() -> OutboundMessage {
    OutboundMessage::text("Dime el *nombre del otro producto* o elige una categoría 👇")
}

pub fn continue_intro() -> OutboundMessage {
    OutboundMessage::text("Perfecto, vamos a añadir un nuevo producto 🙌.")
}

pub fn billing_received() -> OutboundMessage {
    OutboundMessage::text(
        "¡Gracias! Registramos tus datos de facturación y recojo. Te avisaremos cuando tu pedido esté listo.",
    )
}

/// Everything an advisor needs to pick up a lead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadAlert {
    pub conversation_id: String,
    pub name: Option<String>,
    pub location: String,
    pub crops: String,
    pub season: Option<String>,
    pub products: Vec<String>,
    pub reason: LeadReason,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadReason {
    QuoteRequested,
    AdvisorRequested,
}

impl LeadAlert {
    pub fn from_session(session: &Session, reason: LeadReason, at: DateTime<Utc>) -> Self {
        let mut products: Vec<String> = session
            .vars
            .cart
            .iter()
            .map(|item| format!("{} ({}) — {}", item.product.name, item.variant, item.quantity))
            .collect();
        if products.is_empty() {
            if let Some(product) = &session.vars.product {
                products.push(product.name.clone());
            }
        }

        Self {
            conversation_id: session.id.clone(),
            name: session.profile_name.clone(),
            location: session.location(),
            crops: session.vars.crops.join(", "),
            season: session.vars.season.clone(),
            products,
            reason,
            at,
        }
    }
}

/// Who the advisor introduces themselves as in the prefilled reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvisorProfile {
    pub name: String,
    pub role: String,
    pub brand: String,
    pub utc_offset_minutes: i32,
}

pub fn advisor_alert(lead: &LeadAlert, advisor: &AdvisorProfile) -> String {
    let stamp = match FixedOffset::east_opt(advisor.utc_offset_minutes * 60) {
        Some(offset) => lead.at.with_timezone(&offset).format("%d/%m/%Y %H:%M").to_string(),
        None => lead.at.format("%d/%m/%Y %H:%M UTC").to_string(),
    };
    let dash = |value: &str| if value.trim().is_empty() { "-".to_string() } else { value.to_string() };
    let name = lead.name.clone().unwrap_or_else(|| "-".to_string());
    let heading = match lead.reason {
        LeadReason::QuoteRequested => "🆕 *Nuevo lead*",
        LeadReason::AdvisorRequested => "🙋 *Cliente solicita asesor*",
    };

    let mut lines = vec![
        format!("🕒 {stamp}"),
        heading.to_string(),
        format!("*Nombre:* {name}"),
        format!("*Ubicación:* {}", dash(&lead.location)),
        format!("*Cultivo:* {}", dash(&lead.crops)),
        format!("*Campaña:* {}", lead.season.clone().unwrap_or_else(|| "-".to_string())),
    ];
    if lead.products.is_empty() {
        lines.push("*Producto:* -".to_string());
    } else {
        lines.push("*Producto:*".to_string());
        lines.extend(lead.products.iter().map(|product| format!("• {product}")));
    }

    let chat = format!("https://wa.me/{}", lead.conversation_id);
    lines.push(format!("Abrir chat: {chat}"));

    let first_name = lead.name.as_deref().and_then(|name| name.split_whitespace().next());
    let greeting = first_name.map(|first| format!("Hola {first}")).unwrap_or_else(|| "Hola".to_string());
    let prefilled = format!(
        "{greeting}, soy {}, {} de {}. Recibí tu solicitud y te escribo para ayudarte con tu cotización.",
        advisor.name, advisor.role, advisor.brand
    );
    if let Ok(link) = Url::parse_with_params(&chat, &[("text", prefilled.as_str())]) {
        lines.push(format!("Responder con mensaje: {link}"));
    }
    lines.join("\n")
}

/// Sub-zones of the flagship department come from a list, others are free text.
pub fn subzone_prompt(session: &Session) -> Prompt {
    match session.vars.department.as_deref() {
        Some(department) if is_flagship(department) => Prompt::SubzoneList,
        _ => Prompt::SubzoneFree,
    }
}
