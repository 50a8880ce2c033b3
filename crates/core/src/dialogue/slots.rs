use crate::dialogue::messages::subzone_prompt;
use crate::domain::catalog::Catalog;
use crate::domain::session::{Prompt, Session, Slot};

/// One row of the asking order: when the slot is relevant, when it counts as
/// answered, and which question to put.
pub struct SlotRule {
    pub slot: Slot,
    pub applies: fn(&Session, &Catalog) -> bool,
    pub filled: fn(&Session, &Catalog) -> bool,
    pub prompt: fn(&Session, &Catalog) -> Prompt,
}

fn always(_: &Session, _: &Catalog) -> bool {
    true
}

fn picking_product(session: &Session, _: &Catalog) -> bool {
    session.selecting_product()
}

fn keep_free_text(session: &Session, list: Prompt, free: Prompt) -> Prompt {
    if session.last_prompt == Some(free) {
        free
    } else {
        list
    }
}

fn has_many_variants(session: &Session, catalog: &Catalog) -> bool {
    session
        .vars
        .product
        .as_ref()
        .and_then(|product| catalog.by_sku(&product.sku))
        .is_some_and(|product| product.variants.len() > 1)
}

/// Asking order, evaluated top to bottom on every turn.
pub const SLOT_ORDER: [SlotRule; 11] = [
    SlotRule {
        slot: Slot::Name,
        applies: always,
        filled: |session, _| session.profile_name.is_some(),
        prompt: |_, _| Prompt::Name,
    },
    SlotRule {
        slot: Slot::Department,
        applies: always,
        filled: |session, _| session.vars.department.is_some(),
        prompt: |_, _| Prompt::Department,
    },
    SlotRule {
        slot: Slot::Subzone,
        applies: always,
        filled: |session, _| session.vars.subzone.is_some(),
        prompt: |session, _| subzone_prompt(session),
    },
    SlotRule {
        slot: Slot::Crop,
        applies: always,
        filled: |session, _| !session.vars.crops.is_empty(),
        prompt: |session, _| keep_free_text(session, Prompt::CropList, Prompt::CropFree),
    },
    SlotRule {
        slot: Slot::Hectares,
        applies: always,
        filled: |session, _| session.vars.hectares.is_some(),
        prompt: |session, _| keep_free_text(session, Prompt::HectaresList, Prompt::HectaresFree),
    },
    SlotRule {
        slot: Slot::Season,
        applies: always,
        filled: |session, _| session.vars.season.is_some(),
        prompt: |_, _| Prompt::Season,
    },
    SlotRule {
        slot: Slot::Category,
        applies: |session, catalog| {
            picking_product(session, catalog) && session.vars.product.is_none()
        },
        filled: |session, _| session.vars.category.is_some(),
        prompt: |_, _| Prompt::Category,
    },
    SlotRule {
        slot: Slot::Product,
        applies: picking_product,
        filled: |session, _| session.vars.product.is_some(),
        prompt: |session, catalog| match session.vars.category {
            Some(category) if !catalog.in_category(category).is_empty() => Prompt::ProductList,
            _ => Prompt::ProductName,
        },
    },
    SlotRule {
        slot: Slot::Variant,
        applies: |session, catalog| {
            picking_product(session, catalog) && has_many_variants(session, catalog)
        },
        filled: |session, _| session.vars.variant.is_some(),
        prompt: |_, _| Prompt::Variant,
    },
    SlotRule {
        slot: Slot::Quantity,
        applies: picking_product,
        filled: |session, _| session.vars.quantity.is_some(),
        prompt: |_, _| Prompt::Quantity,
    },
    SlotRule {
        slot: Slot::Checkout,
        applies: |session, _| {
            session.discovery_complete()
                && !session.vars.cart.is_empty()
                && !session.vars.selecting_product
        },
        filled: |_, _| false,
        prompt: |session, _| if session.vars.reviewing { Prompt::Help } else { Prompt::AddMore },
    },
];

/// The first relevant slot still unanswered, with the question to ask.
pub fn next_open(session: &Session, catalog: &Catalog) -> Option<(Slot, Prompt)> {
    SLOT_ORDER
        .iter()
        .filter(|rule| (rule.applies)(session, catalog))
        .find(|rule| !(rule.filled)(session, catalog))
        .map(|rule| (rule.slot, (rule.prompt)(session, catalog)))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{next_open, SLOT_ORDER};
    use crate::domain::catalog::{Catalog, Category, Product, Unit, Variant};
    use crate::domain::session::{CartItem, ProductRef, Prompt, Quantity, Session, Slot};

    fn qualified() -> Session {
        let mut session = Session::new("59170000000");
        session.profile_name = Some("Juan Pérez".to_string());
        session.vars.department = Some("La Paz".to_string());
        session.vars.subzone = Some("Caranavi".to_string());
        session.vars.crops = vec!["Soya".to_string()];
        session.vars.hectares = Some("0–100 ha".to_string());
        session.vars.season = Some("Verano".to_string());
        session
    }

    fn catalog() -> Catalog {
        let variant = |label: &str, pack: i64| Variant {
            label: label.to_string(),
            pack_size: Decimal::from(pack),
            unit: Unit::Liter,
        };
        Catalog::new(vec![Product {
            sku: "A".to_string(),
            name: "Producto A".to_string(),
            category: Some(Category::Fertilizer),
            active_ingredient: "Nitrógeno".to_string(),
            formulation: String::new(),
            dose: String::new(),
            targets: String::new(),
            image_url: None,
            variants: vec![variant("Bidón 5 L", 5), variant("Bidón 20 L", 20)],
            unit: Unit::Liter,
        }])
    }

    #[test]
    fn table_follows_the_documented_order() {
        let slots: Vec<Slot> = SLOT_ORDER.iter().map(|rule| rule.slot).collect();
        assert_eq!(
            slots,
            vec![
                Slot::Name,
                Slot::Department,
                Slot::Subzone,
                Slot::Crop,
                Slot::Hectares,
                Slot::Season,
                Slot::Category,
                Slot::Product,
                Slot::Variant,
                Slot::Quantity,
                Slot::Checkout,
            ]
        );
    }

    #[test]
    fn fresh_session_starts_with_name() {
        let session = Session::new("59170000000");
        assert_eq!(next_open(&session, &catalog()), Some((Slot::Name, Prompt::Name)));
    }

    #[test]
    fn non_flagship_department_asks_free_subzone() {
        let mut session = qualified();
        session.vars.subzone = None;
        assert_eq!(next_open(&session, &catalog()), Some((Slot::Subzone, Prompt::SubzoneFree)));

        session.vars.department = Some("Santa Cruz".to_string());
        assert_eq!(next_open(&session, &catalog()), Some((Slot::Subzone, Prompt::SubzoneList)));
    }

    #[test]
    fn known_product_skips_category() {
        let mut session = qualified();
        assert_eq!(next_open(&session, &catalog()), Some((Slot::Category, Prompt::Category)));

        session.vars.product = Some(ProductRef { sku: "A".to_string(), name: "Producto A".to_string() });
        assert_eq!(next_open(&session, &catalog()), Some((Slot::Variant, Prompt::Variant)));

        session.vars.variant = Some("Bidón 20 L".to_string());
        assert_eq!(next_open(&session, &catalog()), Some((Slot::Quantity, Prompt::Quantity)));
    }

    #[test]
    fn filled_cart_moves_to_checkout() {
        let mut session = qualified();
        session.upsert_cart(CartItem {
            product: ProductRef { sku: "A".to_string(), name: "Producto A".to_string() },
            variant: "Bidón 20 L".to_string(),
            quantity: Quantity { amount: Decimal::from(40), unit: Unit::Liter },
        });
        assert_eq!(next_open(&session, &catalog()), Some((Slot::Checkout, Prompt::AddMore)));

        session.vars.reviewing = true;
        assert_eq!(next_open(&session, &catalog()), Some((Slot::Checkout, Prompt::Help)));

        session.reset_product_slots();
        assert_eq!(next_open(&session, &catalog()), Some((Slot::Category, Prompt::Category)));
    }
}
