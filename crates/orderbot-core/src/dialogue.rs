//! Conversational state machine
//!
//! ```text
//!   NEW ──any──▶ greeted ──(multi-section menu)──▶ SELECTING_RESTAURANT
//!                   │                                     │ section named
//!                   └──(flat / single section)──▶ BUILDING_CART ◀┘
//!
//!   BUILDING_CART ──yes (total > 0)──▶ NEW   (RequestPaymentLink, DeleteSession)
//!   BUILDING_CART ──cancel──────────▶ NEW   (DeleteSession)
//!   BUILDING_CART ──reset───────────▶ NEW   (ResetSession)
//! ```
//!
//! [`step`] is pure with respect to I/O: it mutates the session in place and
//! returns the replies plus side-effect commands for an outer driver.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::intent::IntentParser;
use crate::menu::Menu;
use crate::session::{CustomerId, Session};

/// Where a session sits in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing sent yet
    New,
    /// Greeted, waiting for a restaurant choice
    SelectingRestaurant,
    /// Taking items; awaiting confirmation once the total is positive
    BuildingCart,
}

impl Stage {
    pub fn of(session: &Session, menu: &Menu) -> Self {
        if !session.greeted {
            Stage::New
        } else if menu.requires_selection() && session.selected_restaurant().is_none() {
            Stage::SelectingRestaurant
        } else {
            Stage::BuildingCart
        }
    }
}

/// Action for code outside the core to carry out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffectCommand {
    /// Create a payment link for a confirmed order
    RequestPaymentLink { customer: CustomerId, amount: Decimal },
    /// Drop the session entirely
    DeleteSession { customer: CustomerId },
    /// Replace the session with a fresh one
    ResetSession { customer: CustomerId },
}

/// Replies and commands produced by one step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub replies: Vec<String>,
    pub commands: Vec<SideEffectCommand>,
}

impl Transition {
    fn reply(&mut self, text: impl Into<String>) {
        self.replies.push(text.into());
    }

    fn command(&mut self, command: SideEffectCommand) {
        self.commands.push(command);
    }
}

/// Fixed-intent classification, checked before any item parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClass {
    Affirmative,
    Negative,
    Cancel,
    Reset,
    AddMore,
    ShowMenu,
    FreeText,
}

const AFFIRMATIVE: &[&str] = &["yes", "yeah", "y", "confirm"];
const NEGATIVE: &[&str] = &["no", "nah", "n"];
const RESET: &[&str] = &["reset", "restart", "start over"];

impl InputClass {
    /// Classify already-normalized text. Exact tokens win over substrings.
    pub fn of(text: &str) -> Self {
        if AFFIRMATIVE.contains(&text) {
            InputClass::Affirmative
        } else if NEGATIVE.contains(&text) {
            InputClass::Negative
        } else if text.contains("cancel") {
            InputClass::Cancel
        } else if RESET.contains(&text) {
            InputClass::Reset
        } else if text.contains("add more") {
            InputClass::AddMore
        } else if text.contains("menu") {
            InputClass::ShowMenu
        } else {
            InputClass::FreeText
        }
    }
}

/// Lowercase and trim inbound text.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Advance `session` by one inbound message.
pub fn step(
    session: &mut Session,
    menu: &Menu,
    parser: &dyn IntentParser,
    text: &str,
) -> Transition {
    let text = normalize_text(text);
    let mut transition = Transition::default();

    if menu.is_empty() {
        transition.reply(replies::MENU_UNAVAILABLE);
        return transition;
    }

    session.touch();
    match Stage::of(session, menu) {
        Stage::New => greet(session, menu, parser, &text, &mut transition),
        Stage::SelectingRestaurant => select_restaurant(session, menu, &text, &mut transition),
        Stage::BuildingCart => build_cart(session, menu, parser, &text, &mut transition),
    }
    transition
}

fn greet(
    session: &mut Session,
    menu: &Menu,
    parser: &dyn IntentParser,
    text: &str,
    t: &mut Transition,
) {
    session.greeted = true;

    if menu.requires_selection() {
        t.reply(replies::greeting_with_sections(menu));
        if let Some(name) = menu.find_section_in(text) {
            bind(session, menu, name, t);
        }
        return;
    }

    let Some(section) = menu.section(None) else {
        t.reply(replies::MENU_UNAVAILABLE);
        return;
    };
    t.reply(replies::greeting_with_menu(menu, section));

    // An opening message that already carries an order is handled now.
    let actionable = match InputClass::of(text) {
        InputClass::FreeText | InputClass::ShowMenu => {
            !parser.parse(text, section.vocabulary()).is_empty()
        }
        _ => true,
    };
    if actionable {
        build_cart(session, menu, parser, text, t);
    }
}

fn select_restaurant(session: &mut Session, menu: &Menu, text: &str, t: &mut Transition) {
    let customer = session.customer.clone();
    match InputClass::of(text) {
        InputClass::Cancel => {
            tracing::info!(customer = %customer, "Cancelled before choosing a restaurant");
            t.reply(replies::ORDER_CANCELLED);
            t.command(SideEffectCommand::DeleteSession { customer });
        }
        InputClass::Reset => {
            t.reply(replies::SESSION_RESET);
            t.command(SideEffectCommand::ResetSession { customer });
        }
        _ => match menu.find_section_in(text) {
            Some(name) => bind(session, menu, name, t),
            None => t.reply(replies::choose_section(menu)),
        },
    }
}

fn bind(session: &mut Session, menu: &Menu, name: &str, t: &mut Transition) {
    let Some(section) = menu.section(Some(name)) else {
        t.reply(replies::choose_section(menu));
        return;
    };
    if session.bind_restaurant(name) {
        tracing::info!(customer = %session.customer, restaurant = name, "Restaurant selected");
    }
    t.reply(replies::section_menu(section));
}

fn build_cart(
    session: &mut Session,
    menu: &Menu,
    parser: &dyn IntentParser,
    text: &str,
    t: &mut Transition,
) {
    let customer = session.customer.clone();
    let Some(section) = menu.section(session.selected_restaurant()) else {
        // The bound restaurant vanished in a menu refresh.
        tracing::warn!(customer = %customer, "Bound section missing from menu, resetting");
        t.reply(replies::MENU_UNAVAILABLE);
        t.command(SideEffectCommand::ResetSession { customer });
        return;
    };

    match InputClass::of(text) {
        InputClass::Affirmative => {
            if session.awaiting_confirmation() {
                let amount = session.cart.total();
                tracing::info!(customer = %customer, %amount, "Order confirmed");
                t.reply(replies::order_confirmed(amount));
                t.command(SideEffectCommand::RequestPaymentLink {
                    customer: customer.clone(),
                    amount,
                });
                t.command(SideEffectCommand::DeleteSession { customer });
                session.cart.clear();
            } else {
                t.reply(replies::NO_ACTIVE_ORDER);
            }
        }
        InputClass::Negative => {
            if session.awaiting_confirmation() {
                t.reply(replies::ADD_MORE_OR_CANCEL);
            } else {
                t.reply(replies::NO_ACTIVE_ORDER);
            }
        }
        InputClass::Cancel => {
            tracing::info!(customer = %customer, "Order cancelled");
            session.cart.clear();
            t.reply(replies::ORDER_CANCELLED);
            t.command(SideEffectCommand::DeleteSession { customer });
        }
        InputClass::Reset => {
            session.cart.clear();
            t.reply(replies::SESSION_RESET);
            t.command(SideEffectCommand::ResetSession { customer });
        }
        InputClass::AddMore => t.reply(replies::SEND_ITEMS),
        InputClass::ShowMenu => t.reply(replies::section_menu(section)),
        InputClass::FreeText => {
            let intent = parser.parse(text, section.vocabulary());
            if intent.is_empty() {
                t.reply(replies::unrecognized(section));
                return;
            }
            let outcome = session.cart.apply_delta(&intent, section);
            if outcome.changed {
                t.reply(replies::order_summary(&session.cart.render()));
            } else {
                t.reply(replies::order_unchanged(&session.cart.render()));
            }
        }
    }
}

/// Reply templates
pub mod replies {
    use rust_decimal::{Decimal, RoundingStrategy};

    use crate::cart::CartSummary;
    use crate::menu::{Menu, Section};

    pub const MENU_UNAVAILABLE: &str =
        "⚠️ Our menu is temporarily unavailable. Please try again in a little while.";
    pub const NO_ACTIVE_ORDER: &str = "❌ Sorry, there is no active order to confirm.";
    pub const ADD_MORE_OR_CANCEL: &str = "Would you like to add more items to your order or cancel it? Reply with 'add more' or 'cancel'.";
    pub const SEND_ITEMS: &str = "Sure, send the items you'd like to add.";
    pub const ORDER_CANCELLED: &str = "✅ Your order has been cancelled.";
    pub const SESSION_RESET: &str = "📝 Okay, your session has been reset.";
    pub const PAYMENT_FAILED: &str = "⚠️ We encountered a problem generating your payment link. Please try again in a moment.";
    pub const TEXT_ONLY: &str = "Sorry, I can only process text orders right now.";

    /// `$7.00`
    pub fn money(amount: Decimal) -> String {
        let mut value = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        value.rescale(2);
        format!("${}", value)
    }

    pub fn capitalize(s: &str) -> String {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    fn welcome(menu: &Menu) -> String {
        match menu.business_name() {
            Some(name) => format!("👋 Welcome to {}!", name),
            None => "👋 Welcome!".to_string(),
        }
    }

    fn section_names(menu: &Menu) -> String {
        let names: Vec<String> = menu
            .sections()
            .into_iter()
            .map(|n| format!("*{}*", capitalize(n)))
            .collect();
        match names.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} or {}", rest.join(", "), last),
            Some((last, _)) => last.clone(),
            None => String::new(),
        }
    }

    /// Item lines, with a heading wherever the display category changes
    pub fn menu_lines(section: &Section) -> String {
        let mut lines = Vec::with_capacity(section.items().len());
        let mut heading: Option<&str> = None;
        for item in section.items() {
            if let Some(category) = item.category.as_deref() {
                if heading != Some(category) {
                    lines.push(format!("*{}*", category));
                    heading = Some(category);
                }
            }
            lines.push(format!("- {}: {}", item.name, money(item.price)));
        }
        lines.join("\n")
    }

    pub fn greeting_with_sections(menu: &Menu) -> String {
        format!(
            "{} Would you like to order from {}?",
            welcome(menu),
            section_names(menu)
        )
    }

    pub fn greeting_with_menu(menu: &Menu, section: &Section) -> String {
        format!(
            "{} Here's our menu:\n{}\n\n{}",
            welcome(menu),
            menu_lines(section),
            example_hint(section)
        )
    }

    pub fn choose_section(menu: &Menu) -> String {
        let names: Vec<String> = menu
            .sections()
            .into_iter()
            .map(|n| format!("'{}'", capitalize(n)))
            .collect();
        format!(
            "❓ Please reply with {} to choose a restaurant.",
            names.join(" or ")
        )
    }

    pub fn section_menu(section: &Section) -> String {
        match section.name() {
            Some(name) => format!(
                "Great choice! Here's our {} menu:\n{}",
                capitalize(name),
                menu_lines(section)
            ),
            None => format!("Here's our menu:\n{}", menu_lines(section)),
        }
    }

    fn example_hint(section: &Section) -> String {
        let names: Vec<&str> = section.items().iter().map(|i| i.name.as_str()).collect();
        match names.as_slice() {
            [first, second, ..] => format!("Try something like: '2 {} and 1 {}'", first, second),
            [only] => format!("Try something like: '2 {}'", only),
            [] => "Send the items you'd like to order.".to_string(),
        }
    }

    pub fn unrecognized(section: &Section) -> String {
        format!("❌ Sorry, I didn't understand your order. {}", example_hint(section))
    }

    fn summary_lines(summary: &CartSummary) -> String {
        summary
            .lines
            .iter()
            .map(|l| format!("- {}x {} ({})", l.quantity, l.item, money(l.line_total)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn order_summary(summary: &CartSummary) -> String {
        if summary.lines.is_empty() {
            return "🧾 Your order is now empty. Send the items you'd like to order.".to_string();
        }
        format!(
            "🧾 Your order:\n{}\n\n💰 Total: {}\nReply 'yes' to confirm or 'no' to modify.",
            summary_lines(summary),
            money(summary.total)
        )
    }

    pub fn order_unchanged(summary: &CartSummary) -> String {
        if summary.lines.is_empty() {
            return "ℹ️ That didn't change anything, your order is empty.".to_string();
        }
        format!("ℹ️ That didn't change your order.\n{}", order_summary(summary))
    }

    pub fn order_confirmed(total: Decimal) -> String {
        format!(
            "✅ Your order of {} has been confirmed! We'll start preparing it.",
            money(total)
        )
    }

    pub fn payment_link(url: &str) -> String {
        format!("🧾 To complete your payment, please visit: {}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::KeywordParser;

    fn flat_menu() -> Menu {
        Menu::flat(vec![
            ("naan", Decimal::new(2, 0)),
            ("coke", Decimal::new(3, 0)),
        ])
        .unwrap()
    }

    fn restaurants() -> Menu {
        Menu::sectioned(vec![
            ("indian", vec![("naan", Decimal::new(2, 0)), ("biryani", Decimal::new(12, 0))]),
            ("italian", vec![("pizza", Decimal::new(10, 0))]),
        ])
        .unwrap()
    }

    fn greeted(menu: &Menu) -> Session {
        let mut session = Session::new(CustomerId::new("+15550001"));
        step(&mut session, menu, &KeywordParser, "hi");
        session
    }

    #[test]
    fn test_classification_priority() {
        assert_eq!(InputClass::of("yes"), InputClass::Affirmative);
        assert_eq!(InputClass::of("y"), InputClass::Affirmative);
        assert_eq!(InputClass::of("no"), InputClass::Negative);
        assert_eq!(InputClass::of("cancel 1 naan"), InputClass::Cancel);
        assert_eq!(InputClass::of("please add more"), InputClass::AddMore);
        assert_eq!(InputClass::of("show me the menu"), InputClass::ShowMenu);
        assert_eq!(InputClass::of("start over"), InputClass::Reset);
        assert_eq!(InputClass::of("no naan"), InputClass::FreeText);
        assert_eq!(InputClass::of("yes 2 naan"), InputClass::FreeText);
    }

    #[test]
    fn test_greeting_sent_once_with_flat_menu() {
        let menu = flat_menu();
        let mut session = Session::new(CustomerId::new("+15550001"));
        assert_eq!(Stage::of(&session, &menu), Stage::New);

        let t = step(&mut session, &menu, &KeywordParser, "hello");
        assert_eq!(t.replies.len(), 1);
        assert!(t.replies[0].contains("Welcome"));
        assert!(t.replies[0].contains("- naan: $2.00"));
        assert_eq!(Stage::of(&session, &menu), Stage::BuildingCart);

        let t = step(&mut session, &menu, &KeywordParser, "hello");
        assert!(!t.replies[0].contains("Welcome"));
    }

    #[test]
    fn test_first_message_with_order_is_processed() {
        let menu = flat_menu();
        let mut session = Session::new(CustomerId::new("+15550001"));
        let t = step(&mut session, &menu, &KeywordParser, "2 naan please");
        assert_eq!(t.replies.len(), 2);
        assert_eq!(session.cart.quantity("naan"), 2);
    }

    #[test]
    fn test_restaurant_selection_flow() {
        let menu = restaurants();
        let mut session = Session::new(CustomerId::new("+15550001"));

        let t = step(&mut session, &menu, &KeywordParser, "hi");
        assert!(t.replies[0].contains("*Indian* or *Italian*"));
        assert_eq!(Stage::of(&session, &menu), Stage::SelectingRestaurant);

        let t = step(&mut session, &menu, &KeywordParser, "2 naan");
        assert!(t.replies[0].contains("choose a restaurant"));
        assert!(session.cart.is_empty());

        let t = step(&mut session, &menu, &KeywordParser, "Indian please");
        assert!(t.replies[0].contains("Indian menu"));
        assert_eq!(session.selected_restaurant(), Some("indian"));
        assert_eq!(Stage::of(&session, &menu), Stage::BuildingCart);

        // Items from another restaurant are not on the bound menu.
        step(&mut session, &menu, &KeywordParser, "1 pizza");
        assert!(session.cart.is_empty());
        step(&mut session, &menu, &KeywordParser, "1 biryani");
        assert_eq!(session.cart.total(), Decimal::new(12, 0));

        // No switching mid-order.
        step(&mut session, &menu, &KeywordParser, "italian");
        assert_eq!(session.selected_restaurant(), Some("indian"));
    }

    #[test]
    fn test_cancel_or_reset_while_choosing_restaurant() {
        let menu = restaurants();
        let customer = CustomerId::new("+15550001");

        let mut session = greeted(&menu);
        let t = step(&mut session, &menu, &KeywordParser, "cancel");
        assert_eq!(t.replies, vec![replies::ORDER_CANCELLED.to_string()]);
        assert_eq!(
            t.commands,
            vec![SideEffectCommand::DeleteSession {
                customer: customer.clone()
            }]
        );
        assert_eq!(session.selected_restaurant(), None);

        let mut session = greeted(&menu);
        let t = step(&mut session, &menu, &KeywordParser, "start over");
        assert_eq!(t.replies, vec![replies::SESSION_RESET.to_string()]);
        assert_eq!(t.commands, vec![SideEffectCommand::ResetSession { customer }]);
    }

    #[test]
    fn test_categories_are_one_orderable_menu() {
        let menu = Menu::categorized(vec![
            ("Mains", vec![("naan", Decimal::new(2, 0))]),
            ("Drinks", vec![("coke", Decimal::new(3, 0))]),
        ])
        .unwrap();
        let mut session = Session::new(CustomerId::new("+15550001"));

        let t = step(&mut session, &menu, &KeywordParser, "hi");
        assert!(t.replies[0].contains("*Mains*\n- naan: $2.00\n*Drinks*\n- coke: $3.00"));
        assert_eq!(Stage::of(&session, &menu), Stage::BuildingCart);

        let t = step(&mut session, &menu, &KeywordParser, "2 naan and 1 coke");
        assert!(t.replies[0].contains("Total: $7.00"));
        assert_eq!(session.cart.quantity("naan"), 2);
        assert_eq!(session.cart.quantity("coke"), 1);
    }

    #[test]
    fn test_section_chosen_in_first_message() {
        let menu = restaurants();
        let mut session = Session::new(CustomerId::new("+15550001"));
        let t = step(&mut session, &menu, &KeywordParser, "hi, italian food please");
        assert_eq!(t.replies.len(), 2);
        assert_eq!(session.selected_restaurant(), Some("italian"));
    }

    #[test]
    fn test_confirm_emits_payment_and_delete() {
        let menu = flat_menu();
        let mut session = greeted(&menu);
        step(&mut session, &menu, &KeywordParser, "1 naan and 1 coke");

        let t = step(&mut session, &menu, &KeywordParser, "yes");
        let customer = CustomerId::new("+15550001");
        assert_eq!(
            t.commands,
            vec![
                SideEffectCommand::RequestPaymentLink {
                    customer: customer.clone(),
                    amount: Decimal::new(5, 0)
                },
                SideEffectCommand::DeleteSession { customer },
            ]
        );
        assert!(t.replies[0].contains("$5.00"));
    }

    #[test]
    fn test_negative_depends_on_cart() {
        let menu = flat_menu();
        let mut session = greeted(&menu);

        let t = step(&mut session, &menu, &KeywordParser, "no");
        assert_eq!(t.replies, vec![replies::NO_ACTIVE_ORDER.to_string()]);
        assert!(t.commands.is_empty());

        step(&mut session, &menu, &KeywordParser, "2 coke");
        let t = step(&mut session, &menu, &KeywordParser, "nah");
        assert_eq!(t.replies, vec![replies::ADD_MORE_OR_CANCEL.to_string()]);
        assert_eq!(session.cart.quantity("coke"), 2);
    }

    #[test]
    fn test_cancel_and_reset() {
        let menu = flat_menu();
        let mut session = greeted(&menu);
        step(&mut session, &menu, &KeywordParser, "2 coke");

        let t = step(&mut session, &menu, &KeywordParser, "cancel my order");
        assert_eq!(t.replies, vec![replies::ORDER_CANCELLED.to_string()]);
        assert!(matches!(t.commands[..], [SideEffectCommand::DeleteSession { .. }]));
        assert!(session.cart.is_empty());

        let t = step(&mut session, &menu, &KeywordParser, "restart");
        assert!(matches!(t.commands[..], [SideEffectCommand::ResetSession { .. }]));
    }

    #[test]
    fn test_unrecognized_and_unchanged() {
        let menu = flat_menu();
        let mut session = greeted(&menu);

        let t = step(&mut session, &menu, &KeywordParser, "2 pizza");
        assert!(t.replies[0].contains("didn't understand"));
        assert!(t.replies[0].contains("'2 naan and 1 coke'"));

        let t = step(&mut session, &menu, &KeywordParser, "remove 1 naan");
        assert!(t.replies[0].contains("didn't change"));
    }

    #[test]
    fn test_add_more_and_menu_prompts() {
        let menu = flat_menu();
        let mut session = greeted(&menu);
        let t = step(&mut session, &menu, &KeywordParser, "add more");
        assert_eq!(t.replies, vec![replies::SEND_ITEMS.to_string()]);
        let t = step(&mut session, &menu, &KeywordParser, "menu?");
        assert!(t.replies[0].contains("- coke: $3.00"));
    }

    #[test]
    fn test_empty_menu_answers_unavailable() {
        let menu = Menu::empty();
        let mut session = Session::new(CustomerId::new("+15550001"));
        let t = step(&mut session, &menu, &KeywordParser, "hi");
        assert_eq!(t.replies, vec![replies::MENU_UNAVAILABLE.to_string()]);
        assert!(!session.greeted);
    }

    #[test]
    fn test_money_format() {
        assert_eq!(replies::money(Decimal::new(7, 0)), "$7.00");
        assert_eq!(replies::money(Decimal::new(4505, 3)), "$4.51");
        assert_eq!(replies::money(Decimal::new(4495, 3)), "$4.50");
        assert_eq!(replies::money(Decimal::new(1999, 2)), "$19.99");
    }
}
