//! Priced catalog of purchasable items
//!
//! A [`Menu`] is either flat (one implicit section) or partitioned into named
//! sections, one per restaurant. Categories of a single business ("Mains",
//! "Drinks") are merged into the implicit section and only kept for display. Menus are immutable once built; a refresh
//! builds a new one and swaps it into a [`MenuHandle`].

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{MenuLoadError, Result};
use crate::intent::Vocabulary;

/// Top-level key holding the business display name rather than a section.
const BUSINESS_NAME_KEY: &str = "restaurant";

/// Wrapper key used by exported menu documents: `{"menu": {...}}`.
const WRAPPER_KEY: &str = "menu";

/// Highest accepted unit price. Keeps cart arithmetic far from overflow.
const MAX_PRICE: i64 = 1_000_000;

/// Normalize an item or section name for lookup.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A single purchasable item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub price: Decimal,
    /// Display heading the item was listed under, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// True for a price the menu accepts: not negative and at most one million.
pub fn price_in_range(price: &Decimal) -> bool {
    !price.is_sign_negative() && *price <= Decimal::from(MAX_PRICE)
}

/// One restaurant's (or the implicit flat) item list
#[derive(Debug, Clone)]
pub struct Section {
    name: Option<String>,
    items: Vec<MenuItem>,
    index: HashMap<String, usize>,
    vocabulary: Vocabulary,
}

impl Section {
    fn build(name: Option<String>, entries: Vec<(String, Decimal)>) -> Result<Self> {
        let label = name.clone().unwrap_or_default();
        let mut items = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());

        for (raw, price) in entries {
            let item = normalize_name(&raw);
            if item.is_empty() {
                return Err(MenuLoadError::Malformed(format!(
                    "empty item name in section '{}'",
                    label
                )));
            }
            if price < Decimal::ZERO {
                return Err(MenuLoadError::NegativePrice {
                    section: label,
                    item,
                });
            }
            if price > Decimal::from(MAX_PRICE) {
                return Err(MenuLoadError::InvalidPrice {
                    section: label,
                    item,
                });
            }
            if index.contains_key(&item) {
                return Err(MenuLoadError::DuplicateItem {
                    section: label,
                    item,
                });
            }
            index.insert(item.clone(), items.len());
            items.push(MenuItem {
                name: item,
                price,
                category: None,
            });
        }

        let vocabulary = Vocabulary::new(items.iter().map(|i| i.name.as_str()));
        Ok(Self {
            name,
            items,
            index,
            vocabulary,
        })
    }

    /// One implicit section holding every category's items, in order.
    fn categorized(groups: Vec<(String, Vec<(String, Decimal)>)>) -> Result<Self> {
        let mut labels = Vec::new();
        let mut entries = Vec::new();
        for (category, items) in groups {
            labels.extend(std::iter::repeat(category.trim().to_string()).take(items.len()));
            entries.extend(items);
        }

        let mut section = Self::build(None, entries)?;
        for (item, category) in section.items.iter_mut().zip(labels) {
            item.category = Some(category);
        }
        Ok(section)
    }

    /// Section name, `None` for the implicit section of a flat menu
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn price_of(&self, item: &str) -> Option<Decimal> {
        self.index
            .get(&normalize_name(item))
            .map(|&i| self.items[i].price)
    }

    pub fn contains(&self, item: &str) -> bool {
        self.index.contains_key(&normalize_name(item))
    }

    /// Item names prepared for the order-intent parser
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
}

/// Read-only catalog snapshot
#[derive(Debug, Clone, Default)]
pub struct Menu {
    sections: Vec<Section>,
    sectioned: bool,
    business_name: Option<String>,
}

impl Menu {
    /// A menu with nothing purchasable, used when loading fails
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a flat menu from `(item, price)` pairs.
    pub fn flat<I, S>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let entries = items.into_iter().map(|(n, p)| (n.into(), p)).collect();
        Ok(Self {
            sections: vec![Section::build(None, entries)?],
            sectioned: false,
            business_name: None,
        })
    }

    /// Build a sectioned menu from `(section, [(item, price)])` groups.
    pub fn sectioned<I, S, J, T>(sections: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, J)>,
        S: Into<String>,
        J: IntoIterator<Item = (T, Decimal)>,
        T: Into<String>,
    {
        let mut built: Vec<Section> = Vec::new();
        for (name, items) in sections {
            let name = normalize_name(&name.into());
            if name.is_empty() {
                return Err(MenuLoadError::Malformed("empty section name".to_string()));
            }
            if built.iter().any(|s| s.name() == Some(name.as_str())) {
                return Err(MenuLoadError::Malformed(format!(
                    "duplicate section '{}'",
                    name
                )));
            }
            let entries = items.into_iter().map(|(n, p)| (n.into(), p)).collect();
            built.push(Section::build(Some(name), entries)?);
        }
        Ok(Self {
            sections: built,
            sectioned: true,
            business_name: None,
        })
    }

    /// Build a flat menu whose items are grouped under display categories.
    /// Every item is orderable without choosing a category first.
    pub fn categorized<I, S, J, T>(categories: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, J)>,
        S: Into<String>,
        J: IntoIterator<Item = (T, Decimal)>,
        T: Into<String>,
    {
        let groups = categories
            .into_iter()
            .map(|(name, items)| {
                let entries = items.into_iter().map(|(n, p)| (n.into(), p)).collect();
                (name.into(), entries)
            })
            .collect();
        Ok(Self {
            sections: vec![Section::categorized(groups)?],
            sectioned: false,
            business_name: None,
        })
    }

    pub fn with_business_name(mut self, name: impl Into<String>) -> Self {
        self.business_name = Some(name.into());
        self
    }

    /// Parse a JSON menu document.
    ///
    /// Accepted shapes are flat `{item: price}` and sectioned
    /// `{restaurant: {item: price}}`. A document wrapped as `{"menu": ...}`
    /// describes one business: its groups are categories, merged into a
    /// single orderable list. A string-valued `"Restaurant"` key names the
    /// business.
    pub fn from_json_str(source: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(source)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(MenuLoadError::Malformed(
                "menu document must be a JSON object".to_string(),
            ));
        };

        let wrapped = matches!(root.get(WRAPPER_KEY), Some(Value::Object(_)))
            && root
                .keys()
                .all(|k| k == WRAPPER_KEY || normalize_name(k) == BUSINESS_NAME_KEY);
        if wrapped {
            let business = take_business_name(&mut root);
            let Some(Value::Object(mut inner)) = root.remove(WRAPPER_KEY) else {
                return Err(MenuLoadError::Malformed("missing 'menu' object".to_string()));
            };
            let menu = Self::from_object(&mut inner, Grouping::Categories)?;
            return Ok(match business {
                Some(name) if menu.business_name.is_none() => menu.with_business_name(name),
                _ => menu,
            });
        }

        Self::from_object(&mut root, Grouping::Restaurants)
    }

    fn from_object(root: &mut Map<String, Value>, grouping: Grouping) -> Result<Self> {
        let business = take_business_name(root);

        let has_prices = root.values().any(|v| !v.is_object());
        let has_sections = root.values().any(Value::is_object);

        let menu = match (has_prices, has_sections) {
            (true, true) => return Err(MenuLoadError::MixedShape),
            (_, false) => {
                let entries = price_entries("", root)?;
                Self::flat(entries)?
            }
            (false, true) => {
                let mut groups = Vec::with_capacity(root.len());
                for (section, value) in root.iter() {
                    let Value::Object(items) = value else {
                        return Err(MenuLoadError::MixedShape);
                    };
                    groups.push((section.clone(), price_entries(section, items)?));
                }
                match grouping {
                    Grouping::Restaurants => Self::sectioned(groups)?,
                    Grouping::Categories => Self::categorized(groups)?,
                }
            }
        };

        Ok(match business {
            Some(name) => menu.with_business_name(name),
            None => menu,
        })
    }

    /// Names of the sections, empty for a flat menu
    pub fn sections(&self) -> Vec<&str> {
        if !self.sectioned {
            return Vec::new();
        }
        self.sections.iter().filter_map(Section::name).collect()
    }

    pub fn is_sectioned(&self) -> bool {
        self.sectioned
    }

    /// True when the menu has more than one section to choose from
    pub fn requires_selection(&self) -> bool {
        self.sectioned && self.sections.len() > 1
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }

    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    pub fn business_name(&self) -> Option<&str> {
        self.business_name.as_deref()
    }

    /// Resolve a section. `None` addresses the implicit section of a flat
    /// menu, or the only section of a single-section menu.
    pub fn section(&self, name: Option<&str>) -> Option<&Section> {
        match name {
            Some(name) => {
                let name = normalize_name(name);
                self.sections
                    .iter()
                    .find(|s| s.name() == Some(name.as_str()))
            }
            None if self.sections.len() == 1 => self.sections.first(),
            None => None,
        }
    }

    pub fn lookup_price(&self, section: Option<&str>, item: &str) -> Option<Decimal> {
        self.section(section)?.price_of(item)
    }

    pub fn list_items(&self, section: Option<&str>) -> &[MenuItem] {
        self.section(section).map(Section::items).unwrap_or(&[])
    }

    /// Find the section named in free text, longest name first.
    pub fn find_section_in(&self, text: &str) -> Option<&str> {
        let text = text.to_lowercase();
        let mut names = self.sections();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        names.into_iter().find(|n| text.contains(n))
    }
}

/// How nested objects of a menu document are read
#[derive(Debug, Clone, Copy)]
enum Grouping {
    Restaurants,
    Categories,
}

fn take_business_name(root: &mut Map<String, Value>) -> Option<String> {
    let key = root
        .iter()
        .find(|(k, v)| normalize_name(k) == BUSINESS_NAME_KEY && v.is_string())
        .map(|(k, _)| k.clone())?;
    match root.remove(&key) {
        Some(Value::String(name)) => Some(name.trim().to_string()),
        _ => None,
    }
}

fn price_entries(section: &str, items: &Map<String, Value>) -> Result<Vec<(String, Decimal)>> {
    items
        .iter()
        .map(|(item, value)| {
            parse_price(value)
                .map(|p| (item.clone(), p))
                .ok_or_else(|| MenuLoadError::InvalidPrice {
                    section: section.to_string(),
                    item: normalize_name(item),
                })
        })
        .collect()
}

/// Accepts JSON numbers and numeric strings.
pub fn parse_price(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let repr = n.to_string();
            Decimal::from_str(&repr)
                .or_else(|_| Decimal::from_scientific(&repr))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Shared, atomically swappable menu snapshot
#[derive(Debug, Clone, Default)]
pub struct MenuHandle {
    current: Arc<RwLock<Arc<Menu>>>,
}

impl MenuHandle {
    pub fn new(menu: Menu) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(menu))),
        }
    }

    /// The menu in effect right now; later swaps do not affect it.
    pub fn snapshot(&self) -> Arc<Menu> {
        self.current.read().clone()
    }

    pub fn replace(&self, menu: Menu) {
        let items = menu.item_count();
        *self.current.write() = Arc::new(menu);
        tracing::info!(items, "Menu snapshot replaced");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_flat_menu_lookup() {
        let menu = Menu::from_json_str(r#"{"Naan": 2, "coke ": 3.5}"#).unwrap();
        assert!(!menu.is_sectioned());
        assert!(menu.sections().is_empty());
        assert_eq!(menu.lookup_price(None, "naan"), Some(dec("2")));
        assert_eq!(menu.lookup_price(None, "COKE"), Some(dec("3.5")));
        assert_eq!(menu.lookup_price(None, "pizza"), None);
        assert_eq!(menu.item_count(), 2);
    }

    #[test]
    fn test_sectioned_menu() {
        let menu = Menu::from_json_str(
            r#"{"Indian": {"naan": 2, "biryani": 12}, "italian": {"pizza": 10}}"#,
        )
        .unwrap();
        assert!(menu.requires_selection());
        assert_eq!(menu.sections(), vec!["indian", "italian"]);
        assert_eq!(menu.lookup_price(Some("Italian"), "pizza"), Some(dec("10")));
        assert_eq!(menu.lookup_price(Some("indian"), "pizza"), None);
        assert_eq!(menu.lookup_price(None, "pizza"), None);
        assert_eq!(menu.list_items(Some("indian")).len(), 2);
    }

    #[test]
    fn test_wrapped_menu_with_business_name() {
        let menu = Menu::from_json_str(
            r#"{"menu": {"Restaurant": "Spice Hub", "Mains": {"naan": 2}}}"#,
        )
        .unwrap();
        assert_eq!(menu.business_name(), Some("Spice Hub"));
        assert!(menu.sections().is_empty());
        assert!(!menu.requires_selection());
        assert_eq!(menu.lookup_price(None, "naan"), Some(dec("2")));
    }

    #[test]
    fn test_wrapped_categories_merge_into_one_list() {
        let menu = Menu::from_json_str(
            r#"{"menu": {"Restaurant": "Spice Hub", "Mains": {"naan": 2, "biryani": 12}, "Drinks": {"coke": 3}}}"#,
        )
        .unwrap();
        assert!(!menu.is_sectioned());
        assert!(!menu.requires_selection());
        assert_eq!(menu.item_count(), 3);
        assert_eq!(menu.lookup_price(None, "naan"), Some(dec("2")));
        assert_eq!(menu.lookup_price(None, "coke"), Some(dec("3")));

        let section = menu.section(None).unwrap();
        assert!(section.vocabulary().contains("coke"));
        let categories: Vec<_> = menu
            .list_items(None)
            .iter()
            .map(|i| i.category.as_deref())
            .collect();
        assert_eq!(categories, vec![Some("Drinks"), Some("Mains"), Some("Mains")]);
    }

    #[test]
    fn test_unwrapped_sections_stay_restaurants() {
        let menu = Menu::from_json_str(
            r#"{"Restaurant": "Food Court", "indian": {"naan": 2}, "drinks": {"coke": 3}}"#,
        )
        .unwrap();
        assert!(menu.requires_selection());
        assert_eq!(menu.sections(), vec!["drinks", "indian"]);
    }

    #[test]
    fn test_duplicate_item_across_categories() {
        assert!(matches!(
            Menu::from_json_str(r#"{"menu": {"Mains": {"naan": 2}, "Sides": {"Naan": 3}}}"#),
            Err(MenuLoadError::DuplicateItem { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_price() {
        assert!(matches!(
            Menu::from_json_str(r#"{"naan": "79228162514264337593543950335"}"#),
            Err(MenuLoadError::InvalidPrice { .. })
        ));
        assert!(Menu::from_json_str(r#"{"naan": 1000000}"#).is_ok());
        assert!(price_in_range(&dec("999.99")));
        assert!(!price_in_range(&dec("1000000.01")));
        assert!(!price_in_range(&dec("-1")));
    }

    #[test]
    fn test_rejects_bad_documents() {
        assert!(matches!(
            Menu::from_json_str(r#"{"naan": -1}"#),
            Err(MenuLoadError::NegativePrice { .. })
        ));
        assert!(matches!(
            Menu::from_json_str(r#"{"naan": "cheap"}"#),
            Err(MenuLoadError::InvalidPrice { .. })
        ));
        assert!(matches!(
            Menu::from_json_str(r#"{"naan": 2, "NAAN": 3}"#),
            Err(MenuLoadError::DuplicateItem { .. })
        ));
        assert!(matches!(
            Menu::from_json_str(r#"{"naan": 2, "drinks": {"coke": 1}}"#),
            Err(MenuLoadError::MixedShape)
        ));
        assert!(matches!(
            Menu::from_json_str("[1, 2]"),
            Err(MenuLoadError::Malformed(_))
        ));
        assert!(Menu::from_json_str("not json").is_err());
    }

    #[test]
    fn test_empty_document_is_empty_menu() {
        let menu = Menu::from_json_str("{}").unwrap();
        assert!(menu.is_empty());
    }

    #[test]
    fn test_find_section_prefers_longest() {
        let menu = Menu::sectioned(vec![
            ("thai", vec![("pad thai", dec("9"))]),
            ("thai street", vec![("satay", dec("6"))]),
        ])
        .unwrap();
        assert_eq!(menu.find_section_in("I want Thai Street food"), Some("thai street"));
        assert_eq!(menu.find_section_in("thai please"), Some("thai"));
        assert_eq!(menu.find_section_in("burgers"), None);
    }

    #[test]
    fn test_handle_swaps_atomically() {
        let handle = MenuHandle::new(Menu::empty());
        let before = handle.snapshot();
        handle.replace(Menu::flat(vec![("naan", dec("2"))]).unwrap());
        assert!(before.is_empty());
        assert_eq!(handle.snapshot().item_count(), 1);
    }
}
