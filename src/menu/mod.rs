use crate::models::RecordRef;
use std::collections::BTreeMap;

/// Every action a record menu can dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub(crate) enum MenuAction {
    Edit,
    Delete,
    AddToShoppingList,
    ToggleComplete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MenuItem {
    pub label: String,
    pub action: MenuAction,
}

impl MenuItem {
    pub fn new(label: impl Into<String>, action: MenuAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Subtype -> extra actions. Defaults apply to every subtype and come first.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MenuRegistry {
    defaults: Vec<MenuItem>,
    by_subtype: BTreeMap<String, Vec<MenuItem>>,
}

impl Default for MenuRegistry {
    fn default() -> Self {
        Self {
            defaults: vec![
                MenuItem::new("Edit", MenuAction::Edit),
                MenuItem::new("Delete", MenuAction::Delete),
            ],
            by_subtype: BTreeMap::new(),
        }
    }
}

impl MenuRegistry {
    pub fn with(mut self, subtype: &str, items: Vec<MenuItem>) -> Self {
        self.by_subtype.insert(subtype.to_string(), items);
        self
    }

    pub fn builtin() -> Self {
        let add = || MenuItem::new("Add to shopping list", MenuAction::AddToShoppingList);
        let done = || MenuItem::new("Toggle complete", MenuAction::ToggleComplete);

        Self::default()
            .with("products", vec![add()])
            .with("transactions", vec![add()])
            .with("tasks", vec![done()])
            .with("habits", vec![done()])
    }

    /// Defaults followed by the subtype's own actions, duplicates dropped.
    pub fn actions_for(&self, subtype: &str) -> Vec<MenuItem> {
        let mut out = self.defaults.clone();
        if let Some(extra) = self.by_subtype.get(subtype) {
            for item in extra {
                if !out.iter().any(|i| i.action == item.action) {
                    out.push(item.clone());
                }
            }
        }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AnchorRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Where the menu is drawn. Behaviour is the same either way.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum MenuPlacement {
    AtPointer { x: f64, y: f64 },
    Anchored(AnchorRect),
}

impl MenuPlacement {
    /// `left`/`top` in viewport pixels.
    pub fn origin(&self) -> (f64, f64) {
        match self {
            MenuPlacement::AtPointer { x, y } => (*x, *y),
            MenuPlacement::Anchored(r) => (r.left, r.bottom + 4.0),
        }
    }
}

/// The one visible menu, bound to the record it was opened on.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct OpenMenu {
    pub record: RecordRef,
    pub placement: MenuPlacement,
    pub items: Vec<MenuItem>,
}

/// Owned "is a menu open" state. Opening replaces, never stacks.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct MenuState {
    open: Option<OpenMenu>,
}

impl MenuState {
    pub fn open(&mut self, registry: &MenuRegistry, record: RecordRef, placement: MenuPlacement) {
        let items = registry.actions_for(&record.subtype);
        self.open = Some(OpenMenu {
            record,
            placement,
            items,
        });
    }

    /// Item clicked: the menu goes away and the choice is handed back for dispatch.
    pub fn choose(&mut self, action: MenuAction) -> Option<(MenuAction, RecordRef)> {
        let menu = self.open.take()?;
        menu.items
            .iter()
            .any(|i| i.action == action)
            .then_some((action, menu.record))
    }

    pub fn dismiss(&mut self) {
        self.open = None;
    }

    pub fn current(&self) -> Option<&OpenMenu> {
        self.open.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(subtype: &str, id: &str) -> RecordRef {
        RecordRef::new("m", subtype, id)
    }

    #[test]
    fn unregistered_subtype_gets_defaults_only() {
        let reg = MenuRegistry::builtin();
        let actions: Vec<MenuAction> = reg.actions_for("metrics").into_iter().map(|i| i.action).collect();
        assert_eq!(actions, vec![MenuAction::Edit, MenuAction::Delete]);
    }

    #[test]
    fn registered_subtype_appends_after_defaults() {
        let reg = MenuRegistry::builtin();
        let actions: Vec<MenuAction> = reg.actions_for("products").into_iter().map(|i| i.action).collect();
        assert_eq!(
            actions,
            vec![MenuAction::Edit, MenuAction::Delete, MenuAction::AddToShoppingList]
        );
    }

    #[test]
    fn duplicates_are_dropped() {
        let reg = MenuRegistry::default().with(
            "tasks",
            vec![
                MenuItem::new("Edit again", MenuAction::Edit),
                MenuItem::new("Done", MenuAction::ToggleComplete),
                MenuItem::new("Done twice", MenuAction::ToggleComplete),
            ],
        );
        let items = reg.actions_for("tasks");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].label, "Edit");
        assert_eq!(items[2].action, MenuAction::ToggleComplete);
    }

    #[test]
    fn opening_replaces_the_previous_menu() {
        let reg = MenuRegistry::builtin();
        let mut state = MenuState::default();
        state.open(&reg, rec("tasks", "1"), MenuPlacement::AtPointer { x: 1.0, y: 2.0 });
        state.open(&reg, rec("products", "2"), MenuPlacement::AtPointer { x: 3.0, y: 4.0 });

        let menu = state.current().expect("one menu");
        assert_eq!(menu.record.item_id, "2");
        assert_eq!(menu.items.len(), 3);
    }

    #[test]
    fn choosing_closes_and_returns_bound_record() {
        let reg = MenuRegistry::builtin();
        let mut state = MenuState::default();
        state.open(&reg, rec("tasks", "7"), MenuPlacement::AtPointer { x: 0.0, y: 0.0 });

        let (action, record) = state.choose(MenuAction::ToggleComplete).expect("dispatch");
        assert_eq!(action, MenuAction::ToggleComplete);
        assert_eq!(record.item_id, "7");
        assert!(!state.is_open());
    }

    #[test]
    fn choosing_an_action_not_in_the_menu_only_closes() {
        let reg = MenuRegistry::builtin();
        let mut state = MenuState::default();
        state.open(&reg, rec("metrics", "1"), MenuPlacement::AtPointer { x: 0.0, y: 0.0 });
        assert!(state.choose(MenuAction::AddToShoppingList).is_none());
        assert!(!state.is_open());
    }

    #[test]
    fn dismiss_does_not_dispatch() {
        let reg = MenuRegistry::builtin();
        let mut state = MenuState::default();
        state.open(&reg, rec("tasks", "1"), MenuPlacement::AtPointer { x: 0.0, y: 0.0 });
        state.dismiss();
        assert!(state.choose(MenuAction::Edit).is_none());
    }

    #[test]
    fn action_keys_are_camel_case() {
        assert_eq!(MenuAction::AddToShoppingList.as_ref(), "addToShoppingList");
        assert_eq!("toggleComplete".parse::<MenuAction>().ok(), Some(MenuAction::ToggleComplete));
    }

    #[test]
    fn anchored_menu_sits_below_the_button() {
        let p = MenuPlacement::Anchored(AnchorRect {
            left: 10.0,
            top: 20.0,
            right: 40.0,
            bottom: 36.0,
        });
        assert_eq!(p.origin(), (10.0, 40.0));
    }
}
