use leptos::ev;
use leptos::html;
use leptos::prelude::*;
use leptos_dom::helpers::window_event_listener;
use leptos_ui::clx;
use wasm_bindgen::JsCast;

use crate::menu::{MenuAction, MenuState};

mod components {
    use super::*;
    clx! {ContextMenuList, ul, "flex flex-col"}
    clx! {ContextMenuEntry, li, "w-full"}
}

pub use components::*;

const ITEM_CLASS: &str = "inline-flex gap-2 items-center w-full rounded-sm px-2 py-1.5 text-sm text-left transition-colors duration-200 text-popover-foreground hover:bg-accent hover:text-accent-foreground focus:outline-none focus-visible:bg-accent";

/// The single record menu, drawn from `menu`. Nothing is rendered while it is closed.
///
/// Escape and any press outside the menu dismiss it without dispatching.
#[component]
pub fn ContextMenu(menu: RwSignal<MenuState>, on_choose: Callback<MenuAction>) -> impl IntoView {
    let menu_ref: NodeRef<html::Div> = NodeRef::new();

    let key_handle = window_event_listener(ev::keydown, move |ev: web_sys::KeyboardEvent| {
        if ev.key() == "Escape" && menu.with_untracked(|m| m.is_open()) {
            ev.prevent_default();
            menu.update(|m| m.dismiss());
        }
    });

    let press_handle = window_event_listener(ev::mousedown, move |ev: web_sys::MouseEvent| {
        if !menu.with_untracked(|m| m.is_open()) {
            return;
        }
        let inside = match (menu_ref.get_untracked(), ev.target()) {
            (Some(el), Some(target)) => target
                .dyn_ref::<web_sys::Node>()
                .is_some_and(|node| el.contains(Some(node))),
            _ => false,
        };
        if !inside {
            menu.update(|m| m.dismiss());
        }
    });

    on_cleanup(move || {
        key_handle.remove();
        press_handle.remove();
    });

    move || {
        menu.with(|m| m.current().cloned()).map(|open| {
            let (left, top) = open.placement.origin();
            let items = open
                .items
                .into_iter()
                .map(|item| {
                    let action = item.action;
                    view! {
                        <ContextMenuEntry>
                            <button
                                type="button"
                                role="menuitem"
                                class=ITEM_CLASS
                                data-action=action.as_ref().to_string()
                                on:click=move |_| on_choose.run(action)
                            >
                                {item.label}
                            </button>
                        </ContextMenuEntry>
                    }
                })
                .collect_view();

            view! {
                <div
                    data-name="ContextMenu"
                    data-state="open"
                    role="menu"
                    class="is-open fixed z-50 w-[180px] p-1 rounded-md border bg-card shadow-md"
                    style=format!("left: {left}px; top: {top}px;")
                    node_ref=menu_ref
                    on:contextmenu=|ev: web_sys::MouseEvent| ev.prevent_default()
                >
                    <ContextMenuList>{items}</ContextMenuList>
                </div>
            }
        })
    }
}
