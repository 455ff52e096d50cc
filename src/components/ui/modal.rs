use icons::X;
use leptos::ev;
use leptos::prelude::*;
use leptos_dom::helpers::window_event_listener;
use leptos_ui::clx;
use tw_merge::*;

use crate::components::hooks::use_random::use_random_id_for;

mod components {
    use super::*;
    clx! {ModalBody, div, "flex flex-col gap-4"}
    clx! {ModalHeader, div, "flex flex-col gap-2 text-center sm:text-left"}
    clx! {ModalTitle, h3, "text-lg leading-none font-semibold"}
    clx! {ModalFooter, footer, "flex flex-col-reverse gap-2 sm:flex-row sm:justify-end"}
}

pub use components::*;

/// Backdrop plus centred panel, shown while `open` is true.
///
/// Escape, the close button and (optionally) a backdrop click all go through
/// `on_close`; the caller decides what closing means.
#[component]
pub fn Modal(
    children: ChildrenFn,
    #[prop(into)] open: Signal<bool>,
    on_close: Callback<()>,
    #[prop(optional, into)] class: String,
    #[prop(default = true)] close_on_backdrop_click: bool,
) -> impl IntoView {
    let target_id = use_random_id_for("modal");
    let merged_class = tw_merge!(
        "bg-background border rounded-2xl shadow-lg p-6 w-full max-w-[calc(100%-2rem)] sm:max-w-lg max-h-[85vh] overflow-y-auto fixed top-[50%] left-[50%] translate-x-[-50%] translate-y-[-50%] z-100",
        class
    );

    let key_handle = window_event_listener(ev::keydown, move |ev: web_sys::KeyboardEvent| {
        if ev.key() == "Escape" && open.get_untracked() {
            ev.prevent_default();
            on_close.run(());
        }
    });
    on_cleanup(move || key_handle.remove());

    let children = StoredValue::new(children);
    let merged_class = StoredValue::new(merged_class);
    let target_id = StoredValue::new(target_id);

    view! {
        <Show when=move || open.get() fallback=|| ().into_view()>
            <div
                data-name="ModalBackdrop"
                data-state="open"
                class="fixed inset-0 z-60 bg-black/50"
                on:click=move |_| {
                    if close_on_backdrop_click {
                        on_close.run(());
                    }
                }
            />

            <div
                data-name="ModalContent"
                data-state="open"
                role="dialog"
                aria-modal="true"
                id=target_id.get_value()
                class=merged_class.get_value()
            >
                <button
                    type="button"
                    class="absolute top-4 right-4 p-1 rounded-sm focus:ring-2 focus:ring-offset-2 focus:outline-none focus:ring-ring [&_svg:not([class*='size-'])]:size-4"
                    aria-label="Close"
                    on:click=move |_| on_close.run(())
                >
                    <X />
                </button>

                {children.with_value(|c| c())}
            </div>
        </Show>
    }
}
