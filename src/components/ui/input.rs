use leptos::prelude::*;
use tw_merge::tw_merge;
use wasm_bindgen::JsCast;

const CONTROL_CLASS: &str = "placeholder:text-muted-foreground selection:bg-primary selection:text-primary-foreground dark:bg-input/30 border-input flex h-9 w-full min-w-0 rounded-md border bg-transparent px-3 py-1 text-base shadow-xs transition-[color,box-shadow] outline-none disabled:pointer-events-none disabled:cursor-not-allowed disabled:opacity-50 md:text-sm focus-visible:border-ring focus-visible:ring-ring/50 focus-visible:ring-2 aria-invalid:ring-destructive/20 dark:aria-invalid:ring-destructive/40 aria-invalid:border-destructive";

fn event_value(ev: &web_sys::Event) -> Option<String> {
    let target = ev.target()?;
    if let Some(input) = target.dyn_ref::<web_sys::HtmlInputElement>() {
        return Some(input.value());
    }
    target
        .dyn_ref::<web_sys::HtmlSelectElement>()
        .map(|select| select.value())
}

/// Text-like input driven from outside: the caller owns the value and decides
/// what an input event means.
///
/// NOTE: no `bind:value`. The value is pushed with `prop:value` and every
/// keystroke goes through `on_value`.
#[component]
pub fn Input(
    #[prop(into, optional)] class: String,
    #[prop(into, default = "text")] r#type: &'static str,
    #[prop(into, optional)] id: String,
    #[prop(into, optional)] name: String,
    #[prop(into, optional)] placeholder: String,
    #[prop(optional_no_strip)] step: Option<String>,
    #[prop(into)] value: Signal<String>,
    #[prop(into, optional)] invalid: Signal<bool>,
    #[prop(into, optional)] disabled: Signal<bool>,
    #[prop(into, optional)] required: bool,
    on_value: Callback<String>,
    #[prop(optional)] node_ref: NodeRef<leptos::html::Input>,
) -> impl IntoView {
    let merged_class = tw_merge!(CONTROL_CLASS, class);

    view! {
        <input
            data-name="Input"
            type=r#type
            class=merged_class
            id=id
            name=name
            placeholder=placeholder
            step=step
            required=required
            disabled=move || disabled.get()
            aria-invalid=move || invalid.get().then_some("true")
            class:invalid=move || invalid.get()
            prop:value=move || value.get()
            on:input=move |ev: web_sys::Event| {
                if let Some(v) = event_value(&ev) {
                    on_value.run(v);
                }
            }
            node_ref=node_ref
        />
    }
}

#[component]
pub fn Checkbox(
    #[prop(into, optional)] id: String,
    #[prop(into, optional)] name: String,
    #[prop(into)] checked: Signal<bool>,
    #[prop(into, optional)] disabled: Signal<bool>,
    on_checked: Callback<bool>,
) -> impl IntoView {
    view! {
        <input
            data-name="Checkbox"
            type="checkbox"
            class="size-4 rounded border-input accent-primary disabled:opacity-50"
            id=id
            name=name
            disabled=move || disabled.get()
            prop:checked=move || checked.get()
            on:change=move |ev: web_sys::Event| {
                if let Some(input) = ev.target().and_then(|t| t.dyn_into::<web_sys::HtmlInputElement>().ok()) {
                    on_checked.run(input.checked());
                }
            }
        />
    }
}

/// `(value, label)` pairs rendered as a native `<select>` with an empty first option.
#[component]
pub fn NativeSelect(
    #[prop(into, optional)] class: String,
    #[prop(into, optional)] id: String,
    #[prop(into, optional)] name: String,
    #[prop(into)] options: Signal<Vec<(String, String)>>,
    #[prop(into)] value: Signal<String>,
    #[prop(into, optional)] invalid: Signal<bool>,
    #[prop(into, optional)] disabled: Signal<bool>,
    on_value: Callback<String>,
) -> impl IntoView {
    let merged_class = tw_merge!(CONTROL_CLASS, "pr-8", class);

    view! {
        <select
            data-name="NativeSelect"
            class=merged_class
            id=id
            name=name
            disabled=move || disabled.get()
            aria-invalid=move || invalid.get().then_some("true")
            class:invalid=move || invalid.get()
            on:change=move |ev: web_sys::Event| {
                if let Some(v) = event_value(&ev) {
                    on_value.run(v);
                }
            }
        >
            <option value="" selected=move || value.get().is_empty()>"Select..."</option>
            {move || {
                let current = value.get();
                options
                    .get()
                    .into_iter()
                    .map(|(v, label)| {
                        let selected = v == current;
                        view! { <option value=v selected=selected>{label}</option> }
                    })
                    .collect_view()
            }}
        </select>
    }
}
